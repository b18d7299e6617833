//! Add command implementation: add new files and replace existing ones.

use super::{CmdResult, dir_for_input};
use crate::utils::{CliListener, EncryptionArg, expand_inputs, format_size};
use oxizip_archive::ZipArchive;
use oxizip_select::{WalkOptions, walk};
use std::fs;
use std::path::Path;

/// Options for updating an archive.
pub struct AddOptions<'a> {
    pub archive: &'a Path,
    pub inputs: &'a [String],
    pub dir_in_archive: &'a str,
    pub level: u32,
    pub encryption: EncryptionArg,
    pub password: Option<&'a str>,
    pub progress: bool,
}

pub fn cmd_add(options: &AddOptions) -> CmdResult {
    if options.encryption != EncryptionArg::None && options.password.is_none() {
        return Err("--encryption needs --password".into());
    }
    let mut zip = if options.archive.exists() {
        ZipArchive::open(options.archive)?
    } else {
        ZipArchive::with_path(options.archive)
    };
    zip.set_compression_level(options.level);
    zip.set_password(options.password);
    zip.set_encryption(options.encryption.into());

    let mut updated = 0usize;
    for input in expand_inputs(options.inputs) {
        let meta = fs::metadata(&input).map_err(|e| format!("{}: {}", input.display(), e))?;
        if !meta.is_dir() {
            zip.update_file(&input, options.dir_in_archive)?;
            updated += 1;
            continue;
        }
        let inner = dir_for_input(options.dir_in_archive, &input);
        for found in walk(&input, WalkOptions::default())? {
            if found.is_dir {
                continue;
            }
            let parent = found
                .relative
                .parent()
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .unwrap_or_default();
            let dir = match (inner.is_empty(), parent.is_empty()) {
                (_, true) => inner.clone(),
                (true, false) => parent,
                (false, false) => format!("{inner}/{parent}"),
            };
            zip.update_file(&found.path, &dir)?;
            updated += 1;
        }
    }

    let mut listener = CliListener::new(options.progress);
    let report = zip.save_with_listener(&mut listener)?;
    println!(
        "Updated {} ({} files added or replaced, {} entries, {})",
        options.archive.display(),
        updated,
        report.written,
        format_size(report.archive_size)
    );
    for name in &report.skipped {
        eprintln!("  skipped: {}", name);
    }
    Ok(())
}
