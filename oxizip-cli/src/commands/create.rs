//! Create command implementation.

use super::{CmdResult, dir_for_input};
use crate::utils::{CliListener, EncryptionArg, MethodArg, Zip64Arg, expand_inputs, format_size};
use oxizip_archive::ZipArchive;
use oxizip_select::{FileSelector, FsCandidate};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Options for creating an archive.
pub struct CreateOptions<'a> {
    pub archive: &'a Path,
    pub inputs: &'a [String],
    pub dir_in_archive: &'a str,
    pub select: Option<&'a str>,
    pub method: MethodArg,
    pub level: u32,
    pub encryption: EncryptionArg,
    pub password: Option<&'a str>,
    pub zip64: Zip64Arg,
    pub parallel_threshold: Option<i64>,
    pub flatten: bool,
    pub empty_dirs: bool,
    pub comment: Option<&'a str>,
    pub force: bool,
    pub progress: bool,
}

pub fn cmd_create(options: &CreateOptions) -> CmdResult {
    if options.archive.exists() && !options.force {
        return Err(format!("{} already exists (use --force to replace it)", options.archive.display()).into());
    }
    if options.encryption != EncryptionArg::None && options.password.is_none() {
        return Err("--encryption needs --password".into());
    }

    let mut zip = ZipArchive::with_path(options.archive);
    zip.set_compression_method(options.method.into());
    zip.set_compression_level(options.level);
    zip.set_zip64(options.zip64.into());
    zip.set_password(options.password);
    zip.set_encryption(options.encryption.into());
    if let Some(threshold) = options.parallel_threshold {
        zip.set_parallel_deflate_threshold(threshold)?;
    }
    zip.set_preserve_directory_hierarchy(!options.flatten);
    zip.set_add_empty_directories(options.empty_dirs);
    if let Some(comment) = options.comment {
        zip.set_comment(comment);
    }

    let selector = options.select.map(FileSelector::new).transpose()?;
    let mut added = 0;
    for input in expand_inputs(options.inputs) {
        added += add_input(&mut zip, &input, options.dir_in_archive, selector.as_ref())?;
    }
    if added == 0 {
        return Err("nothing to add".into());
    }

    let mut listener = CliListener::new(options.progress);
    let report = zip.save_with_listener(&mut listener)?;
    println!(
        "Created {} ({} entries, {})",
        options.archive.display(),
        report.written,
        format_size(report.archive_size)
    );
    for name in &report.skipped {
        eprintln!("  skipped: {}", name);
    }
    Ok(())
}

fn add_input(
    zip: &mut ZipArchive,
    input: &Path,
    dir_in_archive: &str,
    selector: Option<&FileSelector>,
) -> Result<usize, Box<dyn std::error::Error>> {
    let meta = fs::metadata(input).map_err(|e| format!("{}: {}", input.display(), e))?;
    if meta.is_dir() {
        let inner = dir_for_input(dir_in_archive, input);
        debug!(input = %input.display(), inner, "adding directory");
        let added = match selector {
            Some(selector) => zip.add_selected_files(selector.source(), input, &inner, true)?,
            None => zip.add_directory(input, &inner)?,
        };
        return Ok(added);
    }
    if let Some(selector) = selector {
        if !selector.matches(&FsCandidate::from_path(input)?) {
            return Ok(0);
        }
    }
    zip.add_file(input, dir_in_archive)?;
    Ok(1)
}
