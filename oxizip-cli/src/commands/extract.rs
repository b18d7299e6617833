//! Extract command implementation.

use super::CmdResult;
use crate::utils::{CliListener, OverwriteArg};
use oxizip_archive::ZipArchive;
use std::path::Path;
use tracing::info;

/// Options for extracting an archive.
pub struct ExtractOptions<'a> {
    pub archive: &'a Path,
    pub output: &'a Path,
    pub select: Option<&'a str>,
    pub overwrite: OverwriteArg,
    pub password: Option<&'a str>,
    pub progress: bool,
}

pub fn cmd_extract(options: &ExtractOptions) -> CmdResult {
    let mut zip = ZipArchive::open(options.archive)?;
    zip.set_password(options.password);
    zip.set_extract_existing_file(options.overwrite.into());

    let mut listener = CliListener::new(options.progress);
    let report = match options.select {
        Some(criteria) => zip.extract_selected_with_listener(criteria, options.output, &mut listener)?,
        None => zip.extract_all_with_listener(options.output, &mut listener)?,
    };
    info!(extracted = report.extracted.len(), skipped = report.skipped.len(), "extract finished");

    println!(
        "Extracted {} entries to {}",
        report.extracted.len(),
        options.output.display()
    );
    if !report.skipped.is_empty() {
        println!("Kept {} existing files:", report.skipped.len());
        for name in &report.skipped {
            println!("  {}", name);
        }
    }
    Ok(())
}
