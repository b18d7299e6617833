//! Remove command implementation.

use super::CmdResult;
use oxizip_archive::ZipArchive;
use std::path::Path;

pub fn cmd_remove(archive: &Path, names: &[String], select: Option<&str>) -> CmdResult {
    if names.is_empty() && select.is_none() {
        return Err("give entry names or --select".into());
    }
    let mut zip = ZipArchive::open(archive)?;
    let mut removed = zip.remove_entries(names)?;
    if let Some(criteria) = select {
        removed += zip.remove_selected_entries(criteria)?;
    }
    if removed == 0 {
        println!("No entries matched; {} unchanged", archive.display());
        return Ok(());
    }
    zip.save()?;
    println!("Removed {} entries from {}", removed, archive.display());
    Ok(())
}
