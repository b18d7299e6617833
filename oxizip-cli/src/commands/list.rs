//! List command implementation.

use super::CmdResult;
use crate::utils::format_size;
use oxizip_archive::{ZipArchive, ZipEntry};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::UNIX_EPOCH;

/// JSON serializable entry data for archive listings.
#[derive(Debug, Serialize, Deserialize)]
struct EntryJson {
    name: String,
    size: u64,
    compressed_size: u64,
    ratio: f64,
    method: String,
    encryption: String,
    crc: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    mtime: Option<i64>,
    is_dir: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    comment: String,
}

impl EntryJson {
    fn from_entry(entry: &ZipEntry) -> Self {
        let mtime = entry
            .times()
            .modified
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64);

        Self {
            name: entry.name().to_string(),
            size: entry.uncompressed_size(),
            compressed_size: entry.compressed_size(),
            ratio: entry.compression_ratio(),
            method: entry.compression_method().to_string(),
            encryption: entry.encryption().to_string(),
            crc: entry.crc32(),
            mtime,
            is_dir: entry.is_directory(),
            comment: entry.comment().to_string(),
        }
    }
}

/// JSON output for archive listing.
#[derive(Debug, Serialize, Deserialize)]
struct ArchiveListJson {
    archive: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    comment: String,
    entries: Vec<EntryJson>,
}

/// Options for listing archive contents.
pub struct ListOptions<'a> {
    pub archive: &'a Path,
    pub select: Option<&'a str>,
    pub long: bool,
    pub json: bool,
}

pub fn cmd_list(options: &ListOptions) -> CmdResult {
    let zip = ZipArchive::open(options.archive)?;
    let entries: Vec<&ZipEntry> = match options.select {
        Some(criteria) => zip.select_entries(criteria)?,
        None => zip.entries().iter().collect(),
    };

    if options.json {
        let listing = ArchiveListJson {
            archive: options.archive.display().to_string(),
            comment: zip.comment().to_string(),
            entries: entries.iter().map(|e| EntryJson::from_entry(e)).collect(),
        };
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    if !options.long {
        for entry in &entries {
            println!("{}", entry.name());
        }
        return Ok(());
    }

    println!("Archive: {}", options.archive.display());
    if !zip.comment().is_empty() {
        println!("Comment: {}", zip.comment());
    }
    println!();
    print_table(&entries);
    Ok(())
}

fn print_table(entries: &[&ZipEntry]) {
    println!(
        "{:>10} {:>10} {:>6} {:>8} {:>6} {:>8}  Name",
        "Size", "Compressed", "Saved", "Method", "Crypt", "CRC-32"
    );
    println!("{}", "-".repeat(72));

    let mut total_size = 0u64;
    let mut total_compressed = 0u64;
    for entry in entries {
        let saved = if entry.uncompressed_size() > 0 {
            format!("{:.1}%", 100.0 - entry.compression_ratio())
        } else {
            "-".to_string()
        };
        let crypt = if entry.encryption().is_encrypted() { "yes" } else { "" };
        let prefix = if entry.is_directory() { "d " } else { "  " };
        println!(
            "{:>10} {:>10} {:>6} {:>8} {:>6} {:08x}  {}{}",
            entry.uncompressed_size(),
            entry.compressed_size(),
            saved,
            entry.compression_method().name(),
            crypt,
            entry.crc32(),
            prefix,
            entry.name()
        );
        total_size += entry.uncompressed_size();
        total_compressed += entry.compressed_size();
    }

    println!("{}", "-".repeat(72));
    let total_saved = if total_size > 0 {
        (1.0 - total_compressed as f64 / total_size as f64) * 100.0
    } else {
        0.0
    };
    println!(
        "{:>10} {:>10} {:>5.1}%  {} entries ({})",
        total_size,
        total_compressed,
        total_saved,
        entries.len(),
        format_size(total_size)
    );
}
