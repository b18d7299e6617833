//! # OxiZip Archive
//!
//! ZIP archive container for OxiZip.
//!
//! - Read archives from files or any `Read + Seek` source; entry data is
//!   decoded lazily.
//! - Build and update archives in memory, then save them atomically.
//! - Deflate (serial or block-parallel) and stored entries, Zip64,
//!   traditional PKWARE encryption and WinZip AES.
//! - Add directory trees and files chosen by selection expressions, and
//!   extract with overwrite policies and path traversal protection.
//!
//! ## Example
//!
//! ```rust,no_run
//! use oxizip_archive::{ZipArchive, Zip64Mode};
//!
//! let mut zip = ZipArchive::new();
//! zip.set_zip64(Zip64Mode::AsNecessary);
//! zip.add_entry("hello.txt", "Hello, world!").unwrap();
//! zip.add_directory("src", "project/src").unwrap();
//! zip.save_as("out.zip").unwrap();
//!
//! let mut zip = ZipArchive::open("out.zip").unwrap();
//! for entry in zip.select_entries("*.rs AND size > 1kb").unwrap() {
//!     println!("{} ({} bytes)", entry.name(), entry.uncompressed_size());
//! }
//! zip.extract_all("unpacked").unwrap();
//! ```
//!
//! ## Progress and errors
//!
//! The `*_with_listener` variants report progress to an
//! [`ArchiveListener`], which can cancel at the next entry boundary, decide
//! what happens to entries whose source fails while saving, and resolve
//! extraction conflicts.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod zip;

// Re-exports
pub use oxizip_core::{
    CompressionMethod, EncryptionAlgorithm, EntryTimes, ErrorKind, FileAttributes, OxiZipError,
    Result, TimestampFormats,
};
pub use zip::{
    ArchiveListener, ArchiveOptions, ConflictResolution, Control, EntryReader, EntrySource,
    ExtractExistingFileAction, ExtractReport, NoopListener, ProgressEvent, ProgressFn,
    ProgressKind, SaveReport, Zip64Mode, ZipArchive, ZipEntry, ZipErrorAction,
};
