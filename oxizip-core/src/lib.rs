//! # OxiZip Core
//!
//! Core components shared by the OxiZip crates.
//!
//! - [`error`]: The error taxonomy used across the workspace
//! - [`entry`]: Format-level entry metadata (methods, encryption, times, names)
//! - [`attributes`]: DOS/Unix file attribute bitmasks
//! - [`time`]: DOS, NTFS and Unix timestamp conversions
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ oxizip-cli       command line front end                 │
//! ├─────────────────────────────────────────────────────────┤
//! │ oxizip-archive   container, pipeline, progress, extract │
//! ├─────────────────────────────────────────────────────────┤
//! │ oxizip-select    selection expression language          │
//! ├─────────────────────────────────────────────────────────┤
//! │ oxizip-core      errors, metadata, time (this crate)    │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use oxizip_core::entry::normalize_entry_name;
//!
//! assert_eq!(normalize_entry_name("dir\\sub\\file.txt").unwrap(), "dir/sub/file.txt");
//! assert!(normalize_entry_name("").is_err());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod attributes;
pub mod entry;
pub mod error;
pub mod time;

// Re-exports for convenience
pub use attributes::FileAttributes;
pub use entry::{
    CompressionMethod, EncryptionAlgorithm, EntryTimes, TimestampFormats, normalize_entry_name,
};
pub use error::{ErrorKind, OxiZipError, Result};
