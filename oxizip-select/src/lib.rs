//! # OxiZip Select
//!
//! A small boolean language for choosing files on disk or entries in an
//! archive by name, size, timestamps, attributes and type.
//!
//! ```text
//! name = *.txt AND size > 10kb
//! (mtime < 2009-01-01 OR attributes = H) AND NOT type = D
//! '*.doc' XOR name = 'Tom Jones*'
//! ```
//!
//! Nouns are `name`, `size`, `mtime`, `ctime`, `atime`, `attributes` and
//! `type`. A bare pattern is shorthand for `name = pattern`. `NOT` binds
//! tightest, then `AND`, `XOR`, `OR`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use oxizip_select::FileSelector;
//! use std::path::Path;
//!
//! let selector = FileSelector::new("*.rs AND size < 100kb")?;
//! for path in selector.select_files(Path::new("src"), true)? {
//!     println!("{}", path.display());
//! }
//! # Ok::<(), oxizip_core::OxiZipError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod ast;
pub mod candidate;
pub mod lexer;
pub mod parser;
pub mod pattern;
pub mod selector;
pub mod walk;

pub use ast::{CmpOp, Criterion, Predicate, TimeField};
pub use candidate::{Candidate, FsCandidate};
pub use pattern::NamePattern;
pub use selector::{FileSelector, Selected};
pub use walk::{WalkEntry, WalkOptions, walk};
