//! ZIP archive support.
//!
//! [`ZipArchive`] is the entry point: open or create an archive, add,
//! update, rename and remove entries, then save. Records follow the PKWARE
//! APPNOTE, with Zip64 extensions, traditional PKWARE encryption and WinZip
//! AES.

pub mod aes;
pub mod crypto;
pub mod extra;
pub mod format;
pub mod pipeline;

mod archive;
mod entry;
mod extract;
mod options;
mod progress;
mod reader;
mod traverse;

pub use archive::{SaveReport, ZipArchive};
pub use entry::{EntrySource, StreamOpener, ZipEntry};
pub use extract::ExtractReport;
pub use options::{
    ArchiveOptions, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY, ExtractExistingFileAction,
    Zip64Mode, ZipErrorAction, check_parallel_threshold,
};
pub use pipeline::{EntryReader, PARALLEL_BLOCK_SIZE};
pub use progress::{
    ArchiveListener, ConflictResolution, Control, EntryFailure, ExtractConflict, NoopListener,
    ProgressEvent, ProgressFn, ProgressKind,
};
pub use reader::ReadSeek;
