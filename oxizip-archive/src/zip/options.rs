//! Archive-wide settings.

use super::pipeline::{DEFAULT_BUFFER_SIZE, PARALLEL_BLOCK_SIZE};
use oxizip_core::entry::{CompressionMethod, EncryptionAlgorithm, TimestampFormats};
use oxizip_core::error::{OxiZipError, Result};
use std::time::Duration;

/// When to write Zip64 structures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Zip64Mode {
    /// Never; saving fails if the archive needs them.
    Never,
    /// Only for entries and archives that need them.
    #[default]
    AsNecessary,
    /// For every entry and the archive trailer.
    Always,
}

/// What to do when an entry fails while saving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZipErrorAction {
    /// Abort the save.
    #[default]
    Throw,
    /// Leave the entry out and continue.
    Skip,
    /// Try the entry again after a delay.
    Retry,
    /// Ask the listener.
    InvokeErrorEvent,
}

/// What to do when an extraction target already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractExistingFileAction {
    /// Fail with [`OxiZipError::ExtractConflict`].
    #[default]
    Throw,
    /// Replace the file.
    OverwriteSilently,
    /// Keep the existing file and skip the entry.
    DoNotOverwrite,
    /// Ask the listener.
    InvokeExtractProgressEvent,
}

/// Default number of retries for [`ZipErrorAction::Retry`].
pub const DEFAULT_MAX_RETRIES: u32 = 29;

/// Default pause between retries.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Settings applied to a [`ZipArchive`](super::ZipArchive).
///
/// Entry-level settings (method, level, encryption, password, timestamp
/// formats, error action) are captured into each entry when it is added.
#[derive(Debug, Clone)]
pub struct ArchiveOptions {
    /// Password applied to entries added from now on.
    pub password: Option<String>,
    /// Encryption applied to entries added while a password is set.
    pub encryption: EncryptionAlgorithm,
    /// Compression method for new entries.
    pub compression_method: CompressionMethod,
    /// Deflate level 0-9; 0 stores.
    pub compression_level: u32,
    /// Zip64 policy.
    pub zip64: Zip64Mode,
    /// Minimum known size for parallel deflate; negative disables it.
    pub parallel_deflate_threshold: i64,
    /// Sort entries by name (case-insensitive) when saving.
    pub sort_entries_before_saving: bool,
    /// Case-sensitive entry lookup.
    pub case_sensitive_retrieval: bool,
    /// Error policy while saving.
    pub error_action: ZipErrorAction,
    /// Attempts per entry under [`ZipErrorAction::Retry`], including the first.
    pub max_retries: u32,
    /// Pause between retries.
    pub retry_delay: Duration,
    /// Action once retries are exhausted.
    pub retry_exhausted_action: ZipErrorAction,
    /// Policy for existing files on extraction.
    pub extract_existing_file: ExtractExistingFileAction,
    /// Extra timestamp fields for new entries.
    pub timestamp_formats: TimestampFormats,
    /// Descend into symlinked directories when adding.
    pub follow_reparse_points: bool,
    /// Keep directory structure below the added root.
    pub preserve_directory_hierarchy: bool,
    /// Add directories that end up with no files.
    pub add_empty_directories: bool,
    /// Copy buffer size.
    pub buffer_size: usize,
    /// Archive comment.
    pub comment: String,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            password: None,
            encryption: EncryptionAlgorithm::None,
            compression_method: CompressionMethod::Deflate,
            compression_level: 6,
            zip64: Zip64Mode::default(),
            parallel_deflate_threshold: 512 * 1024,
            sort_entries_before_saving: false,
            case_sensitive_retrieval: false,
            error_action: ZipErrorAction::Throw,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            retry_exhausted_action: ZipErrorAction::Throw,
            extract_existing_file: ExtractExistingFileAction::Throw,
            timestamp_formats: TimestampFormats::default(),
            follow_reparse_points: false,
            preserve_directory_hierarchy: true,
            add_empty_directories: true,
            buffer_size: DEFAULT_BUFFER_SIZE,
            comment: String::new(),
        }
    }
}

/// Validate a parallel deflate threshold.
///
/// Negative disables parallel deflate; otherwise the threshold must be at
/// least one block.
pub fn check_parallel_threshold(threshold: i64) -> Result<()> {
    if threshold >= 0 && threshold < PARALLEL_BLOCK_SIZE as i64 {
        return Err(OxiZipError::invalid_argument(format!(
            "parallel deflate threshold must be negative or at least {PARALLEL_BLOCK_SIZE} bytes, got {threshold}"
        )));
    }
    Ok(())
}

/// Whether a source of `known_size` bytes should use parallel deflate.
pub fn use_parallel(threshold: i64, known_size: Option<u64>) -> bool {
    match (u64::try_from(threshold), known_size) {
        (Ok(limit), Some(size)) => size >= limit,
        _ => false,
    }
}
