//! Progress reporting, cancellation and error callbacks.
//!
//! Long-running operations accept an [`ArchiveListener`]. Progress events
//! may ask for cancellation, which takes effect at the next entry
//! boundary; the operation then fails with [`OxiZipError::Cancelled`].

use super::options::{ExtractExistingFileAction, ZipErrorAction};
use oxizip_core::error::OxiZipError;
use std::path::Path;

/// Kind of progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressKind {
    /// A save is starting.
    SaveStarted,
    /// An entry is about to be written or extracted.
    BeforeEntry,
    /// Bytes of the current entry have been transferred.
    EntryBytesTransferred,
    /// The current entry is done.
    AfterEntry,
    /// The save finished.
    SaveCompleted,
    /// An extraction is starting.
    ExtractStarted,
    /// The extraction finished.
    ExtractCompleted,
}

/// A progress notification.
#[derive(Debug, Clone)]
pub struct ProgressEvent<'a> {
    /// What happened.
    pub kind: ProgressKind,
    /// The current entry, if any.
    pub entry_name: Option<&'a str>,
    /// Bytes of the current entry transferred so far.
    pub bytes_transferred: u64,
    /// Size of the current entry, if known.
    pub total_bytes: Option<u64>,
    /// Entries finished so far.
    pub entries_done: usize,
    /// Entries in the operation.
    pub entries_total: usize,
}

/// Listener verdict on a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Control {
    /// Carry on.
    #[default]
    Continue,
    /// Stop at the next entry boundary.
    Cancel,
}

/// An entry that failed while saving.
#[derive(Debug)]
pub struct EntryFailure<'a> {
    /// Entry name.
    pub entry_name: &'a str,
    /// The failure.
    pub error: &'a OxiZipError,
    /// Attempts made so far, starting at 1.
    pub attempt: u32,
}

/// An extraction target that already exists.
#[derive(Debug)]
pub struct ExtractConflict<'a> {
    /// Entry name.
    pub entry_name: &'a str,
    /// Existing file.
    pub path: &'a Path,
}

/// Listener answer to an extraction conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictResolution {
    /// Replace the file.
    Overwrite,
    /// Keep the file, skip the entry.
    #[default]
    Skip,
    /// Fail the extraction.
    Throw,
}

/// Callbacks for archive operations. All methods have defaults.
pub trait ArchiveListener {
    /// Progress notification.
    fn on_progress(&mut self, _event: &ProgressEvent<'_>) -> Control {
        Control::Continue
    }

    /// An entry failed under [`ZipErrorAction::InvokeErrorEvent`].
    ///
    /// Returning `InvokeErrorEvent` again is treated as `Throw`.
    fn on_error(&mut self, _failure: &EntryFailure<'_>) -> ZipErrorAction {
        ZipErrorAction::Throw
    }

    /// An extraction target exists under
    /// [`ExtractExistingFileAction::InvokeExtractProgressEvent`].
    fn on_extract_conflict(&mut self, _conflict: &ExtractConflict<'_>) -> ConflictResolution {
        ConflictResolution::Skip
    }
}

/// Listener that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

impl ArchiveListener for NoopListener {}

/// Adapter turning a closure into a progress-only listener.
pub struct ProgressFn<F>(pub F);

impl<F> ArchiveListener for ProgressFn<F>
where
    F: FnMut(&ProgressEvent<'_>) -> Control,
{
    fn on_progress(&mut self, event: &ProgressEvent<'_>) -> Control {
        (self.0)(event)
    }
}

impl ExtractExistingFileAction {
    /// Map a listener answer onto the action taken.
    pub(crate) fn from_resolution(resolution: ConflictResolution) -> Self {
        match resolution {
            ConflictResolution::Overwrite => Self::OverwriteSilently,
            ConflictResolution::Skip => Self::DoNotOverwrite,
            ConflictResolution::Throw => Self::Throw,
        }
    }
}
