//! Error types for OxiZip operations.
//!
//! Every fallible operation in the workspace returns [`OxiZipError`]. The
//! variants are fine grained; [`OxiZipError::kind`] folds them onto the
//! coarse taxonomy callers usually branch on.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for OxiZip operations.
#[derive(Debug, Error)]
pub enum OxiZipError {
    /// I/O error from the underlying file system or stream.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Entry name is empty or malformed.
    #[error("Invalid entry name {name:?}: {reason}")]
    InvalidName {
        /// The offending name.
        name: String,
        /// Why the name was rejected.
        reason: String,
    },

    /// An entry with the same name already exists in the archive.
    #[error("An entry with the name {name:?} already exists in the archive")]
    DuplicateEntry {
        /// The colliding name.
        name: String,
    },

    /// The source is not a readable ZIP archive.
    #[error("Cannot read archive: {message}")]
    BadRead {
        /// Description of the structural problem.
        message: String,
    },

    /// The stream cannot be used (missing, or not seekable when it must be).
    #[error("Bad stream: {message}")]
    BadStream {
        /// Description of the stream problem.
        message: String,
    },

    /// The operation is not valid in the archive's current state.
    #[error("Bad state: {message}")]
    BadState {
        /// Description of the state problem.
        message: String,
    },

    /// Malformed selection criteria.
    #[error("Invalid selection criteria at position {position}: {message}")]
    Parse {
        /// Description of the syntax problem.
        message: String,
        /// Character offset into the criteria string.
        position: usize,
    },

    /// Directory traversal failed (cycle, excessive depth).
    #[error("Traversal error at {}: {message}", path.display())]
    Traversal {
        /// Path where traversal stopped.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// Zip64 extensions are required but disabled.
    #[error("Zip64 required but disabled: {message}")]
    Zip64Required {
        /// What exceeded the 32-bit limits.
        message: String,
    },

    /// A configuration value was rejected.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the rejected value.
        message: String,
    },

    /// The operation was cancelled by a listener.
    #[error("Operation cancelled")]
    Cancelled,

    /// CRC checksum mismatch after decompression.
    #[error("CRC mismatch in {name:?}: expected {expected:#010x}, computed {computed:#010x}")]
    CrcMismatch {
        /// Entry name.
        name: String,
        /// CRC recorded in the archive.
        expected: u32,
        /// CRC of the extracted data.
        computed: u32,
    },

    /// Missing or wrong password for an encrypted entry.
    #[error("Bad password for entry {name:?}")]
    BadPassword {
        /// Entry name.
        name: String,
    },

    /// WinZip AES authentication code did not match.
    #[error("Authentication code mismatch for entry {name:?}")]
    AuthenticationFailed {
        /// Entry name.
        name: String,
    },

    /// Corrupted data in archive.
    #[error("Corrupted data at offset {offset}: {message}")]
    CorruptedData {
        /// Byte offset where corruption was detected.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// Unsupported compression or encryption method.
    #[error("Unsupported method: {method}")]
    UnsupportedMethod {
        /// Method description.
        method: String,
    },

    /// Path traversal attack detected (e.g., "../" in an entry name).
    #[error("Path traversal detected in entry: {path}")]
    PathTraversal {
        /// The suspicious path.
        path: String,
    },

    /// Entry not found in archive.
    #[error("Entry not found: {name}")]
    EntryNotFound {
        /// Name of the missing entry.
        name: String,
    },

    /// Extraction target exists and the policy says to fail.
    #[error("Target file already exists: {}", path.display())]
    ExtractConflict {
        /// The existing file.
        path: PathBuf,
    },
}

/// Result type alias for OxiZip operations.
pub type Result<T> = std::result::Result<T, OxiZipError>;

/// Coarse error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Empty or malformed entry name.
    InvalidName,
    /// Name collision on add.
    DuplicateEntry,
    /// Source is not a valid archive.
    BadRead,
    /// Unusable stream.
    BadStream,
    /// Operation requires a different archive state.
    BadState,
    /// Malformed selection criteria.
    ParseError,
    /// Underlying file system failure.
    IoError,
    /// Verification or consistency failure in archive data.
    ZipError,
    /// Operation not allowed by the archive configuration.
    InvalidOperation,
    /// Rejected configuration value.
    InvalidArgument,
    /// Cancelled by a listener.
    Cancelled,
}

impl OxiZipError {
    /// Map this error onto the coarse taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) | Self::Traversal { .. } => ErrorKind::IoError,
            Self::InvalidName { .. } => ErrorKind::InvalidName,
            Self::DuplicateEntry { .. } => ErrorKind::DuplicateEntry,
            Self::BadRead { .. } => ErrorKind::BadRead,
            Self::BadStream { .. } => ErrorKind::BadStream,
            Self::BadState { .. } => ErrorKind::BadState,
            Self::Parse { .. } => ErrorKind::ParseError,
            Self::Zip64Required { .. } => ErrorKind::InvalidOperation,
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::CrcMismatch { .. }
            | Self::BadPassword { .. }
            | Self::AuthenticationFailed { .. }
            | Self::CorruptedData { .. }
            | Self::UnsupportedMethod { .. }
            | Self::PathTraversal { .. }
            | Self::EntryNotFound { .. }
            | Self::ExtractConflict { .. } => ErrorKind::ZipError,
        }
    }

    /// Create an invalid name error.
    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a duplicate entry error.
    pub fn duplicate_entry(name: impl Into<String>) -> Self {
        Self::DuplicateEntry { name: name.into() }
    }

    /// Create a bad read error.
    pub fn bad_read(message: impl Into<String>) -> Self {
        Self::BadRead {
            message: message.into(),
        }
    }

    /// Create a bad stream error.
    pub fn bad_stream(message: impl Into<String>) -> Self {
        Self::BadStream {
            message: message.into(),
        }
    }

    /// Create a bad state error.
    pub fn bad_state(message: impl Into<String>) -> Self {
        Self::BadState {
            message: message.into(),
        }
    }

    /// Create a selection parse error.
    pub fn parse(message: impl Into<String>, position: usize) -> Self {
        Self::Parse {
            message: message.into(),
            position,
        }
    }

    /// Create a traversal error.
    pub fn traversal(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Traversal {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a Zip64-required error.
    pub fn zip64_required(message: impl Into<String>) -> Self {
        Self::Zip64Required {
            message: message.into(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a CRC mismatch error.
    pub fn crc_mismatch(name: impl Into<String>, expected: u32, computed: u32) -> Self {
        Self::CrcMismatch {
            name: name.into(),
            expected,
            computed,
        }
    }

    /// Create a bad password error.
    pub fn bad_password(name: impl Into<String>) -> Self {
        Self::BadPassword { name: name.into() }
    }

    /// Create an authentication failure error.
    pub fn authentication_failed(name: impl Into<String>) -> Self {
        Self::AuthenticationFailed { name: name.into() }
    }

    /// Create a corrupted data error.
    pub fn corrupted(offset: u64, message: impl Into<String>) -> Self {
        Self::CorruptedData {
            offset,
            message: message.into(),
        }
    }

    /// Create an unsupported method error.
    pub fn unsupported_method(method: impl Into<String>) -> Self {
        Self::UnsupportedMethod {
            method: method.into(),
        }
    }

    /// Create a path traversal error.
    pub fn path_traversal(path: impl Into<String>) -> Self {
        Self::PathTraversal { path: path.into() }
    }

    /// Create an entry not found error.
    pub fn entry_not_found(name: impl Into<String>) -> Self {
        Self::EntryNotFound { name: name.into() }
    }

    /// Create an extract conflict error.
    pub fn extract_conflict(path: impl Into<PathBuf>) -> Self {
        Self::ExtractConflict { path: path.into() }
    }

    /// Convert an I/O error, recovering an [`OxiZipError`] that was carried
    /// through a `Read`/`Write` adapter with [`OxiZipError::into_io`].
    pub fn from_io(err: io::Error) -> Self {
        let carries_own = err.get_ref().is_some_and(|inner| inner.is::<OxiZipError>());
        if carries_own {
            if let Some(inner) = err.into_inner() {
                if let Ok(own) = inner.downcast::<OxiZipError>() {
                    return *own;
                }
            }
            return Self::bad_stream("lost error payload");
        }
        Self::Io(err)
    }

    /// Wrap into an [`io::Error`] so it can cross `Read`/`Write` boundaries.
    pub fn into_io(self) -> io::Error {
        match self {
            Self::Io(err) => err,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }

    /// Whether this error came from the file system rather than archive data.
    pub fn is_io(&self) -> bool {
        self.kind() == ErrorKind::IoError
    }
}
