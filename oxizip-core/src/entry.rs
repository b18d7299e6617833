//! Entry metadata.
//!
//! Format-level types describing one archive member: how it is compressed,
//! how it is encrypted, which timestamps it carries, and how its name is
//! normalized.

use crate::error::{OxiZipError, Result};
use std::time::SystemTime;

/// Compression method used for an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum CompressionMethod {
    /// No compression (method 0).
    Stored,
    /// DEFLATE compression (method 8).
    #[default]
    Deflate,
    /// Unknown/unsupported method.
    Unknown(u16),
}

impl CompressionMethod {
    /// Create from the on-disk method id.
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => Self::Stored,
            8 => Self::Deflate,
            _ => Self::Unknown(value),
        }
    }

    /// The on-disk method id.
    pub fn to_u16(self) -> u16 {
        match self {
            Self::Stored => 0,
            Self::Deflate => 8,
            Self::Unknown(id) => id,
        }
    }

    /// Get the method name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Stored => "Stored",
            Self::Deflate => "Deflate",
            Self::Unknown(_) => "Unknown",
        }
    }
}

impl std::fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown(id) => write!(f, "Unknown({})", id),
            _ => write!(f, "{}", self.name()),
        }
    }
}

/// Encryption applied to an entry's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum EncryptionAlgorithm {
    /// Not encrypted.
    #[default]
    None,
    /// Traditional PKWARE stream cipher (ZipCrypto).
    PkzipWeak,
    /// WinZip AES with a 128-bit key.
    WinZipAes128,
    /// WinZip AES with a 256-bit key.
    WinZipAes256,
}

impl EncryptionAlgorithm {
    /// Whether any encryption is applied.
    pub fn is_encrypted(self) -> bool {
        !matches!(self, Self::None)
    }

    /// Whether this is one of the WinZip AES variants.
    pub fn is_aes(self) -> bool {
        matches!(self, Self::WinZipAes128 | Self::WinZipAes256)
    }
}

impl std::fmt::Display for EncryptionAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::None => "None",
            Self::PkzipWeak => "ZipCrypto",
            Self::WinZipAes128 => "AES-128",
            Self::WinZipAes256 => "AES-256",
        };
        f.write_str(name)
    }
}

/// Timestamps attached to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryTimes {
    /// Last modification time.
    pub modified: Option<SystemTime>,
    /// Last access time.
    pub accessed: Option<SystemTime>,
    /// Creation time.
    pub created: Option<SystemTime>,
}

impl EntryTimes {
    /// All three timestamps set to the same instant.
    pub fn uniform(time: SystemTime) -> Self {
        Self {
            modified: Some(time),
            accessed: Some(time),
            created: Some(time),
        }
    }
}

/// Extra-field timestamp encodings an entry carries besides the DOS fields.
///
/// DOS date/time is always written; these flags add the NTFS (0x000a) and
/// extended Unix (0x5455) extra fields. Both may be present at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampFormats {
    /// NTFS extra field with 100ns FILETIME values.
    pub windows: bool,
    /// Extended timestamp extra field with Unix seconds.
    pub unix: bool,
}

impl Default for TimestampFormats {
    fn default() -> Self {
        Self {
            windows: true,
            unix: false,
        }
    }
}

/// Normalize an entry name to the archive's forward-slash form.
///
/// Backslashes become `/`, a leading `./` or `/` and any drive prefix are
/// removed, and runs of `/` collapse. A trailing `/` (directory marker) is
/// preserved. Empty results are rejected.
pub fn normalize_entry_name(name: &str) -> Result<String> {
    let mut unified = name.replace('\\', "/");

    // Drive letter prefix ("C:/...")
    if unified.len() >= 2 && unified.as_bytes()[1] == b':' && unified.as_bytes()[0].is_ascii_alphabetic() {
        unified.drain(..2);
    }

    let is_dir = unified.ends_with('/');
    let parts: Vec<&str> = unified
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect();

    if parts.is_empty() {
        return Err(OxiZipError::invalid_name(name, "entry name is empty"));
    }
    if name.contains('\0') {
        return Err(OxiZipError::invalid_name(name, "entry name contains NUL"));
    }

    let mut normalized = parts.join("/");
    if is_dir {
        normalized.push('/');
    }
    Ok(normalized)
}
