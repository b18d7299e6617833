//! Archive entries.

use super::extra::AesExtra;
use super::options::ZipErrorAction;
use oxizip_core::entry::{CompressionMethod, EncryptionAlgorithm, EntryTimes, TimestampFormats};
use oxizip_core::time::DosDateTime;
use oxizip_core::FileAttributes;
use oxizip_select::Candidate;
use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Closure producing a fresh reader each time the entry is written.
pub type StreamOpener = Box<dyn FnMut() -> io::Result<Box<dyn Read>>>;

/// Where the data of a new or updated entry comes from.
///
/// Sources are opened lazily, when the archive is saved.
pub enum EntrySource {
    /// In-memory bytes.
    Bytes(Vec<u8>),
    /// A file on disk.
    File(PathBuf),
    /// A reader; it can be consumed by one save only.
    Reader(Box<dyn Read>),
    /// A closure that opens a reader for every save.
    Opener(StreamOpener),
}

impl EntrySource {
    /// Source from any readable value.
    pub fn reader<R: Read + 'static>(reader: R) -> Self {
        Self::Reader(Box::new(reader))
    }

    /// Source from a re-openable closure.
    pub fn opener<F>(open: F) -> Self
    where
        F: FnMut() -> io::Result<Box<dyn Read>> + 'static,
    {
        Self::Opener(Box::new(open))
    }

    /// Source from a file path.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    pub(crate) fn known_size(&self) -> Option<u64> {
        match self {
            Self::Bytes(b) => Some(b.len() as u64),
            Self::File(p) => fs::metadata(p).ok().map(|m| m.len()),
            Self::Reader(_) | Self::Opener(_) => None,
        }
    }
}

impl fmt::Debug for EntrySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            Self::File(p) => write!(f, "File({})", p.display()),
            Self::Reader(_) => f.write_str("Reader"),
            Self::Opener(_) => f.write_str("Opener"),
        }
    }
}

impl From<Vec<u8>> for EntrySource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<&[u8]> for EntrySource {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for EntrySource {
    fn from(bytes: &[u8; N]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}

impl From<&str> for EntrySource {
    fn from(text: &str) -> Self {
        Self::Bytes(text.as_bytes().to_vec())
    }
}

impl From<String> for EntrySource {
    fn from(text: String) -> Self {
        Self::Bytes(text.into_bytes())
    }
}

impl From<&Path> for EntrySource {
    fn from(path: &Path) -> Self {
        Self::File(path.to_path_buf())
    }
}

impl From<PathBuf> for EntrySource {
    fn from(path: PathBuf) -> Self {
        Self::File(path)
    }
}

/// Position and raw header values of an entry inside a loaded archive.
#[derive(Debug, Clone)]
pub(crate) struct Location {
    pub local_header_offset: u64,
    pub flags: u16,
    /// Method id as stored (99 for AES).
    pub raw_method: u16,
    pub version_needed: u16,
    pub dos_time: DosDateTime,
    pub aes: Option<AesExtra>,
    /// Central extra blocks this crate does not interpret.
    pub foreign_extra: Vec<u8>,
}

impl Location {
    /// Compression method of the stored data.
    pub fn real_method(&self) -> CompressionMethod {
        match self.aes {
            Some(aes) => CompressionMethod::from_u16(aes.method),
            None => CompressionMethod::from_u16(self.raw_method),
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.flags & super::format::FLAG_ENCRYPTED != 0
    }
}

pub(crate) enum Payload {
    Source(EntrySource),
    /// A reader source already written by a previous save.
    Consumed,
    Directory,
    Existing(Location),
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source(s) => write!(f, "Source({s:?})"),
            Self::Consumed => f.write_str("Consumed"),
            Self::Directory => f.write_str("Directory"),
            Self::Existing(l) => write!(f, "Existing(offset {})", l.local_header_offset),
        }
    }
}

/// One member of a [`ZipArchive`](super::ZipArchive).
///
/// Sizes and CRC are those recorded in the archive; for entries that have
/// not been saved yet they are zero (or the known size of the source).
#[derive(Debug)]
pub struct ZipEntry {
    pub(crate) name: String,
    pub(crate) comment: String,
    pub(crate) method: CompressionMethod,
    pub(crate) level: u32,
    pub(crate) encryption: EncryptionAlgorithm,
    pub(crate) password: Option<String>,
    pub(crate) times: EntryTimes,
    pub(crate) timestamp_formats: TimestampFormats,
    pub(crate) attributes: FileAttributes,
    pub(crate) error_action: Option<ZipErrorAction>,
    pub(crate) crc32: u32,
    pub(crate) compressed_size: u64,
    pub(crate) uncompressed_size: u64,
    pub(crate) payload: Payload,
    /// Set when an existing entry must be decoded and encoded again.
    pub(crate) recode: bool,
}

impl ZipEntry {
    pub(crate) fn new(name: String, payload: Payload) -> Self {
        let is_dir = matches!(payload, Payload::Directory);
        let uncompressed_size = match &payload {
            Payload::Source(s) => s.known_size().unwrap_or(0),
            _ => 0,
        };
        let attributes = if is_dir {
            FileAttributes::from_dos(FileAttributes::DIRECTORY)
        } else {
            FileAttributes::from_dos(FileAttributes::ARCHIVE)
        };
        Self {
            name,
            comment: String::new(),
            method: CompressionMethod::Deflate,
            level: 6,
            encryption: EncryptionAlgorithm::None,
            password: None,
            times: EntryTimes::uniform(SystemTime::now()),
            timestamp_formats: TimestampFormats::default(),
            attributes,
            error_action: None,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size,
            payload,
            recode: false,
        }
    }

    /// Entry name, with a trailing `/` for directories.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this is a directory entry.
    pub fn is_directory(&self) -> bool {
        self.name.ends_with('/')
    }

    /// Whether the entry's data lives in a saved archive.
    pub fn is_saved(&self) -> bool {
        matches!(self.payload, Payload::Existing(_) | Payload::Directory)
    }

    /// Entry comment.
    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// Set the entry comment.
    pub fn set_comment(&mut self, comment: impl Into<String>) {
        self.comment = comment.into();
    }

    /// Compression method.
    pub fn compression_method(&self) -> CompressionMethod {
        self.method
    }

    /// Set the compression method. Changing it on a saved entry recompresses
    /// it on the next save.
    pub fn set_compression_method(&mut self, method: CompressionMethod) {
        if method != self.method {
            self.method = method;
            self.mark_recode();
        }
    }

    /// Deflate level.
    pub fn compression_level(&self) -> u32 {
        self.level
    }

    /// Set the deflate level (0-9).
    pub fn set_compression_level(&mut self, level: u32) {
        let level = level.min(9);
        if level != self.level {
            self.level = level;
            self.mark_recode();
        }
    }

    /// Encryption algorithm.
    pub fn encryption(&self) -> EncryptionAlgorithm {
        self.encryption
    }

    /// Set the encryption algorithm. A password is needed to save.
    pub fn set_encryption(&mut self, encryption: EncryptionAlgorithm) {
        if encryption != self.encryption {
            self.encryption = encryption;
            self.mark_recode();
        }
    }

    /// Set the password used to encrypt this entry and to read it back.
    /// An unencrypted entry switches to [`EncryptionAlgorithm::PkzipWeak`].
    pub fn set_password(&mut self, password: Option<&str>) {
        self.password = password.map(str::to_string);
        if self.password.is_some()
            && self.encryption == EncryptionAlgorithm::None
            && !self.is_directory()
        {
            self.encryption = EncryptionAlgorithm::PkzipWeak;
            self.mark_recode();
        }
    }

    /// Timestamps.
    pub fn times(&self) -> EntryTimes {
        self.times
    }

    /// Set all timestamps.
    pub fn set_times(&mut self, times: EntryTimes) {
        self.times = times;
    }

    /// Set the modification time.
    pub fn set_modified(&mut self, modified: SystemTime) {
        self.times.modified = Some(modified);
    }

    /// Extra timestamp formats written for this entry.
    pub fn timestamp_formats(&self) -> TimestampFormats {
        self.timestamp_formats
    }

    /// Choose the extra timestamp formats.
    pub fn set_timestamp_formats(&mut self, formats: TimestampFormats) {
        self.timestamp_formats = formats;
    }

    /// File attributes.
    pub fn file_attributes(&self) -> FileAttributes {
        self.attributes
    }

    /// Set file attributes. The directory bit follows the entry kind.
    pub fn set_file_attributes(&mut self, attributes: FileAttributes) {
        let mut attributes = attributes;
        if self.is_directory() {
            attributes.dos |= FileAttributes::DIRECTORY;
        } else {
            attributes.dos &= !FileAttributes::DIRECTORY;
        }
        self.attributes = attributes;
    }

    /// Per-entry error policy, overriding the archive's.
    pub fn error_action(&self) -> Option<ZipErrorAction> {
        self.error_action
    }

    /// Override the archive error policy for this entry.
    pub fn set_error_action(&mut self, action: Option<ZipErrorAction>) {
        self.error_action = action;
    }

    /// CRC-32 of the uncompressed data.
    pub fn crc32(&self) -> u32 {
        self.crc32
    }

    /// Compressed size, including encryption overhead.
    pub fn compressed_size(&self) -> u64 {
        self.compressed_size
    }

    /// Uncompressed size.
    pub fn uncompressed_size(&self) -> u64 {
        self.uncompressed_size
    }

    /// Compressed size as a percentage of the uncompressed size.
    pub fn compression_ratio(&self) -> f64 {
        if self.uncompressed_size == 0 {
            return 0.0;
        }
        self.compressed_size as f64 / self.uncompressed_size as f64 * 100.0
    }

    /// Swap in new content; the entry keeps its settings.
    pub(crate) fn replace_source(&mut self, source: EntrySource) {
        self.uncompressed_size = source.known_size().unwrap_or(0);
        self.compressed_size = 0;
        self.crc32 = 0;
        self.payload = Payload::Source(source);
        self.recode = false;
        self.times = EntryTimes::uniform(SystemTime::now());
    }

    fn mark_recode(&mut self) {
        if matches!(self.payload, Payload::Existing(_)) {
            self.recode = true;
        }
    }

    pub(crate) fn location(&self) -> Option<&Location> {
        match &self.payload {
            Payload::Existing(loc) => Some(loc),
            _ => None,
        }
    }
}

impl Candidate for ZipEntry {
    fn path(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.uncompressed_size
    }

    fn modified(&self) -> Option<SystemTime> {
        self.times.modified
    }

    fn created(&self) -> Option<SystemTime> {
        self.times.created
    }

    fn accessed(&self) -> Option<SystemTime> {
        self.times.accessed
    }

    fn attributes(&self) -> FileAttributes {
        self.attributes
    }

    fn is_dir(&self) -> bool {
        self.is_directory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_sizes() {
        let e = ZipEntry::new("a.txt".into(), Payload::Source("hello".into()));
        assert_eq!(e.uncompressed_size(), 5);
        assert!(!e.is_saved());
        assert!(!e.is_directory());

        let d = ZipEntry::new("dir/".into(), Payload::Directory);
        assert!(d.is_directory());
        assert!(d.file_attributes().contains(FileAttributes::DIRECTORY));
    }

    #[test]
    fn test_settings_on_new_entry_do_not_recode() {
        let mut e = ZipEntry::new("a".into(), Payload::Source(EntrySource::from(&b"x"[..])));
        e.set_compression_method(CompressionMethod::Stored);
        e.set_compression_level(12);
        assert_eq!(e.compression_level(), 9);
        assert!(!e.recode);
    }

    #[test]
    fn test_password_turns_on_encryption() {
        let mut e = ZipEntry::new("a".into(), Payload::Source("x".into()));
        e.set_password(Some("pw"));
        assert_eq!(e.encryption(), EncryptionAlgorithm::PkzipWeak);

        let mut aes = ZipEntry::new("b".into(), Payload::Source("x".into()));
        aes.set_encryption(EncryptionAlgorithm::WinZipAes128);
        aes.set_password(Some("pw"));
        assert_eq!(aes.encryption(), EncryptionAlgorithm::WinZipAes128);
    }

    #[test]
    fn test_directory_bit_follows_kind() {
        let mut e = ZipEntry::new("f".into(), Payload::Source("x".into()));
        e.set_file_attributes(FileAttributes::from_dos(FileAttributes::DIRECTORY | FileAttributes::HIDDEN));
        assert!(!e.file_attributes().contains(FileAttributes::DIRECTORY));
        assert!(e.file_attributes().is_hidden());
    }

    #[test]
    fn test_candidate_view() {
        let e = ZipEntry::new("docs/readme.md".into(), Payload::Source("abc".into()));
        let c: &dyn Candidate = &e;
        assert_eq!(c.path(), "docs/readme.md");
        assert_eq!(c.size(), 3);
        assert!(c.modified().is_some());
    }
}
