//! The archive container.
//!
//! A [`ZipArchive`] is an in-memory collection of entries. Adding, updating,
//! renaming and removing entries only changes that collection; nothing is
//! written until one of the save methods runs. Saving to a path goes
//! through a temporary file in the destination directory that replaces the
//! target only once the whole archive has been written, so a failed or
//! cancelled save leaves the previous file (or no file) behind.

use super::aes::AesStrength;
use super::entry::{EntrySource, Location, Payload, ZipEntry};
use super::extra::{self, AesExtra};
use super::format::{
    CentralDirectoryHeader, DataDescriptor, EndOfCentralDirectory, FLAG_DATA_DESCRIPTOR,
    FLAG_ENCRYPTED, FLAG_UTF8, HOST_SYSTEM, LOCAL_HEADER_LEN, LocalFileHeader, METHOD_AES,
    VERSION_AES, VERSION_DEFLATE, VERSION_STORED, VERSION_ZIP64, ZIP64_MARKER_16,
    ZIP64_MARKER_32, version_made_by,
};
use super::options::{
    ArchiveOptions, ExtractExistingFileAction, Zip64Mode, ZipErrorAction, check_parallel_threshold,
    use_parallel,
};
use super::pipeline::{EncodeError, EncodeOutcome, EncodeSettings, EntryReader, encode};
use super::progress::{
    ArchiveListener, Control, EntryFailure, NoopListener, ProgressEvent, ProgressKind,
};
use super::reader::{self, ReadSeek, read_directory, utf8_flag};
use oxizip_core::entry::{
    CompressionMethod, EncryptionAlgorithm, EntryTimes, TimestampFormats, normalize_entry_name,
};
use oxizip_core::error::{OxiZipError, Result};
use oxizip_core::time::DosDateTime;
use oxizip_core::FileAttributes;
use oxizip_select::FileSelector;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, instrument, warn};

/// Whether an entry of `size` input bytes may need Zip64 sizes once
/// encoded. Covers stored-block overhead of deflate on incompressible data
/// plus the encryption header and trailer.
fn may_exceed_32bit(size: u64) -> bool {
    size.saturating_add(size / 1024 + 1024) >= u64::from(ZIP64_MARKER_32)
}

/// Outcome of a save.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReport {
    /// Entries written.
    pub written: usize,
    /// Entries left out by the error policy.
    pub skipped: Vec<String>,
    /// Position of the end of the archive in the destination.
    pub archive_size: u64,
}

/// A ZIP archive being read, built or updated.
pub struct ZipArchive {
    pub(super) entries: Vec<ZipEntry>,
    pub(super) path: Option<PathBuf>,
    pub(super) source: Option<Box<dyn ReadSeek>>,
    pub(super) options: ArchiveOptions,
    looked_up: Cell<bool>,
    /// Lookup key to position, built on demand.
    index: RefCell<Option<HashMap<String, usize>>>,
}

impl fmt::Debug for ZipArchive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZipArchive")
            .field("path", &self.path)
            .field("entries", &self.entries.len())
            .field("loaded", &self.source.is_some())
            .field("options", &self.options)
            .finish()
    }
}

impl Default for ZipArchive {
    fn default() -> Self {
        Self::new()
    }
}

fn lookup_key(name: &str, case_sensitive: bool) -> String {
    if case_sensitive {
        name.to_string()
    } else {
        name.to_lowercase()
    }
}

/// Join an archive directory and a relative name.
pub(super) fn archive_name(dir_in_archive: &str, relative: &str) -> String {
    let dir = dir_in_archive.replace('\\', "/");
    let dir = dir.trim_matches('/');
    if dir.is_empty() {
        relative.to_string()
    } else {
        format!("{dir}/{relative}")
    }
}

/// Copy timestamps and attributes of a file into an entry.
pub(super) fn fill_from_metadata(entry: &mut ZipEntry, meta: &fs::Metadata, file_name: &str) {
    let modified = meta.modified().ok().unwrap_or_else(SystemTime::now);
    entry.times = EntryTimes {
        modified: Some(modified),
        accessed: meta.accessed().ok(),
        created: meta.created().ok(),
    };
    let mut attributes = FileAttributes::from_metadata(meta, file_name);
    if entry.is_directory() {
        attributes.dos |= FileAttributes::DIRECTORY;
        attributes.dos &= !FileAttributes::ARCHIVE;
    }
    entry.attributes = attributes;
    if !entry.is_directory() {
        entry.uncompressed_size = meta.len();
    }
}

fn file_name_of(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| OxiZipError::invalid_argument(format!("{} has no file name", path.display())))
}

fn parent_dir(name: &str) -> &str {
    name.trim_end_matches('/').rsplit_once('/').map_or("", |(parent, _)| parent)
}

impl ZipArchive {
    /// Create an empty archive with no file name.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            path: None,
            source: None,
            options: ArchiveOptions::default(),
            looked_up: Cell::new(false),
            index: RefCell::new(None),
        }
    }

    /// Create an empty archive that [`save`](Self::save) writes to `path`.
    pub fn with_path(path: impl AsRef<Path>) -> Self {
        let mut archive = Self::new();
        archive.path = Some(path.as_ref().to_path_buf());
        archive
    }

    /// Open an existing archive file for reading or updating.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut archive = Self::read(BufReader::new(file))?;
        archive.path = Some(path.to_path_buf());
        info!(entries = archive.entries.len(), "opened archive");
        Ok(archive)
    }

    /// Load an archive from any seekable reader.
    pub fn read<R: Read + Seek + 'static>(reader: R) -> Result<Self> {
        let mut source: Box<dyn ReadSeek> = Box::new(reader);
        let directory = read_directory(&mut source)?;
        let mut archive = Self::new();
        archive.entries = directory.entries;
        archive.options.comment = directory.comment;
        archive.source = Some(source);
        Ok(archive)
    }

    /// Load an archive held in memory.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        Self::read(Cursor::new(bytes.into()))
    }

    /// The file this archive is saved to, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // Configuration

    /// Current settings.
    pub fn options(&self) -> &ArchiveOptions {
        &self.options
    }

    /// Replace all settings at once.
    pub fn set_options(&mut self, options: ArchiveOptions) -> Result<()> {
        check_parallel_threshold(options.parallel_deflate_threshold)?;
        if options.case_sensitive_retrieval != self.options.case_sensitive_retrieval {
            self.set_case_sensitive_retrieval(options.case_sensitive_retrieval)?;
        }
        self.options = options;
        self.invalidate_index();
        Ok(())
    }

    /// Password for entries added from now on, and for reading loaded ones.
    pub fn set_password(&mut self, password: Option<&str>) {
        self.options.password = password.map(str::to_string);
    }

    /// Encryption for entries added while a password is set.
    pub fn set_encryption(&mut self, encryption: EncryptionAlgorithm) {
        self.options.encryption = encryption;
    }

    /// Compression method for new entries.
    pub fn set_compression_method(&mut self, method: CompressionMethod) {
        self.options.compression_method = method;
    }

    /// Deflate level for new entries (0-9).
    pub fn set_compression_level(&mut self, level: u32) {
        self.options.compression_level = level.min(9);
    }

    /// Zip64 policy.
    pub fn set_zip64(&mut self, mode: Zip64Mode) {
        self.options.zip64 = mode;
    }

    /// Parallel deflate threshold; see [`check_parallel_threshold`].
    pub fn set_parallel_deflate_threshold(&mut self, threshold: i64) -> Result<()> {
        check_parallel_threshold(threshold)?;
        self.options.parallel_deflate_threshold = threshold;
        Ok(())
    }

    /// Sort entries by name when saving.
    pub fn set_sort_entries_before_saving(&mut self, sort: bool) {
        self.options.sort_entries_before_saving = sort;
    }

    /// Choose case-sensitive lookup. Must be called before the first
    /// lookup.
    pub fn set_case_sensitive_retrieval(&mut self, case_sensitive: bool) -> Result<()> {
        if self.looked_up.get() {
            return Err(OxiZipError::bad_state(
                "case sensitivity must be set before the first entry lookup",
            ));
        }
        self.options.case_sensitive_retrieval = case_sensitive;
        self.invalidate_index();
        Ok(())
    }

    /// Archive-wide error policy while saving.
    pub fn set_error_action(&mut self, action: ZipErrorAction) {
        self.options.error_action = action;
    }

    /// Attempts per entry under [`ZipErrorAction::Retry`], counting the
    /// first one. Defaults to 29.
    pub fn set_max_retries(&mut self, retries: u32) {
        self.options.max_retries = retries;
    }

    /// Pause between retries.
    pub fn set_retry_delay(&mut self, delay: std::time::Duration) {
        self.options.retry_delay = delay;
    }

    /// Action taken once retries are exhausted.
    pub fn set_retry_exhausted_action(&mut self, action: ZipErrorAction) {
        self.options.retry_exhausted_action = action;
    }

    /// Policy for existing files on extraction.
    pub fn set_extract_existing_file(&mut self, action: ExtractExistingFileAction) {
        self.options.extract_existing_file = action;
    }

    /// Extra timestamp formats for new entries.
    pub fn set_timestamp_formats(&mut self, formats: TimestampFormats) {
        self.options.timestamp_formats = formats;
    }

    /// Descend into symlinked directories when adding directories.
    pub fn set_follow_reparse_points(&mut self, follow: bool) {
        self.options.follow_reparse_points = follow;
    }

    /// Keep the directory structure when adding directories.
    pub fn set_preserve_directory_hierarchy(&mut self, preserve: bool) {
        self.options.preserve_directory_hierarchy = preserve;
    }

    /// Add directories that contain no added files.
    pub fn set_add_empty_directories(&mut self, add: bool) {
        self.options.add_empty_directories = add;
    }

    /// Copy buffer size.
    pub fn set_buffer_size(&mut self, size: usize) {
        self.options.buffer_size = size.max(512);
    }

    /// Archive comment.
    pub fn comment(&self) -> &str {
        &self.options.comment
    }

    /// Set the archive comment.
    pub fn set_comment(&mut self, comment: impl Into<String>) {
        self.options.comment = comment.into();
    }

    // Lookup

    fn key(&self, name: &str) -> String {
        lookup_key(name, self.options.case_sensitive_retrieval)
    }

    pub(super) fn invalidate_index(&self) {
        self.index.replace(None);
    }

    fn exact_position(&self, name: &str) -> Option<usize> {
        let mut index = self.index.borrow_mut();
        let map = index.get_or_insert_with(|| {
            let mut map = HashMap::with_capacity(self.entries.len());
            for (i, entry) in self.entries.iter().enumerate() {
                map.entry(self.key(&entry.name)).or_insert(i);
            }
            map
        });
        map.get(&self.key(name)).copied()
    }

    pub(super) fn contains_exact(&self, name: &str) -> bool {
        self.exact_position(name).is_some()
    }

    fn index_last(&self) {
        let last = self.entries.len() - 1;
        if let Some(map) = self.index.borrow_mut().as_mut() {
            map.entry(self.key(&self.entries[last].name)).or_insert(last);
        }
    }

    /// Resolve a lookup name. `dir` matches a file named `dir`, then the
    /// directory `dir/`; `dir/` matches only the directory.
    pub(super) fn position(&self, name: &str) -> Option<usize> {
        self.looked_up.set(true);
        let query = normalize_entry_name(name).ok()?;
        if query.ends_with('/') {
            return self.exact_position(&query);
        }
        self.exact_position(&query)
            .or_else(|| self.exact_position(&format!("{query}/")))
    }

    pub(super) fn require(&self, name: &str) -> Result<usize> {
        self.position(name).ok_or_else(|| OxiZipError::entry_not_found(name))
    }

    /// Look up an entry.
    pub fn entry(&self, name: &str) -> Option<&ZipEntry> {
        self.position(name).map(|i| &self.entries[i])
    }

    /// Look up an entry for modification.
    pub fn entry_mut(&mut self, name: &str) -> Option<&mut ZipEntry> {
        let i = self.position(name)?;
        Some(&mut self.entries[i])
    }

    /// Whether an entry exists.
    pub fn contains_entry(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// All entries in archive order.
    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    /// Entry names in archive order.
    pub fn entry_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the archive has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries matching a selection expression.
    pub fn select_entries(&self, criteria: &str) -> Result<Vec<&ZipEntry>> {
        let selector = FileSelector::new(criteria)?;
        Ok(self.entries.iter().filter(|e| selector.matches(*e)).collect())
    }

    /// Entries matching a selection expression whose parent directory in
    /// the archive is `dir_in_archive` (empty for the root).
    pub fn select_entries_in(&self, criteria: &str, dir_in_archive: &str) -> Result<Vec<&ZipEntry>> {
        let selector = FileSelector::new(criteria)?;
        let dir = dir_in_archive.replace('\\', "/");
        let dir = dir.trim_matches('/');
        let dir = self.key(dir);
        Ok(self
            .entries
            .iter()
            .filter(|e| self.key(parent_dir(&e.name)) == dir)
            .filter(|e| selector.matches(*e))
            .collect())
    }

    // Adding and updating

    fn apply_defaults(&self, entry: &mut ZipEntry) {
        let o = &self.options;
        entry.timestamp_formats = o.timestamp_formats;
        if entry.is_directory() {
            entry.method = CompressionMethod::Stored;
            return;
        }
        entry.method = o.compression_method;
        entry.level = o.compression_level.min(9);
        if let Some(password) = &o.password {
            entry.password = Some(password.clone());
            entry.encryption = if o.encryption.is_encrypted() {
                o.encryption
            } else {
                EncryptionAlgorithm::PkzipWeak
            };
        }
    }

    fn push_entry(&mut self, mut entry: ZipEntry) -> Result<&mut ZipEntry> {
        if self.exact_position(&entry.name).is_some() {
            return Err(OxiZipError::duplicate_entry(entry.name));
        }
        self.apply_defaults(&mut entry);
        debug!(entry = %entry.name, "added entry");
        self.entries.push(entry);
        self.index_last();
        let last = self.entries.len() - 1;
        Ok(&mut self.entries[last])
    }

    pub(super) fn push_all(&mut self, entries: Vec<ZipEntry>) -> Result<usize> {
        let mut batch = HashSet::with_capacity(entries.len());
        for entry in &entries {
            if self.exact_position(&entry.name).is_some() || !batch.insert(self.key(&entry.name)) {
                return Err(OxiZipError::duplicate_entry(entry.name.clone()));
            }
        }
        let count = entries.len();
        for mut entry in entries {
            self.apply_defaults(&mut entry);
            self.entries.push(entry);
            self.index_last();
        }
        Ok(count)
    }

    /// Add a file entry from any source: bytes, text, a path, a reader or
    /// an opener closure.
    pub fn add_entry(&mut self, name: &str, source: impl Into<EntrySource>) -> Result<&mut ZipEntry> {
        let name = normalize_entry_name(name)?;
        if name.ends_with('/') {
            return Err(OxiZipError::invalid_name(name, "file entry name ends with '/'"));
        }
        self.push_entry(ZipEntry::new(name, Payload::Source(source.into())))
    }

    /// Add a directory entry.
    pub fn add_directory_entry(&mut self, name: &str) -> Result<&mut ZipEntry> {
        let mut name = normalize_entry_name(name)?;
        if !name.ends_with('/') {
            name.push('/');
        }
        self.push_entry(ZipEntry::new(name, Payload::Directory))
    }

    /// Add a file from disk under `dir_in_archive` (empty for the root).
    pub fn add_file(&mut self, path: impl AsRef<Path>, dir_in_archive: &str) -> Result<&mut ZipEntry> {
        let path = path.as_ref();
        let meta = fs::metadata(path)?;
        if meta.is_dir() {
            return Err(OxiZipError::invalid_argument(format!(
                "{} is a directory",
                path.display()
            )));
        }
        let file_name = file_name_of(path)?;
        let name = normalize_entry_name(&archive_name(dir_in_archive, &file_name))?;
        let mut entry = ZipEntry::new(name, Payload::Source(EntrySource::File(path.to_path_buf())));
        fill_from_metadata(&mut entry, &meta, &file_name);
        self.push_entry(entry)
    }

    /// Replace an entry's content, or add it when missing.
    pub fn update_entry(&mut self, name: &str, source: impl Into<EntrySource>) -> Result<&mut ZipEntry> {
        let normalized = normalize_entry_name(name)?;
        match self.exact_position(&normalized) {
            Some(i) => {
                let entry = &mut self.entries[i];
                entry.replace_source(source.into());
                debug!(entry = %entry.name, "updated entry");
                Ok(entry)
            }
            None => self.add_entry(name, source),
        }
    }

    /// Replace an entry with a file from disk, or add it when missing.
    pub fn update_file(&mut self, path: impl AsRef<Path>, dir_in_archive: &str) -> Result<&mut ZipEntry> {
        let path = path.as_ref();
        let file_name = file_name_of(path)?;
        let name = normalize_entry_name(&archive_name(dir_in_archive, &file_name))?;
        match self.exact_position(&name) {
            Some(i) => {
                let meta = fs::metadata(path)?;
                let entry = &mut self.entries[i];
                entry.replace_source(EntrySource::File(path.to_path_buf()));
                fill_from_metadata(entry, &meta, &file_name);
                Ok(entry)
            }
            None => self.add_file(path, dir_in_archive),
        }
    }

    // Removing and renaming

    /// Remove an entry.
    pub fn remove_entry(&mut self, name: &str) -> Result<ZipEntry> {
        let i = self.require(name)?;
        debug!(entry = name, "removed entry");
        self.invalidate_index();
        Ok(self.entries.remove(i))
    }

    /// Remove several entries; nothing is removed if any is missing.
    pub fn remove_entries<I, S>(&mut self, names: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut indices = Vec::new();
        for name in names {
            indices.push(self.require(name.as_ref())?);
        }
        indices.sort_unstable();
        indices.dedup();
        for &i in indices.iter().rev() {
            self.entries.remove(i);
        }
        self.invalidate_index();
        Ok(indices.len())
    }

    /// Remove entries matching a selection expression.
    pub fn remove_selected_entries(&mut self, criteria: &str) -> Result<usize> {
        let selector = FileSelector::new(criteria)?;
        let before = self.entries.len();
        self.entries.retain(|e| !selector.matches(e));
        self.invalidate_index();
        let removed = before - self.entries.len();
        debug!(criteria, removed, "removed selected entries");
        Ok(removed)
    }

    /// Rename an entry. Directory entries keep their trailing `/`.
    pub fn rename_entry(&mut self, old: &str, new: &str) -> Result<()> {
        let i = self.require(old)?;
        let mut name = normalize_entry_name(new)?;
        if self.entries[i].is_directory() {
            if !name.ends_with('/') {
                name.push('/');
            }
        } else if name.ends_with('/') {
            return Err(OxiZipError::invalid_name(name, "file entry name ends with '/'"));
        }
        if let Some(j) = self.exact_position(&name) {
            if j != i {
                return Err(OxiZipError::duplicate_entry(name));
            }
        }
        debug!(from = %self.entries[i].name, to = %name, "renamed entry");
        self.entries[i].name = name;
        self.invalidate_index();
        Ok(())
    }

    // Saving

    /// Save to the archive's path.
    pub fn save(&mut self) -> Result<SaveReport> {
        self.save_with_listener(&mut NoopListener)
    }

    /// Save to the archive's path, reporting to `listener`.
    pub fn save_with_listener(&mut self, listener: &mut dyn ArchiveListener) -> Result<SaveReport> {
        let path = self
            .path
            .clone()
            .ok_or_else(|| OxiZipError::bad_state("archive has no file name; use save_as"))?;
        self.save_path(&path, listener)
    }

    /// Save to `path`, which becomes the archive's path.
    pub fn save_as(&mut self, path: impl AsRef<Path>) -> Result<SaveReport> {
        self.save_as_with_listener(path, &mut NoopListener)
    }

    /// Save to `path`, reporting to `listener`.
    pub fn save_as_with_listener(
        &mut self,
        path: impl AsRef<Path>,
        listener: &mut dyn ArchiveListener,
    ) -> Result<SaveReport> {
        let path = path.as_ref();
        let report = self.save_path(path, listener)?;
        self.path = Some(path.to_path_buf());
        Ok(report)
    }

    /// Write the archive to a seekable writer.
    ///
    /// Entries are not reloaded from the writer afterwards. If the error
    /// policy skipped an entry after part of it was written, bytes may
    /// remain past [`SaveReport::archive_size`].
    pub fn save_to<W: Write + Seek>(&mut self, writer: W) -> Result<SaveReport> {
        self.save_to_with_listener(writer, &mut NoopListener)
    }

    /// Write the archive to a seekable writer, reporting to `listener`.
    #[instrument(skip_all)]
    pub fn save_to_with_listener<W: Write + Seek>(
        &mut self,
        mut writer: W,
        listener: &mut dyn ArchiveListener,
    ) -> Result<SaveReport> {
        self.write_archive(&mut writer, listener)
    }

    #[instrument(skip_all, fields(path = %path.display()))]
    fn save_path(&mut self, path: &Path, listener: &mut dyn ArchiveListener) -> Result<SaveReport> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut temp = tempfile::Builder::new()
            .prefix(".oxizip-")
            .suffix(".tmp")
            .tempfile_in(&dir)?;

        let report = {
            let capacity = self.options.buffer_size.max(4096);
            let mut out = BufWriter::with_capacity(capacity, temp.as_file_mut());
            let report = self.write_archive(&mut out, listener)?;
            out.flush()?;
            report
        };
        temp.as_file().set_len(report.archive_size)?;
        temp.as_file().sync_all()?;

        // An open handle blocks replacing the file on Windows.
        if cfg!(windows) && self.path.as_deref() == Some(path) {
            self.source = None;
        }
        temp.persist(path).map_err(|e| OxiZipError::Io(e.error))?;
        self.reload(path)?;
        info!(written = report.written, skipped = report.skipped.len(), "archive saved");
        Ok(report)
    }

    /// Re-read the saved file so entries point at their new data.
    fn reload(&mut self, path: &Path) -> Result<()> {
        let mut source: Box<dyn ReadSeek> = Box::new(BufReader::new(File::open(path)?));
        let directory = read_directory(&mut source)?;
        let mut previous: HashMap<String, ZipEntry> =
            self.entries.drain(..).map(|e| (e.name.clone(), e)).collect();
        let mut entries = directory.entries;
        for entry in &mut entries {
            if let Some(prev) = previous.remove(&entry.name) {
                entry.password = prev.password;
                entry.error_action = prev.error_action;
                entry.level = prev.level;
            }
        }
        self.entries = entries;
        self.source = Some(source);
        self.invalidate_index();
        Ok(())
    }

    fn write_archive<W: Write + Seek>(
        &mut self,
        out: &mut W,
        listener: &mut dyn ArchiveListener,
    ) -> Result<SaveReport> {
        if self.options.sort_entries_before_saving {
            self.entries.sort_by_cached_key(|e| e.name.to_lowercase());
            self.invalidate_index();
        }
        let total = self.entries.len();
        if self.options.zip64 == Zip64Mode::Never && total >= usize::from(ZIP64_MARKER_16) {
            return Err(OxiZipError::zip64_required(format!(
                "{total} entries exceed the classic limit of {}",
                ZIP64_MARKER_16 - 1
            )));
        }
        info!(entries = total, "saving archive");

        let Self {
            entries,
            source,
            options,
            ..
        } = self;
        let mut saver = Saver {
            out,
            source,
            options,
            listener,
            cancel: false,
            done: 0,
            total,
        };
        saver.notify(ProgressKind::SaveStarted, None, 0, None);

        let mut records = Vec::with_capacity(total);
        let mut report = SaveReport::default();
        for entry in entries.iter_mut() {
            if saver.cancel {
                info!(done = saver.done, "save cancelled");
                return Err(OxiZipError::Cancelled);
            }
            let size = Some(entry.uncompressed_size).filter(|_| entry.is_saved());
            saver.notify(ProgressKind::BeforeEntry, Some(&entry.name), 0, size);

            match saver.write_entry(entry)? {
                Some(record) => {
                    records.push(record);
                    report.written += 1;
                }
                None => report.skipped.push(entry.name.clone()),
            }
            saver.done += 1;
            saver.notify(ProgressKind::AfterEntry, Some(&entry.name), 0, None);
        }
        if saver.cancel {
            info!(done = saver.done, "save cancelled");
            return Err(OxiZipError::Cancelled);
        }

        let mode = saver.options.zip64;
        if mode == Zip64Mode::Never {
            if let Some(big) = records.iter().find(|r| r.needs_zip64()) {
                return Err(OxiZipError::zip64_required(format!(
                    "{} needs 64-bit sizes or offsets",
                    String::from_utf8_lossy(&big.name)
                )));
            }
        }

        let cd_offset = saver.out.stream_position()?;
        let mut cd_size = 0;
        for record in &records {
            cd_size += record.write(saver.out)?;
        }
        let eocd = EndOfCentralDirectory {
            entries: records.len() as u64,
            cd_size,
            cd_offset,
            comment: saver.options.comment.as_bytes().to_vec(),
            zip64: false,
        };
        let zip64 = match mode {
            Zip64Mode::Always => true,
            Zip64Mode::AsNecessary => eocd.needs_zip64(),
            Zip64Mode::Never if eocd.needs_zip64() => {
                return Err(OxiZipError::zip64_required("central directory lies beyond 4 GiB"));
            }
            Zip64Mode::Never => false,
        };
        eocd.write(saver.out, zip64)?;
        saver.out.flush()?;
        report.archive_size = saver.out.stream_position()?;
        saver.notify(ProgressKind::SaveCompleted, None, 0, None);
        debug!(
            written = report.written,
            skipped = report.skipped.len(),
            size = report.archive_size,
            zip64,
            "wrote archive"
        );
        Ok(report)
    }
}

/// Sizes of written entry data.
#[derive(Debug, Clone, Copy)]
struct Written {
    crc32: u32,
    compressed: u64,
    uncompressed: u64,
}

struct LocalLayout {
    header: LocalFileHeader,
    aes: Option<AesExtra>,
    zip64: bool,
}

fn dos_time_of(entry: &ZipEntry) -> DosDateTime {
    DosDateTime::from_system_time(entry.times.modified.unwrap_or_else(SystemTime::now))
}

fn time_extra(entry: &ZipEntry, central: bool) -> Vec<u8> {
    let mut out = Vec::new();
    if entry.timestamp_formats.windows {
        out.extend(extra::ntfs_field(&entry.times));
    }
    if entry.timestamp_formats.unix {
        out.extend(extra::unix_time_field(&entry.times, central));
    }
    out
}

fn size_field(zip64: bool, value: u64) -> u32 {
    if zip64 {
        ZIP64_MARKER_32
    } else {
        value as u32
    }
}

fn central_record(
    entry: &ZipEntry,
    offset: u64,
    local: &LocalLayout,
    written: Written,
    foreign_extra: &[u8],
    force_zip64: bool,
) -> CentralDirectoryHeader {
    let mut extra = time_extra(entry, true);
    if let Some(aes) = &local.aes {
        extra.extend(extra::aes_field(aes));
    }
    extra.extend_from_slice(foreign_extra);

    let mut attributes = entry.attributes;
    if HOST_SYSTEM == 3 && attributes.unix_mode.is_none() {
        attributes.unix_mode = Some(if entry.is_directory() { 0o040_755 } else { 0o100_644 });
    }

    CentralDirectoryHeader {
        version_made_by: version_made_by(),
        version_needed: local.header.version_needed,
        flags: local.header.flags,
        method: local.header.method,
        dos_time: local.header.dos_time,
        crc32: written.crc32,
        compressed_size: written.compressed,
        uncompressed_size: written.uncompressed,
        local_header_offset: offset,
        internal_attr: 0,
        external_attr: attributes.to_external(),
        name: entry.name.as_bytes().to_vec(),
        extra,
        comment: entry.comment.as_bytes().to_vec(),
        force_zip64,
    }
}

/// State of one save.
struct Saver<'a, W: Write + Seek> {
    out: &'a mut W,
    source: &'a mut Option<Box<dyn ReadSeek>>,
    options: &'a ArchiveOptions,
    listener: &'a mut dyn ArchiveListener,
    cancel: bool,
    done: usize,
    total: usize,
}

impl<W: Write + Seek> Saver<'_, W> {
    fn notify(&mut self, kind: ProgressKind, entry_name: Option<&str>, bytes: u64, total_bytes: Option<u64>) {
        let event = ProgressEvent {
            kind,
            entry_name,
            bytes_transferred: bytes,
            total_bytes,
            entries_done: self.done,
            entries_total: self.total,
        };
        if self.listener.on_progress(&event) == Control::Cancel {
            self.cancel = true;
        }
    }

    fn force_zip64(&self) -> bool {
        self.options.zip64 == Zip64Mode::Always
    }

    /// Write one entry. `None` means the error policy skipped it.
    fn write_entry(&mut self, entry: &mut ZipEntry) -> Result<Option<CentralDirectoryHeader>> {
        if let Payload::Directory = entry.payload {
            return self.write_directory(entry).map(Some);
        }
        if let Payload::Existing(loc) = &entry.payload {
            if entry.is_directory() {
                return self.write_directory(entry).map(Some);
            }
            if !entry.recode {
                let loc = loc.clone();
                return self.copy_raw(entry, &loc).map(Some);
            }
        }
        self.write_encoded(entry)
    }

    fn write_directory(&mut self, entry: &ZipEntry) -> Result<CentralDirectoryHeader> {
        let offset = self.out.stream_position()?;
        let zip64 = self.force_zip64();
        let mut extra = Vec::new();
        if zip64 {
            extra.extend(extra::zip64_local_placeholder(0, 0));
        }
        extra.extend(time_extra(entry, false));
        let header = LocalFileHeader {
            version_needed: if zip64 { VERSION_ZIP64 } else { VERSION_DEFLATE },
            flags: utf8_flag(&entry.name, &entry.comment),
            method: CompressionMethod::Stored.to_u16(),
            dos_time: dos_time_of(entry),
            crc32: 0,
            compressed_size: size_field(zip64, 0),
            uncompressed_size: size_field(zip64, 0),
            name: entry.name.as_bytes().to_vec(),
            extra,
        };
        header.write(self.out)?;
        let layout = LocalLayout {
            header,
            aes: None,
            zip64,
        };
        let written = Written {
            crc32: 0,
            compressed: 0,
            uncompressed: 0,
        };
        let foreign = entry.location().map(|l| l.foreign_extra.clone()).unwrap_or_default();
        Ok(central_record(entry, offset, &layout, written, &foreign, zip64))
    }

    fn zip64_for(&self, name: &str, largest: u64) -> Result<bool> {
        let overflow = largest >= u64::from(ZIP64_MARKER_32);
        match self.options.zip64 {
            Zip64Mode::Always => Ok(true),
            Zip64Mode::AsNecessary => Ok(overflow),
            Zip64Mode::Never if overflow => Err(OxiZipError::zip64_required(format!(
                "{name}: {largest} bytes exceed 4 GiB"
            ))),
            Zip64Mode::Never => Ok(false),
        }
    }

    /// Copy an unchanged entry's data as is.
    fn copy_raw(&mut self, entry: &ZipEntry, loc: &Location) -> Result<CentralDirectoryHeader> {
        let zip64 = self.zip64_for(&entry.name, entry.compressed_size.max(entry.uncompressed_size))?;
        let offset = self.out.stream_position()?;
        let flags = (loc.flags & !FLAG_UTF8) | utf8_flag(&entry.name, &entry.comment);
        // The ZipCrypto check byte of streamed entries comes from the DOS time.
        let dos_time = if loc.is_encrypted() && loc.aes.is_none() && loc.flags & FLAG_DATA_DESCRIPTOR != 0 {
            loc.dos_time
        } else {
            dos_time_of(entry)
        };

        let mut extra = Vec::new();
        if zip64 {
            extra.extend(extra::zip64_local_placeholder(entry.uncompressed_size, entry.compressed_size));
        }
        extra.extend(time_extra(entry, false));
        if let Some(aes) = &loc.aes {
            extra.extend(extra::aes_field(aes));
        }
        let header = LocalFileHeader {
            version_needed: if zip64 {
                loc.version_needed.max(VERSION_ZIP64)
            } else {
                loc.version_needed
            },
            flags,
            method: loc.raw_method,
            dos_time,
            crc32: entry.crc32,
            compressed_size: size_field(zip64, entry.compressed_size),
            uncompressed_size: size_field(zip64, entry.uncompressed_size),
            name: entry.name.as_bytes().to_vec(),
            extra,
        };

        let source = self
            .source
            .as_mut()
            .ok_or_else(|| OxiZipError::bad_state("archive source is no longer available"))?;
        let data_start = reader::data_offset(source, loc)?;
        header.write(self.out)?;
        source.seek(SeekFrom::Start(data_start))?;
        let copied = io::copy(&mut Read::take(source.as_mut(), entry.compressed_size), &mut *self.out)?;
        if copied != entry.compressed_size {
            return Err(OxiZipError::bad_read(format!(
                "{}: entry data is truncated ({copied} of {} bytes)",
                entry.name, entry.compressed_size
            )));
        }
        let written = Written {
            crc32: entry.crc32,
            compressed: entry.compressed_size,
            uncompressed: entry.uncompressed_size,
        };
        if flags & FLAG_DATA_DESCRIPTOR != 0 {
            DataDescriptor {
                crc32: written.crc32,
                compressed_size: written.compressed,
                uncompressed_size: written.uncompressed,
            }
            .write(self.out, zip64)?;
        }
        debug!(entry = %entry.name, bytes = copied, "copied entry data");
        self.notify(
            ProgressKind::EntryBytesTransferred,
            Some(&entry.name),
            entry.uncompressed_size,
            Some(entry.uncompressed_size),
        );

        let layout = LocalLayout {
            header,
            aes: loc.aes,
            zip64,
        };
        Ok(central_record(entry, offset, &layout, written, &loc.foreign_extra, self.force_zip64()))
    }

    fn layout(&self, entry: &ZipEntry, method: CompressionMethod, zip64: bool) -> Result<LocalLayout> {
        let mut flags = utf8_flag(&entry.name, &entry.comment);
        let mut raw_method = method.to_u16();
        let mut version_needed = match method {
            CompressionMethod::Stored => VERSION_STORED,
            _ => VERSION_DEFLATE,
        };
        let mut aes = None;
        match entry.encryption {
            EncryptionAlgorithm::None => {}
            EncryptionAlgorithm::PkzipWeak => {
                flags |= FLAG_ENCRYPTED | FLAG_DATA_DESCRIPTOR;
            }
            algorithm => {
                let strength = AesStrength::for_algorithm(algorithm)
                    .ok_or_else(|| OxiZipError::unsupported_method(algorithm.to_string()))?;
                flags |= FLAG_ENCRYPTED;
                aes = Some(AesExtra {
                    vendor_version: 1,
                    strength: strength.to_byte(),
                    method: raw_method,
                });
                raw_method = METHOD_AES;
                version_needed = VERSION_AES;
            }
        }
        if zip64 {
            version_needed = version_needed.max(VERSION_ZIP64);
        }

        let mut extra = Vec::new();
        if zip64 {
            extra.extend(extra::zip64_local_placeholder(0, 0));
        }
        extra.extend(time_extra(entry, false));
        if let Some(aes) = &aes {
            extra.extend(extra::aes_field(aes));
        }
        Ok(LocalLayout {
            header: LocalFileHeader {
                version_needed,
                flags,
                method: raw_method,
                dos_time: dos_time_of(entry),
                crc32: 0,
                compressed_size: size_field(zip64, 0),
                uncompressed_size: size_field(zip64, 0),
                name: entry.name.as_bytes().to_vec(),
                extra,
            },
            aes,
            zip64,
        })
    }

    /// Compress (and encrypt) an entry, applying the error policy to
    /// source failures.
    fn write_encoded(&mut self, entry: &mut ZipEntry) -> Result<Option<CentralDirectoryHeader>> {
        let offset = self.out.stream_position()?;
        let policy = entry.error_action.unwrap_or(self.options.error_action);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let error = match self.try_encode(entry, offset) {
                Ok(record) => return Ok(Some(record)),
                Err(EncodeError::Sink(e)) => return Err(e),
                Err(EncodeError::Source(e)) => e,
            };

            let mut action = policy;
            if action == ZipErrorAction::InvokeErrorEvent {
                let failure = EntryFailure {
                    entry_name: &entry.name,
                    error: &error,
                    attempt,
                };
                action = self.listener.on_error(&failure);
            }
            let reopenable = !matches!(entry.payload, Payload::Consumed);
            let exhausted = attempt >= self.options.max_retries || !reopenable;
            if action == ZipErrorAction::Retry && exhausted {
                action = self.options.retry_exhausted_action;
                if action == ZipErrorAction::Retry {
                    action = ZipErrorAction::Throw;
                }
            }

            match action {
                ZipErrorAction::Skip => {
                    warn!(entry = %entry.name, error = %error, "skipping entry");
                    self.out.seek(SeekFrom::Start(offset))?;
                    return Ok(None);
                }
                ZipErrorAction::Retry => {
                    warn!(entry = %entry.name, attempt, error = %error, "retrying entry");
                    std::thread::sleep(self.options.retry_delay);
                    self.out.seek(SeekFrom::Start(offset))?;
                }
                ZipErrorAction::Throw | ZipErrorAction::InvokeErrorEvent => return Err(error),
            }
        }
    }

    fn try_encode(
        &mut self,
        entry: &mut ZipEntry,
        offset: u64,
    ) -> std::result::Result<CentralDirectoryHeader, EncodeError> {
        let sink = EncodeError::Sink;
        let source_err = EncodeError::Source;

        let password = entry.password.clone().or_else(|| self.options.password.clone());
        if entry.encryption.is_encrypted() && password.is_none() {
            return Err(sink(OxiZipError::bad_state(format!(
                "{}: encryption is set but no password was given",
                entry.name
            ))));
        }
        let method = match (entry.method, entry.level) {
            (CompressionMethod::Deflate, 0) => CompressionMethod::Stored,
            (m, _) => m,
        };

        let known_size = match &entry.payload {
            Payload::Source(source) => source.known_size(),
            Payload::Existing(_) => Some(entry.uncompressed_size),
            _ => None,
        };
        let zip64 = match self.options.zip64 {
            Zip64Mode::Always => true,
            Zip64Mode::AsNecessary => known_size.is_none_or(may_exceed_32bit),
            Zip64Mode::Never => false,
        };
        let parallel = method == CompressionMethod::Deflate
            && use_parallel(self.options.parallel_deflate_threshold, known_size);

        let layout = self.layout(entry, method, zip64).map_err(sink)?;
        self.out
            .seek(SeekFrom::Start(offset))
            .map_err(|e| sink(OxiZipError::Io(e)))?;
        layout.header.write(self.out).map_err(sink)?;

        // Decoding parameters for recompressing loaded data.
        let recode = match &entry.payload {
            Payload::Existing(loc) => {
                Some(reader::decode_settings(entry, loc, password.as_deref(), true).map_err(source_err)?)
            }
            _ => None,
        };

        let name = entry.name.clone();
        let password = password.unwrap_or_default();
        let settings = EncodeSettings {
            method,
            level: entry.level,
            encryption: entry.encryption,
            password: password.as_bytes(),
            check_byte: (layout.header.dos_time.time >> 8) as u8,
            parallel,
            buffer_size: self.options.buffer_size,
        };

        // A plain reader can be read once; the entry keeps no source after.
        let taken = if matches!(entry.payload, Payload::Source(EntrySource::Reader(_))) {
            match std::mem::replace(&mut entry.payload, Payload::Consumed) {
                Payload::Source(EntrySource::Reader(r)) => Some(r),
                _ => None,
            }
        } else {
            None
        };

        let Saver {
            out,
            source: archive,
            listener,
            cancel,
            done,
            total,
            ..
        } = &mut *self;

        let outcome = {
            let mut input: Box<dyn Read + '_> = match taken {
                Some(r) => r,
                None => match &mut entry.payload {
                    Payload::Source(EntrySource::Bytes(bytes)) => Box::new(bytes.as_slice()),
                    Payload::Source(EntrySource::File(path)) => {
                        Box::new(File::open(&*path).map_err(|e| source_err(OxiZipError::Io(e)))?)
                    }
                    Payload::Source(EntrySource::Opener(open)) => {
                        open().map_err(|e| source_err(OxiZipError::Io(e)))?
                    }
                    Payload::Existing(loc) => {
                        let settings = recode
                            .ok_or_else(|| sink(OxiZipError::bad_state("missing decode settings")))?;
                        let archive = archive.as_mut().ok_or_else(|| {
                            sink(OxiZipError::bad_state("archive source is no longer available"))
                        })?;
                        let start = reader::data_offset(archive, loc).map_err(source_err)?;
                        archive
                            .seek(SeekFrom::Start(start))
                            .map_err(|e| source_err(OxiZipError::Io(e)))?;
                        let raw = Read::take(archive.as_mut(), settings.compressed_size);
                        Box::new(EntryReader::new(Box::new(raw), settings).map_err(source_err)?)
                    }
                    Payload::Source(EntrySource::Reader(_)) | Payload::Consumed => {
                        return Err(sink(OxiZipError::bad_state(format!(
                            "{name}: reader source was consumed by an earlier save"
                        ))));
                    }
                    Payload::Directory => {
                        return Err(sink(OxiZipError::bad_state("directory entry has no data")));
                    }
                },
            };

            let mut on_bytes = |n: u64| {
                let event = ProgressEvent {
                    kind: ProgressKind::EntryBytesTransferred,
                    entry_name: Some(&name),
                    bytes_transferred: n,
                    total_bytes: known_size,
                    entries_done: *done,
                    entries_total: *total,
                };
                if listener.on_progress(&event) == Control::Cancel {
                    *cancel = true;
                }
            };
            encode(&mut *input, &mut **out, &settings, &mut on_bytes)?
        };

        let largest = outcome.compressed.max(outcome.uncompressed);
        if largest >= u64::from(ZIP64_MARKER_32) && !layout.zip64 {
            return Err(sink(OxiZipError::zip64_required(format!(
                "{name}: {largest} bytes exceed 4 GiB"
            ))));
        }
        patch_local_header(&mut **out, offset, &layout, &outcome).map_err(sink)?;
        if layout.header.flags & FLAG_DATA_DESCRIPTOR != 0 {
            DataDescriptor {
                crc32: outcome.crc32,
                compressed_size: outcome.compressed,
                uncompressed_size: outcome.uncompressed,
            }
            .write(&mut **out, layout.zip64)
            .map_err(sink)?;
        }
        debug!(
            entry = %name,
            uncompressed = outcome.uncompressed,
            compressed = outcome.compressed,
            parallel,
            "encoded entry"
        );

        if !matches!(entry.payload, Payload::Existing(_)) {
            entry.crc32 = outcome.crc32;
            entry.compressed_size = outcome.compressed;
            entry.uncompressed_size = outcome.uncompressed;
        }
        let written = Written {
            crc32: outcome.crc32,
            compressed: outcome.compressed,
            uncompressed: outcome.uncompressed,
        };
        let force_zip64 = self.force_zip64();
        let foreign = entry.location().map(|l| l.foreign_extra.clone()).unwrap_or_default();
        Ok(central_record(entry, offset, &layout, written, &foreign, force_zip64))
    }
}

/// Fill in the CRC and sizes of a local header written before its data.
fn patch_local_header<W: Write + Seek>(
    out: &mut W,
    offset: u64,
    layout: &LocalLayout,
    outcome: &EncodeOutcome,
) -> Result<()> {
    let end = out.stream_position()?;
    let mut fields = Vec::with_capacity(12);
    fields.extend_from_slice(&outcome.crc32.to_le_bytes());
    fields.extend_from_slice(&size_field(layout.zip64, outcome.compressed).to_le_bytes());
    fields.extend_from_slice(&size_field(layout.zip64, outcome.uncompressed).to_le_bytes());
    out.seek(SeekFrom::Start(offset + 14))?;
    out.write_all(&fields)?;
    if layout.zip64 {
        // The Zip64 block leads the extra field: tag, length, then the sizes.
        let at = offset + LOCAL_HEADER_LEN + layout.header.name.len() as u64 + 4;
        out.seek(SeekFrom::Start(at))?;
        out.write_all(&outcome.uncompressed.to_le_bytes())?;
        out.write_all(&outcome.compressed.to_le_bytes())?;
    }
    out.seek(SeekFrom::Start(end))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxizip_core::ErrorKind;

    fn archive_with(names: &[&str]) -> ZipArchive {
        let mut zip = ZipArchive::new();
        for name in names {
            if name.ends_with('/') {
                zip.add_directory_entry(name).unwrap();
            } else {
                zip.add_entry(name, name.as_bytes()).unwrap();
            }
        }
        zip
    }

    #[test]
    fn test_lookup_is_case_insensitive_by_default() {
        let zip = archive_with(&["Docs/Readme.TXT"]);
        assert!(zip.contains_entry("docs/readme.txt"));
        assert!(zip.contains_entry("docs\\README.txt"));
    }

    #[test]
    fn test_case_sensitivity_locked_after_lookup() {
        let mut zip = archive_with(&["a.txt"]);
        zip.set_case_sensitive_retrieval(true).unwrap();
        assert!(!zip.contains_entry("A.TXT"));
        let err = zip.set_case_sensitive_retrieval(false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadState);
    }

    #[test]
    fn test_trailing_slash_fallback() {
        let zip = archive_with(&["dir/", "file"]);
        assert_eq!(zip.entry("dir").map(ZipEntry::name), Some("dir/"));
        assert!(zip.entry("file/").is_none());
    }

    #[test]
    fn test_duplicates_rejected() {
        let mut zip = archive_with(&["a.txt"]);
        let err = zip.add_entry("A.txt", "x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateEntry);
        assert_eq!(zip.len(), 1);
    }

    #[test]
    fn test_file_name_with_trailing_slash_rejected() {
        let mut zip = ZipArchive::new();
        let err = zip.add_entry("dir/", "x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidName);
    }

    #[test]
    fn test_remove_entries_is_atomic() {
        let mut zip = archive_with(&["a", "b", "c"]);
        assert!(zip.remove_entries(["a", "missing"]).is_err());
        assert_eq!(zip.len(), 3);
        assert_eq!(zip.remove_entries(["a", "c"]).unwrap(), 2);
        assert_eq!(zip.entry_names(), vec!["b"]);
    }

    #[test]
    fn test_rename_keeps_kind() {
        let mut zip = archive_with(&["old/", "x.txt", "y.txt"]);
        zip.rename_entry("old", "new").unwrap();
        assert!(zip.entry("new/").is_some());
        let err = zip.rename_entry("x.txt", "Y.TXT").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateEntry);
        zip.rename_entry("x.txt", "X.txt").unwrap();
        assert_eq!(zip.entry("x.txt").map(ZipEntry::name), Some("X.txt"));
    }

    #[test]
    fn test_update_replaces_or_adds() {
        let mut zip = archive_with(&["a"]);
        zip.update_entry("a", "longer content").unwrap();
        zip.update_entry("b", "new").unwrap();
        assert_eq!(zip.len(), 2);
        assert_eq!(zip.entry("a").unwrap().uncompressed_size(), 14);
    }

    #[test]
    fn test_select_entries_in_directory() {
        let zip = archive_with(&["a.txt", "sub/b.txt", "sub/deep/c.txt", "sub/d.bin"]);
        fn names<'a>(v: Vec<&'a ZipEntry>) -> Vec<&'a str> {
            v.into_iter().map(ZipEntry::name).collect::<Vec<_>>()
        }
        assert_eq!(names(zip.select_entries("*.txt").unwrap()).len(), 3);
        assert_eq!(names(zip.select_entries_in("*.txt", "sub").unwrap()), vec!["sub/b.txt"]);
        assert_eq!(names(zip.select_entries_in("*.txt", "").unwrap()), vec!["a.txt"]);
    }

    #[test]
    fn test_zip64_reserved_below_4gib_for_incompressible_growth() {
        assert!(!may_exceed_32bit(0));
        assert!(!may_exceed_32bit(1 << 30));
        // Deflate stored blocks and AES framing can push these past 4 GiB.
        assert!(may_exceed_32bit(0xFFFE_FFFF));
        assert!(may_exceed_32bit(0xFFC0_1000));
        assert!(!may_exceed_32bit(0xFFC0_0000));
        assert!(may_exceed_32bit(u64::MAX));
    }

    #[test]
    fn test_password_applies_encryption_default() {
        let mut zip = ZipArchive::new();
        zip.set_password(Some("pw"));
        let entry = zip.add_entry("secret", "x").unwrap();
        assert_eq!(entry.encryption(), EncryptionAlgorithm::PkzipWeak);
        zip.set_password(None);
        let entry = zip.add_entry("plain", "x").unwrap();
        assert_eq!(entry.encryption(), EncryptionAlgorithm::None);
    }

    #[test]
    fn test_save_without_path_is_bad_state() {
        let mut zip = archive_with(&["a"]);
        assert_eq!(zip.save().unwrap_err().kind(), ErrorKind::BadState);
    }

    #[test]
    fn test_save_to_memory_and_reload() {
        let mut zip = archive_with(&["dir/", "dir/a.txt", "b.txt"]);
        zip.set_comment("hello");
        let mut buf = Cursor::new(Vec::new());
        let report = zip.save_to(&mut buf).unwrap();
        assert_eq!(report.written, 3);
        assert_eq!(report.archive_size, buf.get_ref().len() as u64);

        let mut loaded = ZipArchive::from_bytes(buf.into_inner()).unwrap();
        assert_eq!(loaded.entry_names(), vec!["dir/", "dir/a.txt", "b.txt"]);
        assert_eq!(loaded.comment(), "hello");
        assert_eq!(loaded.read_entry("dir/a.txt").unwrap(), b"dir/a.txt");
    }

    #[test]
    fn test_never_mode_entry_limit() {
        let mut zip = ZipArchive::new();
        zip.set_zip64(Zip64Mode::Never);
        for i in 0..usize::from(ZIP64_MARKER_16) {
            zip.add_entry(&format!("e{i}"), Vec::new()).unwrap();
        }
        let err = zip.save_to(Cursor::new(Vec::new())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    }
}
