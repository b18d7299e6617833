//! Reading, verifying and extracting entries.

use super::archive::ZipArchive;
use super::options::ExtractExistingFileAction;
use super::pipeline::EntryReader;
use super::progress::{
    ArchiveListener, Control, ExtractConflict, NoopListener, ProgressEvent, ProgressKind,
};
use super::reader;
use filetime::FileTime;
use oxizip_core::FileAttributes;
use oxizip_core::entry::EntryTimes;
use oxizip_core::error::{OxiZipError, Result};
use oxizip_select::FileSelector;
use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Outcome of an extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractReport {
    /// Files and directories written.
    pub extracted: Vec<PathBuf>,
    /// Entries left alone because the target already existed.
    pub skipped: Vec<String>,
}

/// Map an entry name below `root`, rejecting names that would escape it.
pub(crate) fn target_path(root: &Path, name: &str) -> Result<PathBuf> {
    if name.starts_with('/') || name.starts_with('\\') {
        return Err(OxiZipError::path_traversal(name));
    }
    let mut path = root.to_path_buf();
    let mut depth = 0;
    for part in name.trim_end_matches('/').split('/') {
        match part {
            "" | "." => {}
            ".." => return Err(OxiZipError::path_traversal(name)),
            _ if part.contains('\\') || part.contains('\0') => {
                return Err(OxiZipError::path_traversal(name));
            }
            // Drive letters and alternate data streams.
            _ if cfg!(windows) && part.contains(':') => {
                return Err(OxiZipError::path_traversal(name));
            }
            _ => {
                path.push(part);
                depth += 1;
            }
        }
    }
    if depth == 0 {
        return Err(OxiZipError::invalid_name(name, "entry name has no path components"));
    }
    Ok(path)
}

fn set_times(path: &Path, times: &EntryTimes) -> Result<()> {
    if let Some(modified) = times.modified {
        let mtime = FileTime::from_system_time(modified);
        let atime = times.accessed.map_or(mtime, FileTime::from_system_time);
        filetime::set_file_times(path, atime, mtime)?;
    }
    Ok(())
}

fn apply_attributes(path: &Path, attributes: FileAttributes) -> Result<()> {
    #[cfg(unix)]
    if let Some(mode) = attributes.unix_mode.map(|m| m & 0o7777).filter(|m| *m != 0) {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    }
    if attributes.is_readonly() {
        let mut permissions = fs::metadata(path)?.permissions();
        permissions.set_readonly(true);
        fs::set_permissions(path, permissions)?;
    }
    Ok(())
}

/// Progress bookkeeping for one extraction.
struct Tracker<'l> {
    listener: &'l mut dyn ArchiveListener,
    cancel: bool,
    done: usize,
    total: usize,
}

impl Tracker<'_> {
    fn send(&mut self, kind: ProgressKind, entry_name: Option<&str>, bytes: u64, total_bytes: Option<u64>) {
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
}

impl ZipArchive {
    fn reader_at(&mut self, index: usize) -> Result<EntryReader<'_>> {
        let entry = &self.entries[index];
        let location = entry.location().ok_or_else(|| {
            OxiZipError::bad_state(format!("{} has not been saved to the archive yet", entry.name))
        })?;
        let password = entry.password.as_deref().or(self.options.password.as_deref());
        let settings = reader::decode_settings(entry, location, password, true)?;
        let source = self
            .source
            .as_mut()
            .ok_or_else(|| OxiZipError::bad_state("archive source is no longer available"))?;
        let start = reader::data_offset(source, location)?;
        source.seek(SeekFrom::Start(start))?;
        let raw = Read::take(source.as_mut(), settings.compressed_size);
        EntryReader::new(Box::new(raw), settings)
    }

    /// Stream an entry's uncompressed data.
    ///
    /// The CRC and authentication code are checked when the reader reaches
    /// the end of the data.
    pub fn open_reader(&mut self, name: &str) -> Result<EntryReader<'_>> {
        let index = self.require(name)?;
        self.reader_at(index)
    }

    /// Read an entry into memory.
    pub fn read_entry(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut reader = self.open_reader(name)?;
        let capacity = usize::try_from(reader.size()).unwrap_or(0).min(16 * 1024 * 1024);
        let mut data = Vec::with_capacity(capacity);
        reader.read_to_end(&mut data).map_err(OxiZipError::from_io)?;
        Ok(data)
    }

    /// Copy an entry's data into `writer`, returning the bytes written.
    pub fn extract_to_writer(&mut self, name: &str, writer: &mut dyn Write) -> Result<u64> {
        let mut reader = self.open_reader(name)?;
        io::copy(&mut reader, writer).map_err(OxiZipError::from_io)
    }

    /// Decode an entry and verify its checksums without keeping the data.
    pub fn test_entry(&mut self, name: &str) -> Result<()> {
        let mut reader = self.open_reader(name)?;
        io::copy(&mut reader, &mut io::sink()).map_err(OxiZipError::from_io)?;
        Ok(())
    }

    /// Verify every file entry, returning how many were checked.
    #[instrument(skip_all)]
    pub fn test_all(&mut self) -> Result<usize> {
        let mut tested = 0;
        for index in 0..self.entries.len() {
            if self.entries[index].is_directory() {
                continue;
            }
            let mut reader = self.reader_at(index)?;
            io::copy(&mut reader, &mut io::sink()).map_err(OxiZipError::from_io)?;
            tested += 1;
        }
        info!(tested, "archive verified");
        Ok(tested)
    }

    /// Extract one entry below `dir`.
    pub fn extract_entry(&mut self, name: &str, dir: impl AsRef<Path>) -> Result<ExtractReport> {
        self.extract_entry_with_listener(name, dir, &mut NoopListener)
    }

    /// Extract one entry below `dir`, reporting to `listener`.
    pub fn extract_entry_with_listener(
        &mut self,
        name: &str,
        dir: impl AsRef<Path>,
        listener: &mut dyn ArchiveListener,
    ) -> Result<ExtractReport> {
        let index = self.require(name)?;
        self.extract_indices(vec![index], dir.as_ref(), listener)
    }

    /// Extract every entry below `dir`.
    pub fn extract_all(&mut self, dir: impl AsRef<Path>) -> Result<ExtractReport> {
        self.extract_all_with_listener(dir, &mut NoopListener)
    }

    /// Extract every entry below `dir`, reporting to `listener`.
    pub fn extract_all_with_listener(
        &mut self,
        dir: impl AsRef<Path>,
        listener: &mut dyn ArchiveListener,
    ) -> Result<ExtractReport> {
        let indices = (0..self.entries.len()).collect();
        self.extract_indices(indices, dir.as_ref(), listener)
    }

    /// Extract the entries matching a selection expression.
    pub fn extract_selected(&mut self, criteria: &str, dir: impl AsRef<Path>) -> Result<ExtractReport> {
        self.extract_selected_with_listener(criteria, dir, &mut NoopListener)
    }

    /// Extract the entries matching a selection expression, reporting to
    /// `listener`.
    pub fn extract_selected_with_listener(
        &mut self,
        criteria: &str,
        dir: impl AsRef<Path>,
        listener: &mut dyn ArchiveListener,
    ) -> Result<ExtractReport> {
        let selector = FileSelector::new(criteria)?;
        let indices = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| selector.matches(*e))
            .map(|(i, _)| i)
            .collect();
        self.extract_indices(indices, dir.as_ref(), listener)
    }

    #[instrument(skip_all, fields(dir = %dir.display(), entries = indices.len()))]
    fn extract_indices(
        &mut self,
        indices: Vec<usize>,
        dir: &Path,
        listener: &mut dyn ArchiveListener,
    ) -> Result<ExtractReport> {
        let mut tracker = Tracker {
            listener,
            cancel: false,
            done: 0,
            total: indices.len(),
        };
        let mut report = ExtractReport::default();
        let mut directories = Vec::new();
        info!("extracting");
        tracker.send(ProgressKind::ExtractStarted, None, 0, None);

        for index in indices {
            if tracker.cancel {
                info!(done = tracker.done, "extraction cancelled");
                return Err(OxiZipError::Cancelled);
            }
            let entry = &self.entries[index];
            let name = entry.name.clone();
            let times = entry.times;
            let attributes = entry.attributes;
            let size = entry.uncompressed_size;
            let is_dir = entry.is_directory();
            let target = target_path(dir, &name)?;
            tracker.send(ProgressKind::BeforeEntry, Some(&name), 0, Some(size));

            if is_dir {
                fs::create_dir_all(&target)?;
                directories.push((target.clone(), times));
                report.extracted.push(target);
            } else if self.extract_file(index, &name, &target, &mut tracker)? {
                set_times(&target, &times)?;
                apply_attributes(&target, attributes)?;
                debug!(entry = %name, path = %target.display(), "extracted");
                report.extracted.push(target);
            } else {
                report.skipped.push(name.clone());
            }

            tracker.done += 1;
            tracker.send(ProgressKind::AfterEntry, Some(&name), size, Some(size));
        }

        // Writing files updates directory mtimes, so directories go last.
        for (path, times) in directories.iter().rev() {
            set_times(path, times)?;
        }
        tracker.send(ProgressKind::ExtractCompleted, None, 0, None);
        info!(
            extracted = report.extracted.len(),
            skipped = report.skipped.len(),
            "extraction complete"
        );
        Ok(report)
    }

    /// Write one file entry to `target`. Returns false when an existing
    /// file is kept.
    fn extract_file(
        &mut self,
        index: usize,
        name: &str,
        target: &Path,
        tracker: &mut Tracker<'_>,
    ) -> Result<bool> {
        if fs::symlink_metadata(target).is_ok() {
            let mut action = self.options.extract_existing_file;
            if action == ExtractExistingFileAction::InvokeExtractProgressEvent {
                let conflict = ExtractConflict {
                    entry_name: name,
                    path: target,
                };
                action = ExtractExistingFileAction::from_resolution(
                    tracker.listener.on_extract_conflict(&conflict),
                );
            }
            match action {
                ExtractExistingFileAction::DoNotOverwrite => {
                    debug!(entry = name, path = %target.display(), "keeping existing file");
                    return Ok(false);
                }
                ExtractExistingFileAction::OverwriteSilently if !target.is_dir() => {
                    #[cfg(windows)]
                    {
                        let mut permissions = fs::metadata(target)?.permissions();
                        if permissions.readonly() {
                            #[allow(clippy::permissions_set_readonly_false)]
                            permissions.set_readonly(false);
                            fs::set_permissions(target, permissions)?;
                        }
                    }
                }
                _ => return Err(OxiZipError::extract_conflict(target)),
            }
        }

        let parent = match target.parent() {
            Some(p) => p,
            None => return Err(OxiZipError::path_traversal(name)),
        };
        fs::create_dir_all(parent)?;
        let mut temp = tempfile::NamedTempFile::new_in(parent)?;
        let buffer_size = self.options.buffer_size.max(512);
        {
            let mut reader = self.reader_at(index)?;
            let total = reader.size();
            let mut buf = vec![0u8; buffer_size];
            let mut written = 0u64;
            loop {
                let n = reader.read(&mut buf).map_err(OxiZipError::from_io)?;
                if n == 0 {
                    break;
                }
                temp.write_all(&buf[..n])?;
                written += n as u64;
                tracker.send(ProgressKind::EntryBytesTransferred, Some(name), written, Some(total));
            }
        }
        temp.flush()?;
        temp.persist(target).map_err(|e| OxiZipError::Io(e.error))?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::progress::{ConflictResolution, ProgressFn};
    use oxizip_core::ErrorKind;
    use std::io::Cursor;

    fn saved(entries: &[(&str, &[u8])]) -> ZipArchive {
        let mut zip = ZipArchive::new();
        for (name, data) in entries {
            if name.ends_with('/') {
                zip.add_directory_entry(name).unwrap();
            } else {
                zip.add_entry(name, *data).unwrap();
            }
        }
        let mut buf = Cursor::new(Vec::new());
        zip.save_to(&mut buf).unwrap();
        ZipArchive::from_bytes(buf.into_inner()).unwrap()
    }

    #[test]
    fn test_target_path_rejects_escapes() {
        let root = Path::new("/out");
        assert_eq!(target_path(root, "a/b.txt").unwrap(), root.join("a").join("b.txt"));
        assert_eq!(target_path(root, "./a/").unwrap(), root.join("a"));
        for bad in ["../x", "a/../../x", "/etc/passwd", "a\\..\\b"] {
            let err = target_path(root, bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ZipError, "{bad}");
        }
    }

    #[test]
    fn test_target_path_colons() {
        let root = Path::new("/out");
        if cfg!(windows) {
            assert!(target_path(root, "C:/x").is_err());
            assert!(target_path(root, "a:b.txt").is_err());
        } else {
            assert_eq!(target_path(root, "a:b.txt").unwrap(), root.join("a:b.txt"));
        }
    }

    #[test]
    fn test_unsaved_entry_is_bad_state() {
        let mut zip = ZipArchive::new();
        zip.add_entry("a", "data").unwrap();
        assert_eq!(zip.read_entry("a").unwrap_err().kind(), ErrorKind::BadState);
    }

    #[test]
    fn test_extract_all_and_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let mut zip = saved(&[("d/", b""), ("d/a.txt", b"alpha"), ("b.txt", b"beta")]);
        let report = zip.extract_all(dir.path()).unwrap();
        assert_eq!(report.extracted.len(), 3);
        assert_eq!(fs::read(dir.path().join("d/a.txt")).unwrap(), b"alpha");

        let err = zip.extract_entry("b.txt", dir.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ZipError);

        fs::write(dir.path().join("b.txt"), b"local").unwrap();
        zip.set_extract_existing_file(ExtractExistingFileAction::DoNotOverwrite);
        let report = zip.extract_entry("b.txt", dir.path()).unwrap();
        assert_eq!(report.skipped, vec!["b.txt".to_string()]);
        assert_eq!(fs::read(dir.path().join("b.txt")).unwrap(), b"local");

        zip.set_extract_existing_file(ExtractExistingFileAction::OverwriteSilently);
        zip.extract_entry("b.txt", dir.path()).unwrap();
        assert_eq!(fs::read(dir.path().join("b.txt")).unwrap(), b"beta");
    }

    #[test]
    fn test_conflict_listener() {
        struct Answer(ConflictResolution, usize);
        impl ArchiveListener for Answer {
            fn on_extract_conflict(&mut self, _: &ExtractConflict<'_>) -> ConflictResolution {
                self.1 += 1;
                self.0
            }
        }

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("x"), b"old").unwrap();
        let mut zip = saved(&[("x", b"new")]);
        zip.set_extract_existing_file(ExtractExistingFileAction::InvokeExtractProgressEvent);

        let mut keep = Answer(ConflictResolution::Skip, 0);
        zip.extract_all_with_listener(dir.path(), &mut keep).unwrap();
        assert_eq!(keep.1, 1);
        assert_eq!(fs::read(dir.path().join("x")).unwrap(), b"old");

        let mut replace = Answer(ConflictResolution::Overwrite, 0);
        zip.extract_all_with_listener(dir.path(), &mut replace).unwrap();
        assert_eq!(fs::read(dir.path().join("x")).unwrap(), b"new");
    }

    #[test]
    fn test_extract_selected_and_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let mut zip = saved(&[("a.txt", b"a"), ("b.bin", b"b"), ("c.txt", b"c")]);
        let report = zip.extract_selected("*.txt", dir.path()).unwrap();
        assert_eq!(report.extracted.len(), 2);
        assert!(!dir.path().join("b.bin").exists());

        let other = tempfile::tempdir().unwrap();
        let mut cancel = ProgressFn(|e: &ProgressEvent<'_>| {
            if e.kind == ProgressKind::AfterEntry {
                Control::Cancel
            } else {
                Control::Continue
            }
        });
        let err = zip.extract_all_with_listener(other.path(), &mut cancel).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(other.path().join("a.txt").exists());
        assert!(!other.path().join("b.bin").exists());
    }

    #[test]
    fn test_modification_time_restored() {
        use std::time::{Duration, SystemTime};
        let when = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        let mut zip = ZipArchive::new();
        zip.add_entry("t.txt", "timed").unwrap().set_modified(when);
        let mut buf = Cursor::new(Vec::new());
        zip.save_to(&mut buf).unwrap();
        let mut zip = ZipArchive::from_bytes(buf.into_inner()).unwrap();

        let dir = tempfile::tempdir().unwrap();
        zip.extract_all(dir.path()).unwrap();
        let mtime = fs::metadata(dir.path().join("t.txt")).unwrap().modified().unwrap();
        assert_eq!(mtime, when);
    }

    #[test]
    fn test_all_detects_corruption() {
        let mut zip = ZipArchive::new();
        zip.set_compression_level(0);
        zip.add_entry("a.txt", "hello world").unwrap();
        let mut buf = Cursor::new(Vec::new());
        zip.save_to(&mut buf).unwrap();
        let mut bytes = buf.into_inner();
        let at = bytes.windows(5).position(|w| w == b"hello").unwrap();
        bytes[at] = b'j';

        let mut zip = ZipArchive::from_bytes(bytes).unwrap();
        let err = zip.test_all().unwrap_err();
        assert!(matches!(err, OxiZipError::CrcMismatch { .. }), "{err}");
    }
}
