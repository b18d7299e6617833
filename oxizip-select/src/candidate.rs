//! Things a selector can be evaluated against.

use crate::ast::TimeField;
use oxizip_core::FileAttributes;
use oxizip_core::error::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Metadata view used by selection criteria.
///
/// Implemented by filesystem candidates ([`FsCandidate`]) and by archive
/// entries. `path` uses forward slashes; directories may carry a trailing
/// `/`.
pub trait Candidate {
    /// Forward-slash path used for `name` matching.
    fn path(&self) -> &str;
    /// Uncompressed size in bytes.
    fn size(&self) -> u64;
    /// Last modification time.
    fn modified(&self) -> Option<SystemTime>;
    /// Creation time.
    fn created(&self) -> Option<SystemTime>;
    /// Last access time.
    fn accessed(&self) -> Option<SystemTime>;
    /// DOS attribute bits.
    fn attributes(&self) -> FileAttributes;
    /// Whether this is a directory.
    fn is_dir(&self) -> bool;

    /// Look up a timestamp by field.
    fn time(&self, field: TimeField) -> Option<SystemTime> {
        match field {
            TimeField::Modified => self.modified(),
            TimeField::Created => self.created(),
            TimeField::Accessed => self.accessed(),
        }
    }
}

/// A file or directory on disk.
#[derive(Debug, Clone)]
pub struct FsCandidate {
    path: PathBuf,
    match_path: String,
    size: u64,
    modified: Option<SystemTime>,
    created: Option<SystemTime>,
    accessed: Option<SystemTime>,
    attributes: FileAttributes,
    is_dir: bool,
}

impl FsCandidate {
    /// Stat `path` without following a final symlink.
    pub fn from_path(path: &Path) -> Result<Self> {
        let meta = fs::symlink_metadata(path)?;
        let follow = if meta.file_type().is_symlink() {
            fs::metadata(path).ok()
        } else {
            None
        };
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let attributes = FileAttributes::from_metadata(&meta, &file_name);
        let effective = follow.as_ref().unwrap_or(&meta);
        let is_dir = effective.is_dir();
        let attributes = if is_dir {
            attributes.with_dos(FileAttributes::DIRECTORY)
        } else {
            attributes
        };

        let mut match_path = path.to_string_lossy().replace('\\', "/");
        if is_dir && !match_path.ends_with('/') {
            match_path.push('/');
        }

        Ok(Self {
            path: path.to_path_buf(),
            match_path,
            size: if is_dir { 0 } else { effective.len() },
            modified: effective.modified().ok(),
            created: effective.created().ok(),
            accessed: effective.accessed().ok(),
            attributes,
            is_dir,
        })
    }

    /// The filesystem path.
    pub fn fs_path(&self) -> &Path {
        &self.path
    }
}

impl Candidate for FsCandidate {
    fn path(&self) -> &str {
        &self.match_path
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    fn created(&self) -> Option<SystemTime> {
        self.created
    }

    fn accessed(&self) -> Option<SystemTime> {
        self.accessed
    }

    fn attributes(&self) -> FileAttributes {
        self.attributes
    }

    fn is_dir(&self) -> bool {
        self.is_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data.bin");
        fs::write(&file, vec![0u8; 300]).unwrap();

        let c = FsCandidate::from_path(&file).unwrap();
        assert_eq!(c.size(), 300);
        assert!(!c.is_dir());
        assert!(c.path().ends_with("/data.bin"));
        assert!(c.modified().is_some());
        assert!(c.time(TimeField::Modified).is_some());
    }

    #[test]
    fn test_dir_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let c = FsCandidate::from_path(dir.path()).unwrap();
        assert!(c.is_dir());
        assert_eq!(c.size(), 0);
        assert!(c.path().ends_with('/'));
        assert!(c.attributes().contains(FileAttributes::DIRECTORY));
    }
}
