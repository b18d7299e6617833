//! Compiled selection criteria.

use crate::ast::Criterion;
use crate::candidate::{Candidate, FsCandidate};
use crate::parser;
use crate::walk::{WalkOptions, walk};
use oxizip_core::error::{OxiZipError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// A path chosen by [`FileSelector::select`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selected {
    /// Full filesystem path.
    pub path: PathBuf,
    /// Path relative to the selection root.
    pub relative: PathBuf,
    /// Whether the path is a directory.
    pub is_dir: bool,
}

/// Parsed selection criteria.
///
/// ```rust
/// use oxizip_select::FileSelector;
///
/// let selector = FileSelector::new("name = *.txt AND size > 1kb").unwrap();
/// assert_eq!(selector.to_string(), "(name = '*.txt' AND size > 1024)");
/// assert!(FileSelector::new("size >").is_err());
/// ```
#[derive(Debug, Clone)]
pub struct FileSelector {
    source: String,
    criterion: Criterion,
    options: WalkOptions,
}

impl FileSelector {
    /// Parse criteria. Syntax errors are reported here, before any
    /// filesystem access.
    pub fn new(criteria: &str) -> Result<Self> {
        let criterion = parser::parse(criteria)?;
        debug!(criteria, parsed = %criterion, "parsed selection criteria");
        Ok(Self {
            source: criteria.to_string(),
            criterion,
            options: WalkOptions::default(),
        })
    }

    /// The criteria string as given.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The parsed criteria.
    pub fn criterion(&self) -> &Criterion {
        &self.criterion
    }

    /// Whether to descend into symlinked directories (default false).
    pub fn set_follow_reparse_points(&mut self, follow: bool) {
        self.options.follow_reparse_points = follow;
    }

    /// Whether symlinked directories are followed.
    pub fn follow_reparse_points(&self) -> bool {
        self.options.follow_reparse_points
    }

    /// Limit traversal depth.
    pub fn set_max_depth(&mut self, depth: usize) {
        self.options.max_depth = depth;
    }

    /// Evaluate against a single candidate.
    pub fn matches(&self, candidate: &dyn Candidate) -> bool {
        self.criterion.evaluate(candidate)
    }

    /// Select files and directories below `dir` that match.
    pub fn select(&self, dir: &Path, recurse: bool) -> Result<Vec<Selected>> {
        let options = WalkOptions {
            recurse,
            ..self.options
        };
        let mut selected = Vec::new();
        for entry in walk(dir, options)? {
            let candidate = match FsCandidate::from_path(&entry.path) {
                Ok(c) => c,
                Err(e) if e.is_io() => {
                    // Removed between listing and stat.
                    debug!(path = %entry.path.display(), error = %e, "skipping vanished path");
                    continue;
                }
                Err(e) => return Err(e),
            };
            if self.matches(&candidate) {
                selected.push(Selected {
                    path: entry.path,
                    relative: entry.relative,
                    is_dir: entry.is_dir,
                });
            }
        }
        debug!(dir = %dir.display(), recurse, count = selected.len(), "selection complete");
        Ok(selected)
    }

    /// Select matching regular files below `dir`.
    pub fn select_files(&self, dir: &Path, recurse: bool) -> Result<Vec<PathBuf>> {
        Ok(self
            .select(dir, recurse)?
            .into_iter()
            .filter(|s| !s.is_dir)
            .map(|s| s.path)
            .collect())
    }
}

impl FromStr for FileSelector {
    type Err = OxiZipError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl fmt::Display for FileSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.criterion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_select_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        fs::write(dir.path().join("b.bin"), vec![0u8; 4096]).unwrap();
        fs::write(dir.path().join("sub/c.txt"), b"hi").unwrap();

        let selector = FileSelector::new("*.txt").unwrap();
        let flat = selector.select_files(dir.path(), false).unwrap();
        assert_eq!(flat, vec![dir.path().join("a.txt")]);

        let deep = selector.select_files(dir.path(), true).unwrap();
        assert_eq!(deep.len(), 2);

        let big = FileSelector::new("size > 1kb").unwrap();
        assert_eq!(
            big.select_files(dir.path(), true).unwrap(),
            vec![dir.path().join("b.bin")]
        );

        let dirs = FileSelector::new("type = D").unwrap();
        let found = dirs.select(dir.path(), true).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].is_dir);
    }

    #[test]
    fn test_from_str() {
        let selector: FileSelector = "name != *.tmp".parse().unwrap();
        assert_eq!(selector.source(), "name != *.tmp");
        assert!("(".parse::<FileSelector>().is_err());
    }
}
