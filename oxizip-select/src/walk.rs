//! Directory traversal with reparse-point control.

use oxizip_core::error::{OxiZipError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Default recursion limit.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Traversal options.
#[derive(Debug, Clone, Copy)]
pub struct WalkOptions {
    /// Descend into subdirectories.
    pub recurse: bool,
    /// Descend into symlinked directories.
    pub follow_reparse_points: bool,
    /// Maximum directory depth below the root.
    pub max_depth: usize,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            recurse: true,
            follow_reparse_points: false,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// One visited path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    /// Full filesystem path.
    pub path: PathBuf,
    /// Path relative to the walk root.
    pub relative: PathBuf,
    /// Whether the path is (or links to) a directory.
    pub is_dir: bool,
    /// Whether the path itself is a symlink.
    pub is_link: bool,
}

/// Walk `root`, returning every file and directory below it in sorted
/// order. The root itself is not included.
///
/// A symlinked directory is reported but only descended when
/// `follow_reparse_points` is set; descending into a directory that is
/// already on the current path is a [`OxiZipError::Traversal`] error.
pub fn walk(root: &Path, options: WalkOptions) -> Result<Vec<WalkEntry>> {
    let meta = fs::metadata(root)?;
    if !meta.is_dir() {
        return Err(OxiZipError::traversal(root, "not a directory"));
    }

    let mut out = Vec::new();
    let mut ancestors = vec![fs::canonicalize(root)?];
    walk_dir(root, Path::new(""), 0, options, &mut ancestors, &mut out)?;
    debug!(root = %root.display(), count = out.len(), "walked directory");
    Ok(out)
}

fn walk_dir(
    dir: &Path,
    relative: &Path,
    depth: usize,
    options: WalkOptions,
    ancestors: &mut Vec<PathBuf>,
    out: &mut Vec<WalkEntry>,
) -> Result<()> {
    let mut children: Vec<_> = fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
    children.sort_by_key(|e| e.file_name());

    for child in children {
        let path = child.path();
        let rel = relative.join(child.file_name());
        let link_meta = fs::symlink_metadata(&path)?;
        let is_link = link_meta.file_type().is_symlink();
        let is_dir = if is_link {
            // Dangling links are reported as files.
            fs::metadata(&path).map(|m| m.is_dir()).unwrap_or(false)
        } else {
            link_meta.is_dir()
        };

        trace!(path = %path.display(), is_dir, is_link, "visit");
        out.push(WalkEntry {
            path: path.clone(),
            relative: rel.clone(),
            is_dir,
            is_link,
        });

        if !is_dir || !options.recurse || (is_link && !options.follow_reparse_points) {
            continue;
        }
        if depth + 1 > options.max_depth {
            return Err(OxiZipError::traversal(
                &path,
                format!("maximum depth {} exceeded", options.max_depth),
            ));
        }

        let canonical = fs::canonicalize(&path)?;
        if ancestors.contains(&canonical) {
            return Err(OxiZipError::traversal(&path, "directory cycle detected"));
        }
        ancestors.push(canonical);
        walk_dir(&path, &rel, depth + 1, options, ancestors, out)?;
        ancestors.pop();
    }
    Ok(())
}
