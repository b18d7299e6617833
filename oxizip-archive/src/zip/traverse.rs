//! Adding directory trees and selected files from disk.

use super::archive::{ZipArchive, archive_name, fill_from_metadata};
use super::entry::{EntrySource, Payload, ZipEntry};
use oxizip_core::entry::normalize_entry_name;
use oxizip_core::error::Result;
use oxizip_select::{FileSelector, WalkOptions, walk};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// A path found below an added root.
struct Found {
    path: PathBuf,
    relative: PathBuf,
    is_dir: bool,
}

fn relative_name(relative: &Path) -> String {
    relative.to_string_lossy().replace('\\', "/")
}

/// Every proper ancestor directory of `name`, each with a trailing `/`.
fn ancestors(name: &str) -> impl Iterator<Item = String> + '_ {
    let trimmed = name.trim_end_matches('/');
    trimmed
        .match_indices('/')
        .map(move |(i, _)| format!("{}/", &trimmed[..i]))
}

impl ZipArchive {
    /// Add a directory tree under `dir_in_archive` (empty for the root).
    ///
    /// Nothing is added if any resulting name collides with an existing
    /// entry.
    #[instrument(skip_all, fields(dir = %dir.as_ref().display(), dir_in_archive))]
    pub fn add_directory(&mut self, dir: impl AsRef<Path>, dir_in_archive: &str) -> Result<usize> {
        let dir = dir.as_ref();
        let options = WalkOptions {
            recurse: true,
            follow_reparse_points: self.options.follow_reparse_points,
            ..WalkOptions::default()
        };
        let found = walk(dir, options)?
            .into_iter()
            .map(|e| Found {
                path: e.path,
                relative: e.relative,
                is_dir: e.is_dir,
            })
            .collect();
        let added = self.add_tree(dir, found, dir_in_archive, true)?;
        info!(added, "added directory");
        Ok(added)
    }

    /// Add the files below `dir` that match `criteria`.
    #[instrument(skip_all, fields(criteria, dir = %dir.as_ref().display(), recurse))]
    pub fn add_selected_files(
        &mut self,
        criteria: &str,
        dir: impl AsRef<Path>,
        dir_in_archive: &str,
        recurse: bool,
    ) -> Result<usize> {
        let dir = dir.as_ref();
        let mut selector = FileSelector::new(criteria)?;
        selector.set_follow_reparse_points(self.options.follow_reparse_points);
        let found = selector
            .select(dir, recurse)?
            .into_iter()
            .map(|s| Found {
                path: s.path,
                relative: s.relative,
                is_dir: s.is_dir,
            })
            .collect();
        let added = self.add_tree(dir, found, dir_in_archive, false)?;
        info!(added, "added selected files");
        Ok(added)
    }

    fn add_tree(&mut self, root: &Path, found: Vec<Found>, dir_in_archive: &str, whole_tree: bool) -> Result<usize> {
        let preserve = self.options.preserve_directory_hierarchy;
        let add_empty = self.options.add_empty_directories;
        let base = dir_in_archive.replace('\\', "/");
        let base = base.trim_matches('/');

        // Directory entry name to its source directory, when there is one.
        let mut dirs: BTreeMap<String, Option<PathBuf>> = BTreeMap::new();
        if !base.is_empty() && (whole_tree || !found.is_empty()) {
            let name = normalize_entry_name(&format!("{base}/"))?;
            let source = whole_tree.then(|| root.to_path_buf());
            dirs.insert(name, source);
        }

        let mut files = Vec::new();
        for item in found {
            if item.is_dir {
                if preserve && add_empty {
                    let name = archive_name(base, &relative_name(&item.relative));
                    let name = normalize_entry_name(&format!("{name}/"))?;
                    dirs.insert(name, Some(item.path));
                }
                continue;
            }
            let meta = match fs::metadata(&item.path) {
                Ok(m) if m.is_file() => m,
                Ok(_) => continue,
                Err(e) => {
                    debug!(path = %item.path.display(), error = %e, "skipping vanished file");
                    continue;
                }
            };
            let file_name = item
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| relative_name(&item.relative));
            let name = if preserve {
                archive_name(base, &relative_name(&item.relative))
            } else {
                archive_name(base, &file_name)
            };
            let name = normalize_entry_name(&name)?;
            let mut entry = ZipEntry::new(name, Payload::Source(EntrySource::File(item.path)));
            fill_from_metadata(&mut entry, &meta, &file_name);
            files.push(entry);
        }

        if preserve {
            let mut parents = BTreeSet::new();
            for name in files.iter().map(|f| f.name.as_str()).chain(dirs.keys().map(String::as_str)) {
                parents.extend(ancestors(name));
            }
            for parent in parents {
                if !dirs.contains_key(&parent) {
                    let source = parent
                        .strip_prefix(base)
                        .map(|rel| root.join(rel.trim_matches('/')));
                    dirs.insert(parent, source.filter(|p| p.is_dir()));
                }
            }
        }

        let mut pending = Vec::with_capacity(dirs.len() + files.len());
        for (name, source) in dirs {
            // Directories already in the archive are shared, not duplicated.
            if self.contains_exact(&name) {
                continue;
            }
            let mut entry = ZipEntry::new(name, Payload::Directory);
            if let Some(meta) = source.as_deref().and_then(|p| fs::metadata(p).ok()) {
                let dir_name = entry.name.trim_end_matches('/').rsplit('/').next().unwrap_or_default().to_string();
                fill_from_metadata(&mut entry, &meta, &dir_name);
            }
            pending.push(entry);
        }
        pending.extend(files);
        self.push_all(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxizip_core::ErrorKind;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        fs::create_dir_all(dir.path().join("empty")).unwrap();
        fs::write(dir.path().join("top.txt"), b"top").unwrap();
        fs::write(dir.path().join("src/lib.rs"), b"fn main() {}").unwrap();
        fs::write(dir.path().join("src/nested/deep.txt"), b"deep").unwrap();
        dir
    }

    #[test]
    fn test_ancestors() {
        assert_eq!(ancestors("a/b/c.txt").collect::<Vec<_>>(), vec!["a/", "a/b/"]);
        assert_eq!(ancestors("a/b/").collect::<Vec<_>>(), vec!["a/"]);
        assert_eq!(ancestors("top").count(), 0);
    }

    #[test]
    fn test_add_directory_preserves_hierarchy() {
        let dir = fixture();
        let mut zip = ZipArchive::new();
        zip.add_directory(dir.path(), "pkg").unwrap();
        let mut names = zip.entry_names();
        names.sort_unstable();
        assert_eq!(
            names,
            vec![
                "pkg/",
                "pkg/empty/",
                "pkg/src/",
                "pkg/src/lib.rs",
                "pkg/src/nested/",
                "pkg/src/nested/deep.txt",
                "pkg/top.txt",
            ]
        );
    }

    #[test]
    fn test_flat_without_empty_dirs() {
        let dir = fixture();
        let mut zip = ZipArchive::new();
        zip.set_preserve_directory_hierarchy(false);
        zip.add_directory(dir.path(), "").unwrap();
        let mut names = zip.entry_names();
        names.sort_unstable();
        assert_eq!(names, vec!["deep.txt", "lib.rs", "top.txt"]);
    }

    #[test]
    fn test_duplicate_leaves_archive_untouched() {
        let dir = fixture();
        let mut zip = ZipArchive::new();
        zip.add_entry("top.txt", "existing").unwrap();
        let err = zip.add_directory(dir.path(), "").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateEntry);
        assert_eq!(zip.entry_names(), vec!["top.txt"]);
    }

    #[test]
    fn test_add_selected_files() {
        let dir = fixture();
        let mut zip = ZipArchive::new();
        let added = zip.add_selected_files("*.txt", dir.path(), "", true).unwrap();
        assert_eq!(added, 4);
        let mut names = zip.entry_names();
        names.sort_unstable();
        assert_eq!(names, vec!["src/", "src/nested/", "src/nested/deep.txt", "top.txt"]);

        let mut shallow = ZipArchive::new();
        shallow.add_selected_files("*.txt", dir.path(), "", false).unwrap();
        assert_eq!(shallow.entry_names(), vec!["top.txt"]);
    }
}
