//! Build a [`DirectoryTree`] from a directory on disk

use std::path::Path;

use chrono::{DateTime, Utc};
use walkdir::WalkDir;

use crate::path::{FilePath, is_reserved};
use crate::tree::{DirectoryTree, FileEntry};
use crate::{Error, Result};

/// Scan `root` recursively into a [`DirectoryTree`].
///
/// Every regular file becomes a leaf carrying its modification time and
/// size. Directories are recorded even when empty; symbolic links and nested
/// `.git` directories are skipped. Paths are expressed relative to `root`.
///
/// # Errors
///
/// Returns an error if `root` is not a readable directory or a file name
/// cannot be represented as a [`FilePath`].
pub fn scan_directory(root: &Path) -> Result<DirectoryTree> {
    if !root.is_dir() {
        return Err(Error::io(
            root,
            std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
        ));
    }

    let mut tree = DirectoryTree::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| {
            let reserved = e.depth() > 0 && is_reserved(&e.file_name().to_string_lossy());
            if reserved {
                tracing::debug!(path = %e.path().display(), "Skipping git metadata");
            }
            !reserved
        });
    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            Error::io(path, e.into())
        })?;

        let file_type = entry.file_type();
        if file_type.is_symlink() {
            tracing::debug!(path = %entry.path().display(), "Skipping symbolic link");
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|_| Error::invalid_path(entry.path().display().to_string(), "outside of root"))?;
        let segments: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let path = FilePath::from_segments(&segments)?;

        if file_type.is_dir() {
            tree.add_directory(&path)?;
        } else if file_type.is_file() {
            let metadata = entry
                .metadata()
                .map_err(|e| Error::io(entry.path(), e.into()))?;
            let modified_at = metadata.modified().ok().map(DateTime::<Utc>::from);
            tree.add_file(&path, FileEntry::new(modified_at, Some(metadata.len())))?;
        }
    }

    tracing::debug!(
        root = %root.display(),
        files = tree.file_count(),
        "Scanned directory"
    );
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::TempDir;
    use assert_fs::prelude::*;

    #[test]
    fn scan_records_files_and_sizes() {
        let temp = TempDir::new().unwrap();
        temp.child("a.txt").write_str("hello").unwrap();
        temp.child("dir/b.txt").write_str("hi").unwrap();
        temp.child("empty").create_dir_all().unwrap();

        let tree = scan_directory(temp.path()).unwrap();
        let files = tree.files();

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].0.as_str(), "/a.txt");
        assert_eq!(files[0].1.size, Some(5));
        assert_eq!(files[1].0.as_str(), "/dir/b.txt");
        assert!(files[1].1.modified_at.is_some());
    }

    #[test]
    fn scan_skips_nested_git_metadata() {
        let temp = TempDir::new().unwrap();
        temp.child("project/.git/HEAD").write_str("ref: refs/heads/main").unwrap();
        temp.child("project/.git/objects/ab").create_dir_all().unwrap();
        temp.child("project/src/main.rs").write_str("fn main() {}").unwrap();
        temp.child(".gitignore").write_str("target").unwrap();

        let tree = scan_directory(temp.path()).unwrap();
        let paths: Vec<String> = tree.files().iter().map(|(p, _)| p.to_string()).collect();

        assert_eq!(paths, vec!["/.gitignore", "/project/src/main.rs"]);
        assert!(tree.get(&FilePath::new("/project").unwrap()).is_some());
    }

    #[test]
    fn scan_rejects_missing_root() {
        let temp = TempDir::new().unwrap();
        assert!(scan_directory(&temp.path().join("missing")).is_err());
    }
}
