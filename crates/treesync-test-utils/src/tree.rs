//! Directory tree fixtures.

use std::fs;
use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use treesync_fs::{DirectoryTree, FileEntry, FilePath};

/// A UTC timestamp `secs` seconds after the epoch.
///
/// # Panics
/// Panics if `secs` is out of range.
pub fn timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .unwrap_or_else(|| panic!("timestamp: {secs} is out of range"))
}

/// Builds [`DirectoryTree`]s for snapshot tests.
///
/// # Example
///
/// ```rust
/// use treesync_test_utils::TreeBuilder;
///
/// let tree = TreeBuilder::new()
///     .file("/docs/readme.md", 10, 120)
///     .dir("/empty")
///     .build();
/// assert_eq!(tree.file_count(), 1);
/// ```
#[derive(Debug, Default)]
pub struct TreeBuilder {
    tree: DirectoryTree,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file modified at `secs` with `size` bytes.
    ///
    /// # Panics
    /// Panics if `path` is invalid or collides with an existing entry.
    pub fn file(mut self, path: &str, secs: i64, size: u64) -> Self {
        let file_path = FilePath::new(path).unwrap_or_else(|e| panic!("TreeBuilder::file: {e}"));
        self.tree
            .add_file(&file_path, FileEntry::new(Some(timestamp(secs)), Some(size)))
            .unwrap_or_else(|e| panic!("TreeBuilder::file: {e}"));
        self
    }

    /// Add a (possibly empty) directory.
    ///
    /// # Panics
    /// Panics if `path` is invalid or collides with a file.
    pub fn dir(mut self, path: &str) -> Self {
        let dir_path = FilePath::new(path).unwrap_or_else(|e| panic!("TreeBuilder::dir: {e}"));
        self.tree
            .add_directory(&dir_path)
            .unwrap_or_else(|e| panic!("TreeBuilder::dir: {e}"));
        self
    }

    pub fn build(self) -> DirectoryTree {
        self.tree
    }
}

/// Shorthand for a tree of `(path, modified secs, size)` files.
pub fn tree(files: &[(&str, i64, u64)]) -> DirectoryTree {
    files
        .iter()
        .fold(TreeBuilder::new(), |builder, (path, secs, size)| {
            builder.file(path, *secs, *size)
        })
        .build()
}

/// Write `content` to `relative` below `root`, creating parent directories.
///
/// # Panics
/// Panics if the filesystem operations fail.
pub fn write_file(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .unwrap_or_else(|e| panic!("write_file: failed to create {}: {e}", parent.display()));
    }
    fs::write(&path, content)
        .unwrap_or_else(|e| panic!("write_file: failed to write {}: {e}", path.display()));
}
