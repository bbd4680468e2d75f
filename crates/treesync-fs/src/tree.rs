//! In-memory directory trees
//!
//! A [`DirectoryTree`] is the input to snapshot creation: a recursive
//! structure of directories and file metadata. Only metadata is modeled;
//! file contents never enter the tree.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::path::{FilePath, SEPARATOR};
use crate::{Error, Result};

/// Metadata of a single file leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Last modification time, if known
    pub modified_at: Option<DateTime<Utc>>,
    /// Size in bytes, if known
    pub size: Option<u64>,
}

impl FileEntry {
    pub fn new(modified_at: Option<DateTime<Utc>>, size: Option<u64>) -> Self {
        Self { modified_at, size }
    }
}

/// A node of a directory tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeNode {
    File(FileEntry),
    Directory(DirectoryTree),
}

/// A directory and everything below it, keyed by entry name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryTree {
    entries: BTreeMap<String, TreeNode>,
}

impl DirectoryTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries directly inside this directory.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &TreeNode)> {
        self.entries.iter().map(|(name, node)| (name.as_str(), node))
    }

    /// Look up the node at `path`.
    pub fn get(&self, path: &FilePath) -> Option<&TreeNode> {
        let mut segments = path.segments().peekable();
        let mut dir = self;
        while let Some(segment) = segments.next() {
            let node = dir.entries.get(segment)?;
            if segments.peek().is_none() {
                return Some(node);
            }
            match node {
                TreeNode::Directory(child) => dir = child,
                TreeNode::File(_) => return None,
            }
        }
        None
    }

    /// Add a file, creating intermediate directories as needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPath`] if an intermediate segment is a file or
    /// the path already names a directory.
    pub fn add_file(&mut self, path: &FilePath, entry: FileEntry) -> Result<()> {
        let (dir, name) = self.parent_dir_mut(path)?;
        if matches!(dir.entries.get(name), Some(TreeNode::Directory(_))) {
            return Err(Error::invalid_path(
                path.as_str(),
                "a directory already exists at this path",
            ));
        }
        dir.entries.insert(name.to_string(), TreeNode::File(entry));
        Ok(())
    }

    /// Add an (empty) directory, creating intermediate directories as needed.
    pub fn add_directory(&mut self, path: &FilePath) -> Result<()> {
        let (dir, name) = self.parent_dir_mut(path)?;
        match dir.entries.get(name) {
            Some(TreeNode::File(_)) => Err(Error::invalid_path(
                path.as_str(),
                "a file already exists at this path",
            )),
            Some(TreeNode::Directory(_)) => Ok(()),
            None => {
                dir.entries
                    .insert(name.to_string(), TreeNode::Directory(DirectoryTree::new()));
                Ok(())
            }
        }
    }

    fn parent_dir_mut<'p>(&mut self, path: &'p FilePath) -> Result<(&mut DirectoryTree, &'p str)> {
        let segments: Vec<&str> = path.segments().collect();
        let (name, parents) = segments
            .split_last()
            .ok_or_else(|| Error::invalid_path(path.as_str(), "path has no segments"))?;

        let mut dir = self;
        for segment in parents {
            let node = dir
                .entries
                .entry(segment.to_string())
                .or_insert_with(|| TreeNode::Directory(DirectoryTree::new()));
            dir = match node {
                TreeNode::Directory(child) => child,
                TreeNode::File(_) => {
                    return Err(Error::invalid_path(
                        path.as_str(),
                        format!("'{}' is a file", segment),
                    ));
                }
            };
        }
        Ok((dir, *name))
    }

    /// All file leaves with their full paths, in path order.
    pub fn files(&self) -> Vec<(FilePath, &FileEntry)> {
        let mut files = Vec::new();
        self.collect_files(&mut String::new(), &mut files);
        files
    }

    fn collect_files<'a>(&'a self, prefix: &mut String, out: &mut Vec<(FilePath, &'a FileEntry)>) {
        for (name, node) in &self.entries {
            let len = prefix.len();
            prefix.push(SEPARATOR);
            prefix.push_str(name);
            match node {
                TreeNode::File(entry) => {
                    // Entries are only inserted through validated FilePaths.
                    if let Ok(path) = FilePath::new(prefix.as_str()) {
                        out.push((path, entry));
                    }
                }
                TreeNode::Directory(child) => child.collect_files(prefix, out),
            }
            prefix.truncate(len);
        }
    }

    /// Number of file leaves.
    pub fn file_count(&self) -> usize {
        self.entries
            .values()
            .map(|node| match node {
                TreeNode::File(_) => 1,
                TreeNode::Directory(child) => child.file_count(),
            })
            .sum()
    }

    /// Whether the tree contains no files at all (empty directories do not count).
    pub fn is_empty(&self) -> bool {
        self.file_count() == 0
    }
}
