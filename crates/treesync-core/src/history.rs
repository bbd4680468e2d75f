//! Versioned snapshot store
//!
//! Every participant owns a [`History`]: an append-only timeline of
//! immutable [`Snapshot`]s stored as commits on the participant's history
//! branch. A snapshot's tree mirrors the participant's directory tree; each
//! file leaf is a small JSON record with the file's modification time and
//! size. Git trees cannot represent empty directories, so they never take
//! part in snapshot identity or diffs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use git2::{Oid, Repository};
use serde::{Deserialize, Serialize};
use treesync_fs::{DirectoryTree, FileEntry, FilePath, PathFilter, validate_name};
use treesync_git::objects;

use crate::change::Change;
use crate::layout::{HISTORY_PREFIX, StoreBranch};
use crate::reference::{FileReference, FileReferenceComparer};
use crate::{Error, Result};

/// Files of one snapshot, keyed by path.
pub type FileSet = BTreeMap<FilePath, FileReference>;

/// An immutable, point-in-time state of one participant's tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub id: String,
    pub history: String,
    pub created_at: DateTime<Utc>,
}

/// Append-only sequence of snapshots, oldest first.
#[derive(Debug, Clone)]
pub struct History {
    pub name: String,
    snapshots: Vec<Snapshot>,
}

impl History {
    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.snapshots.last()
    }

    fn position(&self, id: &str) -> Result<usize> {
        self.snapshots
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| Error::NotFound(format!("snapshot {} in history {}", id, self.name)))
    }
}

/// Blob content of a file leaf.
#[derive(Debug, Serialize, Deserialize)]
struct FileRecord {
    modified_at: Option<DateTime<Utc>>,
    size: Option<u64>,
}

/// Snapshot timelines of all participants in a store.
pub struct SnapshotStore<'r> {
    repo: &'r Repository,
    comparer: &'r dyn FileReferenceComparer,
}

impl<'r> SnapshotStore<'r> {
    pub fn new(repo: &'r Repository, comparer: &'r dyn FileReferenceComparer) -> Self {
        Self { repo, comparer }
    }

    /// Names of all histories holding at least one snapshot.
    pub fn history_names(&self) -> Result<Vec<String>> {
        Ok(objects::branches_with_prefix(self.repo, HISTORY_PREFIX)?)
    }

    /// Load a history. A participant without snapshots has an empty history.
    pub fn history(&self, name: &str) -> Result<History> {
        validate_name(name)?;
        let branch = StoreBranch::History(name).name();

        let mut snapshots = Vec::new();
        if let Some(tip) = objects::branch_tip(self.repo, &branch)? {
            for oid in objects::first_parent_chain(self.repo, tip)?.into_iter().rev() {
                let commit = self.repo.find_commit(oid)?;
                snapshots.push(Snapshot {
                    id: oid.to_string(),
                    history: name.to_string(),
                    created_at: objects::commit_time(&commit),
                });
            }
        }

        Ok(History {
            name: name.to_string(),
            snapshots,
        })
    }

    /// The most recent snapshot of a history, if any.
    pub fn latest_snapshot(&self, name: &str) -> Result<Option<Snapshot>> {
        Ok(self.history(name)?.latest().cloned())
    }

    /// Look up a snapshot by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the id does not belong to the history.
    pub fn snapshot(&self, name: &str, id: &str) -> Result<Snapshot> {
        let history = self.history(name)?;
        let idx = history.position(id)?;
        Ok(history.snapshots[idx].clone())
    }

    /// Record `tree` as the newest state of history `name`.
    ///
    /// If the tree is content-equal to the latest snapshot (per comparer,
    /// ignoring empty directories) the latest snapshot is returned and the
    /// history is left unchanged.
    pub fn create_snapshot(&self, name: &str, tree: &DirectoryTree) -> Result<Snapshot> {
        validate_name(name)?;
        let branch = StoreBranch::History(name).name();

        let mut records = BTreeMap::new();
        let mut files = FileSet::new();
        for (path, entry) in tree.files() {
            let record = FileRecord {
                modified_at: entry.modified_at,
                size: entry.size,
            };
            records.insert(path.relative().to_string(), serde_json::to_vec(&record)?);
            files.insert(path.clone(), FileReference::from_entry(path, entry));
        }
        let tree_id = objects::write_tree(self.repo, &records)?;

        if let Some(latest) = objects::branch_tip(self.repo, &branch)? {
            let latest_commit = self.repo.find_commit(latest)?;
            let unchanged = latest_commit.tree_id() == tree_id
                || self.diff(&self.files_at(latest)?, &files, None)?.is_empty();
            if unchanged {
                tracing::debug!(history = %name, snapshot = %latest, "Tree unchanged, reusing latest snapshot");
                return Ok(Snapshot {
                    id: latest.to_string(),
                    history: name.to_string(),
                    created_at: objects::commit_time(&latest_commit),
                });
            }
        }

        let now = Utc::now();
        let oid = objects::commit_tree(
            self.repo,
            &branch,
            tree_id,
            &format!("Snapshot of {} ({} files)", name, files.len()),
            now,
        )?;
        let commit = self.repo.find_commit(oid)?;

        tracing::info!(history = %name, snapshot = %oid, files = files.len(), "Created snapshot");
        Ok(Snapshot {
            id: oid.to_string(),
            history: name.to_string(),
            created_at: objects::commit_time(&commit),
        })
    }

    /// Rebuild the directory tree of a snapshot.
    pub fn load_tree(&self, snapshot: &Snapshot) -> Result<DirectoryTree> {
        let mut tree = DirectoryTree::new();
        for (path, reference) in self.files(&snapshot.history, &snapshot.id)? {
            tree.add_file(&path, FileEntry::new(reference.modified_at, reference.size))?;
        }
        Ok(tree)
    }

    /// All files of a snapshot.
    pub fn files(&self, name: &str, id: &str) -> Result<FileSet> {
        let snapshot = self.snapshot(name, id)?;
        self.files_at(objects::parse_oid(&snapshot.id)?)
    }

    fn files_at(&self, commit_id: Oid) -> Result<FileSet> {
        let tree_id = self.repo.find_commit(commit_id)?.tree_id();
        let mut files = FileSet::new();
        for (relative, bytes) in objects::read_tree(self.repo, tree_id)? {
            let path = FilePath::new(format!("/{}", relative))?;
            let record: FileRecord = serde_json::from_slice(&bytes)?;
            files.insert(
                path.clone(),
                FileReference::new(path, record.modified_at, record.size),
            );
        }
        Ok(files)
    }

    /// Net changes between two snapshots of the same history.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if either id is not part of the history.
    pub fn compare_snapshots(
        &self,
        name: &str,
        from_id: &str,
        to_id: &str,
        filter: Option<&PathFilter>,
    ) -> Result<Vec<Change>> {
        let history = self.history(name)?;
        history.position(from_id)?;
        history.position(to_id)?;

        let from = objects::parse_oid(from_id)?;
        let to = objects::parse_oid(to_id)?;
        if self.repo.find_commit(from)?.tree_id() == self.repo.find_commit(to)?.tree_id() {
            return Ok(Vec::new());
        }
        self.diff(&self.files_at(from)?, &self.files_at(to)?, filter)
    }

    /// Changes from an empty tree to snapshot `to_id`: every file is added.
    pub fn get_changes(&self, name: &str, to_id: &str, filter: Option<&PathFilter>) -> Result<Vec<Change>> {
        let history = self.history(name)?;
        history.position(to_id)?;
        self.diff(&FileSet::new(), &self.files_at(objects::parse_oid(to_id)?)?, filter)
    }

    /// Every change along the history from `from_id` (exclusive, or the
    /// empty start state when `None`) to `to_id`, one snapshot step at a
    /// time, in chronological order.
    ///
    /// Unlike [`compare_snapshots`](Self::compare_snapshots), intermediate
    /// versions are preserved, so a file that changed and changed back shows
    /// up as two changes instead of none.
    pub fn change_log(
        &self,
        name: &str,
        from_id: Option<&str>,
        to_id: &str,
        filter: Option<&PathFilter>,
    ) -> Result<Vec<Change>> {
        let history = self.history(name)?;
        let end = history.position(to_id)?;
        let (start, mut previous) = match from_id {
            Some(from_id) => {
                let start = history.position(from_id)?;
                if start > end {
                    return Err(Error::InvalidRange {
                        from: from_id.to_string(),
                        to: to_id.to_string(),
                    });
                }
                let files = self.files_at(objects::parse_oid(from_id)?)?;
                (start + 1, files)
            }
            None => (0, FileSet::new()),
        };

        let mut changes = Vec::new();
        for snapshot in &history.snapshots[start..=end] {
            let current = self.files_at(objects::parse_oid(&snapshot.id)?)?;
            changes.extend(self.diff(&previous, &current, filter)?);
            previous = current;
        }
        Ok(changes)
    }

    fn diff(&self, from: &FileSet, to: &FileSet, filter: Option<&PathFilter>) -> Result<Vec<Change>> {
        let mut paths: Vec<&FilePath> = from.keys().chain(to.keys()).collect();
        paths.sort();
        paths.dedup();

        let mut changes = Vec::new();
        for path in paths {
            if filter.is_some_and(|f| !f.include(path)) {
                continue;
            }
            match (from.get(path), to.get(path)) {
                (Some(a), Some(b)) if self.comparer.equals(a, b) => {}
                (None, None) => {}
                (a, b) => changes.push(Change::new(a.cloned(), b.cloned())?),
            }
        }
        Ok(changes)
    }
}
