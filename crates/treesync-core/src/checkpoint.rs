//! Multi-participant checkpoints and the diffs between them
//!
//! A [`Checkpoint`] records, for every configured participant, the id of
//! that participant's latest snapshot at the time the checkpoint was taken.
//! Checkpoints form their own append-only timeline on the checkpoint branch;
//! each is a commit whose tree holds one small pointer record per
//! participant.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use git2::Repository;
use serde::{Deserialize, Serialize};
use treesync_fs::{FilePath, PathFilter};
use treesync_git::objects;

use crate::change::{Change, ChangeKind};
use crate::history::SnapshotStore;
use crate::layout::StoreBranch;
use crate::reference::FileReferenceComparer;
use crate::{Error, Result};

const POINTER_SUFFIX: &str = ".json";

/// Pointer record stored per participant in a checkpoint.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotPointer {
    snapshot_id: Option<String>,
}

/// Cross-participant, point-in-time record of every participant's latest snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// Participant name to snapshot id; `None` if the participant had no snapshot yet
    pub participants: BTreeMap<String, Option<String>>,
}

impl Checkpoint {
    pub fn snapshot_id(&self, participant: &str) -> Option<&str> {
        self.participants.get(participant).and_then(|id| id.as_deref())
    }
}

/// How a participant itself changed between two checkpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantChange {
    pub name: String,
    pub kind: ChangeKind,
}

/// Per-path, per-participant changes between two checkpoints.
#[derive(Debug, Clone, Default)]
pub struct MultiDiff {
    pub from_checkpoint: Option<String>,
    pub to_checkpoint: String,
    /// Path to participant to that participant's ordered changes of the path
    pub changes: BTreeMap<FilePath, BTreeMap<String, Vec<Change>>>,
    pub participant_changes: Vec<ParticipantChange>,
}

impl MultiDiff {
    /// Paths changed by at least one participant.
    pub fn paths(&self) -> impl Iterator<Item = &FilePath> {
        self.changes.keys()
    }

    pub fn changes_for(&self, path: &FilePath) -> Option<&BTreeMap<String, Vec<Change>>> {
        self.changes.get(path)
    }

    /// Whether any participant joined since the `from` checkpoint.
    pub fn has_added_participant(&self) -> bool {
        self.participant_changes
            .iter()
            .any(|c| c.kind == ChangeKind::Added)
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.participant_changes.is_empty()
    }
}

/// Aggregates participant histories into checkpoints and diffs them.
pub struct Coordinator<'r> {
    repo: &'r Repository,
    snapshots: SnapshotStore<'r>,
}

impl<'r> Coordinator<'r> {
    pub fn new(repo: &'r Repository, comparer: &'r dyn FileReferenceComparer) -> Self {
        Self {
            repo,
            snapshots: SnapshotStore::new(repo, comparer),
        }
    }

    pub fn snapshots(&self) -> &SnapshotStore<'r> {
        &self.snapshots
    }

    /// Append a checkpoint recording each participant's latest snapshot.
    ///
    /// Returns `None` without touching the timeline when there are no
    /// participants. Otherwise a new checkpoint is always appended, even if
    /// nothing changed since the previous one.
    pub fn create_checkpoint(&self, participants: &[String]) -> Result<Option<Checkpoint>> {
        if participants.is_empty() {
            return Ok(None);
        }

        let mut pointers = BTreeMap::new();
        let mut records = BTreeMap::new();
        for name in participants {
            let snapshot_id = self.snapshots.latest_snapshot(name)?.map(|s| s.id);
            let pointer = SnapshotPointer {
                snapshot_id: snapshot_id.clone(),
            };
            records.insert(format!("{}{}", name, POINTER_SUFFIX), serde_json::to_vec(&pointer)?);
            pointers.insert(name.clone(), snapshot_id);
        }

        let tree_id = objects::write_tree(self.repo, &records)?;
        let created_at = Utc::now();
        let oid = objects::commit_tree(
            self.repo,
            &StoreBranch::Checkpoints.name(),
            tree_id,
            &format!("Checkpoint of {} participants", pointers.len()),
            created_at,
        )?;
        let commit = self.repo.find_commit(oid)?;

        tracing::debug!(checkpoint = %oid, participants = pointers.len(), "Created checkpoint");
        Ok(Some(Checkpoint {
            id: oid.to_string(),
            created_at: objects::commit_time(&commit),
            participants: pointers,
        }))
    }

    /// All checkpoints, oldest first.
    pub fn checkpoints(&self) -> Result<Vec<Checkpoint>> {
        let mut checkpoints = Vec::new();
        if let Some(tip) = objects::branch_tip(self.repo, &StoreBranch::Checkpoints.name())? {
            for oid in objects::first_parent_chain(self.repo, tip)?.into_iter().rev() {
                checkpoints.push(self.read_checkpoint(oid)?);
            }
        }
        Ok(checkpoints)
    }

    /// The most recent checkpoint, if any.
    pub fn latest_checkpoint(&self) -> Result<Option<Checkpoint>> {
        match objects::branch_tip(self.repo, &StoreBranch::Checkpoints.name())? {
            Some(tip) => Ok(Some(self.read_checkpoint(tip)?)),
            None => Ok(None),
        }
    }

    /// Look up a checkpoint on the timeline.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `id` is not a checkpoint.
    pub fn checkpoint(&self, id: &str) -> Result<Checkpoint> {
        let not_found = || Error::NotFound(format!("checkpoint {}", id));
        let oid = objects::parse_oid(id).map_err(|_| not_found())?;
        let tip = objects::branch_tip(self.repo, &StoreBranch::Checkpoints.name())?.ok_or_else(not_found)?;

        if tip != oid && !objects::is_ancestor(self.repo, oid, tip)? {
            return Err(not_found());
        }
        self.read_checkpoint(oid)
    }

    fn read_checkpoint(&self, oid: git2::Oid) -> Result<Checkpoint> {
        let commit = self.repo.find_commit(oid)?;
        let mut participants = BTreeMap::new();
        for (file, bytes) in objects::read_tree(self.repo, commit.tree_id())? {
            if let Some(name) = file.strip_suffix(POINTER_SUFFIX) {
                let pointer: SnapshotPointer = serde_json::from_slice(&bytes)?;
                participants.insert(name.to_string(), pointer.snapshot_id);
            }
        }
        Ok(Checkpoint {
            id: oid.to_string(),
            created_at: objects::commit_time(&commit),
            participants,
        })
    }

    /// Changes between two checkpoints, or from the start when `from` is `None`.
    ///
    /// Each participant's history is walked snapshot by snapshot between the
    /// two recorded snapshots, so per-path change lists are ordered and keep
    /// intermediate versions. A participant whose filter excludes a path
    /// contributes no changes for it.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if either checkpoint is unknown
    /// - [`Error::InvalidRange`] if `from` is not earlier than `to` on the timeline
    pub fn get_changes(
        &self,
        from: Option<&str>,
        to: &str,
        filters: &BTreeMap<String, PathFilter>,
    ) -> Result<MultiDiff> {
        let to_checkpoint = self.checkpoint(to)?;
        let from_checkpoint = match from {
            Some(from) => {
                let checkpoint = self.checkpoint(from)?;
                let ordered = objects::is_ancestor(
                    self.repo,
                    objects::parse_oid(&checkpoint.id)?,
                    objects::parse_oid(&to_checkpoint.id)?,
                )?;
                if !ordered {
                    return Err(Error::InvalidRange {
                        from: from.to_string(),
                        to: to.to_string(),
                    });
                }
                Some(checkpoint)
            }
            None => None,
        };

        let mut diff = MultiDiff {
            from_checkpoint: from_checkpoint.as_ref().map(|c| c.id.clone()),
            to_checkpoint: to_checkpoint.id.clone(),
            ..MultiDiff::default()
        };

        for (name, to_snapshot) in &to_checkpoint.participants {
            let Some(to_snapshot) = to_snapshot else {
                continue;
            };
            let from_snapshot = from_checkpoint
                .as_ref()
                .and_then(|c| c.snapshot_id(name));
            let changes = self.snapshots.change_log(
                name,
                from_snapshot,
                to_snapshot,
                filters.get(name),
            )?;
            for change in changes {
                diff.changes
                    .entry(change.path().clone())
                    .or_default()
                    .entry(name.clone())
                    .or_default()
                    .push(change);
            }
        }

        diff.participant_changes = participant_changes(from_checkpoint.as_ref(), &to_checkpoint);
        tracing::debug!(
            from = ?diff.from_checkpoint,
            to = %diff.to_checkpoint,
            paths = diff.changes.len(),
            "Computed checkpoint diff"
        );
        Ok(diff)
    }
}

fn participant_changes(from: Option<&Checkpoint>, to: &Checkpoint) -> Vec<ParticipantChange> {
    let empty = BTreeMap::new();
    let before = from.map(|c| &c.participants).unwrap_or(&empty);
    let after = &to.participants;

    let mut changes = Vec::new();
    for (name, snapshot) in after {
        let kind = match before.get(name) {
            None => Some(ChangeKind::Added),
            Some(previous) if previous != snapshot => Some(ChangeKind::Modified),
            Some(_) => None,
        };
        if let Some(kind) = kind {
            changes.push(ParticipantChange {
                name: name.clone(),
                kind,
            });
        }
    }
    for name in before.keys().filter(|name| !after.contains_key(*name)) {
        changes.push(ParticipantChange {
            name: name.clone(),
            kind: ChangeKind::Deleted,
        });
    }
    changes
}
