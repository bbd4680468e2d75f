//! Durable synchronization state
//!
//! The sync state is the record of every reconciliation run (sync points),
//! the per-participant actions those runs produced, and the paths that are
//! currently in conflict. It is persisted as a single JSON record on the
//! state branch and is only ever published through a transaction.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use git2::{Oid, Repository};
use serde::{Deserialize, Serialize};
use treesync_fs::FilePath;
use treesync_git::objects;
use uuid::Uuid;

use crate::layout::StoreBranch;
use crate::reference::FileReference;
use crate::{Error, Result};

/// Name of the record holding the sync state.
pub const STATE_FILE: &str = "state.json";

/// The durable record of one reconciliation run's baseline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPoint {
    pub id: u64,
    /// Baseline checkpoint; `None` marks a reset point
    pub checkpoint_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SyncPoint {
    pub fn is_reset(&self) -> bool {
        self.checkpoint_id.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncActionKind {
    Add,
    Remove,
    Replace,
}

impl fmt::Display for SyncActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Add => "add",
            Self::Remove => "remove",
            Self::Replace => "replace",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncActionState {
    Queued,
    Completed,
    Cancelled,
}

impl fmt::Display for SyncActionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Queued => "queued",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", name)
    }
}

/// A file operation one participant has to perform to converge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncAction {
    pub id: Uuid,
    pub target: String,
    pub path: FilePath,
    pub kind: SyncActionKind,
    pub from: Option<FileReference>,
    pub to: Option<FileReference>,
    pub sync_point_id: u64,
    pub state: SyncActionState,
}

impl SyncAction {
    /// Create a queued action.
    pub fn new(
        target: impl Into<String>,
        path: FilePath,
        kind: SyncActionKind,
        from: Option<FileReference>,
        to: Option<FileReference>,
        sync_point_id: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            target: target.into(),
            path,
            kind,
            from,
            to,
            sync_point_id,
            state: SyncActionState::Queued,
        }
    }

    pub fn is_queued(&self) -> bool {
        self.state == SyncActionState::Queued
    }
}

/// A path whose participants diverged irreconcilably.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictInfo {
    pub path: FilePath,
    /// Last checkpoint known to precede the divergence, if any
    pub anchor_checkpoint_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Sync points, sync actions and conflicts of one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    /// State format version for forward compatibility
    version: String,
    sync_points: Vec<SyncPoint>,
    actions: Vec<SyncAction>,
    conflicts: Vec<ConflictInfo>,
    /// Participant filter expressions in effect at the latest sync point
    #[serde(default)]
    filters: BTreeMap<String, String>,
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncState {
    pub fn new() -> Self {
        Self {
            version: "1.0".to_string(),
            sync_points: Vec::new(),
            actions: Vec::new(),
            conflicts: Vec::new(),
            filters: BTreeMap::new(),
        }
    }

    /// Load the state from the state branch; empty if never saved.
    pub fn load(repo: &Repository) -> Result<Self> {
        match objects::branch_tip(repo, &StoreBranch::State.name())? {
            Some(tip) => Ok(objects::read_json(repo, tip, STATE_FILE)?.unwrap_or_default()),
            None => Ok(Self::new()),
        }
    }

    /// Append the state to the state branch.
    ///
    /// Returns `None` if the stored state is already identical.
    pub fn save(&self, repo: &Repository) -> Result<Option<Oid>> {
        if Self::load(repo)? == *self {
            return Ok(None);
        }

        let mut records = BTreeMap::new();
        records.insert(STATE_FILE.to_string(), serde_json::to_vec_pretty(self)?);
        let tree_id = objects::write_tree(repo, &records)?;

        let message = match self.latest_sync_point() {
            Some(point) => format!("Sync state at sync point {}", point.id),
            None => "Sync state".to_string(),
        };
        let oid = objects::commit_tree(repo, &StoreBranch::State.name(), tree_id, &message, Utc::now())?;
        Ok(Some(oid))
    }

    pub fn sync_points(&self) -> &[SyncPoint] {
        &self.sync_points
    }

    pub fn actions(&self) -> &[SyncAction] {
        &self.actions
    }

    pub fn conflicts(&self) -> &[ConflictInfo] {
        &self.conflicts
    }

    pub fn filters(&self) -> &BTreeMap<String, String> {
        &self.filters
    }

    pub fn set_filters(&mut self, filters: BTreeMap<String, String>) {
        self.filters = filters;
    }

    /// Append a sync point with the next id in sequence.
    pub fn append_sync_point(&mut self, checkpoint_id: Option<String>) -> &SyncPoint {
        let id = self.sync_points.last().map_or(1, |p| p.id + 1);
        self.sync_points.push(SyncPoint {
            id,
            checkpoint_id,
            created_at: Utc::now(),
        });
        tracing::debug!(sync_point = id, "Appended sync point");
        &self.sync_points[self.sync_points.len() - 1]
    }

    pub fn latest_sync_point(&self) -> Option<&SyncPoint> {
        self.sync_points.last()
    }

    /// Look up a sync point by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown id.
    pub fn sync_point(&self, id: u64) -> Result<&SyncPoint> {
        self.sync_points
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| Error::NotFound(format!("sync point {}", id)))
    }

    /// Checkpoint recorded by the sync point preceding `sync_point_id`.
    ///
    /// `None` for sync point 1, which has no predecessor.
    pub fn anchor_before(&self, sync_point_id: u64) -> Option<String> {
        if sync_point_id <= 1 {
            return None;
        }
        self.sync_point(sync_point_id - 1)
            .ok()
            .and_then(|p| p.checkpoint_id.clone())
    }

    pub fn action(&self, id: Uuid) -> Option<&SyncAction> {
        self.actions.iter().find(|a| a.id == id)
    }

    /// Queued actions for `path`, oldest first.
    pub fn queued_actions(&self, path: &FilePath) -> Vec<&SyncAction> {
        self.actions
            .iter()
            .filter(|a| a.is_queued() && &a.path == path)
            .collect()
    }

    /// Queued actions addressed to `target`.
    pub fn queued_actions_for(&self, target: &str) -> Vec<&SyncAction> {
        self.actions
            .iter()
            .filter(|a| a.is_queued() && a.target == target)
            .collect()
    }

    pub fn add_action(&mut self, action: SyncAction) -> Uuid {
        let id = action.id;
        tracing::debug!(
            action = %id,
            participant = %action.target,
            path = %action.path,
            kind = %action.kind,
            "Queued sync action"
        );
        self.actions.push(action);
        id
    }

    /// Mark a queued action as performed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAction`] if the action is unknown or not queued.
    pub fn complete_action(&mut self, id: Uuid) -> Result<()> {
        self.transition(id, SyncActionState::Completed)
    }

    /// Withdraw a queued action.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAction`] if the action is unknown or not queued.
    pub fn cancel_action(&mut self, id: Uuid) -> Result<()> {
        self.transition(id, SyncActionState::Cancelled)
    }

    fn transition(&mut self, id: Uuid, next: SyncActionState) -> Result<()> {
        let action = self
            .actions
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| Error::InvalidAction {
                id: id.to_string(),
                reason: "no such action".to_string(),
            })?;
        if !action.is_queued() {
            return Err(Error::InvalidAction {
                id: id.to_string(),
                reason: format!("cannot move from {} to {}", action.state, next),
            });
        }
        action.state = next;
        Ok(())
    }

    /// Cancel every queued action for `path`, returning the cancelled actions.
    pub fn cancel_queued(&mut self, path: &FilePath) -> Vec<SyncAction> {
        let mut cancelled = Vec::new();
        for action in self
            .actions
            .iter_mut()
            .filter(|a| a.is_queued() && &a.path == path)
        {
            action.state = SyncActionState::Cancelled;
            cancelled.push(action.clone());
        }
        cancelled
    }

    /// Cancel every queued action, returning how many were cancelled.
    pub fn cancel_all_queued(&mut self) -> usize {
        let mut count = 0;
        for action in self.actions.iter_mut().filter(|a| a.is_queued()) {
            action.state = SyncActionState::Cancelled;
            count += 1;
        }
        count
    }

    pub fn conflict(&self, path: &FilePath) -> Option<&ConflictInfo> {
        self.conflicts.iter().find(|c| &c.path == path)
    }

    /// Record a conflict, replacing any existing one for the same path.
    pub fn add_conflict(&mut self, path: FilePath, anchor_checkpoint_id: Option<String>) {
        tracing::info!(path = %path, anchor = ?anchor_checkpoint_id, "Conflict raised");
        self.conflicts.retain(|c| c.path != path);
        self.conflicts.push(ConflictInfo {
            path,
            anchor_checkpoint_id,
            created_at: Utc::now(),
        });
    }

    /// Remove the conflict on `path` once it has been resolved externally.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the path has no open conflict.
    pub fn resolve_conflict(&mut self, path: &FilePath) -> Result<ConflictInfo> {
        let pos = self
            .conflicts
            .iter()
            .position(|c| &c.path == path)
            .ok_or_else(|| Error::NotFound(format!("conflict on {}", path)))?;
        Ok(self.conflicts.remove(pos))
    }

    /// Drop every conflict, returning how many were removed.
    pub fn clear_conflicts(&mut self) -> usize {
        let count = self.conflicts.len();
        self.conflicts.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn path(p: &str) -> FilePath {
        FilePath::new(p).unwrap()
    }

    fn add(target: &str, p: &str, sync_point_id: u64) -> SyncAction {
        let to = FileReference::new(path(p), None, Some(1));
        SyncAction::new(target, path(p), SyncActionKind::Add, None, Some(to), sync_point_id)
    }

    #[test]
    fn sync_point_ids_are_gapless_from_one() {
        let mut state = SyncState::new();
        assert_eq!(state.append_sync_point(Some("a".into())).id, 1);
        assert_eq!(state.append_sync_point(None).id, 2);
        assert_eq!(state.append_sync_point(Some("b".into())).id, 3);

        assert!(state.sync_point(2).unwrap().is_reset());
        assert!(matches!(state.sync_point(4), Err(Error::NotFound(_))));
    }

    #[test]
    fn anchor_is_checkpoint_of_previous_sync_point() {
        let mut state = SyncState::new();
        state.append_sync_point(Some("first".into()));
        state.append_sync_point(Some("second".into()));

        assert_eq!(state.anchor_before(1), None);
        assert_eq!(state.anchor_before(2), Some("first".to_string()));
        assert_eq!(state.anchor_before(3), Some("second".to_string()));
    }

    #[test]
    fn actions_only_leave_the_queued_state() {
        let mut state = SyncState::new();
        let id = state.add_action(add("right", "/f", 1));

        state.complete_action(id).unwrap();
        assert_eq!(state.action(id).unwrap().state, SyncActionState::Completed);

        assert!(matches!(state.cancel_action(id), Err(Error::InvalidAction { .. })));
        assert!(matches!(
            state.complete_action(Uuid::new_v4()),
            Err(Error::InvalidAction { .. })
        ));
    }

    #[test]
    fn cancel_queued_is_scoped_to_a_path() {
        let mut state = SyncState::new();
        state.add_action(add("left", "/a", 1));
        state.add_action(add("right", "/a", 1));
        let other = state.add_action(add("right", "/b", 1));

        let cancelled = state.cancel_queued(&path("/a"));
        assert_eq!(cancelled.len(), 2);
        assert!(state.queued_actions(&path("/a")).is_empty());
        assert_eq!(state.queued_actions_for("right")[0].id, other);

        assert_eq!(state.cancel_all_queued(), 1);
        assert_eq!(state.cancel_all_queued(), 0);
    }

    #[test]
    fn conflicts_are_unique_per_path() {
        let mut state = SyncState::new();
        state.add_conflict(path("/a"), None);
        state.add_conflict(path("/a"), Some("anchor".into()));
        assert_eq!(state.conflicts().len(), 1);
        assert_eq!(
            state.conflict(&path("/a")).unwrap().anchor_checkpoint_id.as_deref(),
            Some("anchor")
        );

        state.resolve_conflict(&path("/a")).unwrap();
        assert!(state.conflict(&path("/a")).is_none());
        assert!(matches!(state.resolve_conflict(&path("/a")), Err(Error::NotFound(_))));
    }

    #[test]
    fn save_and_load_through_the_state_branch() {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init_bare(dir.path()).unwrap();
        assert_eq!(SyncState::load(&repo).unwrap(), SyncState::new());

        let mut state = SyncState::new();
        state.append_sync_point(Some("checkpoint".into()));
        state.add_action(add("right", "/f", 1));
        state.add_conflict(path("/g"), None);

        assert!(state.save(&repo).unwrap().is_some());
        assert_eq!(SyncState::load(&repo).unwrap(), state);
        // Unchanged state is not committed again.
        assert!(state.save(&repo).unwrap().is_none());
    }
}
