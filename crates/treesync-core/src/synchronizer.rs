//! Reconciliation runs
//!
//! One run of the [`Synchronizer`] takes a checkpoint of every participant,
//! diffs it against the checkpoint of the previous run and classifies each
//! changed path through its change graph. Converged paths turn into queued
//! [`SyncAction`]s for the participants that lag behind; diverged paths turn
//! into [`ConflictInfo`](crate::state::ConflictInfo) records that keep the
//! path out of automatic processing until resolved or reset.
//!
//! A run only mutates the repository it is given. Publishing the result is
//! the caller's business, normally by committing the surrounding
//! transaction, which makes the whole run all-or-nothing.

use std::collections::BTreeMap;

use git2::Repository;
use treesync_fs::{FilePath, PathFilter};
use uuid::Uuid;

use crate::checkpoint::{Checkpoint, Coordinator, MultiDiff};
use crate::config::GroupConfig;
use crate::graph::{ChangeGraphBuilder, Classification, plan_actions};
use crate::history::FileSet;
use crate::reference::{FileReference, FileReferenceComparer, versions_equal};
use crate::state::{SyncAction, SyncState};
use crate::Result;

/// Why a run did nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Fewer than two participants are configured.
    NotEnoughParticipants { count: usize },
    /// Some participants have not taken a snapshot yet.
    MissingSnapshots { participants: Vec<String> },
}

/// What a completed run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Id of the sync point appended by this run
    pub sync_point_id: u64,
    /// Checkpoint recorded by that sync point
    pub checkpoint_id: Option<String>,
    /// Whether pending actions and conflicts were discarded first
    pub reset: bool,
    pub paths_processed: usize,
    pub new_actions: Vec<Uuid>,
    pub cancelled_actions: Vec<Uuid>,
    pub new_conflicts: Vec<FilePath>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Skipped(SkipReason),
    Completed(SyncReport),
}

/// Drives reconciliation runs against one repository.
pub struct Synchronizer<'r> {
    repo: &'r Repository,
    comparer: &'r dyn FileReferenceComparer,
}

impl<'r> Synchronizer<'r> {
    pub fn new(repo: &'r Repository, comparer: &'r dyn FileReferenceComparer) -> Self {
        Self { repo, comparer }
    }

    /// Perform one reconciliation run.
    ///
    /// Nothing is written unless at least two participants are configured
    /// and each of them has a snapshot.
    ///
    /// # Errors
    ///
    /// Any storage error aborts the run. Since the run only touches the
    /// repository it was given, discarding that repository (rolling back
    /// the transaction) leaves no partial state behind.
    pub fn synchronize(&self) -> Result<SyncOutcome> {
        let config = GroupConfig::load(self.repo)?;
        let names = config.names();
        if names.len() < 2 {
            tracing::debug!(participants = names.len(), "Not enough participants, skipping run");
            return Ok(SyncOutcome::Skipped(SkipReason::NotEnoughParticipants {
                count: names.len(),
            }));
        }

        let coordinator = Coordinator::new(self.repo, self.comparer);
        let mut missing = Vec::new();
        for name in &names {
            if coordinator.snapshots().latest_snapshot(name)?.is_none() {
                missing.push(name.clone());
            }
        }
        if !missing.is_empty() {
            tracing::debug!(participants = ?missing, "Participants without snapshots, skipping run");
            return Ok(SyncOutcome::Skipped(SkipReason::MissingSnapshots {
                participants: missing,
            }));
        }

        let filters = config.filters()?;
        let expressions = config.filter_expressions();
        let mut state = SyncState::load(self.repo)?;
        let mut report = SyncReport::default();

        let Some(checkpoint) = coordinator.create_checkpoint(&names)? else {
            return Ok(SyncOutcome::Skipped(SkipReason::NotEnoughParticipants { count: 0 }));
        };

        let previous = state.latest_sync_point().cloned();
        let from_id = previous.as_ref().and_then(|p| p.checkpoint_id.clone());
        let mut diff = coordinator.get_changes(from_id.as_deref(), &checkpoint.id, &filters)?;

        let participant_added = from_id.is_some() && diff.has_added_participant();
        // Newcomers are covered by `participant_added`; departures never reset.
        let filters_changed = previous.is_some()
            && expressions
                .iter()
                .any(|(name, filter)| state.filters().get(name).is_some_and(|old| old != filter));
        if participant_added || filters_changed {
            tracing::info!(
                participant_added,
                filters_changed,
                "Participants or filters changed, resetting sync state"
            );
            state.append_sync_point(None);
            report.cancelled_actions.extend(queued_ids(&state));
            state.cancel_all_queued();
            state.clear_conflicts();
            diff = coordinator.get_changes(None, &checkpoint.id, &filters)?;
            report.reset = true;
        } else {
            self.cancel_departed(&names, &mut state, &mut report)?;
        }

        // A run that saw nothing new keeps the previous baseline.
        let recorded = match &from_id {
            Some(previous) if !report.reset && diff.is_empty() => previous.clone(),
            _ => checkpoint.id.clone(),
        };
        let sync_point_id = state.append_sync_point(Some(recorded.clone())).id;
        report.sync_point_id = sync_point_id;
        report.checkpoint_id = Some(recorded);

        let current = self.current_files(&coordinator, &checkpoint)?;
        let run = Run {
            comparer: self.comparer,
            diff: &diff,
            filters: &filters,
            current: &current,
            sync_point_id,
        };
        for path in diff.paths() {
            if state.conflict(path).is_some() {
                tracing::debug!(path = %path, "Path in conflict, skipping");
                continue;
            }
            run.process_path(path, &mut state, &mut report);
            report.paths_processed += 1;
        }

        state.set_filters(expressions);
        state.save(self.repo)?;

        tracing::info!(
            sync_point = report.sync_point_id,
            reset = report.reset,
            paths = report.paths_processed,
            actions = report.new_actions.len(),
            conflicts = report.new_conflicts.len(),
            "Synchronization run completed"
        );
        Ok(SyncOutcome::Completed(report))
    }

    /// Cancel queued actions addressed to participants that left the group.
    fn cancel_departed(
        &self,
        names: &[String],
        state: &mut SyncState,
        report: &mut SyncReport,
    ) -> Result<()> {
        let departed: Vec<Uuid> = state
            .actions()
            .iter()
            .filter(|a| a.is_queued() && !names.contains(&a.target))
            .map(|a| a.id)
            .collect();
        if !departed.is_empty() {
            tracing::info!(actions = departed.len(), "Cancelling actions of departed participants");
        }
        for id in departed {
            state.cancel_action(id)?;
            report.cancelled_actions.push(id);
        }
        Ok(())
    }

    fn current_files(
        &self,
        coordinator: &Coordinator<'_>,
        checkpoint: &Checkpoint,
    ) -> Result<BTreeMap<String, FileSet>> {
        let mut current = BTreeMap::new();
        for (name, snapshot_id) in &checkpoint.participants {
            let files = match snapshot_id {
                Some(id) => coordinator.snapshots().files(name, id)?,
                None => FileSet::new(),
            };
            current.insert(name.clone(), files);
        }
        Ok(current)
    }
}

fn queued_ids(state: &SyncState) -> Vec<Uuid> {
    state
        .actions()
        .iter()
        .filter(|a| a.is_queued())
        .map(|a| a.id)
        .collect()
}

/// Inputs shared by every path of one run.
struct Run<'a> {
    comparer: &'a dyn FileReferenceComparer,
    diff: &'a MultiDiff,
    filters: &'a BTreeMap<String, PathFilter>,
    current: &'a BTreeMap<String, FileSet>,
    sync_point_id: u64,
}

impl Run<'_> {
    fn process_path(&self, path: &FilePath, state: &mut SyncState, report: &mut SyncReport) {
        let current: BTreeMap<String, Option<FileReference>> = self
            .current
            .iter()
            .filter(|(name, _)| self.filters.get(*name).is_none_or(|f| f.include(path)))
            .map(|(name, files)| (name.clone(), files.get(path).cloned()))
            .collect();
        if current.is_empty() {
            return;
        }

        let empty = BTreeMap::new();
        let changes = self.diff.changes_for(path).unwrap_or(&empty);
        let mut graph = ChangeGraphBuilder::new(self.comparer).build(changes, &current);

        let pending: Vec<SyncAction> = state.queued_actions(path).into_iter().cloned().collect();
        let acyclic = graph.to_acyclic();
        let applicable = pending
            .iter()
            .all(|a| acyclic.contains(a.from.as_ref()) && acyclic.contains(a.to.as_ref()));
        if !applicable {
            tracing::info!(path = %path, "Pending actions no longer apply");
            self.conflict_with_pending(path, state, report);
            return;
        }

        // Participants that have not yet applied a queued action are on
        // their way to its target.
        for action in &pending {
            graph.add_edge(action.from.as_ref(), action.to.as_ref());
        }

        match graph.to_acyclic().classify() {
            Classification::Converged(target) => {
                let planned = plan_actions(self.comparer, target.as_ref(), &current);
                for action in &pending {
                    let still_planned = planned.iter().any(|p| {
                        p.participant == action.target
                            && versions_equal(self.comparer, p.from.as_ref(), action.from.as_ref())
                            && versions_equal(self.comparer, p.to.as_ref(), action.to.as_ref())
                    });
                    if !still_planned && state.cancel_action(action.id).is_ok() {
                        report.cancelled_actions.push(action.id);
                    }
                }
                for plan in planned {
                    let duplicate = pending.iter().any(|a| {
                        a.target == plan.participant
                            && versions_equal(self.comparer, a.from.as_ref(), plan.from.as_ref())
                            && versions_equal(self.comparer, a.to.as_ref(), plan.to.as_ref())
                    });
                    if duplicate {
                        continue;
                    }
                    let action = SyncAction::new(
                        plan.participant,
                        path.clone(),
                        plan.kind,
                        plan.from,
                        plan.to,
                        self.sync_point_id,
                    );
                    report.new_actions.push(state.add_action(action));
                }
            }
            Classification::Conflict(_) if !pending.is_empty() => {
                self.conflict_with_pending(path, state, report);
            }
            Classification::Conflict(_) => {
                state.add_conflict(path.clone(), self.diff.from_checkpoint.clone());
                report.new_conflicts.push(path.clone());
            }
        }
    }

    /// Cancel every pending action of `path` and raise a conflict anchored
    /// before the oldest of them.
    fn conflict_with_pending(&self, path: &FilePath, state: &mut SyncState, report: &mut SyncReport) {
        let cancelled = state.cancel_queued(path);
        let anchor = cancelled
            .iter()
            .map(|a| a.sync_point_id)
            .min()
            .and_then(|oldest| state.anchor_before(oldest));
        report.cancelled_actions.extend(cancelled.iter().map(|a| a.id));
        state.add_conflict(path.clone(), anchor);
        report.new_conflicts.push(path.clone());
    }
}
