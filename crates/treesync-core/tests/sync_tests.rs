//! Reconciliation scenarios run against a real shared store

use git2::Repository;
use pretty_assertions::assert_eq;
use treesync_core::{
    DefaultComparer, Error, FileReference, GroupConfig, SkipReason, SnapshotStore, SyncAction,
    SyncActionKind, SyncActionState, SyncOutcome, SyncReport, SyncState, Synchronizer,
};
use treesync_fs::FilePath;
use treesync_git::Transaction;
use treesync_test_utils::{TestStore, timestamp, tree};

fn setup(participants: &[(&str, &str)]) -> (TestStore, Repository) {
    let store = TestStore::new();
    let repo = store.open();
    let mut config = GroupConfig::default();
    for (name, filter) in participants {
        config.add_participant(name, filter).unwrap();
    }
    config.save(&repo).unwrap();
    (store, repo)
}

fn snapshot(repo: &Repository, name: &str, files: &[(&str, i64, u64)]) {
    SnapshotStore::new(repo, &DefaultComparer)
        .create_snapshot(name, &tree(files))
        .unwrap();
}

fn run(repo: &Repository) -> SyncOutcome {
    Synchronizer::new(repo, &DefaultComparer).synchronize().unwrap()
}

fn sync(repo: &Repository) -> SyncReport {
    match run(repo) {
        SyncOutcome::Completed(report) => report,
        other => panic!("expected a completed run, got {other:?}"),
    }
}

fn path(p: &str) -> FilePath {
    FilePath::new(p).unwrap()
}

fn version(p: &str, secs: i64, size: u64) -> FileReference {
    FileReference::new(path(p), Some(timestamp(secs)), Some(size))
}

fn queued(state: &SyncState) -> Vec<&SyncAction> {
    state.actions().iter().filter(|a| a.is_queued()).collect()
}

#[test]
fn fewer_than_two_participants_skips_the_run() {
    let (store, repo) = setup(&[("left", "")]);
    snapshot(&repo, "left", &[("/a", 1, 1)]);

    assert_eq!(
        run(&repo),
        SyncOutcome::Skipped(SkipReason::NotEnoughParticipants { count: 1 })
    );
    assert_eq!(store.branch_tip("state"), None);
    assert_eq!(store.branch_tip("checkpoints"), None);
}

#[test]
fn participant_without_snapshot_skips_the_run() {
    let (store, repo) = setup(&[("left", ""), ("right", "")]);
    snapshot(&repo, "left", &[("/a", 1, 1)]);

    assert_eq!(
        run(&repo),
        SyncOutcome::Skipped(SkipReason::MissingSnapshots {
            participants: vec!["right".to_string()]
        })
    );
    assert_eq!(store.branch_tip("state"), None);
    assert_eq!(store.branch_tip("checkpoints"), None);
}

#[test]
fn disjoint_additions_become_two_add_actions() {
    let (_store, repo) = setup(&[("left", ""), ("right", "")]);
    snapshot(&repo, "left", &[("/file1", 1, 10)]);
    snapshot(&repo, "right", &[("/file2", 2, 20)]);

    let report = sync(&repo);
    assert_eq!(report.sync_point_id, 1);
    assert_eq!(report.new_actions.len(), 2);
    assert!(report.new_conflicts.is_empty());

    let state = SyncState::load(&repo).unwrap();
    assert_eq!(state.sync_points().len(), 1);
    assert!(state.conflicts().is_empty());

    let mut actions: Vec<(String, String, SyncActionKind)> = state
        .actions()
        .iter()
        .map(|a| (a.path.to_string(), a.target.clone(), a.kind))
        .collect();
    actions.sort();
    assert_eq!(
        actions,
        vec![
            ("/file1".to_string(), "right".to_string(), SyncActionKind::Add),
            ("/file2".to_string(), "left".to_string(), SyncActionKind::Add),
        ]
    );
    assert!(state.actions().iter().all(|a| a.sync_point_id == 1));
}

#[test]
fn divergent_edits_raise_one_conflict() {
    let (_store, repo) = setup(&[("left", ""), ("right", "")]);
    snapshot(&repo, "left", &[("/doc", 1, 10)]);
    snapshot(&repo, "right", &[("/doc", 1, 10)]);
    let first = sync(&repo);
    assert!(first.new_actions.is_empty());

    snapshot(&repo, "left", &[("/doc", 2, 11)]);
    snapshot(&repo, "right", &[("/doc", 3, 12)]);
    let second = sync(&repo);

    assert!(second.new_actions.is_empty());
    assert_eq!(second.new_conflicts, vec![path("/doc")]);

    let state = SyncState::load(&repo).unwrap();
    let conflict = state.conflict(&path("/doc")).unwrap();
    assert_eq!(conflict.anchor_checkpoint_id, first.checkpoint_id);
    assert!(state.actions().is_empty());
}

#[test]
fn reverted_edit_produces_no_actions() {
    let (_store, repo) = setup(&[("left", ""), ("right", "")]);
    snapshot(&repo, "left", &[("/a", 1, 10)]);
    snapshot(&repo, "right", &[("/a", 1, 10)]);
    sync(&repo);

    snapshot(&repo, "left", &[("/a", 2, 20)]);
    snapshot(&repo, "left", &[("/a", 1, 10)]);
    let report = sync(&repo);

    assert_eq!(report.paths_processed, 1);
    assert!(report.new_actions.is_empty());
    assert!(report.new_conflicts.is_empty());
}

#[test]
fn rerun_without_changes_is_idempotent() {
    let (_store, repo) = setup(&[("left", ""), ("right", "")]);
    snapshot(&repo, "left", &[("/file1", 1, 10)]);
    snapshot(&repo, "right", &[("/file2", 2, 20)]);
    let first = sync(&repo);

    let second = sync(&repo);
    assert_eq!(second.sync_point_id, 2);
    assert_eq!(second.checkpoint_id, first.checkpoint_id);
    assert!(second.new_actions.is_empty());
    assert!(second.new_conflicts.is_empty());

    let state = SyncState::load(&repo).unwrap();
    assert_eq!(state.sync_points().len(), 2);
    assert_eq!(state.actions().len(), 2);
    assert!(state.conflicts().is_empty());
}

#[test]
fn new_participant_resets_pending_work() {
    let (_store, repo) = setup(&[("left", ""), ("right", "")]);
    snapshot(&repo, "left", &[("/a", 1, 1), ("/c", 5, 1)]);
    snapshot(&repo, "right", &[("/b", 2, 1), ("/c", 6, 1)]);
    let first = sync(&repo);
    assert_eq!(first.new_actions.len(), 2);
    assert_eq!(first.new_conflicts, vec![path("/c")]);

    // Left adopts right's version, but the conflict stays open until a reset.
    snapshot(&repo, "left", &[("/a", 1, 1), ("/c", 6, 1)]);
    let mut config = GroupConfig::load(&repo).unwrap();
    config.add_participant("third", "").unwrap();
    config.save(&repo).unwrap();
    snapshot(&repo, "third", &[]);

    let second = sync(&repo);
    assert!(second.reset);
    assert_eq!(second.sync_point_id, 3);

    let state = SyncState::load(&repo).unwrap();
    assert!(state.sync_point(2).unwrap().is_reset());
    assert!(!state.sync_point(3).unwrap().is_reset());
    assert!(state.conflicts().is_empty());

    for id in &first.new_actions {
        assert_eq!(state.action(*id).unwrap().state, SyncActionState::Cancelled);
    }
    let pending = queued(&state);
    assert_eq!(pending.len(), 5);
    assert!(pending.iter().all(|a| a.sync_point_id == 3));
    assert_eq!(
        pending.iter().filter(|a| a.target == "third").count(),
        3
    );
}

#[test]
fn changed_filter_resets_and_widens_the_sync() {
    let (_store, repo) = setup(&[("left", ""), ("right", "!/private/*")]);
    snapshot(&repo, "left", &[("/private/key", 1, 1), ("/public", 2, 1)]);
    snapshot(&repo, "right", &[]);

    let first = sync(&repo);
    let state = SyncState::load(&repo).unwrap();
    assert_eq!(first.new_actions.len(), 1);
    assert_eq!(state.actions()[0].path, path("/public"));
    assert_eq!(state.filters()["right"], "!/private/*");

    let mut config = GroupConfig::load(&repo).unwrap();
    config.remove_participant("right").unwrap();
    config.add_participant("right", "").unwrap();
    config.save(&repo).unwrap();

    let second = sync(&repo);
    assert!(second.reset);
    let state = SyncState::load(&repo).unwrap();
    let mut targets: Vec<String> = queued(&state).iter().map(|a| a.path.to_string()).collect();
    targets.sort();
    assert_eq!(targets, vec!["/private/key".to_string(), "/public".to_string()]);
}

#[test]
fn departing_participant_keeps_pending_work_of_others() {
    let (_store, repo) = setup(&[("left", ""), ("right", ""), ("third", "")]);
    snapshot(&repo, "left", &[("/a", 1, 1)]);
    snapshot(&repo, "right", &[("/b", 2, 2)]);
    snapshot(&repo, "third", &[]);
    let first = sync(&repo);
    assert_eq!(first.new_actions.len(), 4);

    let mut config = GroupConfig::load(&repo).unwrap();
    config.remove_participant("third").unwrap();
    config.save(&repo).unwrap();

    let second = sync(&repo);
    assert!(!second.reset);
    assert_eq!(second.sync_point_id, 2);
    assert!(second.new_actions.is_empty());
    assert!(second.new_conflicts.is_empty());

    let state = SyncState::load(&repo).unwrap();
    assert!(state.sync_points().iter().all(|p| !p.is_reset()));
    assert_eq!(second.cancelled_actions.len(), 2);
    for id in &second.cancelled_actions {
        let action = state.action(*id).unwrap();
        assert_eq!(action.target, "third");
        assert_eq!(action.state, SyncActionState::Cancelled);
    }

    let mut pending: Vec<(String, String)> = queued(&state)
        .iter()
        .map(|a| (a.path.to_string(), a.target.clone()))
        .collect();
    pending.sort();
    assert_eq!(
        pending,
        vec![
            ("/a".to_string(), "right".to_string()),
            ("/b".to_string(), "left".to_string()),
        ]
    );
    assert!(!state.filters().contains_key("third"));
}

#[test]
fn conflicted_path_is_left_alone() {
    let (_store, repo) = setup(&[("left", ""), ("right", "")]);
    snapshot(&repo, "left", &[("/doc", 1, 10)]);
    snapshot(&repo, "right", &[("/doc", 2, 10)]);
    assert_eq!(sync(&repo).new_conflicts.len(), 1);

    snapshot(&repo, "left", &[("/doc", 3, 10)]);
    let report = sync(&repo);
    assert_eq!(report.paths_processed, 0);
    assert!(report.new_actions.is_empty());
    assert_eq!(SyncState::load(&repo).unwrap().conflicts().len(), 1);
}

#[test]
fn edit_against_a_queued_action_cancels_it_and_conflicts() {
    let (_store, repo) = setup(&[("left", ""), ("right", "")]);
    snapshot(&repo, "left", &[("/f", 1, 1)]);
    snapshot(&repo, "right", &[("/f", 1, 1)]);
    let first = sync(&repo);

    snapshot(&repo, "left", &[("/f", 2, 2)]);
    let second = sync(&repo);
    assert_eq!(second.new_actions.len(), 1);
    let pending = second.new_actions[0];

    // Right edits the file instead of applying the queued replacement.
    snapshot(&repo, "right", &[("/f", 3, 3)]);
    let third = sync(&repo);

    assert_eq!(third.cancelled_actions, vec![pending]);
    assert_eq!(third.new_conflicts, vec![path("/f")]);
    let state = SyncState::load(&repo).unwrap();
    assert_eq!(state.action(pending).unwrap().state, SyncActionState::Cancelled);
    assert_eq!(
        state.conflict(&path("/f")).unwrap().anchor_checkpoint_id,
        first.checkpoint_id
    );
}

#[test]
fn inapplicable_queued_action_is_cancelled_not_dropped() {
    let (_store, repo) = setup(&[("left", ""), ("right", "")]);
    snapshot(&repo, "left", &[("/f", 1, 1)]);
    snapshot(&repo, "right", &[("/f", 1, 1)]);
    sync(&repo);

    let mut state = SyncState::load(&repo).unwrap();
    let stale = state.add_action(SyncAction::new(
        "right",
        path("/f"),
        SyncActionKind::Replace,
        Some(version("/f", 7, 7)),
        Some(version("/f", 8, 8)),
        1,
    ));
    state.save(&repo).unwrap();

    snapshot(&repo, "left", &[("/f", 2, 2)]);
    let report = sync(&repo);

    assert_eq!(report.cancelled_actions, vec![stale]);
    assert!(report.new_actions.is_empty());
    let state = SyncState::load(&repo).unwrap();
    assert_eq!(state.action(stale).unwrap().state, SyncActionState::Cancelled);
    assert_eq!(state.conflict(&path("/f")).unwrap().anchor_checkpoint_id, None);
}

#[test]
fn further_edit_supersedes_queued_action() {
    let (_store, repo) = setup(&[("left", ""), ("right", "")]);
    snapshot(&repo, "left", &[("/f", 1, 1)]);
    snapshot(&repo, "right", &[("/f", 1, 1)]);
    sync(&repo);

    snapshot(&repo, "left", &[("/f", 2, 2)]);
    let old = sync(&repo).new_actions[0];

    snapshot(&repo, "left", &[("/f", 3, 3)]);
    let report = sync(&repo);
    assert_eq!(report.cancelled_actions, vec![old]);
    assert!(report.new_conflicts.is_empty());

    let state = SyncState::load(&repo).unwrap();
    let pending = queued(&state);
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].target, "right");
    assert_eq!(pending[0].from, Some(version("/f", 1, 1)));
    assert_eq!(pending[0].to, Some(version("/f", 3, 3)));
}

#[test]
fn unchanged_outcome_keeps_queued_action() {
    let (_store, repo) = setup(&[("left", ""), ("right", "")]);
    snapshot(&repo, "left", &[("/f", 1, 1)]);
    snapshot(&repo, "right", &[("/f", 1, 1)]);
    sync(&repo);

    snapshot(&repo, "left", &[("/f", 2, 2)]);
    let kept = sync(&repo).new_actions[0];

    // An edit that is reverted before the next run changes nothing.
    snapshot(&repo, "left", &[("/f", 4, 4)]);
    snapshot(&repo, "left", &[("/f", 2, 2)]);
    let report = sync(&repo);
    assert!(report.new_actions.is_empty());
    assert!(report.cancelled_actions.is_empty());

    let state = SyncState::load(&repo).unwrap();
    assert_eq!(queued(&state).len(), 1);
    assert_eq!(queued(&state)[0].id, kept);
}

#[test]
fn losing_a_commit_race_is_retryable() {
    let store = TestStore::new();
    {
        let repo = store.open();
        let mut config = GroupConfig::default();
        config.add_participant("left", "").unwrap();
        config.add_participant("right", "").unwrap();
        config.save(&repo).unwrap();
        snapshot(&repo, "left", &[("/a", 1, 1)]);
        snapshot(&repo, "right", &[("/b", 2, 2)]);
    }

    let mut winner = Transaction::new(store.url(), store.workspace("winner"));
    let mut loser = Transaction::new(store.url(), store.workspace("loser"));
    winner.begin().unwrap();
    loser.begin().unwrap();

    sync(winner.repository().unwrap());
    sync(loser.repository().unwrap());

    winner.commit().unwrap();
    let error = Error::from(loser.commit().unwrap_err());
    assert!(error.is_retryable(), "expected a retryable error, got {error}");

    // The losing run leaves nothing behind; a full retry succeeds.
    let state = SyncState::load(&store.open()).unwrap();
    assert_eq!(state.sync_points().len(), 1);

    let mut retry = Transaction::new(store.url(), store.workspace("retry"));
    retry.begin().unwrap();
    let report = sync(retry.repository().unwrap());
    assert_eq!(report.sync_point_id, 2);
    retry.commit().unwrap();
    assert_eq!(SyncState::load(&store.open()).unwrap().sync_points().len(), 2);
}
