//! Replica scenarios across crates
//!
//! Real directories are scanned into snapshots, reconciled through group
//! sessions, and the queued actions are carried out on disk the way a
//! client of the engine would.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use treesync_core::{
    Error, GroupManager, GroupSession, SyncAction, SyncActionKind, SyncOutcome, SyncReport,
};
use treesync_fs::{LockMode, scan_directory};
use treesync_test_utils::write_file;

// =============================================================================
// Test Infrastructure
// =============================================================================

/// A machine: its own configuration directory and replicas, sharing one store.
struct Machine {
    _home: TempDir,
    manager: GroupManager,
}

impl Machine {
    fn new(store: &Path) -> Self {
        let home = TempDir::new().unwrap();
        let manager = GroupManager::new(home.path());
        manager.add_group("docs", store).unwrap();
        Self {
            _home: home,
            manager,
        }
    }

    fn writer(&self) -> GroupSession {
        self.manager.open("docs", LockMode::Exclusive).unwrap()
    }

    fn reader(&self) -> GroupSession {
        self.manager.open("docs", LockMode::Shared).unwrap()
    }
}

struct World {
    root: TempDir,
}

impl World {
    fn new() -> Self {
        Self {
            root: TempDir::new().unwrap(),
        }
    }

    fn store(&self) -> PathBuf {
        self.root.path().join("docs.git")
    }

    fn replica(&self, name: &str) -> PathBuf {
        self.root.path().join("replicas").join(name)
    }

    fn snapshot(&self, session: &mut GroupSession, name: &str) {
        fs::create_dir_all(self.replica(name)).unwrap();
        let tree = scan_directory(&self.replica(name)).unwrap();
        session.create_snapshot(name, &tree).unwrap();
    }

    /// Carry out `action` on its target replica, copying from `source`.
    fn apply(&self, action: &SyncAction, source: &str) {
        let relative = action.path.relative();
        let target = self.replica(&action.target).join(relative);
        match action.kind {
            SyncActionKind::Remove => fs::remove_file(&target).unwrap(),
            SyncActionKind::Add | SyncActionKind::Replace => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).unwrap();
                }
                fs::copy(self.replica(source).join(relative), &target).unwrap();
                let modified_at = action
                    .to
                    .as_ref()
                    .and_then(|r| r.modified_at)
                    .expect("copied file has a modification time");
                fs::File::options()
                    .write(true)
                    .open(&target)
                    .unwrap()
                    .set_modified(SystemTime::from(modified_at))
                    .unwrap();
            }
        }
    }
}

fn completed(outcome: SyncOutcome) -> SyncReport {
    match outcome {
        SyncOutcome::Completed(report) => report,
        other => panic!("expected a completed run, got {other:?}"),
    }
}

fn other(name: &str) -> &'static str {
    if name == "left" { "right" } else { "left" }
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn applied_actions_converge_the_replicas() {
    let world = World::new();
    let machine = Machine::new(&world.store());
    write_file(&world.replica("left"), "report.txt", "quarterly");
    write_file(&world.replica("left"), "notes/a.md", "a");
    write_file(&world.replica("right"), "photos/cat.jpg", "meow");

    let mut session = machine.writer();
    session.add_participant("left", "").unwrap();
    session.add_participant("right", "").unwrap();
    world.snapshot(&mut session, "left");
    world.snapshot(&mut session, "right");
    let report = completed(session.synchronize().unwrap());
    assert_eq!(report.new_actions.len(), 3);
    session.commit().unwrap();

    // Carry out every queued action and record that it was done.
    let mut session = machine.writer();
    let mut state = session.state().unwrap();
    let queued: Vec<SyncAction> = state.actions().iter().filter(|a| a.is_queued()).cloned().collect();
    for action in &queued {
        world.apply(action, other(&action.target));
        state.complete_action(action.id).unwrap();
    }
    session.save_state(&state).unwrap();
    world.snapshot(&mut session, "left");
    world.snapshot(&mut session, "right");
    let report = completed(session.synchronize().unwrap());
    session.commit().unwrap();

    assert!(report.new_actions.is_empty(), "unexpected actions: {:?}", report.new_actions);
    assert!(report.new_conflicts.is_empty());

    let left = scan_directory(&world.replica("left")).unwrap();
    let right = scan_directory(&world.replica("right")).unwrap();
    assert_eq!(left.files().len(), 3);
    assert_eq!(left, right);
}

#[test]
fn second_machine_sees_committed_work() {
    let world = World::new();
    let first = Machine::new(&world.store());
    let second = Machine::new(&world.store());

    let mut session = first.writer();
    session.add_participant("left", "").unwrap();
    session.commit().unwrap();

    let reader = second.reader();
    let names: Vec<String> = reader.participants().unwrap().into_iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["left".to_string()]);
}

#[test]
fn one_writer_at_a_time() {
    let world = World::new();
    let first = Machine::new(&world.store());
    let second = Machine::new(&world.store());

    let writer = first.writer();
    assert!(matches!(
        second.manager.open("docs", LockMode::Exclusive),
        Err(Error::Fs(treesync_fs::Error::LockFailed { .. }))
    ));
    assert!(second.manager.open("docs", LockMode::Shared).is_err());
    writer.close();

    let reader_one = first.reader();
    let reader_two = second.reader();
    assert!(second.manager.open("docs", LockMode::Exclusive).is_err());
    reader_one.close();
    reader_two.close();
}

#[test]
fn resolved_conflict_is_processed_again() {
    let world = World::new();
    let machine = Machine::new(&world.store());
    write_file(&world.replica("left"), "plan.txt", "left version");
    write_file(&world.replica("right"), "plan.txt", "the right version");

    let mut session = machine.writer();
    session.add_participant("left", "").unwrap();
    session.add_participant("right", "").unwrap();
    world.snapshot(&mut session, "left");
    world.snapshot(&mut session, "right");
    let report = completed(session.synchronize().unwrap());
    assert_eq!(report.new_conflicts.len(), 1);
    session.commit().unwrap();

    // Someone settles on the left version by hand.
    let left_file = world.replica("left").join("plan.txt");
    let right_file = world.replica("right").join("plan.txt");
    fs::copy(&left_file, &right_file).unwrap();
    let modified = fs::metadata(&left_file).unwrap().modified().unwrap();
    fs::File::options()
        .write(true)
        .open(&right_file)
        .unwrap()
        .set_modified(modified)
        .unwrap();

    let mut session = machine.writer();
    let mut state = session.state().unwrap();
    state.resolve_conflict(&report.new_conflicts[0]).unwrap();
    session.save_state(&state).unwrap();
    world.snapshot(&mut session, "right");
    let report = completed(session.synchronize().unwrap());
    session.commit().unwrap();

    assert_eq!(report.paths_processed, 1);
    assert!(report.new_actions.is_empty());
    assert!(report.new_conflicts.is_empty());
    assert!(machine.reader().state().unwrap().conflicts().is_empty());
}
