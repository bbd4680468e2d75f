//! Status command implementation
//!
//! Shows a group's participants, queued actions and open conflicts, either
//! as colored text or as JSON for scripting.

use colored::Colorize;
use serde::Serialize;
use treesync_core::{GroupManager, SyncState};
use treesync_fs::LockMode;

use super::snapshot::short_id;
use crate::error::Result;

#[derive(Debug, Serialize)]
struct StatusReport {
    group: String,
    participants: Vec<ParticipantStatus>,
    last_sync_point: Option<u64>,
    pending_actions: Vec<ActionStatus>,
    conflicts: Vec<ConflictStatus>,
}

#[derive(Debug, Serialize)]
struct ParticipantStatus {
    name: String,
    filter: String,
    snapshots: usize,
    latest_snapshot: Option<String>,
}

#[derive(Debug, Serialize)]
struct ActionStatus {
    id: String,
    participant: String,
    kind: String,
    path: String,
    sync_point: u64,
}

#[derive(Debug, Serialize)]
struct ConflictStatus {
    path: String,
    anchor_checkpoint: Option<String>,
}

pub fn run_status(manager: &GroupManager, group: &str, json: bool) -> Result<()> {
    let session = manager.open(group, LockMode::Shared)?;

    let mut participants = Vec::new();
    for participant in session.participants()? {
        let history = session.history(&participant.name)?;
        participants.push(ParticipantStatus {
            snapshots: history.snapshots().len(),
            latest_snapshot: history.latest().map(|s| s.id.clone()),
            name: participant.name,
            filter: participant.filter,
        });
    }
    let state = session.state()?;
    session.close();

    let report = build_report(group, participants, &state);
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn build_report(group: &str, participants: Vec<ParticipantStatus>, state: &SyncState) -> StatusReport {
    StatusReport {
        group: group.to_string(),
        participants,
        last_sync_point: state.latest_sync_point().map(|p| p.id),
        pending_actions: state
            .actions()
            .iter()
            .filter(|a| a.is_queued())
            .map(|a| ActionStatus {
                id: a.id.to_string(),
                participant: a.target.clone(),
                kind: a.kind.to_string(),
                path: a.path.to_string(),
                sync_point: a.sync_point_id,
            })
            .collect(),
        conflicts: state
            .conflicts()
            .iter()
            .map(|c| ConflictStatus {
                path: c.path.to_string(),
                anchor_checkpoint: c.anchor_checkpoint_id.clone(),
            })
            .collect(),
    }
}

fn print_report(report: &StatusReport) {
    println!("{} {}", "Group:".bold(), report.group.cyan());
    match report.last_sync_point {
        Some(id) => println!("{} {}", "Last sync point:".bold(), id),
        None => println!("{} {}", "Last sync point:".bold(), "never synchronized".dimmed()),
    }

    println!();
    println!("{}", "Participants:".bold());
    if report.participants.is_empty() {
        println!("   {}", "(none)".dimmed());
    }
    for p in &report.participants {
        let latest = p
            .latest_snapshot
            .as_deref()
            .map(short_id)
            .unwrap_or("no snapshot");
        print!("   {} {} ({} snapshot(s), latest {})", "-".blue(), p.name.cyan(), p.snapshots, latest);
        if !p.filter.is_empty() {
            print!(" filter {}", p.filter.dimmed());
        }
        println!();
    }

    println!();
    println!("{} {}", "Pending actions:".bold(), report.pending_actions.len());
    for a in &report.pending_actions {
        println!("   {} {} {} -> {}", "+".green(), a.kind, a.path, a.participant.cyan());
    }

    println!();
    println!("{} {}", "Conflicts:".bold(), report.conflicts.len());
    for c in &report.conflicts {
        println!("   {} {}", "!".red(), c.path.red());
    }
}
