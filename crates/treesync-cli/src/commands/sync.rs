//! Sync command implementation
//!
//! Opens the group exclusively, runs one reconciliation and commits it.

use colored::Colorize;
use treesync_core::{GroupManager, SkipReason, SyncOutcome};
use treesync_fs::LockMode;
use treesync_git::CommitOutcome;

use crate::error::Result;

pub fn run_sync(manager: &GroupManager, group: &str) -> Result<()> {
    println!("{} Synchronizing {}...", "=>".blue().bold(), group.cyan());

    let mut session = manager.open(group, LockMode::Exclusive)?;
    let outcome = session.synchronize()?;

    let report = match outcome {
        SyncOutcome::Skipped(reason) => {
            session.close();
            match reason {
                SkipReason::NotEnoughParticipants { count } => println!(
                    "{} Nothing to do: {} participant(s) configured, at least 2 needed.",
                    "SKIPPED".yellow().bold(),
                    count
                ),
                SkipReason::MissingSnapshots { participants } => println!(
                    "{} Nothing to do: no snapshot yet for {}.",
                    "SKIPPED".yellow().bold(),
                    participants.join(", ")
                ),
            }
            return Ok(());
        }
        SyncOutcome::Completed(report) => report,
    };

    if let CommitOutcome::NoOp = session.commit()? {
        tracing::debug!(group = %group, "Sync run produced no changes to publish");
    }

    if report.reset {
        println!(
            "{} Participants or filters changed: pending actions and conflicts were reset.",
            "RESET".yellow().bold()
        );
    }
    println!(
        "{} Sync point {}: {} path(s) examined, {} new action(s), {} cancelled, {} new conflict(s).",
        "OK".green().bold(),
        report.sync_point_id,
        report.paths_processed,
        report.new_actions.len(),
        report.cancelled_actions.len(),
        report.new_conflicts.len()
    );
    for path in &report.new_conflicts {
        println!("   {} {}", "!".red(), path.to_string().red());
    }
    Ok(())
}
