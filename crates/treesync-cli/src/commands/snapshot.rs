//! Snapshot command

use std::path::Path;

use colored::Colorize;
use treesync_core::GroupManager;
use treesync_fs::{LockMode, scan_directory};

use crate::error::{CliError, Result};

/// Scan `dir` and record it as the participant's newest snapshot.
pub fn run_snapshot(manager: &GroupManager, group: &str, participant: &str, dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        return Err(CliError::user(format!("{} is not a directory", dir.display())));
    }
    let tree = scan_directory(dir)?;

    let mut session = manager.open(group, LockMode::Exclusive)?;
    let before = session.history(participant)?.latest().map(|s| s.id.clone());
    let snapshot = session.create_snapshot(participant, &tree)?;
    session.commit()?;

    if before.as_deref() == Some(snapshot.id.as_str()) {
        println!(
            "{} {} unchanged (snapshot {})",
            "OK".green().bold(),
            participant.cyan(),
            short_id(&snapshot.id).dimmed()
        );
    } else {
        println!(
            "{} Recorded snapshot {} of {} ({} files)",
            "OK".green().bold(),
            short_id(&snapshot.id).yellow(),
            participant.cyan(),
            tree.file_count()
        );
    }
    Ok(())
}

pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
