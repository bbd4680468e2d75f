//! Participant configuration commands

use colored::Colorize;
use treesync_core::GroupManager;
use treesync_fs::LockMode;

use crate::error::Result;

pub fn run_add_participant(manager: &GroupManager, group: &str, name: &str, filter: &str) -> Result<()> {
    let mut session = manager.open(group, LockMode::Exclusive)?;
    session.add_participant(name, filter)?;
    session.commit()?;

    if filter.is_empty() {
        println!("{} Added participant {} to {}", "OK".green().bold(), name.cyan(), group);
    } else {
        println!(
            "{} Added participant {} to {} (filter: {})",
            "OK".green().bold(),
            name.cyan(),
            group,
            filter.dimmed()
        );
    }
    Ok(())
}

pub fn run_remove_participant(manager: &GroupManager, group: &str, name: &str) -> Result<()> {
    let mut session = manager.open(group, LockMode::Exclusive)?;
    session.remove_participant(name)?;
    session.commit()?;
    println!("{} Removed participant {} from {}", "OK".green().bold(), name.cyan(), group);
    Ok(())
}
