//! Group registration commands

use std::path::Path;

use colored::Colorize;
use treesync_core::GroupManager;

use crate::error::Result;

/// Register a group, creating its shared store if the address is empty.
pub fn run_add_group(manager: &GroupManager, name: &str, address: &Path) -> Result<()> {
    let address = manager.add_group(name, address)?;
    println!(
        "{} Added group {} at {}",
        "OK".green().bold(),
        name.cyan(),
        address.display()
    );
    Ok(())
}

pub fn run_remove_group(manager: &GroupManager, name: &str) -> Result<()> {
    let entry = manager.remove_group(name)?;
    println!(
        "{} Removed group {} (store kept at {})",
        "OK".green().bold(),
        name.cyan(),
        entry.address.display()
    );
    Ok(())
}

pub fn run_groups(manager: &GroupManager) -> Result<()> {
    let groups = manager.groups()?;
    if groups.is_empty() {
        println!("No groups registered.");
        println!("Run {} to add one.", "treesync add-group <name> <address>".cyan());
        return Ok(());
    }
    for (name, entry) in groups {
        println!("{}  {}", name.cyan().bold(), entry.address.display());
    }
    Ok(())
}
