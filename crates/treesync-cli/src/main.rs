//! treesync CLI
//!
//! The command-line interface for registering groups, recording snapshots
//! and reconciling participants.

mod cli;
mod commands;
mod error;

use clap::Parser;
use colored::Colorize;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use treesync_core::GroupManager;

use cli::{Cli, Commands};
use error::Result;

fn main() {
    if let Err(e) = run() {
        eprintln!("{}: {}", "error".red().bold(), e);
        if let Some(hint) = e.hint() {
            eprintln!("{}: {}", "hint".yellow().bold(), hint);
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // Setup tracing if verbose
    if cli.verbose {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(Level::DEBUG)
            .with_target(true)
            .with_writer(std::io::stderr)
            .finish();
        if tracing::subscriber::set_global_default(subscriber).is_ok() {
            tracing::debug!("Verbose mode enabled");
        }
    }

    let manager = match cli.home {
        Some(home) => GroupManager::new(home),
        None => GroupManager::from_env()?,
    };

    match cli.command {
        Some(cmd) => execute_command(&manager, cmd),
        None => {
            println!("{} directory reconciliation", "treesync".green().bold());
            println!();
            println!("Run {} for available commands.", "treesync --help".cyan());
            Ok(())
        }
    }
}

fn execute_command(manager: &GroupManager, cmd: Commands) -> Result<()> {
    match cmd {
        Commands::AddGroup { name, address } => commands::run_add_group(manager, &name, &address),
        Commands::RemoveGroup { name } => commands::run_remove_group(manager, &name),
        Commands::Groups => commands::run_groups(manager),
        Commands::AddParticipant {
            group,
            name,
            filter,
        } => commands::run_add_participant(manager, &group, &name, &filter),
        Commands::RemoveParticipant { group, name } => {
            commands::run_remove_participant(manager, &group, &name)
        }
        Commands::Snapshot {
            group,
            participant,
            dir,
        } => commands::run_snapshot(manager, &group, &participant, &dir),
        Commands::Sync { group } => commands::run_sync(manager, &group),
        Commands::Status { group, json } => commands::run_status(manager, &group, json),
    }
}
