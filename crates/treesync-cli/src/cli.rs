//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// treesync - Keep several directory replicas in step
#[derive(Parser, Debug)]
#[command(name = "treesync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration directory holding groups.toml
    #[arg(long, global = true, env = "TREESYNC_HOME")]
    pub home: Option<PathBuf>,

    /// The command to run
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Register a group, creating its shared store if needed
    AddGroup {
        /// Group name
        name: String,

        /// Location of the shared store
        address: PathBuf,
    },

    /// Unregister a group (the shared store is kept)
    RemoveGroup {
        /// Group name
        name: String,
    },

    /// List registered groups
    Groups,

    /// Add a participant to a group
    ///
    /// Examples:
    ///   treesync add-participant photos laptop
    ///   treesync add-participant photos nas --filter '/raw/*;!*.tmp'
    AddParticipant {
        /// Group name
        group: String,

        /// Participant name
        name: String,

        /// Filter expression: ';'-separated globs, '!' excludes
        #[arg(short, long, default_value = "")]
        filter: String,
    },

    /// Remove a participant from a group (its history is kept)
    RemoveParticipant {
        /// Group name
        group: String,

        /// Participant name
        name: String,
    },

    /// Record the current state of a participant's directory
    Snapshot {
        /// Group name
        group: String,

        /// Participant name
        participant: String,

        /// Directory to scan
        dir: PathBuf,
    },

    /// Reconcile all participants of a group
    Sync {
        /// Group name
        group: String,
    },

    /// Show participants, pending actions and conflicts
    Status {
        /// Group name
        group: String,

        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },
}
