//! Command implementations for treesync-cli

pub mod group;
pub mod participant;
pub mod snapshot;
pub mod status;
pub mod sync;

pub use group::{run_add_group, run_groups, run_remove_group};
pub use participant::{run_add_participant, run_remove_participant};
pub use snapshot::run_snapshot;
pub use status::run_status;
pub use sync::run_sync;
