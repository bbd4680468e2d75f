//! Reconciliation engine for treesync
//!
//! This crate keeps several independently evolving directory replicas
//! ("participants") in step:
//!
//! - **Snapshots**: every participant has an append-only history of
//!   immutable tree snapshots ([`SnapshotStore`])
//! - **Checkpoints**: dated records of every participant's latest snapshot,
//!   and per-path diffs between them ([`Coordinator`])
//! - **Change graphs**: per-file version graphs that tell converging edits
//!   from conflicting ones ([`ChangeGraphBuilder`])
//! - **Synchronization**: runs that turn classifications into queued
//!   actions and conflicts ([`Synchronizer`], [`SyncState`])
//! - **Groups**: named shared stores and the sessions that read and write
//!   them ([`GroupManager`], [`GroupSession`])
//!
//! # Architecture
//!
//! ```text
//!                  treesync-cli
//!                       |
//!                 treesync-core
//!                       |
//!           +-----------+-----------+
//!           |                       |
//!      treesync-fs            treesync-git
//! ```
//!
//! All state lives in a shared git store and is modified through
//! transactions; see [`treesync_git::Transaction`].

pub mod change;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod graph;
pub mod group;
pub mod history;
pub mod layout;
pub mod reference;
pub mod state;
pub mod synchronizer;

pub use change::{Change, ChangeKind};
pub use checkpoint::{Checkpoint, Coordinator, MultiDiff, ParticipantChange};
pub use config::{GroupConfig, ParticipantConfig};
pub use error::{Error, Result};
pub use graph::{AcyclicGraph, ChangeGraph, ChangeGraphBuilder, Classification, PlannedAction};
pub use group::{GroupEntry, GroupManager, GroupSession, GroupsConfig};
pub use history::{FileSet, History, Snapshot, SnapshotStore};
pub use layout::StoreBranch;
pub use reference::{DefaultComparer, FileReference, FileReferenceComparer};
pub use state::{ConflictInfo, SyncAction, SyncActionKind, SyncActionState, SyncPoint, SyncState};
pub use synchronizer::{SkipReason, SyncOutcome, SyncReport, Synchronizer};
