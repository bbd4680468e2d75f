//! Shared test utilities for the treesync workspace.
//!
//! This crate provides standardised test fixtures to eliminate duplication
//! across crate test suites. It is a dev-dependency only, never published.
//!
//! # Modules
//!
//! - [`tree`]: in-memory directory trees and on-disk participant directories
//! - [`store`]: [`TestStore`](store::TestStore), a temporary shared store

pub mod store;
pub mod tree;

pub use store::TestStore;
pub use tree::{TreeBuilder, timestamp, tree, write_file};
