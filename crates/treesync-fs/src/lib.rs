//! Filesystem abstraction for treesync
//!
//! Provides validated tree paths, in-memory directory trees, directory
//! scanning, path filters, config files and advisory store locks.

pub mod config;
pub mod error;
pub mod filter;
pub mod io;
pub mod lock;
pub mod path;
pub mod scan;
pub mod tree;

pub use config::ConfigStore;
pub use error::{Error, Result};
pub use filter::PathFilter;
pub use lock::{LockMode, StoreLock};
pub use path::{FilePath, validate_name};
pub use scan::scan_directory;
pub use tree::{DirectoryTree, FileEntry, TreeNode};
