//! Groups and group sessions
//!
//! A group is a named shared store. [`GroupManager`] keeps the registry of
//! groups in `groups.toml` inside the treesync configuration directory and
//! opens [`GroupSession`]s on them.
//!
//! A session owns a transaction on the group's store plus an advisory lock:
//! exclusive sessions are writers and may publish their work with
//! [`GroupSession::commit`]; shared sessions are readers. Every operation on
//! the session works on the transaction's private copy, so nothing becomes
//! visible to others before the commit.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use treesync_fs::{ConfigStore, DirectoryTree, LockMode, StoreLock, validate_name};
use treesync_git::{CommitOutcome, Transaction};
use uuid::Uuid;

use crate::checkpoint::{Checkpoint, Coordinator};
use crate::config::{GroupConfig, ParticipantConfig};
use crate::history::{History, Snapshot, SnapshotStore};
use crate::reference::{DefaultComparer, FileReferenceComparer};
use crate::state::SyncState;
use crate::synchronizer::{SyncOutcome, Synchronizer};
use crate::{Error, Result};

/// Environment variable overriding the configuration directory.
pub const HOME_ENV: &str = "TREESYNC_HOME";

const GROUPS_FILE: &str = "groups.toml";
const WORKSPACES_DIR: &str = "workspaces";
const LOCK_FILE: &str = "treesync.lock";

/// A registered group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupEntry {
    /// Location of the shared store
    pub address: PathBuf,
}

/// Contents of `groups.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupsConfig {
    #[serde(default)]
    pub groups: BTreeMap<String, GroupEntry>,
}

/// Registry of groups and factory for sessions.
pub struct GroupManager {
    config_dir: PathBuf,
    store: ConfigStore,
    comparer: Arc<dyn FileReferenceComparer>,
}

impl GroupManager {
    /// Manage groups registered in `config_dir`.
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            store: ConfigStore::new(),
            comparer: Arc::new(DefaultComparer),
        }
    }

    /// Use `$TREESYNC_HOME`, or the platform configuration directory.
    pub fn from_env() -> Result<Self> {
        let config_dir = match std::env::var_os(HOME_ENV) {
            Some(home) => PathBuf::from(home),
            None => dirs::config_dir()
                .map(|d| d.join("treesync"))
                .ok_or_else(|| Error::NotFound("configuration directory".to_string()))?,
        };
        Ok(Self::new(config_dir))
    }

    /// Compare file versions with `comparer` in every session opened from now on.
    pub fn with_comparer(mut self, comparer: Arc<dyn FileReferenceComparer>) -> Self {
        self.comparer = comparer;
        self
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    fn groups_file(&self) -> PathBuf {
        self.config_dir.join(GROUPS_FILE)
    }

    fn load(&self) -> Result<GroupsConfig> {
        Ok(self.store.load_or_default(&self.groups_file())?)
    }

    fn save(&self, config: &GroupsConfig) -> Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        Ok(self.store.save(&self.groups_file(), config)?)
    }

    /// All registered groups by name.
    pub fn groups(&self) -> Result<BTreeMap<String, GroupEntry>> {
        Ok(self.load()?.groups)
    }

    /// Register a group, creating its shared store if `address` is empty.
    ///
    /// # Errors
    ///
    /// - [`Error::GroupExists`] if the name is taken
    /// - A storage error if `address` holds something other than a shared store
    pub fn add_group(&self, name: &str, address: &Path) -> Result<PathBuf> {
        validate_name(name)?;
        let mut config = self.load()?;
        if config.groups.contains_key(name) {
            return Err(Error::GroupExists {
                name: name.to_string(),
            });
        }

        let is_empty = !address.exists() || std::fs::read_dir(address)?.next().is_none();
        if is_empty {
            treesync_git::init_shared_store(address)?;
        } else {
            git2::Repository::open_bare(address)?;
        }
        let address = dunce::canonicalize(address)?;

        config.groups.insert(
            name.to_string(),
            GroupEntry {
                address: address.clone(),
            },
        );
        self.save(&config)?;
        tracing::info!(group = %name, address = %address.display(), "Added group");
        Ok(address)
    }

    /// Unregister a group. The shared store itself is left in place.
    pub fn remove_group(&self, name: &str) -> Result<GroupEntry> {
        let mut config = self.load()?;
        let entry = config.groups.remove(name).ok_or_else(|| Error::GroupNotFound {
            name: name.to_string(),
        })?;
        self.save(&config)?;
        tracing::info!(group = %name, "Removed group");
        Ok(entry)
    }

    pub fn group(&self, name: &str) -> Result<GroupEntry> {
        self.load()?
            .groups
            .remove(name)
            .ok_or_else(|| Error::GroupNotFound {
                name: name.to_string(),
            })
    }

    /// Open a session on a group.
    ///
    /// # Errors
    ///
    /// - [`Error::GroupNotFound`] for an unregistered group
    /// - [`treesync_fs::Error::LockFailed`] if the requested access conflicts
    ///   with another open session
    /// - A clone error if the shared store is unreachable
    pub fn open(&self, name: &str, mode: LockMode) -> Result<GroupSession> {
        let entry = self.group(name)?;
        let lock = StoreLock::try_acquire(&entry.address.join(LOCK_FILE), mode)?;

        let workspace = self
            .config_dir
            .join(WORKSPACES_DIR)
            .join(format!("{}-{}", name, Uuid::new_v4()));
        let mut transaction = Transaction::new(entry.address.to_string_lossy(), workspace);
        transaction.begin()?;

        tracing::debug!(group = %name, ?mode, "Opened group session");
        Ok(GroupSession {
            name: name.to_string(),
            address: entry.address,
            mode,
            comparer: Arc::clone(&self.comparer),
            transaction,
            _lock: lock,
        })
    }
}

/// An open group: a transaction on its store under an advisory lock.
///
/// Dropping the session without [`commit`](Self::commit) discards all
/// changes, as does [`close`](Self::close).
pub struct GroupSession {
    name: String,
    address: PathBuf,
    mode: LockMode,
    comparer: Arc<dyn FileReferenceComparer>,
    transaction: Transaction,
    _lock: StoreLock,
}

impl GroupSession {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &Path {
        &self.address
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    fn repo(&self) -> Result<&git2::Repository> {
        Ok(self.transaction.repository()?)
    }

    fn ensure_writable(&self) -> Result<()> {
        match self.mode {
            LockMode::Exclusive => Ok(()),
            LockMode::Shared => Err(Error::ReadOnly {
                name: self.name.clone(),
            }),
        }
    }

    pub fn participants(&self) -> Result<Vec<ParticipantConfig>> {
        Ok(GroupConfig::load(self.repo()?)?.participants().to_vec())
    }

    pub fn add_participant(&mut self, name: &str, filter: &str) -> Result<()> {
        self.ensure_writable()?;
        let repo = self.repo()?;
        let mut config = GroupConfig::load(repo)?;
        config.add_participant(name, filter)?;
        config.save(repo)?;
        tracing::info!(group = %self.name, participant = %name, "Added participant");
        Ok(())
    }

    /// Remove a participant from the configuration. Its history is kept.
    pub fn remove_participant(&mut self, name: &str) -> Result<()> {
        self.ensure_writable()?;
        let repo = self.repo()?;
        let mut config = GroupConfig::load(repo)?;
        config.remove_participant(name)?;
        config.save(repo)?;
        tracing::info!(group = %self.name, participant = %name, "Removed participant");
        Ok(())
    }

    /// Record `tree` as the participant's current state.
    pub fn create_snapshot(&mut self, participant: &str, tree: &DirectoryTree) -> Result<Snapshot> {
        self.ensure_writable()?;
        let repo = self.repo()?;
        if GroupConfig::load(repo)?.participant(participant).is_none() {
            return Err(Error::ParticipantNotFound {
                name: participant.to_string(),
            });
        }
        SnapshotStore::new(repo, self.comparer.as_ref()).create_snapshot(participant, tree)
    }

    pub fn history(&self, participant: &str) -> Result<History> {
        SnapshotStore::new(self.repo()?, self.comparer.as_ref()).history(participant)
    }

    pub fn checkpoints(&self) -> Result<Vec<Checkpoint>> {
        Coordinator::new(self.repo()?, self.comparer.as_ref()).checkpoints()
    }

    /// Run one reconciliation.
    pub fn synchronize(&mut self) -> Result<SyncOutcome> {
        self.ensure_writable()?;
        Synchronizer::new(self.repo()?, self.comparer.as_ref()).synchronize()
    }

    pub fn state(&self) -> Result<SyncState> {
        SyncState::load(self.repo()?)
    }

    /// Store an updated sync state, e.g. after completing actions.
    pub fn save_state(&mut self, state: &SyncState) -> Result<()> {
        self.ensure_writable()?;
        state.save(self.repo()?)?;
        Ok(())
    }

    /// Publish every change made in this session.
    ///
    /// # Errors
    ///
    /// - [`Error::ReadOnly`] for shared sessions
    /// - A transaction failure if the store changed concurrently; see
    ///   [`Error::is_retryable`]
    pub fn commit(mut self) -> Result<CommitOutcome> {
        self.ensure_writable()?;
        let outcome = self.transaction.commit()?;
        tracing::debug!(group = %self.name, ?outcome, "Closed group session");
        Ok(outcome)
    }

    /// Discard every change made in this session and release the group.
    pub fn close(mut self) {
        self.transaction.rollback();
        tracing::debug!(group = %self.name, "Closed group session");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn groups_are_registered_once() {
        let home = TempDir::new().unwrap();
        let stores = TempDir::new().unwrap();
        let manager = GroupManager::new(home.path());

        manager.add_group("photos", &stores.path().join("photos")).unwrap();
        assert!(matches!(
            manager.add_group("photos", &stores.path().join("other")),
            Err(Error::GroupExists { .. })
        ));
        assert_eq!(manager.groups().unwrap().len(), 1);

        manager.remove_group("photos").unwrap();
        assert!(manager.groups().unwrap().is_empty());
        assert!(matches!(
            manager.remove_group("photos"),
            Err(Error::GroupNotFound { .. })
        ));
    }

    #[test]
    fn shared_sessions_are_read_only() {
        let home = TempDir::new().unwrap();
        let stores = TempDir::new().unwrap();
        let manager = GroupManager::new(home.path());
        manager.add_group("docs", &stores.path().join("docs")).unwrap();

        let mut session = manager.open("docs", LockMode::Shared).unwrap();
        assert!(matches!(
            session.add_participant("left", ""),
            Err(Error::ReadOnly { .. })
        ));
        assert!(session.participants().unwrap().is_empty());
        assert!(matches!(session.commit(), Err(Error::ReadOnly { .. })));
    }

    #[test]
    fn exclusive_session_excludes_others() {
        let home = TempDir::new().unwrap();
        let stores = TempDir::new().unwrap();
        let manager = GroupManager::new(home.path());
        manager.add_group("docs", &stores.path().join("docs")).unwrap();

        let writer = manager.open("docs", LockMode::Exclusive).unwrap();
        assert!(manager.open("docs", LockMode::Shared).is_err());
        writer.close();
        assert!(manager.open("docs", LockMode::Shared).is_ok());
    }

    #[test]
    fn changes_are_visible_only_after_commit() {
        let home = TempDir::new().unwrap();
        let stores = TempDir::new().unwrap();
        let manager = GroupManager::new(home.path());
        manager.add_group("docs", &stores.path().join("docs")).unwrap();

        let mut session = manager.open("docs", LockMode::Exclusive).unwrap();
        session.add_participant("left", "").unwrap();
        session.close();
        let reader = manager.open("docs", LockMode::Shared).unwrap();
        assert!(reader.participants().unwrap().is_empty());
        reader.close();

        let mut session = manager.open("docs", LockMode::Exclusive).unwrap();
        session.add_participant("left", "").unwrap();
        assert!(matches!(session.commit().unwrap(), CommitOutcome::Committed { .. }));

        let reader = manager.open("docs", LockMode::Shared).unwrap();
        assert_eq!(reader.participants().unwrap()[0].name, "left");
    }
}
