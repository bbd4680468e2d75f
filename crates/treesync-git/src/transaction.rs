//! Optimistic, all-or-nothing transactions against a shared store
//!
//! A [`Transaction`] works on a private bare clone of the shared store.
//! Changes are made locally by committing to branches of the clone; on
//! [`Transaction::commit`] every branch that advanced locally is pushed in a
//! single batch, unless any of them also advanced in the shared store since
//! [`Transaction::begin`]. Races are detected, never locked: the losing side
//! gets [`Error::TransactionFailed`] and must redo its whole operation.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use git2::{Oid, PushOptions, RemoteCallbacks, Repository};

use crate::objects::branch_ref;
use crate::{Error, Result};

const REMOTE_NAME: &str = "origin";
const FETCH_REFSPEC: &str = "+refs/heads/*:refs/remotes/origin/*";
const REMOTE_PREFIX: &str = "refs/remotes/origin/";

/// Lifecycle of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Created,
    Active,
    Completed,
    Failed,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Result of a successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The listed branches were pushed to the shared store.
    Committed { branches: Vec<String> },
    /// Nothing changed locally; the shared store was left untouched.
    NoOp,
}

/// An optimistic transaction on a shared git store.
pub struct Transaction {
    remote_url: String,
    workspace: PathBuf,
    state: TransactionState,
    repo: Option<Repository>,
    /// Branch tips of the shared store as seen by `begin()`.
    base: BTreeMap<String, Oid>,
}

impl Transaction {
    /// Prepare a transaction against the shared store at `remote_url`, using
    /// `workspace` as the private working copy.
    pub fn new(remote_url: impl Into<String>, workspace: impl Into<PathBuf>) -> Self {
        Self {
            remote_url: remote_url.into(),
            workspace: workspace.into(),
            state: TransactionState::Created,
            repo: None,
            base: BTreeMap::new(),
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Clone the shared store into the workspace and start tracking changes.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] if the transaction was already started
    /// - [`Error::WorkspaceNotEmpty`] if the workspace holds unrelated content
    /// - [`Error::Clone`] if the shared store is unreachable or invalid
    pub fn begin(&mut self) -> Result<()> {
        self.expect_state(TransactionState::Created)?;

        if workspace_has_content(&self.workspace)? {
            return Err(Error::WorkspaceNotEmpty {
                path: self.workspace.clone(),
            });
        }

        match self.clone_shared_store() {
            Ok((repo, base)) => {
                tracing::debug!(
                    url = %self.remote_url,
                    workspace = %self.workspace.display(),
                    branches = base.len(),
                    "Transaction started"
                );
                self.repo = Some(repo);
                self.base = base;
                self.state = TransactionState::Active;
                Ok(())
            }
            Err(e) => {
                self.discard_workspace();
                Err(Error::Clone {
                    url: self.remote_url.clone(),
                    message: e.to_string(),
                })
            }
        }
    }

    fn clone_shared_store(&self) -> Result<(Repository, BTreeMap<String, Oid>)> {
        fs::create_dir_all(&self.workspace).map_err(|e| Error::io(&self.workspace, e))?;
        let repo = Repository::init_bare(&self.workspace)?;

        let base = {
            let mut remote = repo.remote(REMOTE_NAME, &self.remote_url)?;
            remote.fetch(&[FETCH_REFSPEC], None, None)?;
            remote_branches(&repo)?
        };

        // A local line of development for every shared revision line.
        for (name, oid) in &base {
            repo.reference(&branch_ref(name), *oid, true, "transaction: begin")?;
        }

        Ok((repo, base))
    }

    /// The private working copy. Only available while the transaction is active.
    pub fn repository(&self) -> Result<&Repository> {
        self.expect_state(TransactionState::Active)?;
        self.repo.as_ref().ok_or_else(|| Error::InvalidState {
            expected: TransactionState::Active.to_string(),
            actual: self.state.to_string(),
        })
    }

    /// Publish every locally advanced branch to the shared store.
    ///
    /// Branches left untouched by the transaction never block the commit,
    /// even if they moved in the shared store meanwhile.
    ///
    /// All branches go out in one push, but libgit2 has no atomic push: a
    /// writer that slips in between the divergence check and the push can
    /// get some refs rejected while others are applied. Callers close that
    /// window by holding the store's exclusive lock around the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransactionFailed`] if any touched branch also moved
    /// in the shared store since `begin()` (and the local branch does not
    /// build on top of that move). The workspace is discarded either way.
    pub fn commit(&mut self) -> Result<CommitOutcome> {
        self.expect_state(TransactionState::Active)?;

        let result = self.push_changes();
        self.state = match result {
            Ok(_) => TransactionState::Completed,
            Err(_) => TransactionState::Failed,
        };
        self.repo = None;
        self.discard_workspace();

        match &result {
            Ok(CommitOutcome::Committed { branches }) => {
                tracing::info!(branches = ?branches, "Transaction committed");
            }
            Ok(CommitOutcome::NoOp) => tracing::debug!("Transaction committed without changes"),
            Err(e) => tracing::warn!(error = %e, "Transaction failed"),
        }
        result
    }

    fn push_changes(&self) -> Result<CommitOutcome> {
        let repo = self.repository()?;
        let mut remote = repo.find_remote(REMOTE_NAME)?;
        remote.fetch(&[FETCH_REFSPEC], None, None)?;
        let shared = remote_branches(repo)?;

        let mut updated = Vec::new();
        let mut diverged = Vec::new();
        for (name, local) in local_branches(repo)? {
            let base = self.base.get(&name).copied();
            if base == Some(local) {
                continue;
            }

            let current = shared.get(&name).copied();
            if current != base {
                let builds_on_shared = match current {
                    Some(current) => current == local || repo.graph_descendant_of(local, current)?,
                    None => false,
                };
                if !builds_on_shared {
                    diverged.push(name);
                    continue;
                }
            }
            updated.push(name);
        }

        if !diverged.is_empty() {
            return Err(Error::TransactionFailed { branches: diverged });
        }
        if updated.is_empty() {
            return Ok(CommitOutcome::NoOp);
        }

        let refspecs: Vec<String> = updated
            .iter()
            .map(|name| format!("{0}:{0}", branch_ref(name)))
            .collect();

        let mut rejected = Vec::new();
        {
            let mut callbacks = RemoteCallbacks::new();
            callbacks.push_update_reference(|refname, status| {
                if let Some(message) = status {
                    rejected.push(format!("{} ({})", refname, message));
                }
                Ok(())
            });
            let mut options = PushOptions::new();
            options.remote_callbacks(callbacks);
            remote.push(&refspecs, Some(&mut options))?;
        }

        if !rejected.is_empty() {
            return Err(Error::TransactionFailed { branches: rejected });
        }
        Ok(CommitOutcome::Committed { branches: updated })
    }

    /// Abandon the transaction, discarding all local changes.
    pub fn rollback(&mut self) {
        if self.state == TransactionState::Active {
            tracing::debug!(workspace = %self.workspace.display(), "Transaction rolled back");
            self.state = TransactionState::Failed;
        }
        self.repo = None;
        self.discard_workspace();
    }

    fn expect_state(&self, expected: TransactionState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::InvalidState {
                expected: expected.to_string(),
                actual: self.state.to_string(),
            })
        }
    }

    fn discard_workspace(&self) {
        if self.workspace.exists()
            && let Err(e) = fs::remove_dir_all(&self.workspace)
        {
            tracing::warn!(
                workspace = %self.workspace.display(),
                error = %e,
                "Failed to remove transaction workspace"
            );
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state == TransactionState::Active {
            self.rollback();
        }
    }
}

fn workspace_has_content(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    let mut entries = fs::read_dir(path).map_err(|e| Error::io(path, e))?;
    Ok(entries.next().is_some())
}

fn remote_branches(repo: &Repository) -> Result<BTreeMap<String, Oid>> {
    collect_refs(repo, REMOTE_PREFIX)
}

fn local_branches(repo: &Repository) -> Result<BTreeMap<String, Oid>> {
    collect_refs(repo, "refs/heads/")
}

fn collect_refs(repo: &Repository, prefix: &str) -> Result<BTreeMap<String, Oid>> {
    let mut refs = BTreeMap::new();
    for reference in repo.references_glob(&format!("{}*", prefix))? {
        let reference = reference?;
        if let (Some(name), Some(oid)) = (
            reference.name().and_then(|n| n.strip_prefix(prefix)),
            reference.target(),
        ) {
            // Symbolic refs such as origin/HEAD carry no direct target.
            refs.insert(name.to_string(), oid);
        }
    }
    Ok(refs)
}
