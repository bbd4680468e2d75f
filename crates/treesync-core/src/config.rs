//! Group configuration
//!
//! The participant list of a group lives in `config.toml` on the config
//! branch of the group's shared store, so configuration edits travel through
//! the same transactions as snapshots and sync state.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use git2::{Oid, Repository};
use serde::{Deserialize, Serialize};
use treesync_fs::{ConfigStore, PathFilter, validate_name};
use treesync_git::objects;

use crate::layout::StoreBranch;
use crate::{Error, Result};

/// Name of the record holding the group configuration.
pub const CONFIG_FILE: &str = "config.toml";

/// One configured participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantConfig {
    pub name: String,
    /// Filter expression; empty includes every path
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub filter: String,
}

impl ParticipantConfig {
    pub fn path_filter(&self) -> Result<PathFilter> {
        Ok(PathFilter::parse(&self.filter)?)
    }
}

/// Configuration of one group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupConfig {
    #[serde(default)]
    participants: Vec<ParticipantConfig>,
}

impl GroupConfig {
    /// Load the configuration from the config branch; empty if never saved.
    pub fn load(repo: &Repository) -> Result<Self> {
        let Some(tip) = objects::branch_tip(repo, &StoreBranch::Config.name())? else {
            return Ok(Self::default());
        };
        match objects::read_file(repo, tip, CONFIG_FILE)? {
            Some(bytes) => {
                let content = String::from_utf8_lossy(&bytes);
                Ok(ConfigStore::parse(Path::new(CONFIG_FILE), &content)?)
            }
            None => Ok(Self::default()),
        }
    }

    /// Append the configuration to the config branch.
    ///
    /// Returns `None` if the stored configuration is already identical.
    pub fn save(&self, repo: &Repository) -> Result<Option<Oid>> {
        if Self::load(repo)? == *self {
            return Ok(None);
        }
        let content = ConfigStore::render(Path::new(CONFIG_FILE), self)?;
        let mut records = BTreeMap::new();
        records.insert(CONFIG_FILE.to_string(), content.into_bytes());
        let tree_id = objects::write_tree(repo, &records)?;
        let oid = objects::commit_tree(
            repo,
            &StoreBranch::Config.name(),
            tree_id,
            "Update group configuration",
            Utc::now(),
        )?;
        Ok(Some(oid))
    }

    pub fn participants(&self) -> &[ParticipantConfig] {
        &self.participants
    }

    pub fn participant(&self, name: &str) -> Option<&ParticipantConfig> {
        self.participants.iter().find(|p| p.name == name)
    }

    /// Participant names in configuration order.
    pub fn names(&self) -> Vec<String> {
        self.participants.iter().map(|p| p.name.clone()).collect()
    }

    /// Add a participant.
    ///
    /// # Errors
    ///
    /// - Name validation errors for names unusable as branch names
    /// - [`treesync_fs::Error::InvalidFilter`] for a malformed filter
    /// - [`Error::ParticipantExists`] if the name is taken
    pub fn add_participant(&mut self, name: &str, filter: &str) -> Result<()> {
        validate_name(name)?;
        PathFilter::parse(filter)?;
        if self.participant(name).is_some() {
            return Err(Error::ParticipantExists {
                name: name.to_string(),
            });
        }
        self.participants.push(ParticipantConfig {
            name: name.to_string(),
            filter: filter.to_string(),
        });
        Ok(())
    }

    /// Remove a participant; its history stays in the store.
    pub fn remove_participant(&mut self, name: &str) -> Result<ParticipantConfig> {
        let pos = self
            .participants
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| Error::ParticipantNotFound {
                name: name.to_string(),
            })?;
        Ok(self.participants.remove(pos))
    }

    /// Compiled filters by participant.
    pub fn filters(&self) -> Result<BTreeMap<String, PathFilter>> {
        self.participants
            .iter()
            .map(|p| Ok((p.name.clone(), p.path_filter()?)))
            .collect()
    }

    /// Filter expressions by participant.
    pub fn filter_expressions(&self) -> BTreeMap<String, String> {
        self.participants
            .iter()
            .map(|p| (p.name.clone(), p.filter.clone()))
            .collect()
    }
}
