//! Git object helpers
//!
//! Every revision line in a treesync store is a plain branch whose commits
//! carry small records (JSON or TOML blobs) in their trees. These helpers
//! read and write such trees without a checkout, so they work on bare
//! repositories.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use git2::{Commit, ErrorCode, FileMode, ObjectType, Oid, Repository, Signature, Time, TreeWalkMode, TreeWalkResult};
use serde::de::DeserializeOwned;

use crate::{Error, Result};

/// Author and committer name recorded on every commit.
pub const SIGNATURE_NAME: &str = "treesync";
/// Author and committer email recorded on every commit.
pub const SIGNATURE_EMAIL: &str = "treesync@localhost";

/// Full reference name of a local branch.
pub fn branch_ref(branch: &str) -> String {
    format!("refs/heads/{}", branch)
}

/// Parse a hex object id.
pub fn parse_oid(id: &str) -> Result<Oid> {
    Oid::from_str(id).map_err(|_| Error::InvalidObjectId { id: id.to_string() })
}

/// Tip of a local branch, or `None` if the branch does not exist.
pub fn branch_tip(repo: &Repository, branch: &str) -> Result<Option<Oid>> {
    match repo.find_reference(&branch_ref(branch)) {
        Ok(reference) => Ok(reference.target()),
        Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Names of local branches starting with `prefix`, with the prefix removed.
pub fn branches_with_prefix(repo: &Repository, prefix: &str) -> Result<Vec<String>> {
    let full_prefix = branch_ref(prefix);
    let mut names = Vec::new();
    for reference in repo.references_glob(&format!("{}*", full_prefix))? {
        let reference = reference?;
        if let Some(name) = reference.name().and_then(|n| n.strip_prefix(&full_prefix)) {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// Write a tree from a map of `/`-separated relative paths to blob contents.
///
/// Intermediate trees are created as needed; a tree without entries is
/// never produced except for the (empty) root.
pub fn write_tree(repo: &Repository, files: &BTreeMap<String, Vec<u8>>) -> Result<Oid> {
    let entries: Vec<(&str, &[u8])> = files
        .iter()
        .map(|(path, content)| (path.as_str(), content.as_slice()))
        .collect();
    write_tree_level(repo, &entries)
}

fn write_tree_level(repo: &Repository, entries: &[(&str, &[u8])]) -> Result<Oid> {
    let mut builder = repo.treebuilder(None)?;
    let mut subdirs: BTreeMap<&str, Vec<(&str, &[u8])>> = BTreeMap::new();

    for &(path, content) in entries {
        match path.split_once('/') {
            Some((dir, rest)) => subdirs.entry(dir).or_default().push((rest, content)),
            None => {
                let blob = repo.blob(content)?;
                builder.insert(path, blob, FileMode::Blob.into())?;
            }
        }
    }
    for (dir, children) in subdirs {
        let oid = write_tree_level(repo, &children)?;
        builder.insert(dir, oid, FileMode::Tree.into())?;
    }

    Ok(builder.write()?)
}

/// Read every blob below a tree into a map keyed by relative path.
pub fn read_tree(repo: &Repository, tree_id: Oid) -> Result<BTreeMap<String, Vec<u8>>> {
    let tree = repo.find_tree(tree_id)?;

    let mut blobs = Vec::new();
    tree.walk(TreeWalkMode::PreOrder, |root, entry| {
        if entry.kind() == Some(ObjectType::Blob)
            && let Some(name) = entry.name()
        {
            blobs.push((format!("{}{}", root, name), entry.id()));
        }
        TreeWalkResult::Ok
    })?;

    let mut files = BTreeMap::new();
    for (path, oid) in blobs {
        let blob = repo.find_blob(oid)?;
        files.insert(path, blob.content().to_vec());
    }
    Ok(files)
}

/// Read a single blob from a commit's tree.
pub fn read_file(repo: &Repository, commit_id: Oid, path: &str) -> Result<Option<Vec<u8>>> {
    let tree = repo.find_commit(commit_id)?.tree()?;
    let entry = match tree.get_path(Path::new(path)) {
        Ok(entry) => entry,
        Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let blob = repo.find_blob(entry.id())?;
    Ok(Some(blob.content().to_vec()))
}

/// Read and deserialize a JSON record from a commit's tree.
pub fn read_json<T: DeserializeOwned>(repo: &Repository, commit_id: Oid, path: &str) -> Result<Option<T>> {
    match read_file(repo, commit_id, path)? {
        Some(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| Error::CorruptRecord {
                path: path.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

/// Append a commit with `tree_id` to `branch`, creating the branch if needed.
pub fn commit_tree(
    repo: &Repository,
    branch: &str,
    tree_id: Oid,
    message: &str,
    time: DateTime<Utc>,
) -> Result<Oid> {
    let tree = repo.find_tree(tree_id)?;
    let signature = Signature::new(SIGNATURE_NAME, SIGNATURE_EMAIL, &Time::new(time.timestamp(), 0))?;

    let parent = match branch_tip(repo, branch)? {
        Some(tip) => Some(repo.find_commit(tip)?),
        None => None,
    };
    let parents: Vec<&Commit> = parent.iter().collect();

    let oid = repo.commit(
        Some(&branch_ref(branch)),
        &signature,
        &signature,
        message,
        &tree,
        &parents,
    )?;
    tracing::debug!(branch = %branch, commit = %oid, "Committed record");
    Ok(oid)
}

/// Commit time as a UTC timestamp.
pub fn commit_time(commit: &Commit) -> DateTime<Utc> {
    Utc.timestamp_opt(commit.time().seconds(), 0)
        .single()
        .unwrap_or_default()
}

/// Commits along the first-parent chain, starting at `tip` and ending at the root.
pub fn first_parent_chain(repo: &Repository, tip: Oid) -> Result<Vec<Oid>> {
    let mut chain = Vec::new();
    let mut current = Some(repo.find_commit(tip)?);
    while let Some(commit) = current {
        chain.push(commit.id());
        current = if commit.parent_count() > 0 {
            Some(commit.parent(0)?)
        } else {
            None
        };
    }
    Ok(chain)
}

/// Whether `ancestor` is a strict ancestor of `descendant`.
pub fn is_ancestor(repo: &Repository, ancestor: Oid, descendant: Oid) -> Result<bool> {
    Ok(repo.graph_descendant_of(descendant, ancestor)?)
}
