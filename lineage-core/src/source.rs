//! The contract between the engine and whatever lists commits, refs and tags.
//!
//! [`RepositorySource`] is implemented by [`Git2Source`](crate::Git2Source)
//! for real repositories and by [`RepositoryData`] for data that is already in
//! memory.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SourceError;

/// A commit as reported by the collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCommit {
  pub id: String,
  pub parent_ids: Vec<String>,
  pub subject: String,
  pub author: String,
  pub author_date: DateTime<Utc>,
  pub commit_date: DateTime<Utc>,
}

/// A live branch ref.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawBranch {
  /// Short name, e.g. `feature` or `origin/feature`.
  pub name: String,
  pub tip_id: String,
  pub is_remote: bool,
  /// Upstream of a local branch, e.g. `origin/feature`.
  #[serde(default)]
  pub tracking_name: Option<String>,
  #[serde(default)]
  pub tracking_tip_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTag {
  pub commit_id: String,
  pub name: String,
}

/// What `HEAD` points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeadState {
  /// A local branch is checked out.
  Branch(String),
  /// A commit is checked out directly.
  Detached(String),
  /// The checked-out branch has no commits yet.
  Unborn(String),
}

impl Default for HeadState {
  fn default() -> Self {
    Self::Unborn("master".to_string())
  }
}

/// Uncommitted state of the working tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingStatus {
  pub changed: usize,
  pub conflicted: usize,
}

impl WorkingStatus {
  pub fn is_clean(&self) -> bool {
    self.changed == 0 && self.conflicted == 0
  }
}

/// Result of comparing a local tip with its remote tip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Divergence {
  /// Merge base of the two tips.
  pub common_id: String,
  /// Commits reachable only from the local tip.
  pub ahead: usize,
  /// Commits reachable only from the remote tip.
  pub behind: usize,
}

/// Branch name assigned to a commit by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecifiedName {
  pub commit_id: String,
  pub branch_name: String,
}

/// Lazily produced commits, newest first.
pub type CommitIter<'a> = Box<dyn Iterator<Item = Result<RawCommit, SourceError>> + 'a>;

/// Provider of the raw repository data a reconstruction consumes.
pub trait RepositorySource {
  /// All reachable commits. Children should be reported before their parents
  /// so the ingestion cut-off can stop early.
  fn commits(&self) -> Result<CommitIter<'_>, SourceError>;

  fn branches(&self) -> Result<Vec<RawBranch>, SourceError>;

  fn tags(&self) -> Result<Vec<RawTag>, SourceError>;

  fn head(&self) -> Result<HeadState, SourceError>;

  fn status(&self) -> Result<WorkingStatus, SourceError> {
    Ok(WorkingStatus::default())
  }

  fn specified_names(&self) -> Result<Vec<SpecifiedName>, SourceError> {
    Ok(Vec::new())
  }

  /// Compare a local tip with a remote tip.
  fn divergence(&self, local_tip: &str, remote_tip: &str) -> Result<Divergence, SourceError>;
}

/// Repository data held in memory.
///
/// Divergence is computed from the commit list itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryData {
  pub commits: Vec<RawCommit>,
  pub branches: Vec<RawBranch>,
  pub tags: Vec<RawTag>,
  pub head: HeadState,
  #[serde(default)]
  pub status: WorkingStatus,
  #[serde(default)]
  pub specified_names: Vec<SpecifiedName>,
}

impl RepositoryData {
  fn parents_by_id(&self) -> HashMap<&str, &[String]> {
    self
      .commits
      .iter()
      .map(|commit| (commit.id.as_str(), commit.parent_ids.as_slice()))
      .collect()
  }

  /// Breadth-first ancestors of `tip`, including `tip`, in visiting order.
  fn ancestors<'a>(parents: &HashMap<&'a str, &'a [String]>, tip: &'a str) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    let mut order = Vec::new();
    let mut queue = VecDeque::from([tip]);

    while let Some(id) = queue.pop_front() {
      if !seen.insert(id) {
        continue;
      }
      order.push(id);
      if let Some(&parent_ids) = parents.get(id) {
        queue.extend(parent_ids.iter().map(String::as_str));
      }
    }

    order
  }
}

impl RepositorySource for RepositoryData {
  fn commits(&self) -> Result<CommitIter<'_>, SourceError> {
    Ok(Box::new(self.commits.iter().cloned().map(Ok)))
  }

  fn branches(&self) -> Result<Vec<RawBranch>, SourceError> {
    Ok(self.branches.clone())
  }

  fn tags(&self) -> Result<Vec<RawTag>, SourceError> {
    Ok(self.tags.clone())
  }

  fn head(&self) -> Result<HeadState, SourceError> {
    Ok(self.head.clone())
  }

  fn status(&self) -> Result<WorkingStatus, SourceError> {
    Ok(self.status)
  }

  fn specified_names(&self) -> Result<Vec<SpecifiedName>, SourceError> {
    Ok(self.specified_names.clone())
  }

  fn divergence(&self, local_tip: &str, remote_tip: &str) -> Result<Divergence, SourceError> {
    let parents = self.parents_by_id();
    for tip in [local_tip, remote_tip] {
      if !parents.contains_key(tip) {
        return Err(SourceError::Unavailable(format!("unknown commit {tip}")));
      }
    }

    let local = Self::ancestors(&parents, local_tip);
    let remote = Self::ancestors(&parents, remote_tip);
    let local_set: HashSet<&str> = local.iter().copied().collect();
    let remote_set: HashSet<&str> = remote.iter().copied().collect();

    let common_id = local
      .iter()
      .find(|id| remote_set.contains(*id))
      .ok_or_else(|| SourceError::Unavailable(format!("{local_tip} and {remote_tip} share no history")))?;

    Ok(Divergence {
      common_id: common_id.to_string(),
      ahead: local_set.difference(&remote_set).count(),
      behind: remote_set.difference(&local_set).count(),
    })
  }
}
