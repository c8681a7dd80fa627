//! Canonical branches, the externally visible result of a reconstruction.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::commit::CommitId;

/// Identifier of a canonical branch.
///
/// Derived from the branch name and the commit the branch grew out of, so a
/// name that is reused after being merged and deleted yields a distinct branch.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct BranchId(Arc<str>);

impl BranchId {
  /// Build the id for `name` branching off `parent_commit` (`None` for a
  /// branch that starts at a root commit).
  pub fn new(name: &str, parent_commit: Option<&CommitId>) -> Self {
    let parent = parent_commit.map_or("root", CommitId::as_str);
    Self(Arc::from(format!("{name}-{parent}")))
  }

  /// Id for another branch with the same name and parent commit, told apart
  /// by its first commit.
  pub fn with_first_commit(&self, first_commit: &CommitId) -> Self {
    Self(Arc::from(format!("{}~{}", self.0, first_commit.short())))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Debug for BranchId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("BranchId").field(&self.as_str()).finish()
  }
}

impl fmt::Display for BranchId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl Serialize for BranchId {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(self.as_str())
  }
}

/// A branch as presented to consumers of a [`RepositorySnapshot`](crate::RepositorySnapshot).
#[derive(Debug, Clone, Serialize)]
pub struct Branch {
  pub id: BranchId,
  pub name: String,
  /// Owned commits ordered from the tip towards the first commit.
  pub commit_ids: Vec<CommitId>,
  pub tip_commit_id: CommitId,
  pub first_commit_id: CommitId,
  /// First parent of the first commit; owned by a different branch.
  pub parent_commit_id: Option<CommitId>,
  pub parent_branch_id: Option<BranchId>,
  pub child_branch_ids: Vec<BranchId>,
  /// Names shown as "could be one of" hints on ambiguous branches.
  pub child_branch_names: BTreeSet<String>,
  pub local_tip_id: Option<CommitId>,
  pub remote_tip_id: Option<CommitId>,
  /// A live ref points into this branch.
  pub is_active: bool,
  pub is_local: bool,
  pub is_remote: bool,
  /// Ownership could not be narrowed to a single branch.
  pub is_multi_branch: bool,
  /// No ref or merge subject provided a name.
  pub is_anonymous: bool,
  pub local_ahead_count: usize,
  pub remote_ahead_count: usize,
}

impl Branch {
  /// Branches that own no commits borrow the commit their ref points at.
  pub fn is_empty(&self) -> bool {
    self.commit_ids.is_empty()
  }

  pub fn is_root(&self) -> bool {
    self.parent_branch_id.is_none()
  }

  /// Local and remote tips differ.
  pub fn is_diverged(&self) -> bool {
    self.local_ahead_count > 0 || self.remote_ahead_count > 0
  }
}
