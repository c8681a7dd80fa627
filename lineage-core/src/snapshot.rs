//! The immutable result of one reconstruction and its hand-off to readers.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;

use crate::branch::{Branch, BranchId};
use crate::commit::{CommitId, CommitNode};

/// Branches and commits of a repository as reconstructed by one refresh.
///
/// Commits are ordered newest first. A snapshot is never modified after it is
/// published; the next refresh produces a new one with a higher generation.
#[derive(Debug, Clone, Serialize)]
pub struct RepositorySnapshot {
  generation: u64,
  branches: Vec<Branch>,
  commits: Vec<CommitNode>,
  current_branch_id: Option<BranchId>,
  current_commit_id: Option<CommitId>,
  #[serde(skip)]
  branch_index: HashMap<BranchId, usize>,
  #[serde(skip)]
  commit_index: HashMap<CommitId, usize>,
}

impl RepositorySnapshot {
  pub(crate) fn new(
    generation: u64,
    branches: Vec<Branch>,
    commits: Vec<CommitNode>,
    current_branch_id: Option<BranchId>,
    current_commit_id: Option<CommitId>,
  ) -> Self {
    let branch_index = branches
      .iter()
      .enumerate()
      .map(|(index, branch)| (branch.id.clone(), index))
      .collect();
    let commit_index = commits
      .iter()
      .enumerate()
      .map(|(index, commit)| (commit.id.clone(), index))
      .collect();

    Self {
      generation,
      branches,
      commits,
      current_branch_id,
      current_commit_id,
      branch_index,
      commit_index,
    }
  }

  /// Number of the refresh that produced this snapshot, starting at 1.
  pub fn generation(&self) -> u64 {
    self.generation
  }

  pub fn branches(&self) -> &[Branch] {
    &self.branches
  }

  pub fn commits(&self) -> &[CommitNode] {
    &self.commits
  }

  pub fn branch(&self, id: &BranchId) -> Option<&Branch> {
    self.branch_index.get(id).and_then(|index| self.branches.get(*index))
  }

  pub fn commit(&self, id: &CommitId) -> Option<&CommitNode> {
    self.commit_index.get(id).and_then(|index| self.commits.get(*index))
  }

  /// All branches carrying `name`; a reused name yields several.
  pub fn branches_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Branch> + 'a {
    self.branches.iter().filter(move |branch| branch.name == name)
  }

  /// Commit whose id starts with `prefix`, if exactly one does.
  pub fn commit_by_prefix(&self, prefix: &str) -> Option<&CommitNode> {
    let mut matches = self
      .commits
      .iter()
      .filter(|commit| commit.id.as_str().starts_with(prefix));
    let first = matches.next()?;
    matches.next().is_none().then_some(first)
  }

  pub fn current_branch(&self) -> Option<&Branch> {
    self.current_branch_id.as_ref().and_then(|id| self.branch(id))
  }

  pub fn current_commit(&self) -> Option<&CommitNode> {
    self.current_commit_id.as_ref().and_then(|id| self.commit(id))
  }

  /// Commits of `branch`, tip first.
  pub fn commits_of(&self, branch: &Branch) -> Vec<&CommitNode> {
    branch.commit_ids.iter().filter_map(|id| self.commit(id)).collect()
  }

  /// Commits owned by any of `branches`, newest first.
  pub fn commits_for(&self, branches: &[BranchId]) -> Vec<&CommitNode> {
    let selected: HashSet<&BranchId> = branches.iter().collect();
    self
      .commits
      .iter()
      .filter(|commit| commit.branch_id.as_ref().is_some_and(|id| selected.contains(id)))
      .collect()
  }

  /// Commits no branch owns. Empty for any repository with a live branch.
  pub fn orphans(&self) -> Vec<&CommitNode> {
    self.commits.iter().filter(|commit| commit.branch_id.is_none()).collect()
  }

  pub fn root_branches(&self) -> impl Iterator<Item = &Branch> {
    self.branches.iter().filter(|branch| branch.parent_branch_id.is_none())
  }

  pub fn children_of(&self, branch: &Branch) -> Vec<&Branch> {
    branch
      .child_branch_ids
      .iter()
      .filter_map(|id| self.branch(id))
      .collect()
  }
}

/// Shared slot holding the most recently published snapshot.
///
/// Clones share the slot. Readers take an `Arc` to the snapshot and keep
/// using it while newer ones are published.
#[derive(Debug, Clone, Default)]
pub struct SnapshotHandle {
  inner: Arc<RwLock<Option<Arc<RepositorySnapshot>>>>,
}

impl SnapshotHandle {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn publish(&self, snapshot: Arc<RepositorySnapshot>) {
    let mut slot = self.inner.write().unwrap_or_else(PoisonError::into_inner);
    *slot = Some(snapshot);
  }

  pub fn latest(&self) -> Option<Arc<RepositorySnapshot>> {
    self.inner.read().unwrap_or_else(PoisonError::into_inner).clone()
  }
}

#[cfg(test)]
mod tests {
  use std::thread;

  use super::*;
  use crate::test_support::{RepoFixture, reconstruct};

  fn snapshot() -> RepositorySnapshot {
    reconstruct(
      &RepoFixture::new()
        .commit("aa1111", &[], "initial")
        .commit("aa2222", &["aa1111"], "second")
        .commit("bb1111", &["aa2222"], "feature")
        .commit("aa3333", &["aa2222"], "third")
        .branch("master", "aa3333")
        .branch("feature", "bb1111")
        .build(),
    )
  }

  #[test]
  fn lookups_by_id_and_name() {
    let snapshot = snapshot();

    let feature = snapshot.branches_named("feature").next().unwrap();
    assert_eq!(snapshot.branch(&feature.id).map(|branch| branch.name.as_str()), Some("feature"));
    assert_eq!(
      snapshot.commit(&CommitId::from("bb1111")).and_then(|commit| commit.branch_id.as_ref()),
      Some(&feature.id)
    );
    assert!(snapshot.commit_by_prefix("aa").is_none());
    assert_eq!(
      snapshot.commit_by_prefix("aa3").map(|commit| commit.subject.as_str()),
      Some("third")
    );
  }

  #[test]
  fn commits_are_filtered_to_selected_branches() {
    let snapshot = snapshot();
    let master = snapshot.branches_named("master").next().unwrap();

    let ids: Vec<&str> = snapshot
      .commits_for(std::slice::from_ref(&master.id))
      .iter()
      .map(|commit| commit.id.as_str())
      .collect();

    assert_eq!(ids, vec!["aa3333", "aa2222", "aa1111"]);
    assert_eq!(snapshot.commits_of(master).len(), 3);
    assert!(snapshot.orphans().is_empty());
  }

  #[test]
  fn hierarchy_navigation() {
    let snapshot = snapshot();

    let roots: Vec<&str> = snapshot.root_branches().map(|branch| branch.name.as_str()).collect();
    assert_eq!(roots, vec!["master"]);
    let master = snapshot.branches_named("master").next().unwrap();
    let children: Vec<&str> = snapshot
      .children_of(master)
      .iter()
      .map(|branch| branch.name.as_str())
      .collect();
    assert_eq!(children, vec!["feature"]);
  }

  #[test]
  fn handle_hands_snapshots_across_threads() {
    let handle = SnapshotHandle::new();
    assert!(handle.latest().is_none());

    let writer = handle.clone();
    thread::spawn(move || writer.publish(Arc::new(snapshot())))
      .join()
      .unwrap();

    assert_eq!(handle.latest().map(|snapshot| snapshot.generation()), Some(1));
  }
}
