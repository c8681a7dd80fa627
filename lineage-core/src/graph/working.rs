//! Mutable state shared by the reconstruction stages.
//!
//! A [`WorkingGraph`] owns the commit arena for one reconstruction together
//! with the transient ownership fragments ([`SubBranch`]) and the candidate
//! claims that map commits to fragments. Stages take `&mut WorkingGraph` in a
//! fixed order; nothing else holds a reference while a reconstruction runs.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;

use chrono::{DateTime, Utc};

use crate::commit::{CommitId, CommitNode, CommitStore};
use crate::error::ReconstructError;

/// Index of a [`SubBranch`] in its working graph.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SubBranchId(usize);

impl SubBranchId {
  pub fn index(self) -> usize {
    self.0
  }
}

impl fmt::Debug for SubBranchId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "SubBranchId({})", self.0)
  }
}

/// Ownership fragment: a run of commits attributed to one branch name before
/// fragments are merged into canonical branches.
#[derive(Debug, Clone)]
pub(crate) struct SubBranch {
  pub id: SubBranchId,
  pub name: String,
  /// Commit the fragment grows down from. For the checked-out branch this is
  /// the uncommitted-changes commit when the working tree is dirty.
  pub tip: CommitId,
  /// Commit the local ref points at.
  pub local_tip: Option<CommitId>,
  /// Commit the remote ref points at.
  pub remote_tip: Option<CommitId>,
  pub is_active: bool,
  pub is_local: bool,
  pub is_remote: bool,
  pub is_anonymous: bool,
  pub is_multi: bool,
  /// Names a multi-owner fragment could not choose between.
  pub multi_candidates: BTreeSet<String>,
}

impl SubBranch {
  pub fn is_priority(&self, priority_branches: &[String]) -> bool {
    self.is_active && priority_branches.iter().any(|name| name == &self.name)
  }
}

/// A local fragment and the remote fragment its ref tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TrackedPair {
  pub local: SubBranchId,
  pub remote: SubBranchId,
}

#[derive(Debug)]
pub(crate) struct WorkingGraph {
  pub commits: CommitStore,
  pub sub_branches: Vec<SubBranch>,
  pub tracked: Vec<TrackedPair>,
  /// Commit `HEAD` resolves to; the uncommitted-changes commit when dirty.
  pub head_commit: Option<CommitId>,
  claims: HashMap<CommitId, Vec<SubBranchId>>,
  /// Claims that later passes must not contest.
  firm: HashSet<CommitId>,
  generations: HashMap<CommitId, usize>,
}

impl WorkingGraph {
  /// Wrap `commits`, computing generation numbers. Fails when a parent link
  /// points outside the store or the graph is not acyclic.
  pub fn new(commits: CommitStore) -> Result<Self, ReconstructError> {
    let generations = compute_generations(&commits)?;
    Ok(Self {
      commits,
      sub_branches: Vec::new(),
      tracked: Vec::new(),
      head_commit: None,
      claims: HashMap::new(),
      firm: HashSet::new(),
      generations,
    })
  }

  /// Add a synthetic commit, wiring it below its parent.
  pub fn add_virtual(&mut self, node: CommitNode) {
    let generation = node
      .first_parent()
      .and_then(|parent| self.generations.get(parent))
      .map_or(0, |generation| generation + 1);
    self.generations.insert(node.id.clone(), generation);
    self.commits.insert(node);
  }

  /// Longest parent path from a root commit.
  pub fn generation(&self, id: &CommitId) -> usize {
    self.generations.get(id).copied().unwrap_or_default()
  }

  /// Present with real data (not a stub for an unreported parent).
  pub fn is_present(&self, id: &CommitId) -> bool {
    self.commits.get(id).is_some_and(|node| !node.is_stub())
  }

  pub fn node(&self, id: &CommitId) -> Result<&CommitNode, ReconstructError> {
    self.commits.require(id)
  }

  /// First parent of `id`, if it has real data.
  pub fn first_parent(&self, id: &CommitId) -> Option<CommitId> {
    self
      .commits
      .get(id)
      .and_then(CommitNode::first_parent)
      .filter(|parent| self.is_present(parent))
      .cloned()
  }

  /// First-children of `id` with real data, by id. Ingestion order of the
  /// children does not show through.
  pub fn first_children(&self, id: &CommitId) -> Vec<CommitId> {
    let mut children: Vec<CommitId> = self
      .commits
      .get(id)
      .map(|node| {
        node
          .first_child_ids
          .iter()
          .filter(|child| self.is_present(child))
          .cloned()
          .collect()
      })
      .unwrap_or_default();
    children.sort();
    children
  }

  /// Most recent commit date in the graph.
  pub fn latest_commit_date(&self) -> DateTime<Utc> {
    self
      .commits
      .iter()
      .map(|node| node.commit_date)
      .max()
      .unwrap_or_default()
  }

  /// Newest first: commit date, then generation, then id.
  pub fn compare_recent(&self, a: &CommitNode, b: &CommitNode) -> Ordering {
    b.commit_date
      .cmp(&a.commit_date)
      .then_with(|| self.generation(&b.id).cmp(&self.generation(&a.id)))
      .then_with(|| a.id.cmp(&b.id))
  }

  /// Ids of all commits with real data, newest first.
  pub fn ordered_ids(&self) -> Vec<CommitId> {
    let mut nodes: Vec<&CommitNode> = self.commits.iter().filter(|node| !node.is_stub()).collect();
    nodes.sort_by(|a, b| self.compare_recent(a, b));
    nodes.into_iter().map(|node| node.id.clone()).collect()
  }

  pub fn add_sub_branch(&mut self, name: impl Into<String>, tip: CommitId) -> SubBranchId {
    let id = SubBranchId(self.sub_branches.len());
    self.sub_branches.push(SubBranch {
      id,
      name: name.into(),
      tip,
      local_tip: None,
      remote_tip: None,
      is_active: false,
      is_local: false,
      is_remote: false,
      is_anonymous: false,
      is_multi: false,
      multi_candidates: BTreeSet::new(),
    });
    id
  }

  pub fn sub_branch(&self, id: SubBranchId) -> Result<&SubBranch, ReconstructError> {
    self
      .sub_branches
      .get(id.0)
      .ok_or_else(|| ReconstructError::Inconsistent(format!("unknown sub-branch {}", id.0)))
  }

  pub fn sub_branch_mut(&mut self, id: SubBranchId) -> Result<&mut SubBranch, ReconstructError> {
    self
      .sub_branches
      .get_mut(id.0)
      .ok_or_else(|| ReconstructError::Inconsistent(format!("unknown sub-branch {}", id.0)))
  }

  /// Name of a fragment; empty for ids that do not exist.
  pub fn name_of(&self, id: SubBranchId) -> &str {
    self.sub_branches.get(id.0).map_or("", |sub_branch| sub_branch.name.as_str())
  }

  /// First fragment with `name`, preferring active local fragments.
  pub fn find_by_name(&self, name: &str) -> Option<SubBranchId> {
    self
      .sub_branches
      .iter()
      .filter(|sub_branch| sub_branch.name == name && !sub_branch.is_multi)
      .min_by_key(|sub_branch| (!sub_branch.is_active, !sub_branch.is_local, sub_branch.id))
      .map(|sub_branch| sub_branch.id)
  }

  pub fn claimants(&self, id: &CommitId) -> &[SubBranchId] {
    self.claims.get(id).map_or(&[], Vec::as_slice)
  }

  pub fn is_claimed(&self, id: &CommitId) -> bool {
    !self.claimants(id).is_empty()
  }

  pub fn is_firm(&self, id: &CommitId) -> bool {
    self.firm.contains(id)
  }

  /// Add `owner` as a candidate for `id`.
  pub fn claim(&mut self, id: &CommitId, owner: SubBranchId) {
    let claimants = self.claims.entry(id.clone()).or_default();
    if !claimants.contains(&owner) {
      claimants.push(owner);
    }
  }

  /// Make `owner` the sole, uncontested owner of `id`.
  pub fn claim_firm(&mut self, id: &CommitId, owner: SubBranchId) {
    self.claims.insert(id.clone(), vec![owner]);
    self.firm.insert(id.clone());
  }

  pub fn set_claimants(&mut self, id: &CommitId, claimants: Vec<SubBranchId>) {
    self.claims.insert(id.clone(), claimants);
  }

  /// Commits with more than one candidate owner.
  pub fn contested(&self) -> impl Iterator<Item = (&CommitId, &[SubBranchId])> {
    self
      .claims
      .iter()
      .filter(|(_, claimants)| claimants.len() > 1)
      .map(|(id, claimants)| (id, claimants.as_slice()))
  }

  /// All ancestors of `tip` including itself.
  pub fn ancestors(&self, tip: &CommitId) -> HashSet<CommitId> {
    let mut seen = HashSet::new();
    let mut stack = vec![tip.clone()];

    while let Some(id) = stack.pop() {
      if !seen.insert(id.clone()) {
        continue;
      }
      if let Some(node) = self.commits.get(&id) {
        stack.extend(node.parent_ids.iter().filter(|parent| !seen.contains(*parent)).cloned());
      }
    }

    seen
  }

  /// Consume the graph, leaving the commits with real data newest first.
  pub fn into_ordered_commits(self) -> Vec<CommitNode> {
    let generations = self.generations;
    let mut nodes: Vec<CommitNode> = self
      .commits
      .into_nodes()
      .filter(|node| !node.is_stub())
      .map(|mut node| {
        node.sub_branch_id = None;
        node
      })
      .collect();
    let generation = |id: &CommitId| generations.get(id).copied().unwrap_or_default();
    nodes.sort_by(|a, b| {
      b.commit_date
        .cmp(&a.commit_date)
        .then_with(|| generation(&b.id).cmp(&generation(&a.id)))
        .then_with(|| a.id.cmp(&b.id))
    });
    nodes
  }

  /// Record each commit's single remaining claimant as its sub-branch.
  pub fn assign_sub_branch_ids(&mut self) -> Result<(), ReconstructError> {
    for (id, claimants) in &self.claims {
      let [owner] = claimants.as_slice() else {
        return Err(ReconstructError::Inconsistent(format!(
          "commit {id} still has {} owners",
          claimants.len()
        )));
      };
      self.commits.require_mut(id)?.sub_branch_id = Some(*owner);
    }
    Ok(())
  }
}

/// Kahn's algorithm over parent links: a commit's generation is one more
/// than its highest parent's.
fn compute_generations(commits: &CommitStore) -> Result<HashMap<CommitId, usize>, ReconstructError> {
  let mut pending: HashMap<CommitId, usize> = HashMap::new();
  let mut queue = VecDeque::new();

  for node in commits.iter() {
    let parents: HashSet<&CommitId> = node.parent_ids.iter().collect();
    if let Some(missing) = parents.iter().find(|parent| !commits.contains(parent)) {
      return Err(ReconstructError::MissingCommit((*missing).clone()));
    }
    if parents.is_empty() {
      queue.push_back(node.id.clone());
    } else {
      pending.insert(node.id.clone(), parents.len());
    }
  }

  let mut generations = HashMap::with_capacity(commits.len());
  while let Some(id) = queue.pop_front() {
    let node = commits.require(&id)?;
    let generation = node
      .parent_ids
      .iter()
      .filter_map(|parent| generations.get(parent))
      .map(|generation| generation + 1)
      .max()
      .unwrap_or(0);
    generations.insert(id.clone(), generation);

    for child in &node.child_ids {
      if let Some(remaining) = pending.get_mut(child) {
        *remaining -= 1;
        if *remaining == 0 {
          queue.push_back(child.clone());
        }
      }
    }
  }

  if generations.len() != commits.len() {
    return Err(ReconstructError::Inconsistent(format!(
      "{} commits are part of a parent cycle or have unlinked parents",
      commits.len() - generations.len()
    )));
  }

  Ok(generations)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_support::{RepoFixture, working_graph};

  fn graph(fixture: RepoFixture) -> WorkingGraph {
    working_graph(&fixture.build())
  }

  #[test]
  fn generations_follow_longest_parent_path() {
    let graph = graph(
      RepoFixture::new()
        .commit("a1", &[], "root")
        .commit("b1", &["a1"], "side")
        .commit("a2", &["a1"], "main")
        .commit("a3", &["a2"], "main")
        .commit("m1", &["b1", "a3"], "merge"),
    );

    assert_eq!(graph.generation(&CommitId::from("a1")), 0);
    assert_eq!(graph.generation(&CommitId::from("b1")), 1);
    assert_eq!(graph.generation(&CommitId::from("m1")), 3);
  }

  #[test]
  fn ordering_breaks_date_ties_by_generation() {
    let mut commits = CommitStore::new();
    let date = RepoFixture::date(1);
    commits.insert(CommitNode::new_virtual("p1", "parent", None, date));
    commits.insert(CommitNode::new_virtual("c1", "child", Some(CommitId::from("p1")), date));
    let graph = WorkingGraph::new(commits).unwrap();

    assert_eq!(graph.ordered_ids(), vec![CommitId::from("c1"), CommitId::from("p1")]);
  }

  #[test]
  fn missing_parent_is_an_internal_fault() {
    let mut commits = CommitStore::new();
    commits.insert_unwired(CommitNode::new_virtual(
      "c1",
      "orphaned",
      Some(CommitId::from("ghost")),
      RepoFixture::date(1),
    ));

    let err = WorkingGraph::new(commits).unwrap_err();
    assert!(matches!(err, ReconstructError::MissingCommit(_)));
    assert!(err.is_internal());
  }

  #[test]
  fn cycle_is_an_internal_fault() {
    let mut commits = CommitStore::new();
    commits.insert(CommitNode::new_virtual("c1", "one", Some(CommitId::from("c2")), RepoFixture::date(1)));
    commits.insert(CommitNode::new_virtual("c2", "two", Some(CommitId::from("c1")), RepoFixture::date(2)));

    let err = WorkingGraph::new(commits).unwrap_err();
    assert!(matches!(err, ReconstructError::Inconsistent(_)));
  }

  #[test]
  fn firm_claims_replace_candidates() {
    let mut graph = graph(RepoFixture::new().commit("a1", &[], "root"));
    let root = CommitId::from("a1");
    let first = graph.add_sub_branch("first", root.clone());
    let second = graph.add_sub_branch("second", root.clone());

    graph.claim(&root, first);
    graph.claim(&root, second);
    graph.claim(&root, second);
    assert_eq!(graph.claimants(&root), &[first, second]);
    assert_eq!(graph.contested().count(), 1);

    graph.claim_firm(&root, second);
    assert_eq!(graph.claimants(&root), &[second]);
    assert!(graph.is_firm(&root));
  }

  #[test]
  fn sub_branch_ids_require_a_single_owner() {
    let mut graph = graph(RepoFixture::new().commit("a1", &[], "root"));
    let root = CommitId::from("a1");
    let first = graph.add_sub_branch("first", root.clone());
    let second = graph.add_sub_branch("second", root.clone());
    graph.claim(&root, first);
    graph.claim(&root, second);

    assert!(graph.assign_sub_branch_ids().is_err());

    graph.claim_firm(&root, first);
    graph.assign_sub_branch_ids().unwrap();
    assert_eq!(graph.commits.get(&root).unwrap().sub_branch_id, Some(first));
  }
}
