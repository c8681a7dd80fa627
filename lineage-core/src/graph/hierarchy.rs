//! Canonical branches from ownership fragments.
//!
//! A branch is a run of commits owned under one name. A commit joins the run
//! of its first parent when it is the child that carries that name on; the
//! second parent of a pull merge joins the merge commit's run, and the local
//! and remote side of a tracked branch share one run. Refs that own no commits
//! attach to the run their tip lands in, or form an empty branch at that tip.
//! Runs that are not connected this way stay separate branches even when
//! they share a name and a parent commit.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::iter;

use tracing::{debug, instrument, warn};

use super::working::{SubBranch, SubBranchId, WorkingGraph};
use crate::branch::{Branch, BranchId};
use crate::commit::{CommitId, CommitNode};
use crate::config::EngineConfig;
use crate::error::ReconstructError;
use crate::merge_names::parse_merge_subject;

/// Disjoint sets over commit positions; the smallest index represents its set.
struct Partition {
  parent: Vec<usize>,
}

impl Partition {
  fn new(len: usize) -> Self {
    Self {
      parent: (0..len).collect(),
    }
  }

  fn find(&mut self, mut index: usize) -> usize {
    while self.parent[index] != index {
      self.parent[index] = self.parent[self.parent[index]];
      index = self.parent[index];
    }
    index
  }

  fn union(&mut self, a: usize, b: usize) {
    let (a, b) = (self.find(a), self.find(b));
    if a != b {
      self.parent[a.max(b)] = a.min(b);
    }
  }
}

/// Build the canonical branches, link parents and children and record each
/// commit's owning branch.
#[instrument(skip_all)]
pub fn build_hierarchy(graph: &mut WorkingGraph, config: &EngineConfig) -> Result<Vec<Branch>, ReconstructError> {
  let groups = group_commits(graph)?;

  let mut branches = Vec::with_capacity(groups.len());
  for group in groups {
    branches.push(build_branch(graph, group)?);
  }
  disambiguate_ids(&mut branches);
  branches.sort_by(|a, b| sort_key(config, a).cmp(&sort_key(config, b)));

  for branch in &branches {
    for id in &branch.commit_ids {
      graph.commits.require_mut(id)?.branch_id = Some(branch.id.clone());
    }
  }

  link_parents(graph, &mut branches);
  annotate_branch_tips(graph, &branches)?;

  debug!(
    branches = branches.len(),
    multi = branches.iter().filter(|branch| branch.is_multi_branch).count(),
    anonymous = branches.iter().filter(|branch| branch.is_anonymous).count(),
    "built branch hierarchy"
  );
  Ok(branches)
}

fn sort_key<'a>(config: &EngineConfig, branch: &'a Branch) -> (usize, bool, &'a str, &'a BranchId) {
  (
    config.priority_of(&branch.name).unwrap_or(usize::MAX),
    branch.is_multi_branch || branch.is_anonymous,
    branch.name.as_str(),
    &branch.id,
  )
}

/// Commits and fragments that form one canonical branch.
struct Group {
  name: String,
  commits: Vec<CommitId>,
  /// Fragments owning any of `commits`.
  owners: BTreeSet<SubBranchId>,
  /// Active fragments whose ref lands in this group.
  refs: BTreeSet<SubBranchId>,
}

impl Group {
  fn new(name: &str) -> Self {
    Self {
      name: name.to_string(),
      commits: Vec::new(),
      owners: BTreeSet::new(),
      refs: BTreeSet::new(),
    }
  }
}

fn owner_of(graph: &WorkingGraph, id: &CommitId) -> Option<SubBranchId> {
  graph.commits.get(id).and_then(|node| node.sub_branch_id)
}

/// The first-child that carries the branch of `id` on: a child owned under
/// the same name, preferring the fragment that owns `id`, then the lowest id.
fn continuation(graph: &WorkingGraph, id: &CommitId) -> Option<CommitId> {
  let owner = owner_of(graph, id)?;
  graph
    .first_children(id)
    .into_iter()
    .filter_map(|child| owner_of(graph, &child).map(|child_owner| (child_owner, child)))
    .filter(|(child_owner, _)| graph.name_of(*child_owner) == graph.name_of(owner))
    .min_by(|(a_owner, a), (b_owner, b)| (*a_owner != owner, a).cmp(&(*b_owner != owner, b)))
    .map(|(_, child)| child)
}

fn is_pull_merge(node: &CommitNode) -> bool {
  parse_merge_subject(&node.subject).is_pull_merge()
}

fn tracked_partner(graph: &WorkingGraph, id: SubBranchId) -> Option<SubBranchId> {
  graph.tracked.iter().find_map(|pair| {
    if pair.local == id {
      Some(pair.remote)
    } else if pair.remote == id {
      Some(pair.local)
    } else {
      None
    }
  })
}

fn group_commits(graph: &WorkingGraph) -> Result<Vec<Group>, ReconstructError> {
  let owned: Vec<(CommitId, SubBranchId)> = graph
    .ordered_ids()
    .into_iter()
    .filter_map(|id| owner_of(graph, &id).map(|owner| (id, owner)))
    .collect();
  let index: HashMap<&CommitId, usize> = owned
    .iter()
    .enumerate()
    .map(|(position, (id, _))| (id, position))
    .collect();
  // Position of `id` if it is owned under `name`.
  let owned_as = |id: &CommitId, name: &str| {
    index
      .get(id)
      .copied()
      .filter(|position| graph.name_of(owned[*position].1) == name)
  };

  let mut partition = Partition::new(owned.len());
  for (position, (id, owner)) in owned.iter().enumerate() {
    let name = graph.name_of(*owner);
    if let Some(parent) = graph.first_parent(id)
      && let Some(parent_position) = owned_as(&parent, name)
      && continuation(graph, &parent).as_ref() == Some(id)
    {
      partition.union(position, parent_position);
    }

    if let Some(node) = graph.commits.get(id)
      && is_pull_merge(node)
      && let Some(second) = node.second_parent()
      && let Some(second_position) = owned_as(second, name)
    {
      partition.union(position, second_position);
    }
  }

  for pair in &graph.tracked {
    let (local, remote) = (graph.sub_branch(pair.local)?, graph.sub_branch(pair.remote)?);
    if local.name == remote.name
      && let Some(local_position) = owned_as(&local.tip, &local.name)
      && let Some(remote_position) = owned_as(&remote.tip, &remote.name)
    {
      partition.union(local_position, remote_position);
    }
  }

  let mut groups: BTreeMap<usize, Group> = BTreeMap::new();
  for (position, (id, owner)) in owned.iter().enumerate() {
    let group = groups
      .entry(partition.find(position))
      .or_insert_with(|| Group::new(graph.name_of(*owner)));
    group.commits.push(id.clone());
    group.owners.insert(*owner);
  }

  let mut empty: Vec<Group> = Vec::new();
  for sub_branch in graph.sub_branches.iter().filter(|sub_branch| sub_branch.is_active) {
    let partner = tracked_partner(graph, sub_branch.id)
      .map(|partner| graph.sub_branch(partner))
      .transpose()?;
    let landing = iter::once(sub_branch)
      .chain(partner)
      .find_map(|candidate| owned_as(&candidate.tip, &sub_branch.name));

    if let Some(position) = landing
      && let Some(group) = groups.get_mut(&partition.find(position))
    {
      group.refs.insert(sub_branch.id);
      continue;
    }

    let existing = empty.iter_mut().find(|group| {
      group.name == sub_branch.name
        && group.refs.iter().any(|other| {
          partner.is_some_and(|partner| partner.id == *other)
            || graph
              .sub_branch(*other)
              .is_ok_and(|other| other.tip == sub_branch.tip)
        })
    });
    match existing {
      Some(group) => {
        group.refs.insert(sub_branch.id);
      }
      None => {
        let mut group = Group::new(&sub_branch.name);
        group.refs.insert(sub_branch.id);
        empty.push(group);
      }
    }
  }

  Ok(groups.into_values().chain(empty).collect())
}

/// Oldest commit of the group that does not grow on another of its commits.
fn first_commit(graph: &WorkingGraph, commits: &HashSet<&CommitId>) -> Result<CommitId, ReconstructError> {
  let mut roots = Vec::new();
  for id in commits {
    let is_root = graph
      .first_parent(id)
      .is_none_or(|parent| !commits.contains(&parent));
    if is_root {
      roots.push((graph.generation(id), graph.node(id)?.commit_date, (*id).clone()));
    }
  }
  roots
    .into_iter()
    .min()
    .map(|(_, _, id)| id)
    .ok_or_else(|| ReconstructError::Inconsistent("branch commits have no first commit".to_string()))
}

/// Commit a group without commits of its own points at.
fn borrowed_tip(refs: &[&SubBranch]) -> Result<CommitId, ReconstructError> {
  refs
    .iter()
    .find(|sub_branch| sub_branch.is_local)
    .or_else(|| refs.first())
    .map(|sub_branch| sub_branch.tip.clone())
    .ok_or_else(|| ReconstructError::Inconsistent("empty sub-branch group".to_string()))
}

fn build_branch(graph: &WorkingGraph, group: Group) -> Result<Branch, ReconstructError> {
  let Group {
    name,
    commits,
    owners,
    refs,
  } = group;
  let members: Vec<&SubBranch> = owners
    .union(&refs)
    .map(|member| graph.sub_branch(*member))
    .collect::<Result<_, _>>()?;
  let refs: Vec<&SubBranch> = refs
    .iter()
    .map(|member| graph.sub_branch(*member))
    .collect::<Result<_, _>>()?;

  let commit_set: HashSet<&CommitId> = commits.iter().collect();
  let mut ordered = Vec::with_capacity(commits.len());
  for id in &commits {
    ordered.push((
      Reverse(graph.generation(id)),
      Reverse(graph.node(id)?.commit_date),
      id.clone(),
    ));
  }
  ordered.sort();
  let commit_ids: Vec<CommitId> = ordered.into_iter().map(|(_, _, id)| id).collect();

  let local = refs.iter().find(|sub_branch| sub_branch.is_local);
  let remote = refs.iter().find(|sub_branch| sub_branch.is_remote);

  let (tip, first, parent_commit) = if commit_ids.is_empty() {
    let tip = borrowed_tip(&refs)?;
    (tip.clone(), tip.clone(), Some(tip))
  } else {
    let tip = [local, remote]
      .into_iter()
      .flatten()
      .map(|sub_branch| &sub_branch.tip)
      .find(|tip| commit_set.contains(tip))
      .or_else(|| {
        commit_ids.iter().find(|id| {
          graph
            .first_children(id)
            .iter()
            .all(|child| !commit_set.contains(child))
        })
      })
      .or_else(|| commit_ids.first())
      .cloned()
      .ok_or_else(|| ReconstructError::Inconsistent(format!("branch {name} has no tip")))?;
    let first = first_commit(graph, &commit_set)?;
    let parent_commit = graph.first_parent(&first);
    (tip, first, parent_commit)
  };

  Ok(Branch {
    id: BranchId::new(&name, parent_commit.as_ref()),
    name,
    commit_ids,
    tip_commit_id: tip,
    first_commit_id: first,
    parent_commit_id: parent_commit,
    parent_branch_id: None,
    child_branch_ids: Vec::new(),
    child_branch_names: members
      .iter()
      .flat_map(|sub_branch| sub_branch.multi_candidates.iter().cloned())
      .collect(),
    local_tip_id: local.and_then(|sub_branch| sub_branch.local_tip.clone()),
    remote_tip_id: remote.and_then(|sub_branch| sub_branch.remote_tip.clone()),
    is_active: !refs.is_empty(),
    is_local: local.is_some(),
    is_remote: remote.is_some(),
    is_multi_branch: members.iter().any(|sub_branch| sub_branch.is_multi),
    is_anonymous: members.iter().all(|sub_branch| sub_branch.is_anonymous),
    local_ahead_count: 0,
    remote_ahead_count: 0,
  })
}

/// Separate runs with the same name and parent commit get ids told apart by
/// their first commit. Active branches keep the plain id.
fn disambiguate_ids(branches: &mut [Branch]) {
  let mut order: Vec<usize> = (0..branches.len()).collect();
  order.sort_by(|a, b| {
    let key = |branch: &Branch| (branch.id.clone(), !branch.is_active, branch.first_commit_id.clone());
    key(&branches[*a]).cmp(&key(&branches[*b]))
  });

  let mut seen = HashSet::new();
  for position in order {
    let branch = &mut branches[position];
    if !seen.insert(branch.id.clone()) {
      branch.id = branch.id.with_first_commit(&branch.first_commit_id);
      debug!(branch = %branch.id, "separate run reuses a name and parent commit");
    }
  }
}

/// A branch's parent is the owner of its parent commit, never itself.
fn link_parents(graph: &WorkingGraph, branches: &mut [Branch]) {
  let index: HashMap<BranchId, usize> = branches
    .iter()
    .enumerate()
    .map(|(position, branch)| (branch.id.clone(), position))
    .collect();

  let mut links = Vec::new();
  for (position, branch) in branches.iter().enumerate() {
    let Some(parent_commit) = &branch.parent_commit_id else {
      continue;
    };
    let Some(parent_id) = graph.commits.get(parent_commit).and_then(|node| node.branch_id.clone()) else {
      continue;
    };
    if parent_id == branch.id {
      warn!(branch = %branch.id, "branch would be its own parent; treating it as a root");
      continue;
    }
    links.push((position, parent_id));
  }

  for (child, parent_id) in links {
    let Some(branch) = branches.get_mut(child) else {
      continue;
    };
    branch.parent_branch_id = Some(parent_id.clone());
    let child_id = branch.id.clone();
    let child_name = branch.name.clone();
    let child_parent_commit = branch.parent_commit_id.clone();

    if let Some(parent) = index.get(&parent_id).and_then(|position| branches.get_mut(*position)) {
      parent.child_branch_ids.push(child_id);
      if parent.is_multi_branch && child_parent_commit.as_ref() == Some(&parent.tip_commit_id) {
        parent.child_branch_names.insert(child_name);
      }
    }
  }
}

/// Label each commit an active branch points at with the branch names.
fn annotate_branch_tips(graph: &mut WorkingGraph, branches: &[Branch]) -> Result<(), ReconstructError> {
  let mut tips: BTreeMap<&CommitId, BTreeSet<&str>> = BTreeMap::new();
  for branch in branches.iter().filter(|branch| branch.is_active) {
    tips
      .entry(&branch.tip_commit_id)
      .or_default()
      .insert(branch.name.as_str());
  }

  for (id, names) in tips {
    let names: Vec<&str> = names.into_iter().collect();
    graph.commits.require_mut(id)?.branch_tips = Some(names.join(", "));
  }
  Ok(())
}
