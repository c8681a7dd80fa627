//! Branch ownership resolution.
//!
//! Claims are handed out in passes of decreasing confidence:
//!
//! 1. priority branches (`master`, `main`, `develop` by default) claim their
//!    whole first-parent chain, uncontested;
//! 2. every other live ref claims its tip and walks its first-parent chain,
//!    possibly sharing commits with other refs;
//! 3. pull merges extend the merged branch along the second parent;
//! 4. names from merge subjects are propagated to unclaimed neighbours;
//! 5. whatever is still unclaimed is grouped into branches that no ref points
//!    at any more, named from merge subjects or `Branch_<short id>`.
//!
//! Commits claimed by more than one branch are narrowed down afterwards by
//! [`reduce_multi_owners`](super::reduce_multi_owners).

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, instrument, trace};

use super::working::{SubBranchId, WorkingGraph};
use crate::commit::CommitId;
use crate::config::EngineConfig;
use crate::error::ReconstructError;
use crate::merge_names::parse_merge_subject;
use crate::source::SpecifiedName;

/// Prefix of names given to branches no ref or merge subject names.
pub const ANONYMOUS_PREFIX: &str = "Branch_";

/// Firmly assign manually specified names before any heuristic runs.
#[instrument(skip_all)]
pub fn apply_specified_names(graph: &mut WorkingGraph, names: &[SpecifiedName]) {
  let mut names: Vec<&SpecifiedName> = names.iter().collect();
  names.sort_by(|a, b| a.commit_id.cmp(&b.commit_id));

  let mut applied = 0usize;
  for specified in names {
    let id = CommitId::from(specified.commit_id.as_str());
    let Some(node) = graph.commits.get_mut(&id).filter(|node| !node.is_stub()) else {
      debug!(commit = %specified.commit_id, "specified commit is not in the commit graph");
      continue;
    };
    node.specified_branch_name = Some(specified.branch_name.clone());

    let owner = match graph.find_by_name(&specified.branch_name) {
      Some(owner) => owner,
      None => graph.add_sub_branch(specified.branch_name.as_str(), id.clone()),
    };
    graph.claim_firm(&id, owner);
    applied += 1;
  }

  if applied > 0 {
    debug!(applied, "applied specified branch names");
  }
}

/// Run every claiming pass. Afterwards each commit with real data has at
/// least one claimant.
#[instrument(skip_all)]
pub fn resolve_ownership(graph: &mut WorkingGraph, config: &EngineConfig) -> Result<(), ReconstructError> {
  let ordered = graph.ordered_ids();
  apply_subject_hints(graph, &ordered)?;

  let (priority, others): (Vec<SubBranchId>, Vec<SubBranchId>) = walk_order(graph, config)
    .into_iter()
    .partition(|id| {
      graph
        .sub_branch(*id)
        .is_ok_and(|sub_branch| sub_branch.is_priority(&config.priority_branches))
    });

  for id in &priority {
    claim_priority_chain(graph, *id)?;
  }
  for id in &others {
    claim_tip(graph, *id)?;
  }

  let mut ancestors = AncestorCache::default();
  for id in &others {
    claim_first_parents(graph, *id, &mut ancestors)?;
  }

  let extended = extend_pull_merges(graph, &ordered)?;
  let inferred = propagate_names(graph, &ordered)?;
  let discovered = discover_referenced_branches(graph, &inferred)?;
  adopt_parent_claims(graph, &ordered)?;

  debug!(
    active = priority.len() + others.len(),
    pull_merge_commits = extended,
    inferred = inferred.len(),
    discovered,
    contested = graph.contested().count(),
    "resolved branch ownership"
  );
  Ok(())
}

/// A merge's own subject names the merge commit; the merged-in branch names
/// the second parent unless that parent already has a name of its own.
fn apply_subject_hints(graph: &mut WorkingGraph, ordered: &[CommitId]) -> Result<(), ReconstructError> {
  let mut sources = Vec::new();

  for id in ordered {
    let node = graph.commits.require_mut(id)?;
    let names = parse_merge_subject(&node.subject);
    if let Some(target) = names.target {
      node.subject_branch_name = Some(target);
    }
    if let (Some(source), Some(second)) = (names.source, node.second_parent()) {
      sources.push((second.clone(), source));
    }
  }

  for (second, source) in sources {
    if let Some(parent) = graph.commits.get_mut(&second)
      && parent.subject_branch_name.is_none()
    {
      parent.subject_branch_name = Some(source);
    }
  }

  Ok(())
}

/// Active sub-branches: priority branches in configured order, then the other
/// refs with the most recent tips first. A branch that was merged into another
/// always has a lower tip generation, so the branch it was merged into walks
/// first.
fn walk_order(graph: &WorkingGraph, config: &EngineConfig) -> Vec<SubBranchId> {
  let mut active: Vec<_> = graph
    .sub_branches
    .iter()
    .filter(|sub_branch| sub_branch.is_active)
    .collect();
  active.sort_by_key(|sub_branch| {
    (
      config.priority_of(&sub_branch.name).unwrap_or(usize::MAX),
      Reverse(graph.generation(&sub_branch.tip)),
      sub_branch.is_remote,
      sub_branch.name.clone(),
      sub_branch.id,
    )
  });
  active.into_iter().map(|sub_branch| sub_branch.id).collect()
}

fn shares_name(graph: &WorkingGraph, claimants: &[SubBranchId], name: &str) -> bool {
  claimants.iter().any(|claimant| graph.name_of(*claimant) == name)
}

/// Claim the tip of `owner`. Returns `false` when another branch already owns
/// it, in which case `owner` does not walk any further.
fn claim_tip(graph: &mut WorkingGraph, owner: SubBranchId) -> Result<bool, ReconstructError> {
  let sub_branch = graph.sub_branch(owner)?;
  let tip = sub_branch.tip.clone();
  let name = sub_branch.name.clone();
  let claimants = graph.claimants(&tip);

  if claimants.is_empty() {
    graph.claim_firm(&tip, owner);
    return Ok(true);
  }
  if claimants.contains(&owner) {
    return Ok(true);
  }
  if shares_name(graph, claimants, &name) {
    graph.claim(&tip, owner);
  }
  Ok(false)
}

fn claim_priority_chain(graph: &mut WorkingGraph, owner: SubBranchId) -> Result<(), ReconstructError> {
  if !claim_tip(graph, owner)? {
    return Ok(());
  }

  let sub_branch = graph.sub_branch(owner)?;
  let name = sub_branch.name.clone();
  let mut current = graph.first_parent(&sub_branch.tip);
  let mut claimed = 0usize;

  while let Some(id) = current {
    let claimants = graph.claimants(&id);
    if claimants.is_empty() {
      graph.claim_firm(&id, owner);
      claimed += 1;
      current = graph.first_parent(&id);
      continue;
    }
    if !claimants.contains(&owner) && shares_name(graph, claimants, &name) {
      graph.claim(&id, owner);
    }
    break;
  }

  trace!(branch = %name, claimed, "claimed priority chain");
  Ok(())
}

/// Ancestor sets of sub-branch tips, computed on first use.
#[derive(Default)]
struct AncestorCache {
  sets: HashMap<SubBranchId, HashSet<CommitId>>,
}

impl AncestorCache {
  /// Whether `commit` is reachable from the tip of `owner`.
  fn reaches(&mut self, graph: &WorkingGraph, owner: SubBranchId, commit: &CommitId) -> bool {
    self
      .sets
      .entry(owner)
      .or_insert_with(|| {
        graph
          .sub_branch(owner)
          .map(|sub_branch| graph.ancestors(&sub_branch.tip))
          .unwrap_or_default()
      })
      .contains(commit)
  }
}

/// Walk the first-parent chain below the tip of `owner`.
///
/// The walk stops at commits it already shares with a branch of the same
/// name, at firm claims, and at commits owned by a branch that `owner` was
/// merged into. Other claimed commits become contested and the walk goes on.
fn claim_first_parents(
  graph: &mut WorkingGraph,
  owner: SubBranchId,
  ancestors: &mut AncestorCache,
) -> Result<(), ReconstructError> {
  let sub_branch = graph.sub_branch(owner)?;
  let tip = sub_branch.tip.clone();
  if !graph.claimants(&tip).contains(&owner) {
    return Ok(());
  }

  let name = sub_branch.name.clone();
  let reference = sub_branch
    .local_tip
    .clone()
    .or_else(|| sub_branch.remote_tip.clone())
    .unwrap_or_else(|| tip.clone());
  let mut current = graph.first_parent(&tip);

  while let Some(id) = current {
    let claimants = graph.claimants(&id).to_vec();

    if claimants.is_empty() {
      graph.claim(&id, owner);
      current = graph.first_parent(&id);
      continue;
    }
    if claimants.contains(&owner) {
      break;
    }
    if shares_name(graph, &claimants, &name) {
      graph.claim(&id, owner);
      break;
    }
    if graph.is_firm(&id) {
      break;
    }
    if claimants
      .iter()
      .any(|claimant| ancestors.reaches(graph, *claimant, &reference))
    {
      trace!(branch = %name, commit = %id, "reached the branch it was merged into");
      break;
    }

    trace!(branch = %name, commit = %id, "sharing commit with another branch");
    graph.claim(&id, owner);
    current = graph.first_parent(&id);
  }

  Ok(())
}

/// `Merge branch 'x' of <url>` merges the remote copy of `x` into the local
/// one, so the second-parent chain belongs to `x` as well.
fn extend_pull_merges(graph: &mut WorkingGraph, ordered: &[CommitId]) -> Result<usize, ReconstructError> {
  let mut extended = 0usize;

  for id in ordered {
    let node = graph.node(id)?;
    let Some(second) = node.second_parent().cloned() else {
      continue;
    };
    let names = parse_merge_subject(&node.subject);
    if !names.is_pull_merge() || !graph.is_present(&second) || graph.is_claimed(&second) {
      continue;
    }
    let Some(branch) = names.source else {
      continue;
    };

    let owner = graph
      .claimants(id)
      .iter()
      .copied()
      .find(|claimant| graph.name_of(*claimant) == branch)
      .or_else(|| graph.find_by_name(&branch));
    let owner = match owner {
      Some(owner) => owner,
      None => graph.add_sub_branch(branch.as_str(), second.clone()),
    };

    let mut current = Some(second);
    while let Some(commit) = current {
      graph.claim(&commit, owner);
      extended += 1;
      current = graph
        .first_parent(&commit)
        .filter(|parent| !graph.is_claimed(parent));
    }
  }

  Ok(extended)
}

fn is_open(graph: &WorkingGraph, id: &CommitId) -> bool {
  graph.is_present(id) && !graph.is_claimed(id) && graph.commits.get(id).is_some_and(|node| !node.is_virtual)
}

/// Name known for an unclaimed commit from its subject or from propagation.
fn open_name<'a>(graph: &'a WorkingGraph, inferred: &'a HashMap<CommitId, String>, id: &CommitId) -> Option<&'a str> {
  inferred.get(id).map(String::as_str).or_else(|| {
    graph
      .commits
      .get(id)
      .and_then(|node| node.subject_branch_name.as_deref())
  })
}

/// Name a commit is known by for voting: its owner when every claimant agrees
/// on one name, otherwise what [`open_name`] reports.
fn known_name<'a>(graph: &'a WorkingGraph, inferred: &'a HashMap<CommitId, String>, id: &CommitId) -> Option<&'a str> {
  match graph.claimants(id) {
    [] => open_name(graph, inferred, id),
    [first, rest @ ..] => {
      let name = graph.name_of(*first);
      rest.iter().all(|other| graph.name_of(*other) == name).then_some(name)
    }
  }
}

/// Fill names into unclaimed commits.
///
/// A named commit passes its name down to an unnamed unclaimed first parent,
/// repeatedly. An unnamed commit whose first-children all carry the same name
/// adopts it, which is repeated until nothing changes.
fn propagate_names(graph: &WorkingGraph, ordered: &[CommitId]) -> Result<HashMap<CommitId, String>, ReconstructError> {
  let mut inferred: HashMap<CommitId, String> = HashMap::new();

  let mut queue: VecDeque<CommitId> = ordered
    .iter()
    .filter(|id| {
      graph.commits.get(id).is_some_and(|node| {
        node.specified_branch_name.is_some() || (!graph.is_claimed(id) && node.subject_branch_name.is_some())
      })
    })
    .cloned()
    .collect();

  while let Some(id) = queue.pop_front() {
    let node = graph.node(&id)?;
    let name = node
      .specified_branch_name
      .clone()
      .or_else(|| open_name(graph, &inferred, &id).map(str::to_string));
    let (Some(name), Some(parent)) = (name, graph.first_parent(&id)) else {
      continue;
    };
    if !is_open(graph, &parent) || open_name(graph, &inferred, &parent).is_some() {
      continue;
    }
    inferred.insert(parent.clone(), name);
    queue.push_back(parent);
  }

  let is_unnamed = |inferred: &HashMap<CommitId, String>, id: &CommitId| {
    is_open(graph, id) && open_name(graph, inferred, id).is_none()
  };
  let mut queue: VecDeque<CommitId> = ordered.iter().filter(|id| is_unnamed(&inferred, id)).cloned().collect();
  let mut queued: HashSet<CommitId> = queue.iter().cloned().collect();

  while let Some(id) = queue.pop_front() {
    queued.remove(&id);
    if !is_unnamed(&inferred, &id) {
      continue;
    }

    let children = graph.first_children(&id);
    let mut names = children.iter().map(|child| known_name(graph, &inferred, child));
    let Some(Some(first)) = names.next() else {
      continue;
    };
    let first = first.to_string();
    if !names.all(|name| name == Some(first.as_str())) {
      continue;
    }

    inferred.insert(id.clone(), first);
    if let Some(parent) = graph.first_parent(&id)
      && is_unnamed(&inferred, &parent)
      && queued.insert(parent.clone())
    {
      queue.push_back(parent);
    }
  }

  Ok(inferred)
}

/// Turn every remaining unclaimed commit into a branch of its own.
///
/// Tops are unclaimed commits without unclaimed first-children. Each walks its
/// first-parent chain until a claimed commit or a commit known under a
/// different name, which then becomes a top itself.
fn discover_referenced_branches(
  graph: &mut WorkingGraph,
  inferred: &HashMap<CommitId, String>,
) -> Result<usize, ReconstructError> {
  let mut discovered = 0usize;

  loop {
    let tops: Vec<CommitId> = graph
      .ordered_ids()
      .into_iter()
      .filter(|id| is_open(graph, id) && graph.first_children(id).iter().all(|child| !is_open(graph, child)))
      .collect();
    if tops.is_empty() {
      break;
    }

    for top in tops {
      if !is_open(graph, &top) {
        continue;
      }

      let known = open_name(graph, inferred, &top).map(str::to_string);
      let is_anonymous = known.is_none();
      let name = known.unwrap_or_else(|| format!("{ANONYMOUS_PREFIX}{}", top.short()));
      let owner = graph.add_sub_branch(name.as_str(), top.clone());
      graph.sub_branch_mut(owner)?.is_anonymous = is_anonymous;
      discovered += 1;

      let mut current = Some(top);
      while let Some(id) = current {
        graph.claim(&id, owner);
        current = graph.first_parent(&id).filter(|parent| {
          is_open(graph, parent)
            && match open_name(graph, inferred, parent) {
              None => true,
              Some(parent_name) => !is_anonymous && parent_name == name,
            }
        });
      }
      trace!(branch = %name, "discovered branch without a ref");
    }
  }

  Ok(discovered)
}

/// Synthetic commits belong to the branch of the commit they were added on.
fn adopt_parent_claims(graph: &mut WorkingGraph, ordered: &[CommitId]) -> Result<(), ReconstructError> {
  for id in ordered.iter().rev() {
    let node = graph.node(id)?;
    if !node.is_virtual || graph.is_claimed(id) {
      continue;
    }
    if let Some(parent) = graph.first_parent(id) {
      let claimants = graph.claimants(&parent).to_vec();
      graph.set_claimants(id, claimants);
    }
  }
  Ok(())
}
