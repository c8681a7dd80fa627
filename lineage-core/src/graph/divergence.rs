use std::collections::{HashMap, HashSet};

use tracing::{debug, instrument, warn};

use super::working::WorkingGraph;
use crate::branch::{Branch, BranchId};
use crate::commit::CommitId;
use crate::error::ReconstructError;
use crate::source::{Divergence, RepositorySource};

/// Oracle answers by `(local tip, remote tip)`, kept across refreshes.
pub type DivergenceCache = HashMap<(CommitId, CommitId), Divergence>;

#[derive(Clone, Copy)]
enum Side {
  Local,
  Remote,
}

/// Mark locally-ahead, remotely-ahead and common commits and count them for
/// every active local branch.
#[instrument(skip_all)]
pub fn compute_divergence(
  graph: &mut WorkingGraph,
  branches: &mut [Branch],
  source: &dyn RepositorySource,
  cache: &mut DivergenceCache,
) -> Result<(), ReconstructError> {
  let mut compared = 0usize;

  for branch in branches.iter_mut().filter(|branch| branch.is_active && branch.is_local) {
    let Some(local_tip) = branch.local_tip_id.clone() else {
      continue;
    };
    if graph.node(&local_tip)?.is_virtual {
      continue;
    }

    match branch.remote_tip_id.clone() {
      Some(remote_tip) if graph.is_present(&remote_tip) => {
        compare_tips(graph, branch, &local_tip, &remote_tip, source, cache)?;
        compared += 1;
      }
      Some(_) => {}
      None => mark_unpushed(graph, branch)?,
    }
  }

  debug!(compared, "computed ahead/behind state");
  Ok(())
}

fn compare_tips(
  graph: &mut WorkingGraph,
  branch: &mut Branch,
  local_tip: &CommitId,
  remote_tip: &CommitId,
  source: &dyn RepositorySource,
  cache: &mut DivergenceCache,
) -> Result<(), ReconstructError> {
  if local_tip == remote_tip {
    branch.local_ahead_count = 0;
    branch.remote_ahead_count = 0;
    return Ok(());
  }

  let key = (local_tip.clone(), remote_tip.clone());
  let divergence = match cache.get(&key) {
    Some(divergence) => Ok(divergence.clone()),
    None => source.divergence(local_tip.as_str(), remote_tip.as_str()).inspect(|divergence| {
      cache.insert(key, divergence.clone());
    }),
  };

  let divergence = match divergence {
    Ok(divergence) => divergence,
    Err(err) => {
      warn!(branch = %branch.id, error = %err, "divergence check failed; reporting 1 ahead and 1 behind");
      branch.local_ahead_count = 1;
      branch.remote_ahead_count = 1;
      return Ok(());
    }
  };

  let common = mark_common(graph, &CommitId::from(divergence.common_id.as_str()));
  let local = mark_side(graph, &branch.id, local_tip, Side::Local, &common)?;
  let remote = mark_side(graph, &branch.id, remote_tip, Side::Remote, &common)?;

  // Never report "ahead" without at least one visible commit.
  branch.local_ahead_count = if divergence.ahead == 0 { 0 } else { local.max(1) };
  branch.remote_ahead_count = if divergence.behind == 0 { 0 } else { remote.max(1) };
  Ok(())
}

/// The merge base and its first-parent ancestors are common history. Returns
/// the commits marked for this comparison; another branch's comparison may
/// already have flagged some of them.
fn mark_common(graph: &mut WorkingGraph, common: &CommitId) -> HashSet<CommitId> {
  let mut marked = HashSet::new();
  let mut current = Some(common.clone());
  while let Some(id) = current {
    let Some(node) = graph.commits.get_mut(&id) else {
      break;
    };
    if !marked.insert(id) {
      break;
    }
    node.is_common = true;
    current = node.first_parent().cloned();
  }
  marked
}

/// Depth-first from `tip` through commits of `branch` outside `common`.
fn mark_side(
  graph: &mut WorkingGraph,
  branch: &BranchId,
  tip: &CommitId,
  side: Side,
  common: &HashSet<CommitId>,
) -> Result<usize, ReconstructError> {
  let mut seen = HashSet::new();
  let mut stack = vec![tip.clone()];
  let mut count = 0;

  while let Some(id) = stack.pop() {
    if common.contains(&id) || !seen.insert(id.clone()) {
      continue;
    }
    let node = graph.commits.require_mut(&id)?;
    if node.branch_id.as_ref() != Some(branch) {
      continue;
    }
    match side {
      Side::Local => node.is_local_ahead = true,
      Side::Remote => node.is_remote_ahead = true,
    }
    count += 1;
    stack.extend(node.parent_ids.iter().cloned());
  }

  Ok(count)
}

/// A branch that was never pushed is entirely ahead.
fn mark_unpushed(graph: &mut WorkingGraph, branch: &mut Branch) -> Result<(), ReconstructError> {
  for id in &branch.commit_ids {
    graph.commits.require_mut(id)?.is_local_ahead = true;
  }
  branch.local_ahead_count = branch.commit_ids.len();
  branch.remote_ahead_count = 0;
  Ok(())
}
