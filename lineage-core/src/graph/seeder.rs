use chrono::{DateTime, Duration, Utc};
use tracing::{debug, instrument, warn};

use super::working::{SubBranchId, TrackedPair, WorkingGraph};
use crate::commit::{CommitId, CommitNode, EMPTY_REPOSITORY_ID, UNCOMMITTED_ID};
use crate::config::EngineConfig;
use crate::source::{HeadState, RawBranch, WorkingStatus};

pub const NO_COMMITS_SUBJECT: &str = "<no commits yet>";

/// Create one active sub-branch per live ref and the synthetic commits that
/// stand in for an empty repository and for uncommitted changes.
#[instrument(skip_all)]
pub fn seed_active_branches(
  graph: &mut WorkingGraph,
  refs: &[RawBranch],
  head: &HeadState,
  status: WorkingStatus,
  config: &EngineConfig,
) {
  if graph.commits.is_empty() {
    seed_empty_repository(graph, head, config);
  }

  let mut locals: Vec<&RawBranch> = refs.iter().filter(|raw| !raw.is_remote).collect();
  locals.sort_by(|a, b| a.name.cmp(&b.name));
  let mut remotes: Vec<&RawBranch> = refs
    .iter()
    .filter(|raw| raw.is_remote && !raw.name.ends_with("/HEAD"))
    .collect();
  remotes.sort_by(|a, b| a.name.cmp(&b.name));

  for raw in &locals {
    seed_ref(graph, &raw.name, &raw.tip_id, false);
  }
  for raw in &remotes {
    seed_ref(graph, config.strip_remote(&raw.name), &raw.tip_id, true);
  }

  for raw in &locals {
    link_tracking(graph, raw, config);
  }

  graph.head_commit = resolve_head(graph, head);

  if !status.is_clean()
    && let Some(parent) = graph.head_commit.clone()
  {
    add_uncommitted(graph, head, status, parent);
  }

  debug!(
    sub_branches = graph.sub_branches.len(),
    tracked = graph.tracked.len(),
    "seeded active branches"
  );
}

fn seed_empty_repository(graph: &mut WorkingGraph, head: &HeadState, config: &EngineConfig) {
  let root_id = CommitId::from(EMPTY_REPOSITORY_ID);
  graph.add_virtual(CommitNode::new_virtual(
    EMPTY_REPOSITORY_ID,
    NO_COMMITS_SUBJECT,
    None,
    DateTime::<Utc>::default(),
  ));

  let name = match head {
    HeadState::Unborn(name) if !name.is_empty() => name.as_str(),
    _ => config.default_branch.as_str(),
  };
  let id = graph.add_sub_branch(name, root_id.clone());
  if let Ok(sub_branch) = graph.sub_branch_mut(id) {
    sub_branch.is_active = true;
    sub_branch.is_local = true;
    sub_branch.local_tip = Some(root_id);
  }
  debug!(branch = name, "repository has no commits; seeded placeholder root");
}

fn seed_ref(graph: &mut WorkingGraph, name: &str, tip_id: &str, is_remote: bool) -> Option<SubBranchId> {
  let tip = CommitId::from(tip_id);
  if !graph.is_present(&tip) {
    warn!(branch = name, tip = tip_id, "branch tip is not in the commit graph; skipping");
    return None;
  }

  let id = graph.add_sub_branch(name, tip.clone());
  if let Ok(sub_branch) = graph.sub_branch_mut(id) {
    sub_branch.is_active = true;
    if is_remote {
      sub_branch.is_remote = true;
      sub_branch.remote_tip = Some(tip);
    } else {
      sub_branch.is_local = true;
      sub_branch.local_tip = Some(tip);
    }
  }
  Some(id)
}

fn find_seeded(graph: &WorkingGraph, name: &str, is_remote: bool) -> Option<SubBranchId> {
  graph
    .sub_branches
    .iter()
    .find(|sub_branch| sub_branch.is_active && sub_branch.name == name && sub_branch.is_remote == is_remote)
    .map(|sub_branch| sub_branch.id)
}

fn link_tracking(graph: &mut WorkingGraph, raw: &RawBranch, config: &EngineConfig) {
  let Some(tracking_name) = raw.tracking_name.as_deref() else {
    return;
  };
  let Some(local) = find_seeded(graph, &raw.name, false) else {
    return;
  };

  let remote_name = config.strip_remote(tracking_name);
  let remote = match find_seeded(graph, remote_name, true) {
    Some(remote) => Some(remote),
    None => raw
      .tracking_tip_id
      .as_deref()
      .and_then(|tip| seed_ref(graph, remote_name, tip, true)),
  };

  if let Some(remote) = remote {
    graph.tracked.push(TrackedPair { local, remote });
  }
}

fn resolve_head(graph: &WorkingGraph, head: &HeadState) -> Option<CommitId> {
  match head {
    HeadState::Branch(name) => find_seeded(graph, name, false)
      .and_then(|id| graph.sub_branch(id).ok())
      .map(|sub_branch| sub_branch.tip.clone()),
    HeadState::Detached(id) => {
      let id = CommitId::from(id.as_str());
      graph.is_present(&id).then_some(id)
    }
    HeadState::Unborn(_) => {
      let root = CommitId::from(EMPTY_REPOSITORY_ID);
      graph.commits.contains(&root).then_some(root)
    }
  }
}

fn add_uncommitted(graph: &mut WorkingGraph, head: &HeadState, status: WorkingStatus, parent: CommitId) {
  let subject = if status.conflicted > 0 {
    format!("[{} conflicts in uncommitted changes]", status.conflicted)
  } else {
    format!("[{} uncommitted changes]", status.changed)
  };
  let date = graph.latest_commit_date() + Duration::seconds(1);
  let id = CommitId::from(UNCOMMITTED_ID);
  graph.add_virtual(CommitNode::new_virtual(UNCOMMITTED_ID, subject, Some(parent.clone()), date));

  let owner = graph
    .sub_branches
    .iter()
    .filter(|sub_branch| sub_branch.is_local && sub_branch.tip == parent)
    .find(|sub_branch| match head {
      HeadState::Branch(name) => &sub_branch.name == name,
      HeadState::Unborn(_) => true,
      HeadState::Detached(_) => false,
    })
    .map(|sub_branch| sub_branch.id);
  if let Some(owner) = owner
    && let Ok(sub_branch) = graph.sub_branch_mut(owner)
  {
    sub_branch.tip = id.clone();
  }

  graph.head_commit = Some(id);
}
