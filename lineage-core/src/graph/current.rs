use tracing::{debug, instrument};

use super::working::WorkingGraph;
use crate::branch::{Branch, BranchId};
use crate::commit::CommitId;
use crate::source::HeadState;

/// Resolve the checked-out branch and commit.
///
/// A named `HEAD` prefers the local branch of that name whose tip is the head
/// commit; otherwise the branch owning the head commit is current.
#[instrument(skip_all)]
pub fn determine_current(
  graph: &WorkingGraph,
  branches: &[Branch],
  head: &HeadState,
) -> (Option<BranchId>, Option<CommitId>) {
  let commit = graph.head_commit.clone();

  let by_name = match head {
    HeadState::Branch(name) | HeadState::Unborn(name) => {
      let locals: Vec<&Branch> = branches
        .iter()
        .filter(|branch| branch.is_local && &branch.name == name)
        .collect();
      locals
        .iter()
        .find(|branch| commit.as_ref() == Some(&branch.tip_commit_id))
        .or_else(|| locals.first())
        .map(|branch| branch.id.clone())
    }
    HeadState::Detached(_) => None,
  };

  let branch = by_name.or_else(|| {
    commit
      .as_ref()
      .and_then(|id| graph.commits.get(id))
      .and_then(|node| node.branch_id.clone())
  });

  debug!(branch = ?branch, commit = ?commit, "determined current position");
  (branch, commit)
}
