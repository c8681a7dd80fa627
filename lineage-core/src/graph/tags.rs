use tracing::{debug, instrument, trace};

use super::working::WorkingGraph;
use crate::commit::CommitId;
use crate::source::RawTag;

/// Append `[name]` labels to tagged commits that belong to a branch. Returns
/// the number of labels attached.
#[instrument(skip_all)]
pub fn annotate_tags(graph: &mut WorkingGraph, tags: &[RawTag]) -> usize {
  let mut sorted: Vec<&RawTag> = tags.iter().collect();
  sorted.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.commit_id.cmp(&b.commit_id)));

  let mut attached = 0;
  for tag in sorted {
    let id = CommitId::from(tag.commit_id.as_str());
    let Some(node) = graph.commits.get_mut(&id).filter(|node| node.branch_id.is_some()) else {
      trace!(tag = tag.name, commit = tag.commit_id, "tag points outside the branch graph");
      continue;
    };
    if !node.tags.is_empty() {
      node.tags.push(' ');
    }
    node.tags.push('[');
    node.tags.push_str(&tag.name);
    node.tags.push(']');
    attached += 1;
  }

  debug!(attached, "annotated tags");
  attached
}
