//! Commit nodes and the arena that owns them.
//!
//! Nodes never hold references to each other. Parents, children and owning
//! branches are expressed as ids that are looked up in the [`CommitStore`],
//! which keeps the graph free of reference cycles and makes freezing a
//! finished graph a plain move.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use tracing::{debug, trace};

use crate::branch::BranchId;
use crate::error::{ReconstructError, SourceError};
use crate::graph::working::SubBranchId;
use crate::source::RawCommit;

/// Number of characters shown for abbreviated commit ids.
pub const SHORT_ID_LENGTH: usize = 6;

/// Id of the synthetic commit standing in for uncommitted working tree changes.
pub const UNCOMMITTED_ID: &str = "0000000000000000000000000000000000000000";

/// Id of the synthetic root used when a repository has no commits yet.
pub const EMPTY_REPOSITORY_ID: &str = "0000000000000000000000000000000000000001";

/// Content hash identifying a commit.
///
/// Wraps an `Arc<str>` so ids are cheap to clone into parent and child lists.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct CommitId(Arc<str>);

impl CommitId {
  pub fn new(id: impl Into<Arc<str>>) -> Self {
    Self(id.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// Display prefix of the id.
  pub fn short(&self) -> &str {
    self.0.get(..SHORT_ID_LENGTH).unwrap_or(&self.0)
  }
}

impl fmt::Debug for CommitId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("CommitId").field(&self.as_str()).finish()
  }
}

impl fmt::Display for CommitId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl From<&str> for CommitId {
  fn from(value: &str) -> Self {
    Self::new(Arc::<str>::from(value))
  }
}

impl From<String> for CommitId {
  fn from(value: String) -> Self {
    Self::new(Arc::<str>::from(value))
  }
}

impl Serialize for CommitId {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(self.as_str())
  }
}

/// One commit together with everything the reconstruction learns about it.
#[derive(Debug, Clone, Serialize)]
pub struct CommitNode {
  pub id: CommitId,
  pub short_id: String,
  pub subject: String,
  pub author: String,
  pub author_date: DateTime<Utc>,
  pub commit_date: DateTime<Utc>,
  /// Ordered parents; the first entry is the first parent.
  pub parent_ids: Vec<CommitId>,
  pub child_ids: Vec<CommitId>,
  /// Children whose first parent is this commit.
  pub first_child_ids: Vec<CommitId>,
  /// Final owner, assigned by the hierarchy builder.
  pub branch_id: Option<BranchId>,
  /// Ownership fragment; only meaningful while a reconstruction is running.
  #[serde(skip)]
  pub sub_branch_id: Option<SubBranchId>,
  /// Branch name inferred from merge subjects (this commit's or a child's).
  pub subject_branch_name: Option<String>,
  /// Name assigned manually; overrides every heuristic.
  pub specified_branch_name: Option<String>,
  /// Names of active branches whose ref points here, for display.
  pub branch_tips: Option<String>,
  /// Bracketed tag labels, for display.
  pub tags: String,
  pub is_local_ahead: bool,
  pub is_remote_ahead: bool,
  pub is_common: bool,
  pub is_virtual: bool,
  #[serde(skip)]
  is_stub: bool,
}

impl CommitNode {
  /// Build a fully populated node from collaborator data.
  pub fn from_raw(raw: RawCommit) -> Self {
    let id = CommitId::from(raw.id);
    Self {
      short_id: id.short().to_string(),
      id,
      subject: raw.subject,
      author: raw.author,
      author_date: raw.author_date,
      commit_date: raw.commit_date,
      parent_ids: raw.parent_ids.into_iter().map(CommitId::from).collect(),
      child_ids: Vec::new(),
      first_child_ids: Vec::new(),
      branch_id: None,
      sub_branch_id: None,
      subject_branch_name: None,
      specified_branch_name: None,
      branch_tips: None,
      tags: String::new(),
      is_local_ahead: false,
      is_remote_ahead: false,
      is_common: false,
      is_virtual: false,
      is_stub: false,
    }
  }

  /// Synthetic commit that does not exist in the repository.
  pub fn new_virtual(id: &str, subject: impl Into<String>, parent: Option<CommitId>, date: DateTime<Utc>) -> Self {
    let mut node = Self::from_raw(RawCommit {
      id: id.to_string(),
      parent_ids: Vec::new(),
      subject: subject.into(),
      author: String::new(),
      author_date: date,
      commit_date: date,
    });
    node.parent_ids = parent.into_iter().collect();
    node.is_virtual = true;
    node
  }

  fn stub(id: CommitId) -> Self {
    let mut node = Self::from_raw(RawCommit {
      id: id.to_string(),
      parent_ids: Vec::new(),
      subject: String::new(),
      author: String::new(),
      author_date: DateTime::<Utc>::default(),
      commit_date: DateTime::<Utc>::default(),
    });
    node.is_stub = true;
    node
  }

  /// The parent this commit was made on top of.
  pub fn first_parent(&self) -> Option<&CommitId> {
    self.parent_ids.first()
  }

  /// The parent that was merged in, for merge commits.
  pub fn second_parent(&self) -> Option<&CommitId> {
    self.parent_ids.get(1)
  }

  /// `true` when the node was only ever referenced as a parent and the
  /// collaborator never reported its data.
  pub fn is_stub(&self) -> bool {
    self.is_stub
  }
}

/// Counters describing one ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
  /// Commits whose data was added (new nodes or filled stubs).
  pub added: usize,
  /// Commits reported again although already present.
  pub known: usize,
  /// Whether the walk was aborted by the already-seen cut-off.
  pub cut_off: bool,
}

/// Arena of commit nodes keyed by id.
#[derive(Debug, Clone, Default)]
pub struct CommitStore {
  nodes: HashMap<CommitId, CommitNode>,
}

impl CommitStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  pub fn contains(&self, id: &CommitId) -> bool {
    self.nodes.contains_key(id)
  }

  pub fn get(&self, id: &CommitId) -> Option<&CommitNode> {
    self.nodes.get(id)
  }

  pub fn get_mut(&mut self, id: &CommitId) -> Option<&mut CommitNode> {
    self.nodes.get_mut(id)
  }

  /// Like [`get`](Self::get), for callers that hold an id they expect to be
  /// present.
  pub fn require(&self, id: &CommitId) -> Result<&CommitNode, ReconstructError> {
    self
      .nodes
      .get(id)
      .ok_or_else(|| ReconstructError::MissingCommit(id.clone()))
  }

  pub fn require_mut(&mut self, id: &CommitId) -> Result<&mut CommitNode, ReconstructError> {
    self
      .nodes
      .get_mut(id)
      .ok_or_else(|| ReconstructError::MissingCommit(id.clone()))
  }

  pub fn iter(&self) -> impl Iterator<Item = &CommitNode> {
    self.nodes.values()
  }

  pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut CommitNode> {
    self.nodes.values_mut()
  }

  pub fn into_nodes(self) -> impl Iterator<Item = CommitNode> {
    self.nodes.into_values()
  }

  /// Look up a commit by a unique id prefix.
  pub fn find_by_prefix(&self, prefix: &str) -> Option<&CommitNode> {
    let mut matches = self.nodes.values().filter(|node| node.id.as_str().starts_with(prefix));
    let first = matches.next()?;
    matches.next().is_none().then_some(first)
  }

  /// Add commits reported by the collaborator.
  ///
  /// With a `cutoff`, the walk stops once that many consecutive commits were
  /// already known together with all of their parents: nothing new can be
  /// upstream of them.
  pub fn ingest<I>(&mut self, commits: I, cutoff: Option<usize>) -> Result<IngestStats, SourceError>
  where
    I: IntoIterator<Item = Result<RawCommit, SourceError>>,
  {
    let mut stats = IngestStats::default();
    let mut consecutive_known = 0usize;

    for raw in commits {
      let raw = raw?;
      let id = CommitId::from(raw.id.as_str());

      if self.is_complete(&id) {
        stats.known += 1;
        let parents_known = self
          .nodes
          .get(&id)
          .is_some_and(|node| node.parent_ids.iter().all(|parent| self.is_complete(parent)));
        consecutive_known = if parents_known { consecutive_known + 1 } else { 0 };

        if let Some(limit) = cutoff
          && consecutive_known >= limit
        {
          debug!(known = stats.known, added = stats.added, "stopping ingestion at already-seen history");
          stats.cut_off = true;
          break;
        }
        continue;
      }

      consecutive_known = 0;
      self.insert(CommitNode::from_raw(raw));
      stats.added += 1;
    }

    debug!(added = stats.added, total = self.len(), "ingested commits");
    Ok(stats)
  }

  /// Insert a node and wire it to its parents, creating stubs for parents that
  /// have not been reported yet. A stub with the same id is replaced while its
  /// child links are kept.
  pub fn insert(&mut self, mut node: CommitNode) {
    if let Some(existing) = self.nodes.remove(&node.id) {
      node.child_ids = existing.child_ids;
      node.first_child_ids = existing.first_child_ids;
    }

    for (index, parent_id) in node.parent_ids.iter().enumerate() {
      let parent = self.nodes.entry(parent_id.clone()).or_insert_with(|| {
        trace!(parent = %parent_id, "creating stub for unreported parent");
        CommitNode::stub(parent_id.clone())
      });
      if !parent.child_ids.contains(&node.id) {
        parent.child_ids.push(node.id.clone());
      }
      if index == 0 && !parent.first_child_ids.contains(&node.id) {
        parent.first_child_ids.push(node.id.clone());
      }
    }

    self.nodes.insert(node.id.clone(), node);
  }

  /// Drop commits that can no longer be reached from `tips`, for example after
  /// a branch was deleted or rebased. Returns the number of removed commits.
  pub fn retain_reachable(&mut self, tips: &[CommitId]) -> usize {
    let mut reachable = HashSet::new();
    let mut stack: Vec<CommitId> = tips.iter().filter(|id| self.nodes.contains_key(*id)).cloned().collect();

    while let Some(id) = stack.pop() {
      if !reachable.insert(id.clone()) {
        continue;
      }
      if let Some(node) = self.nodes.get(&id) {
        stack.extend(node.parent_ids.iter().filter(|parent| self.nodes.contains_key(*parent)).cloned());
      }
    }

    let before = self.nodes.len();
    self.nodes.retain(|id, _| reachable.contains(id));
    for node in self.nodes.values_mut() {
      node.child_ids.retain(|child| reachable.contains(child));
      node.first_child_ids.retain(|child| reachable.contains(child));
    }

    let removed = before - self.nodes.len();
    if removed > 0 {
      debug!(removed, "dropped unreachable commits");
    }
    removed
  }

  /// Whether history reachable from `tips` has holes: a tip that was never
  /// reported, or a parent only known as a stub. After a cut-off walk this
  /// means commits the collaborator lists late were skipped.
  pub fn has_gaps(&self, tips: &[CommitId]) -> bool {
    let mut seen = HashSet::new();
    let mut stack: Vec<&CommitId> = tips.iter().collect();

    while let Some(id) = stack.pop() {
      if !seen.insert(id) {
        continue;
      }
      match self.nodes.get(id) {
        Some(node) if !node.is_stub => stack.extend(node.parent_ids.iter()),
        _ => {
          trace!(commit = %id, "history has a gap");
          return true;
        }
      }
    }
    false
  }

  fn is_complete(&self, id: &CommitId) -> bool {
    self.nodes.get(id).is_some_and(|node| !node.is_stub)
  }

  /// Insert a node without touching parent links.
  #[cfg(test)]
  pub(crate) fn insert_unwired(&mut self, node: CommitNode) {
    self.nodes.insert(node.id.clone(), node);
  }
}
