//! In-memory repository fixtures for engine tests.

use chrono::{DateTime, TimeZone, Utc};

use crate::branch::Branch;
use crate::commit::CommitStore;
use crate::config::EngineConfig;
use crate::graph::{
  WorkingGraph, apply_specified_names, build_hierarchy, reduce_multi_owners, resolve_ownership, seed_active_branches,
};
use crate::service::RepositoryStructureService;
use crate::snapshot::RepositorySnapshot;
use crate::source::{
  HeadState, RawBranch, RawCommit, RawTag, RepositoryData, RepositorySource, SpecifiedName, WorkingStatus,
};

/// Builder for [`RepositoryData`].
///
/// Commits are listed oldest first; each gets a commit date one minute after
/// the previous one. `build` reverses them so the data reads newest first,
/// the order a revwalk produces.
pub(crate) struct RepoFixture {
  data: RepositoryData,
  minute: i64,
}

impl RepoFixture {
  pub(crate) fn new() -> Self {
    Self {
      data: RepositoryData {
        head: HeadState::Branch("master".to_string()),
        ..RepositoryData::default()
      },
      minute: 0,
    }
  }

  pub(crate) fn date(minute: i64) -> DateTime<Utc> {
    Utc
      .timestamp_opt(1_700_000_000 + minute * 60, 0)
      .single()
      .unwrap_or_default()
  }

  pub(crate) fn commit(mut self, id: &str, parents: &[&str], subject: &str) -> Self {
    self.minute += 1;
    let date = Self::date(self.minute);
    self.data.commits.push(RawCommit {
      id: id.to_string(),
      parent_ids: parents.iter().map(|parent| parent.to_string()).collect(),
      subject: subject.to_string(),
      author: "Test User".to_string(),
      author_date: date,
      commit_date: date,
    });
    self
  }

  pub(crate) fn branch(mut self, name: &str, tip: &str) -> Self {
    self.data.branches.push(RawBranch {
      name: name.to_string(),
      tip_id: tip.to_string(),
      is_remote: false,
      tracking_name: None,
      tracking_tip_id: None,
    });
    self
  }

  /// Local branch tracking `origin/<name>`, plus the remote ref itself.
  pub(crate) fn tracked_branch(mut self, name: &str, local_tip: &str, remote_tip: &str) -> Self {
    let remote_name = format!("origin/{name}");
    self.data.branches.push(RawBranch {
      name: name.to_string(),
      tip_id: local_tip.to_string(),
      is_remote: false,
      tracking_name: Some(remote_name.clone()),
      tracking_tip_id: Some(remote_tip.to_string()),
    });
    self.data.branches.push(RawBranch {
      name: remote_name,
      tip_id: remote_tip.to_string(),
      is_remote: true,
      tracking_name: None,
      tracking_tip_id: None,
    });
    self
  }

  pub(crate) fn remote_branch(mut self, name: &str, tip: &str) -> Self {
    self.data.branches.push(RawBranch {
      name: format!("origin/{name}"),
      tip_id: tip.to_string(),
      is_remote: true,
      tracking_name: None,
      tracking_tip_id: None,
    });
    self
  }

  pub(crate) fn tag(mut self, name: &str, commit: &str) -> Self {
    self.data.tags.push(RawTag {
      commit_id: commit.to_string(),
      name: name.to_string(),
    });
    self
  }

  pub(crate) fn head(mut self, head: HeadState) -> Self {
    self.data.head = head;
    self
  }

  pub(crate) fn status(mut self, changed: usize, conflicted: usize) -> Self {
    self.data.status = WorkingStatus { changed, conflicted };
    self
  }

  pub(crate) fn specified(mut self, commit: &str, branch: &str) -> Self {
    self.data.specified_names.push(SpecifiedName {
      commit_id: commit.to_string(),
      branch_name: branch.to_string(),
    });
    self
  }

  pub(crate) fn build(mut self) -> RepositoryData {
    self.data.commits.reverse();
    self.data
  }
}

/// Ingest every commit of `data` into a fresh working graph.
pub(crate) fn working_graph(data: &RepositoryData) -> WorkingGraph {
  let mut commits = CommitStore::new();
  commits.ingest(data.commits().unwrap(), None).unwrap();
  WorkingGraph::new(commits).unwrap()
}

/// Run the stages up to and including the hierarchy builder.
pub(crate) fn hierarchy(data: &RepositoryData) -> (WorkingGraph, Vec<Branch>) {
  let config = EngineConfig::default();
  let mut graph = working_graph(data);
  seed_active_branches(&mut graph, &data.branches, &data.head, data.status, &config);
  apply_specified_names(&mut graph, &data.specified_names);
  resolve_ownership(&mut graph, &config).unwrap();
  reduce_multi_owners(&mut graph).unwrap();
  let branches = build_hierarchy(&mut graph, &config).unwrap();
  (graph, branches)
}

/// Run the whole pipeline with the default configuration.
pub(crate) fn reconstruct(data: &RepositoryData) -> RepositorySnapshot {
  reconstruct_with(data, EngineConfig::default())
}

pub(crate) fn reconstruct_with(data: &RepositoryData, config: EngineConfig) -> RepositorySnapshot {
  let mut service = RepositoryStructureService::new(config);
  let snapshot = service.refresh(data).unwrap();
  (*snapshot).clone()
}
