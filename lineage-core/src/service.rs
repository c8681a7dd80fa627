//! Orchestration of a full reconstruction cycle.
//!
//! [`RepositoryStructureService`] keeps the ingested commits between refreshes
//! so later refreshes only read new history. Everything derived from the
//! commits is recomputed on every refresh and published as a fresh
//! [`RepositorySnapshot`].

use std::iter;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, info, instrument, warn};

use crate::commit::{CommitId, CommitStore};
use crate::config::EngineConfig;
use crate::error::ReconstructError;
use crate::graph::{
  DivergenceCache, WorkingGraph, annotate_tags, apply_specified_names, build_hierarchy, compute_divergence,
  determine_current, reduce_multi_owners, resolve_ownership, seed_active_branches,
};
use crate::snapshot::{RepositorySnapshot, SnapshotHandle};
use crate::source::{HeadState, RepositorySource};

/// Runs the reconstruction pipeline for one repository.
///
/// A service is single-writer: refreshes of the same repository must not
/// overlap. Readers on other threads observe results through
/// [`SnapshotHandle`].
#[derive(Debug)]
pub struct RepositoryStructureService {
  config: EngineConfig,
  cache: Option<CommitStore>,
  divergence_cache: DivergenceCache,
  generation: u64,
  handle: SnapshotHandle,
}

impl RepositoryStructureService {
  pub fn new(config: EngineConfig) -> Self {
    Self {
      config,
      cache: None,
      divergence_cache: DivergenceCache::new(),
      generation: 0,
      handle: SnapshotHandle::new(),
    }
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  /// Handle through which published snapshots can be read from other threads.
  pub fn handle(&self) -> SnapshotHandle {
    self.handle.clone()
  }

  pub fn latest(&self) -> Option<Arc<RepositorySnapshot>> {
    self.handle.latest()
  }

  /// Reconstruct the repository structure and publish the result.
  ///
  /// An internal fault discards the cached commits and reruns the pipeline
  /// once from an empty store. Errors reading repository data are returned as
  /// they are.
  #[instrument(skip_all, fields(generation = self.generation + 1))]
  pub fn refresh(&mut self, source: &dyn RepositorySource) -> Result<Arc<RepositorySnapshot>, ReconstructError> {
    let generation = self.generation + 1;
    let cached = self.cache.take();

    let (snapshot, commits) = match self.build(source, cached, generation) {
      Ok(built) => built,
      Err(first) if first.is_internal() => {
        warn!(error = %first, "reconstruction failed; retrying from an empty commit store");
        self.divergence_cache.clear();
        self
          .build(source, None, generation)
          .map_err(|second| ReconstructError::RetryFailed {
            first: Box::new(first),
            second: Box::new(second),
          })?
      }
      Err(err) => return Err(err),
    };

    self.cache = Some(commits);
    self.generation = generation;

    let snapshot = Arc::new(snapshot);
    self.handle.publish(Arc::clone(&snapshot));
    info!(
      generation,
      branches = snapshot.branches().len(),
      commits = snapshot.commits().len(),
      "published repository structure"
    );
    Ok(snapshot)
  }

  /// Run [`refresh`](Self::refresh) on a worker thread. The service is handed
  /// back together with the result once the refresh completes.
  pub fn refresh_in_background<S>(
    mut self,
    source: S,
  ) -> JoinHandle<(Self, Result<Arc<RepositorySnapshot>, ReconstructError>)>
  where
    S: RepositorySource + Send + 'static,
  {
    thread::spawn(move || {
      let result = self.refresh(&source);
      (self, result)
    })
  }

  fn build(
    &mut self,
    source: &dyn RepositorySource,
    cached: Option<CommitStore>,
    generation: u64,
  ) -> Result<(RepositorySnapshot, CommitStore), ReconstructError> {
    let refs = source.branches()?;
    let head = source.head()?;
    let mut tips: Vec<CommitId> = refs
      .iter()
      .flat_map(|raw| iter::once(raw.tip_id.as_str()).chain(raw.tracking_tip_id.as_deref()))
      .map(CommitId::from)
      .collect();
    if let HeadState::Detached(id) = &head {
      tips.push(CommitId::from(id.as_str()));
    }

    let cutoff = cached.as_ref().map(|_| self.config.ingest_cutoff);
    let mut commits = cached.unwrap_or_default();
    let mut stats = commits.ingest(source.commits()?, cutoff)?;
    if stats.cut_off && commits.has_gaps(&tips) {
      debug!(added = stats.added, "cut-off walk skipped reachable commits; reading full history");
      let full = commits.ingest(source.commits()?, None)?;
      stats.added += full.added;
      stats.cut_off = false;
    }

    let removed = commits.retain_reachable(&tips);
    debug!(
      added = stats.added,
      cut_off = stats.cut_off,
      removed,
      total = commits.len(),
      "commit store ready"
    );
    let next_cache = commits.clone();

    let tags = source.tags()?;
    let status = source.status()?;
    let specified = source.specified_names()?;

    let mut graph = WorkingGraph::new(commits)?;
    seed_active_branches(&mut graph, &refs, &head, status, &self.config);
    apply_specified_names(&mut graph, &specified);
    resolve_ownership(&mut graph, &self.config)?;
    reduce_multi_owners(&mut graph)?;
    let mut branches = build_hierarchy(&mut graph, &self.config)?;
    if self.config.compute_ahead_behind {
      compute_divergence(&mut graph, &mut branches, source, &mut self.divergence_cache)?;
    }
    annotate_tags(&mut graph, &tags);
    let (current_branch, current_commit) = determine_current(&graph, &branches, &head);

    let snapshot = RepositorySnapshot::new(
      generation,
      branches,
      graph.into_ordered_commits(),
      current_branch,
      current_commit,
    );
    Ok((snapshot, next_cache))
  }
}
