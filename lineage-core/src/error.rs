//! Error types produced while reading repository data and reconstructing
//! branches.

use thiserror::Error;

use crate::commit::CommitId;

/// Errors reported by a [`RepositorySource`](crate::source::RepositorySource).
#[derive(Debug, Error)]
pub enum SourceError {
  /// Wrapper for lower-level errors originating from `git2`.
  #[error(transparent)]
  Git(#[from] git2::Error),
  /// A commit id handed to the source could not be parsed as an object id.
  #[error("invalid object id '{0}'")]
  InvalidObjectId(String),
  /// The source has no record of the requested data.
  #[error("{0}")]
  Unavailable(String),
  /// Wrapper for other error types.
  #[error(transparent)]
  Other(#[from] anyhow::Error),
}

/// Errors produced by a reconstruction cycle.
#[derive(Debug, Error)]
pub enum ReconstructError {
  /// Listing commits, branches or tags failed. Never retried.
  #[error("failed to read repository data: {0}")]
  Source(#[from] SourceError),
  /// A pass referenced a commit that is not present in the commit store.
  #[error("commit {0} is referenced but missing from the commit store")]
  MissingCommit(CommitId),
  /// A pass found the working graph in a state it cannot continue from.
  #[error("inconsistent repository structure: {0}")]
  Inconsistent(String),
  /// Reconstruction failed, and so did the retry from an empty graph.
  #[error("reconstruction failed after retrying from scratch: {second}")]
  RetryFailed {
    first: Box<ReconstructError>,
    second: Box<ReconstructError>,
  },
}

impl ReconstructError {
  /// Internal faults are recovered by discarding the working graph and running
  /// the pipeline once more from an empty commit store.
  pub fn is_internal(&self) -> bool {
    matches!(self, Self::MissingCommit(_) | Self::Inconsistent(_))
  }
}
