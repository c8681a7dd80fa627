//! # Lineage Core Library
//!
//! Reconstructs a navigable model of branches from a raw git commit graph.
//! Git does not remember which branch a commit was made on once the branch is
//! merged, deleted or rebased, so the engine infers ownership from topology,
//! ref tips and merge-commit subjects.
//!
//! The pipeline is driven by [`RepositoryStructureService`]: commits are
//! ingested into a [`CommitStore`], active refs seed sub-branches, ownership is
//! resolved, canonical branches and their hierarchy are built, ahead/behind
//! state is computed and tags are attached. The result is published as an
//! immutable [`RepositorySnapshot`].

pub mod branch;
pub mod commit;
pub mod config;
pub mod error;
pub mod git_source;
pub mod graph;
pub mod merge_names;
pub mod service;
pub mod snapshot;
pub mod source;
pub mod specified;

#[cfg(test)]
pub(crate) mod test_support;

pub use branch::{Branch, BranchId};
pub use commit::{CommitId, CommitNode, CommitStore, IngestStats};
pub use config::{ConfigDirs, EngineConfig};
pub use error::{ReconstructError, SourceError};
pub use git_source::Git2Source;
pub use merge_names::{MergeBranchNames, parse_merge_subject};
pub use service::RepositoryStructureService;
pub use snapshot::{RepositorySnapshot, SnapshotHandle};
pub use source::{
  CommitIter, Divergence, HeadState, RawBranch, RawCommit, RawTag, RepositoryData, RepositorySource, SpecifiedName,
  WorkingStatus,
};
pub use specified::SpecifiedNames;
