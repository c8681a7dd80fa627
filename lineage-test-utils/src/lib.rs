//! Test utilities shared across the lineage workspace
//!
//! Temporary git repositories ([`GitRepoTestGuard`]) and helpers that build
//! history in them: commits, branches, merges and remote-tracking refs.
//!
//! The clippy dead_code lint is disabled for this crate because test utilities
//! may not be used by all tests, and the compiler cannot detect usage across
//! crate boundaries in development dependencies.

#![allow(dead_code)]

pub mod git;

pub use git::{
  GitRepoTestGuard, checkout_branch, create_branch, create_commit, create_remote_branch, merge_branch, set_upstream,
};
