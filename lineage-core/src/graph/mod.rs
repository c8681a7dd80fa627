//! Reconstruction stages.
//!
//! Each stage is a function over the [`WorkingGraph`](working::WorkingGraph),
//! invoked by the service in this order: seed, specified names, ownership,
//! multi-owner reduction, hierarchy, divergence, tags, current.

mod current;
mod divergence;
mod hierarchy;
mod multi;
mod ownership;
mod seeder;
mod tags;
pub mod working;

pub(crate) use current::determine_current;
pub(crate) use divergence::{DivergenceCache, compute_divergence};
pub(crate) use hierarchy::build_hierarchy;
pub(crate) use multi::reduce_multi_owners;
pub(crate) use ownership::{apply_specified_names, resolve_ownership};
pub(crate) use seeder::seed_active_branches;
pub(crate) use tags::annotate_tags;
pub use working::SubBranchId;
pub(crate) use working::WorkingGraph;

#[cfg(test)]
mod properties;
