//! Reduction of commits claimed by more than one branch.
//!
//! Contested commits are grouped into buckets: runs along first-parent edges,
//! newest first. Buckets sit in a work-list. Each bucket is scanned from its
//! top for the first commit whose owner can be decided; the run from the top
//! down to that commit moves to the decided branch and the rest of the bucket
//! goes back to the front of the work-list. A bucket in which no commit can be
//! decided becomes a `Multi_<short id>` branch. Every step either shrinks the
//! work-list or retires a bucket, so the loop terminates.

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashSet, VecDeque};

use tracing::{debug, instrument, trace};

use super::ownership::ANONYMOUS_PREFIX;
use super::working::{SubBranchId, WorkingGraph};
use crate::commit::CommitId;
use crate::error::ReconstructError;

/// Prefix of names given to branches that stay ambiguous.
pub const MULTI_PREFIX: &str = "Multi_";

/// Counters describing one reduction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MultiStats {
  pub buckets: usize,
  pub resolved_runs: usize,
  pub ambiguous: usize,
}

/// Leave every commit with exactly one owner and record it as the commit's
/// sub-branch.
#[instrument(skip_all)]
pub fn reduce_multi_owners(graph: &mut WorkingGraph) -> Result<MultiStats, ReconstructError> {
  collapse_same_name_claims(graph);

  let buckets = collect_buckets(graph);
  let mut stats = MultiStats {
    buckets: buckets.len(),
    ..MultiStats::default()
  };
  let mut queue: VecDeque<Vec<CommitId>> = buckets.into();

  while let Some(bucket) = queue.pop_front() {
    let decided = bucket
      .iter()
      .enumerate()
      .find_map(|(index, id)| decide_owner(graph, id).map(|owner| (index, owner)));

    match decided {
      Some((index, owner)) => {
        for id in &bucket[..=index] {
          graph.claim_firm(id, owner);
        }
        trace!(branch = graph.name_of(owner), commits = index + 1, "resolved contested run");
        stats.resolved_runs += 1;

        let rest = bucket[index + 1..].to_vec();
        if !rest.is_empty() {
          queue.push_front(rest);
        }
      }
      None => {
        retire_bucket(graph, &bucket)?;
        stats.ambiguous += 1;
      }
    }
  }

  graph.assign_sub_branch_ids()?;
  debug!(
    buckets = stats.buckets,
    resolved = stats.resolved_runs,
    ambiguous = stats.ambiguous,
    "reduced multi-owner commits"
  );
  Ok(stats)
}

/// Local and remote refs of one branch claim the same commits; one claimant
/// per name is enough.
fn collapse_same_name_claims(graph: &mut WorkingGraph) {
  let updates: Vec<(CommitId, Vec<SubBranchId>)> = graph
    .contested()
    .filter_map(|(id, claimants)| {
      let mut seen = HashSet::new();
      let kept: Vec<SubBranchId> = claimants
        .iter()
        .copied()
        .filter(|claimant| seen.insert(graph.name_of(*claimant)))
        .collect();
      (kept.len() != claimants.len()).then(|| (id.clone(), kept))
    })
    .collect();

  for (id, claimants) in updates {
    graph.set_claimants(&id, claimants);
  }
}

/// Visiting contested commits by descending generation guarantees that a run
/// is entered at its newest commit.
fn collect_buckets(graph: &WorkingGraph) -> Vec<Vec<CommitId>> {
  let contested: HashSet<CommitId> = graph.contested().map(|(id, _)| id.clone()).collect();
  let mut ordered: Vec<&CommitId> = contested.iter().collect();
  ordered.sort_by_key(|id| (Reverse(graph.generation(id)), (*id).clone()));

  let mut assigned: HashSet<CommitId> = HashSet::new();
  let mut buckets = Vec::new();

  for top in ordered {
    if assigned.contains(top) {
      continue;
    }

    let mut bucket = Vec::new();
    let mut current = Some(top.clone());
    while let Some(id) = current {
      if !contested.contains(&id) || !assigned.insert(id.clone()) {
        break;
      }
      current = graph.first_parent(&id);
      bucket.push(id);
    }
    buckets.push(bucket);
  }

  buckets
}

/// Decide the owner of one contested commit, trying in order: the specified
/// name, the only named candidate, the self-named candidate among three, the
/// merge-subject name, and a unanimous vote of decided first-children.
fn decide_owner(graph: &WorkingGraph, id: &CommitId) -> Option<SubBranchId> {
  let node = graph.commits.get(id)?;
  let candidates = graph.claimants(id);
  let candidate_named =
    |name: &str| -> Vec<SubBranchId> { candidates.iter().copied().filter(|c| graph.name_of(*c) == name).collect() };

  if let Some(name) = &node.specified_branch_name {
    return candidate_named(name.as_str()).first().copied().or_else(|| graph.find_by_name(name));
  }

  let named: Vec<SubBranchId> = candidates
    .iter()
    .copied()
    .filter(|candidate| {
      graph
        .sub_branch(*candidate)
        .is_ok_and(|sub_branch| !sub_branch.is_anonymous && !sub_branch.is_multi)
    })
    .collect();
  if let [only] = named.as_slice() {
    return Some(*only);
  }

  // Heuristic: with exactly three candidates, the anonymous branch named after
  // this very commit wins. Not known to hold in general.
  let own_name = format!("{ANONYMOUS_PREFIX}{}", id.short());
  if candidates.len() == 3
    && let [own] = candidate_named(own_name.as_str()).as_slice()
  {
    return Some(*own);
  }

  if let Some(hint) = &node.subject_branch_name
    && let [matched] = candidate_named(hint.as_str()).as_slice()
  {
    return Some(*matched);
  }

  let votes: Vec<&str> = graph
    .first_children(id)
    .iter()
    .filter_map(|child| match graph.claimants(child) {
      [single] => Some(graph.name_of(*single)),
      _ => None,
    })
    .collect();
  if let Some(first) = votes.first()
    && votes.iter().all(|vote| vote == first)
    && let [matched] = candidate_named(*first).as_slice()
  {
    return Some(*matched);
  }

  None
}

fn retire_bucket(graph: &mut WorkingGraph, bucket: &[CommitId]) -> Result<(), ReconstructError> {
  let Some(top) = bucket.first() else {
    return Ok(());
  };

  let candidates: BTreeSet<String> = bucket
    .iter()
    .flat_map(|id| graph.claimants(id).iter().map(|claimant| graph.name_of(*claimant).to_string()))
    .collect();

  let owner = graph.add_sub_branch(format!("{MULTI_PREFIX}{}", top.short()), top.clone());
  let sub_branch = graph.sub_branch_mut(owner)?;
  sub_branch.is_multi = true;
  sub_branch.multi_candidates = candidates;

  for id in bucket {
    graph.claim_firm(id, owner);
  }
  trace!(top = %top, commits = bucket.len(), "left commits ambiguous");
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::EngineConfig;
  use crate::graph::ownership::{apply_specified_names, resolve_ownership};
  use crate::graph::seeder::seed_active_branches;
  use crate::source::RepositoryData;
  use crate::test_support::{RepoFixture, working_graph};

  fn reduced(data: &RepositoryData) -> (WorkingGraph, MultiStats) {
    let config = EngineConfig::default();
    let mut graph = working_graph(data);
    seed_active_branches(&mut graph, &data.branches, &data.head, data.status, &config);
    apply_specified_names(&mut graph, &data.specified_names);
    resolve_ownership(&mut graph, &config).unwrap();
    let stats = reduce_multi_owners(&mut graph).unwrap();
    (graph, stats)
  }

  fn owner(graph: &WorkingGraph, commit: &str) -> String {
    let id = graph.commits.get(&CommitId::from(commit)).unwrap().sub_branch_id.unwrap();
    graph.name_of(id).to_string()
  }

  fn stacked() -> RepoFixture {
    RepoFixture::new()
      .commit("m1", &[], "initial")
      .commit("a1", &["m1"], "shared one")
      .commit("a2", &["a1"], "shared two")
      .commit("t1", &["a2"], "topic work")
      .commit("o1", &["a2"], "other work")
      .branch("master", "m1")
      .branch("topic", "t1")
      .branch("other", "o1")
  }

  #[test]
  fn undecidable_run_becomes_multi_branch() {
    let (graph, stats) = reduced(&stacked().build());

    assert_eq!(stats.ambiguous, 1);
    assert_eq!(owner(&graph, "a2"), "Multi_a2");
    assert_eq!(owner(&graph, "a1"), "Multi_a2");

    let multi = graph.commits.get(&CommitId::from("a2")).unwrap().sub_branch_id.unwrap();
    let multi = graph.sub_branch(multi).unwrap();
    assert!(multi.is_multi);
    assert_eq!(
      multi.multi_candidates.iter().map(String::as_str).collect::<Vec<_>>(),
      vec!["other", "topic"]
    );
  }

  #[test]
  fn specified_name_prevents_ambiguity() {
    let (graph, stats) = reduced(&stacked().specified("a2", "topic").build());

    assert_eq!(stats.buckets, 0);
    assert_eq!(owner(&graph, "a2"), "topic");
    assert_eq!(owner(&graph, "a1"), "topic");
    assert_eq!(owner(&graph, "o1"), "other");
  }

  #[test]
  fn self_named_candidate_wins_among_three() {
    let mut graph = working_graph(
      &RepoFixture::new()
        .commit("c1", &[], "root")
        .commit("c2", &["c1"], "child")
        .build(),
    );
    let id = CommitId::from("c1");
    let first = graph.add_sub_branch("first", id.clone());
    let second = graph.add_sub_branch("second", id.clone());
    let own = graph.add_sub_branch("Branch_c1", id.clone());
    graph.sub_branch_mut(own).unwrap().is_anonymous = true;
    for candidate in [first, second, own] {
      graph.claim(&id, candidate);
    }

    assert_eq!(decide_owner(&graph, &id), Some(own));
  }

  #[test]
  fn subject_hint_decides_a_commit() {
    let data = RepoFixture::new()
      .commit("m1", &[], "initial")
      .commit("x1", &["m1"], "side")
      .commit("a1", &["m1", "x1"], "Merge branch 'side' into topic")
      .commit("t1", &["a1"], "topic work")
      .commit("o1", &["a1"], "other work")
      .branch("master", "m1")
      .branch("topic", "t1")
      .branch("other", "o1")
      .build();

    let (graph, _) = reduced(&data);

    assert_eq!(owner(&graph, "a1"), "topic");
    assert_eq!(owner(&graph, "x1"), "side");
  }

  #[test]
  fn first_children_vote_for_the_next_commit() {
    let data = RepoFixture::new()
      .commit("m1", &[], "initial")
      .commit("a1", &["m1"], "shared base")
      .commit("a2", &["a1"], "Merge branch 'x' into topic")
      .commit("t1", &["a2"], "topic work")
      .commit("o1", &["a2"], "other work")
      .branch("master", "m1")
      .branch("topic", "t1")
      .branch("other", "o1")
      .build();

    let (graph, stats) = reduced(&data);

    assert_eq!(owner(&graph, "a2"), "topic");
    assert_eq!(owner(&graph, "a1"), "topic");
    assert_eq!(stats.resolved_runs, 2);
  }

  #[test]
  fn same_name_claims_collapse_without_a_bucket() {
    let data = RepoFixture::new()
      .commit("m1", &[], "initial")
      .commit("f1", &["m1"], "feature")
      .commit("f2", &["f1"], "feature")
      .branch("master", "m1")
      .tracked_branch("feature", "f1", "f2")
      .build();

    let (graph, stats) = reduced(&data);

    assert_eq!(stats.buckets, 0);
    assert_eq!(owner(&graph, "f1"), "feature");
    assert_eq!(owner(&graph, "f2"), "feature");
  }
}
