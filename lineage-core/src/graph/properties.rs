//! Randomised checks of the whole pipeline over generated histories.

use std::collections::{BTreeMap, HashMap, HashSet};

use proptest::prelude::*;
use proptest::sample::Index;

use crate::commit::{CommitId, CommitNode};
use crate::config::EngineConfig;
use crate::service::RepositoryStructureService;
use crate::source::{RawBranch, RawCommit, RepositoryData};
use crate::test_support::{RepoFixture, reconstruct, reconstruct_with};

const NAMES: [&str; 3] = ["feature", "topic", "fix"];

/// Commit `i` gets a first parent below `i`, optionally a distinct second
/// parent, and optionally a merge subject naming one of `NAMES`.
fn history() -> impl Strategy<Value = RepositoryData> {
  let commits = prop::collection::vec((any::<Index>(), prop::option::of(any::<Index>()), any::<bool>()), 1..24);
  let refs = prop::collection::vec((0..NAMES.len(), any::<Index>()), 0..4);

  (commits, refs).prop_map(|(commits, refs)| {
    let last = commits.len();
    let ids: Vec<String> = (0..=last).map(|index| format!("c{index:03}")).collect();
    let mut fixture = RepoFixture::new().commit(&ids[0], &[], "root");

    for (offset, (first, second, named)) in commits.into_iter().enumerate() {
      let index = offset + 1;
      let first = first.index(index);
      let mut parents = vec![ids[first].as_str()];
      if let Some(second) = second.map(|second| second.index(index))
        && second != first
      {
        parents.push(ids[second].as_str());
      }
      let subject = if parents.len() > 1 && named {
        format!("Merge branch '{}'", NAMES[index % NAMES.len()])
      } else {
        format!("change {index}")
      };
      fixture = fixture.commit(&ids[index], &parents, &subject);
    }

    fixture = fixture.branch("master", &ids[last]);
    let mut seen = BTreeMap::new();
    for (name, tip) in refs {
      seen.entry(NAMES[name]).or_insert_with(|| tip.index(ids.len()));
    }
    for (name, tip) in seen {
      fixture = fixture.branch(name, &ids[tip]);
    }
    fixture.build()
  })
}

/// A generated history and the same history with a branch `late` added off
/// one of its commits. The new commit is listed right before its parent, so a
/// newest-first walk reaches it after most of the known history.
fn grown_history() -> impl Strategy<Value = (RepositoryData, RepositoryData)> {
  (history(), any::<Index>()).prop_map(|(base, at)| {
    let mut grown = base.clone();
    let position = at.index(grown.commits.len());
    let parent = grown.commits[position].clone();
    grown.commits.insert(
      position,
      RawCommit {
        id: "late001".to_string(),
        parent_ids: vec![parent.id.clone()],
        subject: "late work".to_string(),
        ..parent
      },
    );
    grown.branches.push(RawBranch {
      name: "late".to_string(),
      tip_id: "late001".to_string(),
      is_remote: false,
      tracking_name: None,
      tracking_tip_id: None,
    });
    (base, grown)
  })
}

proptest! {
  #![proptest_config(ProptestConfig::with_cases(64))]

  #[test]
  fn reconstruction_is_deterministic(data in history()) {
    let first = serde_json::to_string(&reconstruct(&data)).unwrap();
    let second = serde_json::to_string(&reconstruct(&data)).unwrap();
    prop_assert_eq!(first, second);
  }

  #[test]
  fn every_commit_has_exactly_one_branch(data in history()) {
    let snapshot = reconstruct(&data);
    prop_assert!(snapshot.orphans().is_empty());

    let mut owners: HashMap<&str, usize> = HashMap::new();
    for branch in snapshot.branches() {
      for id in &branch.commit_ids {
        *owners.entry(id.as_str()).or_default() += 1;
        let owner = snapshot.commit(id).and_then(|commit| commit.branch_id.as_ref());
        prop_assert_eq!(owner, Some(&branch.id));
      }
    }
    prop_assert_eq!(owners.len(), snapshot.commits().len());
    prop_assert!(owners.values().all(|count| *count == 1));
  }

  #[test]
  fn no_branch_is_its_own_parent(data in history()) {
    let snapshot = reconstruct(&data);
    for branch in snapshot.branches() {
      prop_assert_ne!(branch.parent_branch_id.as_ref(), Some(&branch.id));
      if let Some(parent) = &branch.parent_branch_id {
        prop_assert!(snapshot.branch(parent).is_some());
      }
    }
  }

  #[test]
  fn unpushed_branches_are_entirely_ahead(data in history()) {
    let snapshot = reconstruct(&data);
    for branch in snapshot.branches().iter().filter(|branch| branch.is_active && branch.is_local) {
      prop_assert_eq!(branch.remote_ahead_count, 0);
      prop_assert_eq!(branch.local_ahead_count, branch.commit_ids.len());
    }
  }

  /// Walking first parents from a branch's newest commit visits exactly its
  /// commits. The second parent of a pull merge is the one way a branch may
  /// continue off that walk; generated histories have no pull merges.
  #[test]
  fn branch_commits_are_contiguous(data in history()) {
    let snapshot = reconstruct(&data);
    for branch in snapshot.branches().iter().filter(|branch| !branch.is_empty()) {
      let members: HashSet<&CommitId> = branch.commit_ids.iter().collect();
      let mut walked = Vec::new();
      let mut current = branch.commit_ids.first();
      while let Some(id) = current.filter(|id| members.contains(id)) {
        walked.push(id.clone());
        current = snapshot.commit(id).and_then(CommitNode::first_parent);
      }
      prop_assert_eq!(&walked, &branch.commit_ids, "branch {} is split", branch.id);
    }
  }

  #[test]
  fn incremental_refresh_matches_fresh_build((base, grown) in grown_history()) {
    let config = EngineConfig {
      ingest_cutoff: 2,
      ..EngineConfig::default()
    };
    let mut service = RepositoryStructureService::new(config.clone());
    service.refresh(&base).unwrap();
    let incremental = service.refresh(&grown).unwrap();
    let fresh = reconstruct_with(&grown, config);

    prop_assert!(incremental.commit(&CommitId::from("late001")).is_some());
    prop_assert_eq!(
      serde_json::to_value(incremental.branches()).unwrap(),
      serde_json::to_value(fresh.branches()).unwrap()
    );
    let owners = |commits: &[CommitNode]| {
      commits
        .iter()
        .map(|commit| (commit.id.clone(), commit.branch_id.clone()))
        .collect::<BTreeMap<_, _>>()
    };
    prop_assert_eq!(owners(incremental.commits()), owners(fresh.commits()));
  }
}
