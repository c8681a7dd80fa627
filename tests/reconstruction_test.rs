//! End-to-end reconstruction over real git repositories.

use anyhow::Result;
use git2::{BranchType, Oid};
use lineage_core::{
  Branch, CommitId, EngineConfig, Git2Source, RepositorySnapshot, RepositoryStructureService,
};
use lineage_test_utils::git::{
  GitRepoTestGuard, checkout_branch, create_branch, create_commit, merge_branch,
};

fn reconstruct(guard: &GitRepoTestGuard) -> Result<RepositorySnapshot> {
  let source = Git2Source::open(guard.path())?;
  let mut service = RepositoryStructureService::new(EngineConfig::default());
  Ok((*service.refresh(&source)?).clone())
}

fn ids(branch: &Branch) -> Vec<&str> {
  branch.commit_ids.iter().map(CommitId::as_str).collect()
}

fn named<'a>(snapshot: &'a RepositorySnapshot, name: &'a str) -> &'a Branch {
  let mut matches = snapshot.branches_named(name);
  let branch = matches.next().unwrap_or_else(|| panic!("no branch named {name}"));
  assert!(matches.next().is_none(), "more than one branch named {name}");
  branch
}

fn oids(commits: &[Oid]) -> Vec<String> {
  commits.iter().map(Oid::to_string).collect()
}

#[test]
fn feature_branched_from_master() -> Result<()> {
  let guard = GitRepoTestGuard::new();
  let repo = &guard.repo;

  let m1 = create_commit(repo, "m1.txt", "m1", "initial")?;
  let m2 = create_commit(repo, "m2.txt", "m2", "second")?;
  create_branch(repo, "feature", None)?;
  checkout_branch(repo, "feature")?;
  let f1 = create_commit(repo, "f1.txt", "f1", "feature one")?;
  let f2 = create_commit(repo, "f2.txt", "f2", "feature two")?;
  checkout_branch(repo, "master")?;
  let m3 = create_commit(repo, "m3.txt", "m3", "third")?;

  let snapshot = reconstruct(&guard)?;
  assert_eq!(snapshot.branches().len(), 2);

  let master = named(&snapshot, "master");
  let feature = named(&snapshot, "feature");

  assert_eq!(ids(master), oids(&[m3, m2, m1]));
  assert_eq!(ids(feature), oids(&[f2, f1]));
  assert_eq!(feature.parent_branch_id.as_ref(), Some(&master.id));
  assert_eq!(
    feature.parent_commit_id.as_ref().map(CommitId::as_str),
    Some(m2.to_string().as_str())
  );
  assert!(master.parent_branch_id.is_none());
  assert_eq!(master.child_branch_ids, vec![feature.id.clone()]);
  assert_eq!(snapshot.current_branch().map(|branch| branch.name.as_str()), Some("master"));
  assert!(snapshot.orphans().is_empty());
  Ok(())
}

#[test]
fn merged_and_deleted_branch_is_recovered_from_merge_subject() -> Result<()> {
  let guard = GitRepoTestGuard::new();
  let repo = &guard.repo;

  create_commit(repo, "base.txt", "base", "initial")?;
  create_branch(repo, "feature", None)?;
  checkout_branch(repo, "feature")?;
  let f1 = create_commit(repo, "feature.txt", "feature", "feature work")?;
  checkout_branch(repo, "master")?;
  create_commit(repo, "master.txt", "master", "master work")?;
  merge_branch(repo, "feature", "Merge branch 'feature'")?;
  repo.find_branch("feature", BranchType::Local)?.delete()?;

  let snapshot = reconstruct(&guard)?;
  let master = named(&snapshot, "master");
  let feature = named(&snapshot, "feature");

  assert!(master.is_active);
  assert!(!feature.is_active);
  assert_eq!(ids(feature), oids(&[f1]));
  assert_eq!(feature.parent_branch_id.as_ref(), Some(&master.id));
  assert_eq!(master.commit_ids.len(), 3);
  Ok(())
}

#[test]
fn reconstruction_is_deterministic() -> Result<()> {
  let guard = GitRepoTestGuard::new();
  let repo = &guard.repo;

  create_commit(repo, "base.txt", "base", "initial")?;
  create_branch(repo, "topic", None)?;
  checkout_branch(repo, "topic")?;
  create_commit(repo, "topic.txt", "topic", "topic work")?;
  checkout_branch(repo, "master")?;
  create_commit(repo, "master.txt", "master", "master work")?;
  merge_branch(repo, "topic", "Merge branch 'topic' into master")?;
  create_commit(repo, "after.txt", "after", "after merge")?;

  let first = serde_json::to_string(&reconstruct(&guard)?)?;
  let second = serde_json::to_string(&reconstruct(&guard)?)?;
  assert_eq!(first, second);
  Ok(())
}

#[test]
fn uncommitted_changes_extend_the_current_branch() -> Result<()> {
  let guard = GitRepoTestGuard::new();
  create_commit(&guard.repo, "base.txt", "base", "initial")?;
  std::fs::write(guard.path().join("base.txt"), "edited")?;

  let snapshot = reconstruct(&guard)?;
  let master = named(&snapshot, "master");
  let current = snapshot.current_commit().expect("current commit");

  assert!(current.is_virtual);
  assert_eq!(master.tip_commit_id, current.id);
  assert_eq!(master.commit_ids.len(), 2);
  Ok(())
}
