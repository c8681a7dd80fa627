//! Git repository management for testing
//!
//! This module provides a temporary git repository guard and helpers that
//! shape history in it.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use git2::build::CheckoutBuilder;
use git2::{BranchType, Oid, Repository, Signature};
use tempfile::TempDir;

/// A test guard that owns a temporary git repository. The directory is
/// removed when the guard is dropped.
pub struct GitRepoTestGuard {
  /// The temporary directory containing the git repository
  pub temp_dir: TempDir,
  /// The git repository
  pub repo: Repository,
}

impl GitRepoTestGuard {
  /// Create a new test git repository whose initial branch is `master`
  pub fn new() -> Self {
    let temp_dir = TempDir::new().expect("Failed to create temporary directory");
    let temp_path = temp_dir.path();

    let repo = Repository::init(temp_path).expect("Failed to initialize git repository");
    repo
      .set_head("refs/heads/master")
      .expect("Failed to point HEAD at master");

    let mut config = repo.config().expect("Failed to get repository config");
    config
      .set_str("user.name", "Lineage Test User")
      .expect("Failed to set user.name");
    config
      .set_str("user.email", "lineage-test@example.com")
      .expect("Failed to set user.email");

    assert!(
      temp_path.join(".git").exists(),
      "Git repository was not properly initialized"
    );

    Self { temp_dir, repo }
  }

  /// Get the path to the git repository
  pub fn path(&self) -> &Path {
    self.temp_dir.path()
  }
}

impl Default for GitRepoTestGuard {
  fn default() -> Self {
    Self::new()
  }
}

fn signature() -> Result<Signature<'static>> {
  Ok(Signature::now("Test User", "test@example.com")?)
}

fn workdir(repo: &Repository) -> Result<&Path> {
  repo.workdir().context("Repository has no working directory")
}

/// Write `file_name`, stage it and commit on top of `HEAD`
pub fn create_commit(repo: &Repository, file_name: &str, content: &str, message: &str) -> Result<Oid> {
  fs::write(workdir(repo)?.join(file_name), content)?;

  let mut index = repo.index()?;
  index.add_path(Path::new(file_name))?;
  index.write()?;

  let tree = repo.find_tree(index.write_tree()?)?;
  let signature = signature()?;

  let parent = repo.head().ok().and_then(|head| head.peel_to_commit().ok());
  let parents: Vec<_> = parent.iter().collect();
  Ok(repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?)
}

/// Create a local branch at `start_point` (a local branch name) or at `HEAD`
pub fn create_branch(repo: &Repository, branch_name: &str, start_point: Option<&str>) -> Result<()> {
  let head = if let Some(start) = start_point {
    repo
      .find_branch(start, BranchType::Local)?
      .into_reference()
      .peel_to_commit()?
  } else {
    repo.head()?.peel_to_commit()?
  };

  repo.branch(branch_name, &head, false)?;
  Ok(())
}

/// Check out a local branch, replacing the working tree
pub fn checkout_branch(repo: &Repository, branch_name: &str) -> Result<()> {
  let obj = repo
    .revparse_single(&format!("refs/heads/{branch_name}"))?
    .peel_to_commit()?;

  repo.checkout_tree(&obj.into_object(), Some(CheckoutBuilder::new().force()))?;
  repo.set_head(&format!("refs/heads/{branch_name}"))?;

  Ok(())
}

/// Merge local branch `branch_name` into `HEAD` with a merge commit
pub fn merge_branch(repo: &Repository, branch_name: &str, message: &str) -> Result<Oid> {
  let ours = repo.head()?.peel_to_commit()?;
  let theirs = repo
    .find_branch(branch_name, BranchType::Local)?
    .into_reference()
    .peel_to_commit()?;

  let mut index = repo.merge_commits(&ours, &theirs, None)?;
  if index.has_conflicts() {
    anyhow::bail!("Merging {branch_name} produced conflicts");
  }
  let tree = repo.find_tree(index.write_tree_to(repo)?)?;
  let signature = signature()?;

  let oid = repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &[&ours, &theirs])?;
  repo.checkout_head(Some(CheckoutBuilder::new().force()))?;
  Ok(oid)
}

/// Create `refs/remotes/<remote>/<branch_name>` at `target`, adding the remote
/// if it does not exist yet
pub fn create_remote_branch(repo: &Repository, remote: &str, branch_name: &str, target: Oid) -> Result<()> {
  if repo.find_remote(remote).is_err() {
    let url = format!("file://{}", workdir(repo)?.display());
    repo.remote(remote, &url)?;
  }
  repo.reference(
    &format!("refs/remotes/{remote}/{branch_name}"),
    target,
    true,
    "lineage test remote branch",
  )?;
  Ok(())
}

/// Make local branch `branch_name` track `upstream` (e.g. `origin/feature`)
pub fn set_upstream(repo: &Repository, branch_name: &str, upstream: &str) -> Result<()> {
  let mut branch = repo.find_branch(branch_name, BranchType::Local)?;
  branch.set_upstream(Some(upstream))?;
  Ok(())
}
