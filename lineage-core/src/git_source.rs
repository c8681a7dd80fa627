//! [`RepositorySource`] over a real repository, backed by `git2`.

use std::path::Path;

use chrono::{DateTime, Utc};
use git2::{BranchType, Commit, ErrorCode, Oid, Repository, Sort, StatusOptions};
use tracing::{debug, trace};

use crate::error::SourceError;
use crate::source::{
  CommitIter, Divergence, HeadState, RawBranch, RawCommit, RawTag, RepositorySource, SpecifiedName, WorkingStatus,
};
use crate::specified::SpecifiedNames;

pub struct Git2Source {
  repo: Repository,
}

impl Git2Source {
  pub fn new(repo: Repository) -> Self {
    Self { repo }
  }

  /// Open the repository containing `path`.
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SourceError> {
    Ok(Self::new(Repository::discover(path)?))
  }

  pub fn repository(&self) -> &Repository {
    &self.repo
  }

  fn oid(id: &str) -> Result<Oid, SourceError> {
    Oid::from_str(id)
      .ok()
      .ok_or_else(|| SourceError::InvalidObjectId(id.to_string()))
  }
}

fn timestamp(time: git2::Time) -> DateTime<Utc> {
  DateTime::from_timestamp(time.seconds(), 0).unwrap_or_default()
}

fn raw_commit(commit: &Commit<'_>) -> RawCommit {
  let author = commit.author();
  RawCommit {
    id: commit.id().to_string(),
    parent_ids: commit.parent_ids().map(|oid| oid.to_string()).collect(),
    subject: commit.summary().unwrap_or_default().to_string(),
    author: author.name().unwrap_or_default().to_string(),
    author_date: timestamp(author.when()),
    commit_date: timestamp(commit.time()),
  }
}

impl RepositorySource for Git2Source {
  /// Walks every local and remote branch tip (and a detached `HEAD`) in
  /// topological order, children first.
  fn commits(&self) -> Result<CommitIter<'_>, SourceError> {
    let mut walk = self.repo.revwalk()?;
    walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;
    walk.push_glob("refs/heads")?;
    walk.push_glob("refs/remotes")?;
    if self.repo.head_detached().unwrap_or(false) {
      walk.push_head()?;
    }

    Ok(Box::new(walk.map(move |oid| -> Result<RawCommit, SourceError> {
      let commit = self.repo.find_commit(oid?)?;
      Ok(raw_commit(&commit))
    })))
  }

  fn branches(&self) -> Result<Vec<RawBranch>, SourceError> {
    let mut branches = Vec::new();

    for entry in self.repo.branches(None)? {
      let (branch, kind) = entry?;
      let Some(name) = branch.name()?.map(str::to_string) else {
        continue;
      };
      let is_remote = kind == BranchType::Remote;
      if is_remote && name.ends_with("/HEAD") {
        continue;
      }
      let Some(tip) = branch.get().target() else {
        continue;
      };

      let (tracking_name, tracking_tip_id) = match branch.upstream() {
        Ok(upstream) if !is_remote => (
          upstream.name()?.map(str::to_string),
          upstream.get().target().map(|oid| oid.to_string()),
        ),
        _ => (None, None),
      };

      branches.push(RawBranch {
        name,
        tip_id: tip.to_string(),
        is_remote,
        tracking_name,
        tracking_tip_id,
      });
    }

    debug!(count = branches.len(), "listed branches");
    Ok(branches)
  }

  /// Lightweight and annotated tags, peeled to the commit they mark.
  fn tags(&self) -> Result<Vec<RawTag>, SourceError> {
    let mut tags = Vec::new();

    for name in self.repo.tag_names(None)?.iter().flatten() {
      let reference = self.repo.find_reference(&format!("refs/tags/{name}"))?;
      match reference.peel_to_commit() {
        Ok(commit) => tags.push(RawTag {
          commit_id: commit.id().to_string(),
          name: name.to_string(),
        }),
        Err(err) => trace!(tag = name, error = %err, "tag does not point at a commit"),
      }
    }

    Ok(tags)
  }

  fn head(&self) -> Result<HeadState, SourceError> {
    let detached = self.repo.head_detached().unwrap_or(false);
    match self.repo.head() {
      Ok(head) if detached => Ok(HeadState::Detached(head.peel_to_commit()?.id().to_string())),
      Ok(head) => Ok(HeadState::Branch(head.shorthand().unwrap_or_default().to_string())),
      Err(err) if err.code() == ErrorCode::UnbornBranch => {
        let head = self.repo.find_reference("HEAD")?;
        let name = head
          .symbolic_target()
          .and_then(|target| target.strip_prefix("refs/heads/"))
          .unwrap_or_default();
        Ok(HeadState::Unborn(name.to_string()))
      }
      Err(err) => Err(err.into()),
    }
  }

  fn status(&self) -> Result<WorkingStatus, SourceError> {
    if self.repo.is_bare() {
      return Ok(WorkingStatus::default());
    }

    let mut options = StatusOptions::new();
    options
      .include_untracked(true)
      .recurse_untracked_dirs(true)
      .include_ignored(false);

    let mut status = WorkingStatus::default();
    for entry in self.repo.statuses(Some(&mut options))?.iter() {
      if entry.status().is_conflicted() {
        status.conflicted += 1;
      } else if !entry.status().is_ignored() {
        status.changed += 1;
      }
    }
    Ok(status)
  }

  fn specified_names(&self) -> Result<Vec<SpecifiedName>, SourceError> {
    match self.repo.workdir() {
      Some(workdir) => Ok(SpecifiedNames::load(workdir)?.to_entries()),
      None => Ok(Vec::new()),
    }
  }

  fn divergence(&self, local_tip: &str, remote_tip: &str) -> Result<Divergence, SourceError> {
    let local = Self::oid(local_tip)?;
    let remote = Self::oid(remote_tip)?;
    let common = self.repo.merge_base(local, remote)?;
    let (ahead, behind) = self.repo.graph_ahead_behind(local, remote)?;

    Ok(Divergence {
      common_id: common.to_string(),
      ahead,
      behind,
    })
  }
}

#[cfg(test)]
mod tests {
  use std::fs;

  use git2::Signature;
  use lineage_test_utils::git::{
    GitRepoTestGuard, checkout_branch, create_branch, create_commit, create_remote_branch, set_upstream,
  };

  use super::*;

  fn source(guard: &GitRepoTestGuard) -> Git2Source {
    Git2Source::open(guard.path()).unwrap()
  }

  #[test]
  fn lists_commits_children_first() {
    let guard = GitRepoTestGuard::new();
    let first = create_commit(&guard.repo, "a.txt", "a", "initial").unwrap();
    let second = create_commit(&guard.repo, "b.txt", "b", "second").unwrap();

    let source = source(&guard);
    let commits: Vec<RawCommit> = source.commits().unwrap().collect::<Result<_, _>>().unwrap();

    let ids: Vec<&str> = commits.iter().map(|commit| commit.id.as_str()).collect();
    assert_eq!(ids, vec![second.to_string(), first.to_string()]);
    assert_eq!(commits[0].subject, "second");
    assert_eq!(commits[0].parent_ids, vec![first.to_string()]);
    assert_eq!(commits[0].author, "Test User");
  }

  #[test]
  fn branches_report_their_upstream() {
    let guard = GitRepoTestGuard::new();
    let tip = create_commit(&guard.repo, "a.txt", "a", "initial").unwrap();
    create_remote_branch(&guard.repo, "origin", "master", tip).unwrap();
    set_upstream(&guard.repo, "master", "origin/master").unwrap();

    let mut branches = source(&guard).branches().unwrap();
    branches.sort_by(|a, b| a.name.cmp(&b.name));

    assert_eq!(branches.len(), 2);
    assert_eq!(branches[0].name, "master");
    assert_eq!(branches[0].tracking_name.as_deref(), Some("origin/master"));
    assert_eq!(branches[0].tracking_tip_id, Some(tip.to_string()));
    assert_eq!(branches[1].name, "origin/master");
    assert!(branches[1].is_remote);
  }

  #[test]
  fn annotated_tags_are_peeled() {
    let guard = GitRepoTestGuard::new();
    let tip = create_commit(&guard.repo, "a.txt", "a", "initial").unwrap();
    let object = guard.repo.find_object(tip, None).unwrap();
    let tagger = Signature::now("Test User", "test@example.com").unwrap();
    guard.repo.tag("v1.0", &object, &tagger, "release", false).unwrap();
    guard.repo.tag_lightweight("latest", &object, false).unwrap();

    let mut tags = source(&guard).tags().unwrap();
    tags.sort_by(|a, b| a.name.cmp(&b.name));

    assert_eq!(tags.len(), 2);
    assert!(tags.iter().all(|tag| tag.commit_id == tip.to_string()));
  }

  #[test]
  fn head_states() {
    let guard = GitRepoTestGuard::new();
    assert_eq!(source(&guard).head().unwrap(), HeadState::Unborn("master".into()));

    let tip = create_commit(&guard.repo, "a.txt", "a", "initial").unwrap();
    assert_eq!(source(&guard).head().unwrap(), HeadState::Branch("master".into()));

    guard.repo.set_head_detached(tip).unwrap();
    assert_eq!(source(&guard).head().unwrap(), HeadState::Detached(tip.to_string()));
  }

  #[test]
  fn status_counts_changed_files() {
    let guard = GitRepoTestGuard::new();
    create_commit(&guard.repo, "a.txt", "a", "initial").unwrap();
    assert!(source(&guard).status().unwrap().is_clean());

    fs::write(guard.path().join("a.txt"), "changed").unwrap();
    fs::write(guard.path().join("new.txt"), "new").unwrap();

    let status = source(&guard).status().unwrap();
    assert_eq!(status, WorkingStatus { changed: 2, conflicted: 0 });
  }

  #[test]
  fn divergence_uses_merge_base() {
    let guard = GitRepoTestGuard::new();
    let base = create_commit(&guard.repo, "a.txt", "a", "initial").unwrap();
    create_branch(&guard.repo, "other", None).unwrap();
    let local = create_commit(&guard.repo, "b.txt", "b", "local").unwrap();
    checkout_branch(&guard.repo, "other").unwrap();
    let remote = create_commit(&guard.repo, "c.txt", "c", "remote").unwrap();

    let divergence = source(&guard)
      .divergence(&local.to_string(), &remote.to_string())
      .unwrap();

    assert_eq!(divergence.common_id, base.to_string());
    assert_eq!((divergence.ahead, divergence.behind), (1, 1));
  }

  #[test]
  fn invalid_ids_are_rejected() {
    let guard = GitRepoTestGuard::new();
    let err = source(&guard).divergence("not-an-id", "also-not").unwrap_err();
    assert!(matches!(err, SourceError::InvalidObjectId(_)));
  }
}
