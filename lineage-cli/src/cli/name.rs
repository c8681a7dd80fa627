//! # Name Command
//!
//! Records or clears the branch name pinned to a commit.

use std::io::Write;

use anyhow::{Context, Result};
use clap::Args;
use lineage_core::{CommitId, SpecifiedNames};
use tracing::info;

use super::Session;
use crate::output::{success_line, warning_line};

/// Command for pinning a commit to a branch name
#[derive(Args)]
pub struct NameArgs {
  /// Commit to name (any revision git understands)
  pub commit: String,

  /// Branch name the commit belongs to
  #[arg(required_unless_present = "clear", conflicts_with = "clear")]
  pub branch: Option<String>,

  /// Remove the recorded name instead
  #[arg(long)]
  pub clear: bool,
}

pub fn handle_name_command(args: NameArgs, session: &Session, out: &mut dyn Write) -> Result<()> {
  let repo = session.source.repository();
  let workdir = repo.workdir().context("Repository has no working directory")?;
  let commit = repo
    .revparse_single(&args.commit)
    .and_then(|object| object.peel_to_commit())
    .with_context(|| format!("Failed to resolve commit '{}'", args.commit))?;
  let commit_id = CommitId::new(commit.id().to_string());
  let short = commit_id.short();

  let mut names = SpecifiedNames::load(workdir)?;

  match args.branch {
    Some(branch) => {
      let previous = names.set(commit_id.as_str(), branch.as_str());
      names.save(workdir)?;
      info!(commit = %commit_id, branch = %branch, ?previous, "recorded branch name");
      writeln!(out, "{}", success_line(&format!("Commit {short} now belongs to '{branch}'")))?;
    }
    None => {
      if names.clear(commit_id.as_str()) {
        names.save(workdir)?;
        writeln!(out, "{}", success_line(&format!("Cleared the branch name of commit {short}")))?;
      } else {
        writeln!(out, "{}", warning_line(&format!("Commit {short} has no recorded branch name")))?;
      }
    }
  }
  Ok(())
}
