//! # Which Command
//!
//! Reports the branch a single commit was attributed to.

use std::io::Write;

use anyhow::{Context, Result};
use clap::Args;
use owo_colors::OwoColorize;

use super::Session;

/// Command for looking up the branch of a commit
#[derive(Args)]
pub struct WhichArgs {
  /// Commit id or unique id prefix
  pub commit: String,
}

pub fn handle_which_command(args: WhichArgs, session: &Session, out: &mut dyn Write) -> Result<()> {
  let snapshot = session.reconstruct()?;

  let commit = snapshot
    .commit_by_prefix(&args.commit)
    .with_context(|| format!("No commit uniquely matches '{}'", args.commit))?;
  let branch = commit
    .branch_id
    .as_ref()
    .and_then(|id| snapshot.branch(id))
    .with_context(|| format!("Commit {} does not belong to any branch", commit.short_id))?;

  if session.no_color {
    writeln!(out, "{} {}", branch.name, commit.short_id)?;
  } else {
    writeln!(out, "{} {}", branch.name.green().bold(), commit.short_id.yellow())?;
  }
  Ok(())
}
