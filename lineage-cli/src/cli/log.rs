//! # Log Command
//!
//! Lists commits newest first with the branch each one belongs to.

use std::io::Write;

use anyhow::{Context, Result, bail};
use clap::Args;
use lineage_core::{BranchId, CommitNode};

use super::Session;
use crate::render::format_commit_line;

/// Command for listing commits
#[derive(Args)]
pub struct LogArgs {
  /// Only show commits of the branch with this name (repeatable)
  #[arg(long = "branch", short = 'b', value_name = "NAME")]
  pub branches: Vec<String>,

  /// Maximum number of commits to show
  #[arg(long, short = 'n', default_value_t = 20)]
  pub max_count: usize,

  /// Print commits as JSON
  #[arg(long)]
  pub json: bool,
}

pub fn handle_log_command(args: LogArgs, session: &Session, out: &mut dyn Write) -> Result<()> {
  let snapshot = session.reconstruct()?;

  let commits: Vec<&CommitNode> = if args.branches.is_empty() {
    snapshot.commits().iter().collect()
  } else {
    let mut ids: Vec<BranchId> = Vec::new();
    for name in &args.branches {
      let before = ids.len();
      ids.extend(snapshot.branches_named(name).map(|branch| branch.id.clone()));
      if ids.len() == before {
        bail!("No branch named '{name}'");
      }
    }
    snapshot.commits_for(&ids)
  };
  let commits: Vec<&CommitNode> = commits.into_iter().take(args.max_count).collect();

  if args.json {
    let json = serde_json::to_string_pretty(&commits).context("Failed to serialize commits")?;
    writeln!(out, "{json}")?;
    return Ok(());
  }

  for commit in commits {
    let branch_name = commit
      .branch_id
      .as_ref()
      .and_then(|id| snapshot.branch(id))
      .map(|branch| branch.name.as_str());
    writeln!(out, "{}", format_commit_line(commit, branch_name, session.no_color))?;
  }
  Ok(())
}
