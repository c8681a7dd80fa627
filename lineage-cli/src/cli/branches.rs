//! # Branches Command
//!
//! Draws the reconstructed branch tree, or dumps every branch as JSON.

use std::io::Write;

use anyhow::{Context, Result};
use clap::Args;

use super::Session;
use crate::output::warning_line;
use crate::render::BranchTreeRenderer;

/// Command for showing the branch tree
#[derive(Args)]
pub struct BranchesArgs {
  /// Include branches that only survive in merge history
  #[arg(long, short = 'a')]
  pub all: bool,

  /// Print every branch as JSON instead of a tree
  #[arg(long)]
  pub json: bool,
}

pub fn handle_branches_command(args: BranchesArgs, session: &Session, out: &mut dyn Write) -> Result<()> {
  let snapshot = session.reconstruct()?;

  if args.json {
    let json = serde_json::to_string_pretty(snapshot.branches()).context("Failed to serialize branches")?;
    writeln!(out, "{json}")?;
    return Ok(());
  }

  if snapshot.branches().is_empty() {
    writeln!(out, "{}", warning_line("No branches found"))?;
    return Ok(());
  }

  BranchTreeRenderer::new(&snapshot, args.all, session.no_color).render(out)?;
  Ok(())
}
