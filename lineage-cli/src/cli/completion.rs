//! # Completion Command
//!
//! Derive-based implementation of the completion command for generating
//! shell completion scripts.

use std::io::Write;

use anyhow::Result;
use clap::{Args, CommandFactory};
use clap_complete::{Shell, generate};

use super::Cli;

/// Command for generating shell completions
#[derive(Args)]
pub struct CompletionArgs {
  /// Shell to generate completions for
  #[arg(value_enum)]
  pub shell: Shell,
}

pub fn handle_completion_command(completion: CompletionArgs, out: &mut dyn Write) -> Result<()> {
  let mut cmd = Cli::command();
  let name = cmd.get_name().to_string();
  generate(completion.shell, &mut cmd, name, out);
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_generate_bash_completions() {
    let mut output = Vec::new();
    handle_completion_command(CompletionArgs { shell: Shell::Bash }, &mut output).unwrap();

    let script = String::from_utf8(output).unwrap();
    assert!(script.contains("lineage"));
    assert!(script.contains("branches"));
  }
}
