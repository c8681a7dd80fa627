//! # Command Line Interface
//!
//! Defines the CLI structure and command handlers for the lineage tool. Every
//! command except `completion` reconstructs the branch structure of one
//! repository and reports on it.

mod branches;
mod completion;
mod log;
mod name;
mod which;

use std::env;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::builder::Styles;
use clap::builder::styling::AnsiColor;
use clap::{ArgAction, Parser, Subcommand};
use lineage_core::{ConfigDirs, EngineConfig, Git2Source, RepositorySnapshot, RepositoryStructureService};
use tracing::{debug, instrument};

use crate::output::ColorMode;

/// Top-level CLI command for the lineage tool
#[derive(Parser)]
#[command(name = "lineage")]
#[command(display_name = "🌳 Lineage")]
#[command(author = env!("CARGO_PKG_AUTHORS"))]
#[command(about = "Reconstruct which branch every commit was made on")]
#[command(
  long_about = "Lineage rebuilds the branch structure of a git repository from its commit graph.\n\n\
        Git forgets which branch a commit was made on once the branch is merged or deleted.\n\
        Lineage infers it from ref tips, topology and merge-commit subjects, and shows how\n\
        branches grew out of each other and how far they are ahead of or behind their remotes."
)]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(propagate_version = true)]
#[command(subcommand_required(true))]
#[command(disable_help_subcommand = true)]
#[command(max_term_width = 120)]
#[command(styles = Styles::styled()
    .header(AnsiColor::BrightGreen.on_default().bold().underline())
    .usage(AnsiColor::Green.on_default().bold())
    .literal(AnsiColor::BrightGreen.on_default().bold())
    .placeholder(AnsiColor::BrightWhite.on_default().italic())
    .valid(AnsiColor::Green.on_default())
    .invalid(AnsiColor::BrightRed.on_default().bold())
)]
pub struct Cli {
  /// Sets the level of verbosity (can be used multiple times)
  #[arg(
    short = 'v',
    long = "verbose",
    action = ArgAction::Count,
    global = true,
    long_help = "Sets the level of verbosity for tracing and logging output.\n\n\
             -v: Show info level messages\n\
             -vv: Show debug level messages\n\
             -vvv: Show trace level messages"
  )]
  pub verbose: u8,

  /// Controls when colored output is used
  #[arg(
    long,
    value_enum,
    ignore_case = true,
    global = true,
    default_value_t = ColorMode::Auto,
  )]
  pub colors: ColorMode,

  /// Path to the repository (defaults to the current directory)
  #[arg(long, short = 'r', global = true, value_name = "PATH")]
  pub repo: Option<PathBuf>,

  /// Subcommands
  #[command(subcommand)]
  pub command: Commands,
}

/// Subcommands for the lineage tool
#[derive(Subcommand)]
pub enum Commands {
  /// Show the reconstructed branch tree
  #[command(long_about = "Display the reconstructed branches as a tree.\n\n\
            Each branch is drawn under the branch it grew out of, with its tip commit,\n\
            the number of commits ahead (↑) of and behind (↓) its remote, and flags for\n\
            the current, remote-only, inactive and ambiguous branches. Branches that only\n\
            survive in merge history are hidden unless --all is given.")]
  #[command(alias = "b")]
  Branches(branches::BranchesArgs),

  /// Generate shell completions
  #[command(long_about = "Generates shell completion scripts for lineage commands.\n\n\
            This command generates completion scripts that provide tab completion for lineage\n\
            commands and options in your shell.")]
  Completion(completion::CompletionArgs),

  /// List commits with the branch each one belongs to
  #[command(long_about = "List commits newest first, each with the branch it was attributed to.\n\n\
            Use --branch to restrict the listing to one or more branches by name.")]
  #[command(alias = "l")]
  Log(log::LogArgs),

  /// Pin a commit to a branch name
  #[command(long_about = "Record the branch a commit belongs to, overriding the inferred name.\n\n\
            The name applies from the commit down its first-parent chain until another\n\
            branch takes over. Names are stored in the repository's .lineage directory.\n\
            Use --clear to remove a recorded name.")]
  Name(name::NameArgs),

  /// Show which branch a commit belongs to
  #[command(long_about = "Show which branch a commit was attributed to.\n\n\
            The commit may be given as a full id or any unique prefix.")]
  #[command(alias = "w")]
  Which(which::WhichArgs),
}

/// A repository opened for one command, with the settings used to reconstruct it.
pub struct Session {
  pub source: Git2Source,
  pub config: EngineConfig,
  pub no_color: bool,
}

impl Session {
  /// Open the repository containing `repo`, or the current directory.
  pub fn open(repo: Option<&Path>, config: EngineConfig, no_color: bool) -> Result<Self> {
    let path = match repo {
      Some(path) => path.to_path_buf(),
      None => env::current_dir().context("Failed to determine current directory")?,
    };
    let source =
      Git2Source::open(&path).with_context(|| format!("Failed to open git repository at {}", path.display()))?;
    debug!(path = %path.display(), "opened repository");

    Ok(Self {
      source,
      config,
      no_color,
    })
  }

  #[instrument(skip_all)]
  pub fn reconstruct(&self) -> Result<Arc<RepositorySnapshot>> {
    let mut service = RepositoryStructureService::new(self.config.clone());
    service
      .refresh(&self.source)
      .context("Failed to reconstruct branch structure")
  }
}

pub fn handle_cli(cli: Cli) -> Result<()> {
  cli.colors.apply();

  let config = ConfigDirs::new()?.load_engine_config()?;
  let stdout = io::stdout();
  let mut out = stdout.lock();
  execute(cli, config, &mut out)
}

/// Run a parsed command against `config`, writing its output to `out`.
pub fn execute(cli: Cli, config: EngineConfig, out: &mut dyn Write) -> Result<()> {
  if let Commands::Completion(completion) = cli.command {
    return completion::handle_completion_command(completion, out);
  }

  let session = Session::open(cli.repo.as_deref(), config, cli.colors.is_disabled())?;
  match cli.command {
    Commands::Branches(args) => branches::handle_branches_command(args, &session, out),
    Commands::Log(args) => log::handle_log_command(args, &session, out),
    Commands::Name(args) => name::handle_name_command(args, &session, out),
    Commands::Which(args) => which::handle_which_command(args, &session, out),
    Commands::Completion(_) => Ok(()),
  }
}
