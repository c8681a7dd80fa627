//! # Lineage CLI Library
//!
//! Command-line front end for the branch reconstruction engine: argument
//! parsing, tracing setup, tree rendering and output formatting.

pub mod cli;
pub mod output;
pub mod render;

use std::env;
use std::io;

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::{Cli, handle_cli};

/// Environment variable that raises the verbosity without `-v` flags.
pub const VERBOSITY_ENV: &str = "LINEAGE_VERBOSITY";

/// Map a `-v` count to a tracing level.
pub fn level_for(verbosity: u8) -> Level {
  match verbosity {
    0 => Level::WARN,
    1 => Level::INFO,
    2 => Level::DEBUG,
    _ => Level::TRACE,
  }
}

/// The larger of the `-v` count and [`VERBOSITY_ENV`].
pub fn effective_verbosity(flag: u8) -> u8 {
  env::var(VERBOSITY_ENV)
    .ok()
    .and_then(|v| v.parse::<u8>().ok())
    .filter(|level| *level <= 3)
    .map_or(flag, |level| level.max(flag))
}

/// Install the global subscriber. Logs go to stderr so JSON output on stdout
/// stays parseable.
pub fn init_tracing(verbosity: u8) {
  let level = level_for(effective_verbosity(verbosity));

  let fmt_layer = fmt::layer()
    .with_target(false)
    .with_level(true)
    .with_writer(io::stderr);
  let filter = EnvFilter::from_default_env().add_directive(level.into());

  tracing_subscriber::registry()
    .with(filter)
    .with(fmt_layer)
    .try_init()
    .ok();
}

pub fn run() -> Result<()> {
  let cli = Cli::parse();
  init_tracing(cli.verbose);
  handle_cli(cli)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn verbosity_levels() {
    assert_eq!(level_for(0), Level::WARN);
    assert_eq!(level_for(1), Level::INFO);
    assert_eq!(level_for(2), Level::DEBUG);
    assert_eq!(level_for(7), Level::TRACE);
  }
}
