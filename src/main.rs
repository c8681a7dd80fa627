//! # Lineage
//!
//! Entry point for the `lineage` binary.

use anyhow::Result;

fn main() -> Result<()> {
  lineage_cli::run()
}
