//! # Configuration Management
//!
//! Engine settings and the directories they are read from, with XDG base
//! directory support.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

/// Name of the repository-local directory holding lineage metadata.
pub const REPO_STATE_DIR: &str = ".lineage";

/// Settings that shape how branches are reconstructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Long-lived branches, highest priority first. Their first-parent chains
  /// are claimed before any other branch and are never contested.
  pub priority_branches: Vec<String>,
  /// Branch anchored on the placeholder root of an empty repository.
  pub default_branch: String,
  /// Remote whose prefix is stripped from remote branch names.
  pub remote_name: String,
  /// Consecutive already-known commits after which incremental ingestion
  /// stops.
  pub ingest_cutoff: usize,
  pub compute_ahead_behind: bool,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      priority_branches: vec!["master".to_string(), "main".to_string(), "develop".to_string()],
      default_branch: "master".to_string(),
      remote_name: "origin".to_string(),
      ingest_cutoff: 20,
      compute_ahead_behind: true,
    }
  }
}

impl EngineConfig {
  pub fn from_toml_str(content: &str) -> Result<Self> {
    toml::from_str(content).context("Failed to parse engine configuration")
  }

  /// Position of `name` in the priority list.
  pub fn priority_of(&self, name: &str) -> Option<usize> {
    self.priority_branches.iter().position(|branch| branch == name)
  }

  /// Strip the configured remote prefix from a remote ref name.
  pub fn strip_remote<'a>(&self, name: &'a str) -> &'a str {
    name
      .strip_prefix(self.remote_name.as_str())
      .and_then(|rest| rest.strip_prefix('/'))
      .unwrap_or(name)
  }
}

/// Represents the configuration directories for lineage
#[derive(Debug, Clone)]
pub struct ConfigDirs {
  pub config_dir: PathBuf,
  pub cache_dir: Option<PathBuf>,
}

impl ConfigDirs {
  /// Resolve the platform configuration directories
  pub fn new() -> Result<Self> {
    let proj_dirs = ProjectDirs::from("", "", "lineage").context("Failed to determine project directories")?;

    Ok(Self {
      config_dir: proj_dirs.config_dir().to_path_buf(),
      cache_dir: Some(proj_dirs.cache_dir().to_path_buf()),
    })
  }

  /// Use an explicit configuration directory
  pub fn with_config_dir<P: Into<PathBuf>>(config_dir: P) -> Self {
    Self {
      config_dir: config_dir.into(),
      cache_dir: None,
    }
  }

  /// Get the config directory
  pub fn config_dir(&self) -> &PathBuf {
    &self.config_dir
  }

  /// Get the path to the engine configuration file
  pub fn engine_config_path(&self) -> PathBuf {
    self.config_dir.join("lineage.toml")
  }

  /// Get the path to the repository-local state directory
  pub fn repo_state_dir<P: AsRef<Path>>(repo_path: P) -> PathBuf {
    repo_path.as_ref().join(REPO_STATE_DIR)
  }

  /// Load the engine configuration from file or return defaults
  pub fn load_engine_config(&self) -> Result<EngineConfig> {
    let config_path = self.engine_config_path();

    if !config_path.exists() {
      return Ok(EngineConfig::default());
    }

    let content = fs::read_to_string(&config_path)
      .with_context(|| format!("Failed to read engine config from {}", config_path.display()))?;

    EngineConfig::from_toml_str(&content)
      .with_context(|| format!("Failed to load engine config from {}", config_path.display()))
  }

  /// Save the engine configuration to file
  pub fn save_engine_config(&self, config: &EngineConfig) -> Result<()> {
    let config_path = self.engine_config_path();

    if let Some(parent) = config_path.parent() {
      fs::create_dir_all(parent).with_context(|| format!("Failed to create config directory {}", parent.display()))?;
    }

    let content = toml::to_string_pretty(config).context("Failed to serialize engine config")?;
    fs::write(&config_path, content)
      .with_context(|| format!("Failed to write engine config to {}", config_path.display()))?;

    Ok(())
  }
}
