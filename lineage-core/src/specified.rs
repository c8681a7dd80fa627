//! # Specified Branch Names
//!
//! Branch names assigned to commits by hand. They are stored per repository in
//! `.lineage/branch-names.json` and take precedence over every inferred name.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::ConfigDirs;
use crate::source::SpecifiedName;

const STORE_FILE: &str = "branch-names.json";

/// Ensure the repository's `.lineage/` directory contains a `.gitignore` that
/// ignores every file within the directory, so the metadata stays out of
/// version control without touching the repository's own ignore rules.
pub fn ensure_internal_gitignore<P: AsRef<Path>>(repo_path: P) -> Result<()> {
  let state_dir = ConfigDirs::repo_state_dir(repo_path);
  if !state_dir.exists() {
    fs::create_dir_all(&state_dir).context("Failed to create .lineage directory")?;
  }

  let gitignore_path = state_dir.join(".gitignore");
  if gitignore_path.exists() {
    let content = fs::read_to_string(&gitignore_path).context("Failed to read .lineage/.gitignore")?;
    if content.lines().any(|line| line.trim() == "*") {
      return Ok(());
    }
  }

  fs::write(&gitignore_path, "*\n").context("Failed to update .lineage/.gitignore")?;

  Ok(())
}

/// Commit id to branch name overrides for one repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecifiedNames {
  #[serde(default)]
  names: BTreeMap<String, String>,
}

impl SpecifiedNames {
  pub fn store_path<P: AsRef<Path>>(repo_path: P) -> PathBuf {
    ConfigDirs::repo_state_dir(repo_path).join(STORE_FILE)
  }

  /// Load the overrides for the repository at `repo_path`; a missing file
  /// means no overrides.
  pub fn load<P: AsRef<Path>>(repo_path: P) -> Result<Self> {
    let path = Self::store_path(repo_path);

    if !path.exists() {
      return Ok(Self::default());
    }

    let content =
      fs::read_to_string(&path).with_context(|| format!("Failed to read branch names from {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse branch names from {}", path.display()))
  }

  pub fn save<P: AsRef<Path>>(&self, repo_path: P) -> Result<()> {
    let repo_path = repo_path.as_ref();
    ensure_internal_gitignore(repo_path)?;

    let path = Self::store_path(repo_path);
    let content = serde_json::to_string_pretty(self).context("Failed to serialize branch names")?;
    fs::write(&path, content).with_context(|| format!("Failed to write branch names to {}", path.display()))?;

    Ok(())
  }

  /// Assign `branch` to `commit_id`, returning the previous name.
  pub fn set(&mut self, commit_id: impl Into<String>, branch: impl Into<String>) -> Option<String> {
    self.names.insert(commit_id.into(), branch.into())
  }

  pub fn clear(&mut self, commit_id: &str) -> bool {
    self.names.remove(commit_id).is_some()
  }

  pub fn get(&self, commit_id: &str) -> Option<&str> {
    self.names.get(commit_id).map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn to_entries(&self) -> Vec<SpecifiedName> {
    self
      .names
      .iter()
      .map(|(commit_id, branch_name)| SpecifiedName {
        commit_id: commit_id.clone(),
        branch_name: branch_name.clone(),
      })
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use tempfile::TempDir;

  use super::*;

  #[test]
  fn load_without_file_is_empty() {
    let temp = TempDir::new().unwrap();
    assert!(SpecifiedNames::load(temp.path()).unwrap().is_empty());
  }

  #[test]
  fn save_and_load_round_trip() {
    let temp = TempDir::new().unwrap();
    let mut names = SpecifiedNames::default();
    assert_eq!(names.set("abc123", "feature"), None);
    assert_eq!(names.set("abc123", "bugfix"), Some("feature".to_string()));
    names.set("def456", "release");

    names.save(temp.path()).unwrap();
    let loaded = SpecifiedNames::load(temp.path()).unwrap();

    assert_eq!(loaded, names);
    assert_eq!(loaded.get("abc123"), Some("bugfix"));
    assert_eq!(loaded.to_entries().len(), 2);
  }

  #[test]
  fn clear_removes_override() {
    let mut names = SpecifiedNames::default();
    names.set("abc123", "feature");
    assert!(names.clear("abc123"));
    assert!(!names.clear("abc123"));
    assert!(names.is_empty());
  }

  #[test]
  fn save_creates_internal_gitignore() {
    let temp = TempDir::new().unwrap();
    SpecifiedNames::default().save(temp.path()).unwrap();

    let gitignore = temp.path().join(".lineage").join(".gitignore");
    assert_eq!(fs::read_to_string(gitignore).unwrap(), "*\n");
  }

  #[test]
  fn existing_gitignore_is_left_untouched() {
    let temp = TempDir::new().unwrap();
    let state_dir = temp.path().join(".lineage");
    fs::create_dir_all(&state_dir).unwrap();
    fs::write(state_dir.join(".gitignore"), "# keep\n*\n").unwrap();

    ensure_internal_gitignore(temp.path()).unwrap();
    assert_eq!(fs::read_to_string(state_dir.join(".gitignore")).unwrap(), "# keep\n*\n");
  }
}
