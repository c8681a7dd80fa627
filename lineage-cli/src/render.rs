//! # Branch Tree Renderer
//!
//! Draws the reconstructed branch hierarchy as a tree, one branch per line,
//! with tip, ahead/behind counts and flags.

use std::collections::HashSet;
use std::io::{self, Write};

use lineage_core::{Branch, BranchId, CommitNode, RepositorySnapshot};
use owo_colors::OwoColorize;

use crate::output::format_ahead_behind;

pub struct BranchTreeRenderer<'a> {
  snapshot: &'a RepositorySnapshot,
  visible: HashSet<&'a BranchId>,
  visited: HashSet<&'a BranchId>,
  no_color: bool,
}

impl<'a> BranchTreeRenderer<'a> {
  /// Without `show_all`, only active branches and the branches they grew out
  /// of are drawn.
  pub fn new(snapshot: &'a RepositorySnapshot, show_all: bool, no_color: bool) -> Self {
    Self {
      snapshot,
      visible: visible_branches(snapshot, show_all),
      visited: HashSet::new(),
      no_color,
    }
  }

  pub fn render<W: Write + ?Sized>(&mut self, writer: &mut W) -> io::Result<()> {
    let roots: Vec<&'a Branch> = self
      .snapshot
      .root_branches()
      .filter(|branch| self.visible.contains(&branch.id))
      .collect();

    for (i, root) in roots.iter().enumerate() {
      self.render_tree(writer, root, 0, &[], i == roots.len() - 1)?;
    }
    Ok(())
  }

  fn render_tree<W: Write + ?Sized>(
    &mut self,
    writer: &mut W,
    branch: &'a Branch,
    depth: u32,
    prefix: &[String],
    is_last_sibling: bool,
  ) -> io::Result<()> {
    if !self.visited.insert(&branch.id) {
      return Ok(());
    }

    self.print_branch(writer, branch, depth, prefix, is_last_sibling)?;

    let children: Vec<&'a Branch> = self
      .snapshot
      .children_of(branch)
      .into_iter()
      .filter(|child| self.visible.contains(&child.id))
      .collect();
    let child_count = children.len();

    for (i, child) in children.into_iter().enumerate() {
      let is_last = i == child_count - 1;

      let mut new_prefix: Vec<String> = prefix.to_vec();
      if depth > 0 {
        new_prefix.push(if is_last_sibling {
          "    ".to_string()
        } else {
          "│   ".to_string()
        });
      }

      self.render_tree(writer, child, depth + 1, &new_prefix, is_last)?;
    }

    Ok(())
  }

  fn print_branch<W: Write + ?Sized>(
    &self,
    writer: &mut W,
    branch: &Branch,
    depth: u32,
    prefix: &[String],
    is_last_sibling: bool,
  ) -> io::Result<()> {
    let mut line = prefix.concat();
    if depth > 0 {
      line.push_str(if is_last_sibling { "└── " } else { "├── " });
    }
    line.push_str(&self.branch_label(branch));
    writeln!(writer, "{line}")
  }

  fn branch_label(&self, branch: &Branch) -> String {
    let is_current = self.snapshot.current_branch().is_some_and(|current| current.id == branch.id);
    let tip = branch.tip_commit_id.short();

    let mut parts = if self.no_color {
      vec![branch.name.clone(), tip.to_string()]
    } else if is_current {
      vec![branch.name.green().bold().to_string(), tip.yellow().to_string()]
    } else if branch.is_multi_branch || !branch.is_active {
      vec![branch.name.bright_black().to_string(), tip.yellow().to_string()]
    } else {
      vec![branch.name.clone(), tip.yellow().to_string()]
    };

    if branch.is_diverged() {
      parts.push(format_ahead_behind(branch.local_ahead_count, branch.remote_ahead_count));
    }
    if branch.is_remote && !branch.is_local {
      parts.push("(remote)".to_string());
    }
    if branch.is_multi_branch && !branch.child_branch_names.is_empty() {
      let names: Vec<&str> = branch.child_branch_names.iter().map(String::as_str).collect();
      parts.push(format!("(one of: {})", names.join(", ")));
    } else if !branch.is_active {
      parts.push("(inactive)".to_string());
    }
    if is_current {
      parts.push("(current)".to_string());
    }

    parts.join(" ")
  }
}

/// Every branch with `show_all`; otherwise active branches and their
/// ancestors, so the drawn tree stays connected.
fn visible_branches(snapshot: &RepositorySnapshot, show_all: bool) -> HashSet<&BranchId> {
  if show_all {
    return snapshot.branches().iter().map(|branch| &branch.id).collect();
  }

  let mut visible = HashSet::new();
  for branch in snapshot.branches().iter().filter(|branch| branch.is_active) {
    let mut current = Some(branch);
    while let Some(branch) = current {
      if !visible.insert(&branch.id) {
        break;
      }
      current = branch.parent_branch_id.as_ref().and_then(|id| snapshot.branch(id));
    }
  }
  visible
}

/// One log line: ahead marker, short id, subject, owning branch and tags.
pub fn format_commit_line(commit: &CommitNode, branch_name: Option<&str>, no_color: bool) -> String {
  let marker = if commit.is_local_ahead {
    "↑"
  } else if commit.is_remote_ahead {
    "↓"
  } else {
    "·"
  };

  let mut line = if no_color {
    format!("{marker} {} {}", commit.short_id, commit.subject)
  } else {
    format!("{marker} {} {}", commit.short_id.yellow(), commit.subject)
  };
  if let Some(name) = branch_name {
    if no_color {
      line.push_str(&format!(" ({name})"));
    } else {
      line.push_str(&format!(" ({})", name.cyan()));
    }
  }
  if !commit.tags.is_empty() {
    line.push(' ');
    line.push_str(&commit.tags);
  }
  line
}

#[cfg(test)]
mod tests {
  use chrono::{TimeZone, Utc};
  use insta::assert_snapshot;
  use lineage_core::{EngineConfig, HeadState, RawBranch, RawCommit, RawTag, RepositoryData, RepositoryStructureService};

  use super::*;

  /// Commits are listed oldest first, one minute apart.
  fn repository(commits: &[(&str, &[&str], &str)], branches: &[(&str, &str)], head: &str) -> RepositoryData {
    let mut raw: Vec<RawCommit> = commits
      .iter()
      .enumerate()
      .map(|(minute, (id, parents, subject))| {
        let date = Utc.timestamp_opt(1_700_000_000 + minute as i64 * 60, 0).unwrap();
        RawCommit {
          id: id.to_string(),
          parent_ids: parents.iter().map(|parent| parent.to_string()).collect(),
          subject: subject.to_string(),
          author: "Test User".to_string(),
          author_date: date,
          commit_date: date,
        }
      })
      .collect();
    raw.reverse();

    RepositoryData {
      commits: raw,
      branches: branches
        .iter()
        .map(|(name, tip)| RawBranch {
          name: name.to_string(),
          tip_id: tip.to_string(),
          is_remote: false,
          tracking_name: None,
          tracking_tip_id: None,
        })
        .collect(),
      head: HeadState::Branch(head.to_string()),
      ..RepositoryData::default()
    }
  }

  fn snapshot(data: &RepositoryData) -> RepositorySnapshot {
    let mut service = RepositoryStructureService::new(EngineConfig::default());
    (*service.refresh(data).unwrap()).clone()
  }

  fn render(snapshot: &RepositorySnapshot, show_all: bool) -> String {
    let mut output = Vec::new();
    BranchTreeRenderer::new(snapshot, show_all, true)
      .render(&mut output)
      .unwrap();
    String::from_utf8(output).unwrap()
  }

  fn stacked() -> RepositoryData {
    repository(
      &[
        ("m1", &[], "initial"),
        ("m2", &["m1"], "second"),
        ("f1", &["m2"], "feature one"),
        ("m3", &["m2"], "third"),
        ("f2", &["f1"], "feature two"),
        ("t1", &["m3"], "topic"),
      ],
      &[("master", "m3"), ("feature", "f2"), ("topic", "t1")],
      "feature",
    )
  }

  #[test]
  fn test_render_tree_snapshot_basic() {
    let output = render(&snapshot(&stacked()), false);
    assert_snapshot!(output, @r"
    master m3 ↑3
    ├── feature f2 ↑2 (current)
    └── topic t1 ↑1
    ");
  }

  #[test]
  fn test_render_hides_inactive_branches_unless_all() {
    let data = repository(
      &[
        ("m1", &[], "initial"),
        ("x1", &["m1"], "old work"),
        ("m2", &["m1", "x1"], "Merge branch 'old' into master"),
      ],
      &[("master", "m2")],
      "master",
    );
    let snapshot = snapshot(&data);

    assert_snapshot!(render(&snapshot, false), @"master m2 ↑2 (current)");
    assert_snapshot!(render(&snapshot, true), @r"
    master m2 ↑2 (current)
    └── old x1 (inactive)
    ");
  }

  #[test]
  fn test_commit_line_lists_branch_and_tags() {
    let mut data = stacked();
    data.tags.push(RawTag {
      commit_id: "m3".to_string(),
      name: "v1.0".to_string(),
    });
    let snapshot = snapshot(&data);
    let commit = snapshot.commit_by_prefix("m3").unwrap();

    assert_eq!(
      format_commit_line(commit, Some("master"), true),
      "↑ m3 third (master) [v1.0]"
    );
  }
}
