//! # Merge Subject Parser
//!
//! Extracts source and target branch names from merge commit subjects such as
//! `Merge branch 'feature' into develop`. Recognised subject shapes are kept in
//! an ordered rule table so new tool conventions can be added without touching
//! the control flow.

/// Branch names referenced by a merge commit subject.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeBranchNames {
  /// Branch that was merged in (names the second parent).
  pub source: Option<String>,
  /// Branch that received the merge (names the merge commit itself).
  pub target: Option<String>,
}

impl MergeBranchNames {
  /// A pull merges the remote copy of a branch into its local copy, so both
  /// names are the same.
  pub fn is_pull_merge(&self) -> bool {
    self.source.is_some() && self.source == self.target
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interpretation {
  /// The prefix references a commit, not a branch.
  Ignore,
  /// The token after the prefix names the source branch.
  SourceBranch,
}

struct MergeRule {
  prefix: &'static str,
  interpretation: Interpretation,
}

/// Evaluated top-down; the first matching prefix wins.
const MERGE_RULES: &[MergeRule] = &[
  MergeRule {
    prefix: "Merge commit ",
    interpretation: Interpretation::Ignore,
  },
  MergeRule {
    prefix: "Merge branch ",
    interpretation: Interpretation::SourceBranch,
  },
  MergeRule {
    prefix: "Merged from ",
    interpretation: Interpretation::SourceBranch,
  },
  MergeRule {
    prefix: "Merged ",
    interpretation: Interpretation::SourceBranch,
  },
  MergeRule {
    prefix: "Merge remote-tracking branch ",
    interpretation: Interpretation::SourceBranch,
  },
  MergeRule {
    prefix: "Merge ",
    interpretation: Interpretation::SourceBranch,
  },
];

/// Longest prefix first.
const REMOTE_PREFIXES: &[&str] = &["refs/remotes/origin/", "remotes/origin/", "origin/"];

const INTO_MARKER: &str = " into ";
const OF_MARKER: &str = " of ";
const PULL_MERGE_SUBJECT: &str = "Merge branch '";

/// Parse the branch names out of a commit subject.
///
/// Unknown subject shapes yield empty names; the function never fails.
pub fn parse_merge_subject(subject: &str) -> MergeBranchNames {
  let Some(rule) = MERGE_RULES.iter().find(|rule| subject.starts_with(rule.prefix)) else {
    return MergeBranchNames::default();
  };

  if rule.interpretation == Interpretation::Ignore {
    return MergeBranchNames::default();
  }

  let rest = &subject[rule.prefix.len()..];
  let (source_token, tail) = match rest.find(' ') {
    Some(index) => rest.split_at(index),
    None => (rest, ""),
  };

  let source = clean_branch_name(source_token);
  let target = if let Some(index) = tail.find(INTO_MARKER) {
    clean_branch_name(&tail[index + INTO_MARKER.len()..])
  } else if tail.contains(OF_MARKER) && subject.starts_with(PULL_MERGE_SUBJECT) {
    source.clone()
  } else {
    None
  };

  MergeBranchNames { source, target }
}

fn clean_branch_name(raw: &str) -> Option<String> {
  let trimmed = trim_noise(raw);
  let stripped = REMOTE_PREFIXES
    .iter()
    .find_map(|prefix| trimmed.strip_prefix(prefix))
    .unwrap_or(trimmed);
  let name = trim_noise(stripped);

  match name {
    "" => None,
    "Master" => Some("master".to_string()),
    other => Some(other.to_string()),
  }
}

fn trim_noise(value: &str) -> &str {
  value.trim_matches(|c: char| c.is_whitespace() || matches!(c, '\'' | '"' | '.' | ','))
}
