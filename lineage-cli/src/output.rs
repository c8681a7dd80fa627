//! # Output Formatting
//!
//! Colors, emojis and consistent styling for user-facing messages.

use owo_colors::OwoColorize;

/// When colored output is used
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
  /// Enable colored output
  Yes,
  /// Enable colored output (alias for Yes)
  Always,
  /// Automatically detect if colors should be used based on terminal
  /// capabilities
  Auto,
  /// Disable colored output
  No,
  /// Disable colored output (alias for No)
  Never,
}

impl ColorMode {
  /// Apply the mode to every `owo-colors` call in the process.
  pub fn apply(self) {
    match self {
      Self::Always | Self::Yes => owo_colors::set_override(true),
      Self::Never | Self::No => owo_colors::set_override(false),
      Self::Auto => {}
    }
  }

  pub fn is_disabled(self) -> bool {
    matches!(self, Self::Never | Self::No)
  }
}

/// Get an emoji by shortcode, or `default` when it is unknown
pub fn get_emoji_or_default(name: &str, default: &str) -> String {
  match emojis::get_by_shortcode(name) {
    Some(emoji) => emoji.to_string(),
    None => default.to_string(),
  }
}

pub fn success_line(message: &str) -> String {
  let check = get_emoji_or_default("check_mark", "✓");
  format!("{} {}", check.green().bold(), message)
}

pub fn warning_line(message: &str) -> String {
  let warning = get_emoji_or_default("warning", "⚠");
  format!("{} {}", warning.yellow().bold(), message)
}

/// Ahead/behind markers such as `↑2 ↓1`; empty when in sync.
pub fn format_ahead_behind(ahead: usize, behind: usize) -> String {
  let mut parts = Vec::new();
  if ahead > 0 {
    parts.push(format!("↑{ahead}"));
  }
  if behind > 0 {
    parts.push(format!("↓{behind}"));
  }
  parts.join(" ")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_get_emoji_or_default() {
    assert_eq!(get_emoji_or_default("nonexistent_emoji_code", "?"), "?");
    assert_ne!(get_emoji_or_default("check_mark", "?"), "?");
  }

  #[test]
  fn test_format_ahead_behind() {
    assert_eq!(format_ahead_behind(0, 0), "");
    assert_eq!(format_ahead_behind(2, 0), "↑2");
    assert_eq!(format_ahead_behind(1, 3), "↑1 ↓3");
  }

  #[test]
  fn test_color_mode_disabled() {
    assert!(ColorMode::Never.is_disabled());
    assert!(ColorMode::No.is_disabled());
    assert!(!ColorMode::Auto.is_disabled());
  }
}
