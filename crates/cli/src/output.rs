//! Terminal output for rgraph commands.
//!
//! Status lines go to stdout, problems to stderr. Colors are only used when
//! the stream is a terminal.

use std::fmt::Display;
use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

use rulegraph_lib::execute::BuildStatus;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const CACHED: &str = "↺";
}

/// First 12 characters of a rule key or content hash.
pub fn short_hash(hash: &str) -> &str {
  &hash[..hash.len().min(12)]
}

/// Compact elapsed time for build summaries: `850ms`, `2.40s`, `3m 5s`.
pub fn format_elapsed(elapsed: Duration) -> String {
  let secs = elapsed.as_secs();
  match secs {
    0 => format!("{}ms", elapsed.subsec_millis()),
    1..=59 => format!("{}.{:02}s", secs, elapsed.subsec_millis() / 10),
    _ => format!("{}m {}s", secs / 60, secs % 60),
  }
}

/// One line per rule that produced or fetched an output.
pub fn print_outcome(status: BuildStatus, target: &dyn Display, hash: Option<&str>) {
  let (symbol, label) = match status {
    BuildStatus::Built => (symbols::SUCCESS, "built"),
    BuildStatus::CacheHit => (symbols::CACHED, "cached"),
    BuildStatus::NothingToBuild => return,
  };
  let symbol = match status {
    BuildStatus::Built => symbol.if_supports_color(Stream::Stdout, |s| s.green()).to_string(),
    _ => symbol.if_supports_color(Stream::Stdout, |s| s.cyan()).to_string(),
  };
  match hash {
    Some(hash) => println!(
      "  {} {} {} {}",
      symbol,
      label,
      target,
      short_hash(hash).if_supports_color(Stream::Stdout, |s| s.dimmed())
    ),
    None => println!("  {} {} {}", symbol, label, target),
  }
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn short_hash_keeps_twelve_characters() {
    let key = "3f2a9c".repeat(11);
    assert_eq!(short_hash(&key), "3f2a9c3f2a9c");
    assert_eq!(short_hash("abc"), "abc");
  }

  #[test]
  fn elapsed_uses_the_coarsest_fitting_unit() {
    assert_eq!(format_elapsed(Duration::from_millis(850)), "850ms");
    assert_eq!(format_elapsed(Duration::from_millis(2400)), "2.40s");
    assert_eq!(format_elapsed(Duration::from_secs(185)), "3m 5s");
  }
}
