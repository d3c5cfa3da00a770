//! Engine configuration.
//!
//! Defaults can be overridden from the environment ([`EngineConfig::from_env`])
//! and then by the caller, e.g. CLI flags.

use std::env;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::consts::{DEFAULT_OUTPUT_DIR, ENV_CACHE_DIR, ENV_OUTPUT_ROOT, ENV_PARALLELISM, ENV_SHELL};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
  #[error("invalid {var} value '{value}': expected a positive integer")]
  InvalidParallelism { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
  /// Maximum number of rules built at once.
  pub parallelism: usize,

  /// Root below which every rule gets its output directory.
  pub output_root: PathBuf,

  /// Directory for persistent cache records. In-memory caching only when unset.
  pub cache_dir: Option<PathBuf>,

  /// Shell used for genrule commands. Falls back to `/bin/sh`.
  pub shell: Option<String>,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      parallelism: num_cpus(),
      output_root: PathBuf::from(DEFAULT_OUTPUT_DIR),
      cache_dir: None,
      shell: None,
    }
  }
}

impl EngineConfig {
  /// Defaults overridden by `RULEGRAPH_*` variables. Empty variables are
  /// treated as unset.
  pub fn from_env() -> Result<Self, ConfigError> {
    let mut config = Self::default();

    if let Some(out) = non_empty_var(ENV_OUTPUT_ROOT) {
      config.output_root = PathBuf::from(out);
    }
    if let Some(dir) = non_empty_var(ENV_CACHE_DIR) {
      config.cache_dir = Some(PathBuf::from(dir));
    }
    if let Some(value) = non_empty_var(ENV_PARALLELISM) {
      config.parallelism = parse_parallelism(ENV_PARALLELISM, &value)?;
    }
    if let Some(shell) = non_empty_var(ENV_SHELL) {
      config.shell = Some(shell);
    }

    Ok(config)
  }

  /// Resolve relative directories against `project_root`.
  pub fn with_project_root(mut self, project_root: &Path) -> Self {
    if self.output_root.is_relative() {
      self.output_root = project_root.join(&self.output_root);
    }
    if let Some(dir) = &self.cache_dir
      && dir.is_relative()
    {
      self.cache_dir = Some(project_root.join(dir));
    }
    self
  }
}

pub fn parse_parallelism(var: &'static str, value: &str) -> Result<usize, ConfigError> {
  match value.trim().parse::<usize>() {
    Ok(n) if n > 0 => Ok(n),
    _ => Err(ConfigError::InvalidParallelism {
      var,
      value: value.to_string(),
    }),
  }
}

fn non_empty_var(name: &str) -> Option<String> {
  env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}
