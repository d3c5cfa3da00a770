//! Types for rule execution.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::cache::BuildOutput;
use crate::rulekey::{RuleKey, RuleKeyError};
use crate::rules::Rule;
use crate::source::{SourcePath, SourcePathError};
use crate::target::TargetId;
use crate::traversal::TraversalError;

/// Everything an executor needs to build one rule.
#[derive(Debug, Clone)]
pub struct StepRequest {
  pub target: TargetId,
  pub rule_key: RuleKey,
  pub rule: Arc<Rule>,
  /// Directory owned by this rule. Executors may clear it.
  pub output_dir: PathBuf,
  /// Absolute path of the rule's output, when it has one.
  pub output_path: Option<PathBuf>,
  /// Absolute paths of every source input of the rule.
  pub resolved: BTreeMap<SourcePath, PathBuf>,
  /// Output paths of dependencies that were built.
  pub dependency_outputs: BTreeMap<TargetId, PathBuf>,
  /// Variables exported to commands run for this rule.
  pub env: BTreeMap<String, String>,
  pub project_root: PathBuf,
}

impl StepRequest {
  pub fn resolved_path(&self, source: &SourcePath) -> Result<&Path, StepError> {
    self
      .resolved
      .get(source)
      .map(PathBuf::as_path)
      .ok_or_else(|| StepError::UnresolvedInput(source.clone()))
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepError {
  #[error("io error at {path}: {message}")]
  Io { path: PathBuf, message: String },

  #[error("command failed with exit code {code:?}: {cmd}")]
  CommandFailed {
    cmd: String,
    code: Option<i32>,
    stderr: String,
  },

  #[error("step did not produce {0}")]
  MissingOutput(PathBuf),

  #[error("refusing to clear output directory {0}")]
  UnsafeOutputDir(PathBuf),

  #[error("source path {0} was not resolved for this step")]
  UnresolvedInput(SourcePath),

  #[error("no build step for rule type {0}")]
  Unsupported(&'static str),
}

impl StepError {
  pub fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> StepError {
    let path = path.into();
    move |e| StepError::Io {
      path,
      message: e.to_string(),
    }
  }
}

/// Runs the build step of a single rule.
pub trait StepExecutor: Send + Sync + 'static {
  fn execute(&self, request: StepRequest) -> impl Future<Output = Result<BuildOutput, StepError>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
  CacheHit,
  Built,
  /// The rule has no output of its own.
  NothingToBuild,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct BuildOutcome {
  pub status: BuildStatus,
  pub output: Option<BuildOutput>,
}

/// Why a rule did not build. Shared by every waiter on the same rule key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
  #[error("{target}: {source}")]
  Step {
    target: TargetId,
    #[source]
    source: StepError,
  },

  #[error(transparent)]
  SourcePath(#[from] SourcePathError),

  #[error(transparent)]
  RuleKey(#[from] RuleKeyError),

  #[error("{target}: failed to place cached output: {message}")]
  Materialize { target: TargetId, message: String },

  #[error("{target}: build task did not complete: {message}")]
  Interrupted { target: TargetId, message: String },
}

/// Outcome of a scheduled build.
#[derive(Debug, Default)]
pub struct BuildReport {
  pub built: BTreeMap<TargetId, BuildOutcome>,

  pub failed: BTreeMap<TargetId, BuildError>,

  /// Skipped rule -> the failed (or skipped) dependency that caused it.
  pub skipped: BTreeMap<TargetId, TargetId>,

  /// Rules never scheduled because the build was aborted.
  pub not_started: BTreeSet<TargetId>,

  pub aborted: bool,
}

impl BuildReport {
  pub fn is_success(&self) -> bool {
    self.failed.is_empty() && self.skipped.is_empty() && !self.aborted
  }

  pub fn cache_hits(&self) -> usize {
    self.count(BuildStatus::CacheHit)
  }

  pub fn executed(&self) -> usize {
    self.count(BuildStatus::Built)
  }

  fn count(&self, status: BuildStatus) -> usize {
    self.built.values().filter(|o| o.status == status).count()
  }

  pub fn total(&self) -> usize {
    self.built.len() + self.failed.len() + self.skipped.len() + self.not_started.len()
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecuteError {
  #[error("unknown target {0}")]
  UnknownTarget(TargetId),
}

impl<E> From<TraversalError<E>> for ExecuteError
where
  E: Into<std::convert::Infallible>,
{
  fn from(err: TraversalError<E>) -> Self {
    match err {
      TraversalError::UnknownTarget(target) => ExecuteError::UnknownTarget(target),
      TraversalError::Predicate(e) => match e.into() {},
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::target;

  #[test]
  fn report_success_when_empty() {
    let report = BuildReport::default();
    assert!(report.is_success());
    assert_eq!(report.total(), 0);
  }

  #[test]
  fn report_counts_by_status() {
    let mut report = BuildReport::default();
    let hit = BuildOutcome {
      status: BuildStatus::CacheHit,
      output: Some(BuildOutput::new("/out/a")),
    };
    let built = BuildOutcome {
      status: BuildStatus::Built,
      output: Some(BuildOutput::new("/out/b")),
    };
    report.built.insert(target("//a:a"), hit);
    report.built.insert(target("//a:b"), built);
    report.skipped.insert(target("//a:c"), target("//a:d"));

    assert_eq!(report.cache_hits(), 1);
    assert_eq!(report.executed(), 1);
    assert!(!report.is_success());
  }
}
