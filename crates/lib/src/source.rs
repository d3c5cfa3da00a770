//! Source references.
//!
//! A [`SourcePath`] is either a plain project-relative path or a path inside the
//! output of another rule. Rule references are how data dependencies turn into
//! DAG edges: every `SourcePath::Rule` found in a rule's fields is a build-time
//! dependency of that rule.
//!
//! # Serialized form
//!
//! - `"res/values.xml"` is a plain path
//! - `"//java/lib:jar"` is the whole output of `//java/lib:jar`
//! - `{ "target": "//x:aar#aar_unzip", "path": "classes.jar" }` is one file in
//!   a rule's output directory

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::RuleGraph;
use crate::layout::OutputLayout;
use crate::target::TargetId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourcePathError {
  /// The referenced rule has not been constructed.
  #[error("source path refers to unknown rule {0}")]
  UnknownRule(TargetId),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "RawSourcePath", into = "RawSourcePath")]
pub enum SourcePath {
  /// A file or directory owned by no rule.
  Path(PathBuf),
  /// `path` inside the output directory of `target`. An empty `path` is the
  /// whole output directory.
  Rule { target: TargetId, path: PathBuf },
}

impl SourcePath {
  pub fn path(path: impl Into<PathBuf>) -> Self {
    SourcePath::Path(path.into())
  }

  pub fn rule_output(target: TargetId, path: impl Into<PathBuf>) -> Self {
    SourcePath::Rule {
      target,
      path: path.into(),
    }
  }

  /// The whole output directory of `target`.
  pub fn rule(target: TargetId) -> Self {
    Self::rule_output(target, PathBuf::new())
  }

  /// Interpret a string as a rule reference when it parses as a target,
  /// otherwise as a plain path.
  pub fn parse_text(text: &str) -> Self {
    if text.contains("//")
      && let Ok(target) = TargetId::parse(text)
    {
      return SourcePath::rule(target);
    }
    SourcePath::Path(PathBuf::from(text))
  }

  pub fn rule_target(&self) -> Option<&TargetId> {
    match self {
      SourcePath::Path(_) => None,
      SourcePath::Rule { target, .. } => Some(target),
    }
  }

  /// File name of the referenced path, falling back to the owning rule's name.
  pub fn file_name(&self) -> Option<String> {
    match self {
      SourcePath::Path(path) => path.file_name().map(|n| n.to_string_lossy().to_string()),
      SourcePath::Rule { target, path } => path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .or_else(|| Some(target.short_name().to_string())),
    }
  }
}

impl fmt::Display for SourcePath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SourcePath::Path(path) => write!(f, "{}", path.display()),
      SourcePath::Rule { target, path } if path.as_os_str().is_empty() => write!(f, "{}", target),
      SourcePath::Rule { target, path } => write!(f, "{}[{}]", target, path.display()),
    }
  }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawSourcePath {
  Text(String),
  Rule {
    target: TargetId,
    #[serde(default)]
    path: PathBuf,
  },
}

impl From<RawSourcePath> for SourcePath {
  fn from(raw: RawSourcePath) -> Self {
    match raw {
      RawSourcePath::Text(text) => SourcePath::parse_text(&text),
      RawSourcePath::Rule { target, path } => SourcePath::Rule { target, path },
    }
  }
}

impl From<SourcePath> for RawSourcePath {
  fn from(source: SourcePath) -> Self {
    match source {
      SourcePath::Path(path) => RawSourcePath::Text(path.to_string_lossy().to_string()),
      SourcePath::Rule { target, path } if path.as_os_str().is_empty() => RawSourcePath::Text(target.to_string()),
      SourcePath::Rule { target, path } => RawSourcePath::Rule { target, path },
    }
  }
}

/// Targets of every rule referenced by `paths`.
pub fn filter_rule_inputs<'a>(paths: impl IntoIterator<Item = &'a SourcePath>) -> BTreeSet<TargetId> {
  paths.into_iter().filter_map(SourcePath::rule_target).cloned().collect()
}

/// Resolves source paths to absolute filesystem paths against a frozen graph.
pub struct SourcePathResolver<'a> {
  graph: &'a RuleGraph,
  layout: &'a OutputLayout,
  project_root: &'a Path,
}

impl<'a> SourcePathResolver<'a> {
  pub fn new(graph: &'a RuleGraph, layout: &'a OutputLayout, project_root: &'a Path) -> Self {
    Self {
      graph,
      layout,
      project_root,
    }
  }

  pub fn absolute_path(&self, source: &SourcePath) -> Result<PathBuf, SourcePathError> {
    match source {
      SourcePath::Path(path) if path.is_absolute() => Ok(path.clone()),
      SourcePath::Path(path) => Ok(self.project_root.join(path)),
      SourcePath::Rule { target, path } => {
        if !self.graph.contains(target) {
          return Err(SourcePathError::UnknownRule(target.clone()));
        }
        let dir = self.layout.output_dir(target);
        if path.as_os_str().is_empty() {
          Ok(dir)
        } else {
          Ok(dir.join(path))
        }
      }
    }
  }

  pub fn absolute_paths<'s>(
    &self,
    sources: impl IntoIterator<Item = &'s SourcePath>,
  ) -> Result<Vec<PathBuf>, SourcePathError> {
    sources.into_iter().map(|s| self.absolute_path(s)).collect()
  }
}
