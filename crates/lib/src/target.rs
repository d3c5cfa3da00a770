//! Target identifiers.
//!
//! A [`TargetId`] names exactly one buildable unit. Its canonical string form is
//!
//! ```text
//! [cell]//base/path:name[#flavor_a,flavor_b]
//! ```
//!
//! Flavors are an ordered set, so `//a:b#x,y` and `//a:b#y,x` are the same
//! target. Ordering between identifiers is lexicographic on the string form,
//! which is what every deterministic traversal in this crate uses as its
//! tie-break.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while parsing a target or flavor string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetParseError {
  #[error("target '{0}' must contain '//'")]
  MissingSlashes(String),

  #[error("target '{0}' must contain ':' followed by a name")]
  MissingName(String),

  #[error("target '{input}' has an invalid cell '{cell}'")]
  InvalidCell { input: String, cell: String },

  #[error("target '{0}' has an invalid base path")]
  InvalidBasePath(String),

  #[error("target '{input}' has an invalid name '{name}'")]
  InvalidName { input: String, name: String },

  #[error("invalid flavor '{0}'")]
  InvalidFlavor(String),
}

/// A single flavor tag, e.g. `shared` or `aar_unzip`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Flavor(String);

impl Flavor {
  pub fn new(name: impl Into<String>) -> Result<Self, TargetParseError> {
    let name = name.into();
    let valid = !name.is_empty()
      && name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');
    if valid {
      Ok(Flavor(name))
    } else {
      Err(TargetParseError::InvalidFlavor(name))
    }
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for Flavor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl<'de> Deserialize<'de> for Flavor {
  fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Flavor::new(raw).map_err(serde::de::Error::custom)
  }
}

/// Canonical identity of a build unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TargetId {
  cell: Option<String>,
  base_path: String,
  short_name: String,
  flavors: BTreeSet<Flavor>,
}

impl TargetId {
  /// Create an unflavored target in the root cell.
  pub fn new(base_path: &str, short_name: &str) -> Result<Self, TargetParseError> {
    Self::parse(&format!("//{}:{}", base_path, short_name))
  }

  pub fn parse(input: &str) -> Result<Self, TargetParseError> {
    let (cell, rest) = input
      .split_once("//")
      .ok_or_else(|| TargetParseError::MissingSlashes(input.to_string()))?;

    let (path_and_name, flavors) = match rest.split_once('#') {
      Some((head, flavors)) => (head, Some(flavors)),
      None => (rest, None),
    };

    let (base_path, short_name) = path_and_name
      .rsplit_once(':')
      .ok_or_else(|| TargetParseError::MissingName(input.to_string()))?;

    if is_relative_component(cell) || cell.contains(['/', '\\', ':']) {
      return Err(TargetParseError::InvalidCell {
        input: input.to_string(),
        cell: cell.to_string(),
      });
    }

    let bad_component = |c: &str| c.is_empty() || is_relative_component(c) || c.contains('\\');
    if base_path.contains(':') || (!base_path.is_empty() && base_path.split('/').any(bad_component)) {
      return Err(TargetParseError::InvalidBasePath(input.to_string()));
    }

    if short_name.is_empty() || is_relative_component(short_name) || short_name.contains([',', '/', '\\']) {
      return Err(TargetParseError::InvalidName {
        input: input.to_string(),
        name: short_name.to_string(),
      });
    }

    let flavors = match flavors {
      Some(list) => list.split(',').map(Flavor::new).collect::<Result<BTreeSet<_>, _>>()?,
      None => BTreeSet::new(),
    };

    Ok(Self {
      cell: (!cell.is_empty()).then(|| cell.to_string()),
      base_path: base_path.to_string(),
      short_name: short_name.to_string(),
      flavors,
    })
  }

  pub fn cell(&self) -> Option<&str> {
    self.cell.as_deref()
  }

  pub fn base_path(&self) -> &str {
    &self.base_path
  }

  pub fn short_name(&self) -> &str {
    &self.short_name
  }

  pub fn flavors(&self) -> &BTreeSet<Flavor> {
    &self.flavors
  }

  pub fn is_flavored(&self) -> bool {
    !self.flavors.is_empty()
  }

  pub fn has_flavor(&self, flavor: &str) -> bool {
    self.flavors.iter().any(|f| f.as_str() == flavor)
  }

  /// The same target with `flavor` added to its flavor set.
  pub fn with_appended_flavor(&self, flavor: Flavor) -> Self {
    let mut target = self.clone();
    target.flavors.insert(flavor);
    target
  }

  /// The same target with its flavor set replaced.
  pub fn with_flavors(&self, flavors: impl IntoIterator<Item = Flavor>) -> Self {
    Self {
      flavors: flavors.into_iter().collect(),
      ..self.clone()
    }
  }

  pub fn unflavored(&self) -> Self {
    self.with_flavors(std::iter::empty())
  }

  /// `name` or `name#flavor_a,flavor_b`.
  pub fn short_name_and_flavor_postfix(&self) -> String {
    if self.flavors.is_empty() {
      self.short_name.clone()
    } else {
      format!("{}#{}", self.short_name, self.flavor_list())
    }
  }

  pub fn fully_qualified_name(&self) -> String {
    self.to_string()
  }

  fn flavor_list(&self) -> String {
    self.flavors.iter().map(Flavor::as_str).collect::<Vec<_>>().join(",")
  }
}

/// `.` and `..` would let a target's output directory leave its parent.
fn is_relative_component(s: &str) -> bool {
  s == "." || s == ".."
}

impl fmt::Display for TargetId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{}//{}:{}",
      self.cell.as_deref().unwrap_or(""),
      self.base_path,
      self.short_name
    )?;
    if !self.flavors.is_empty() {
      write!(f, "#{}", self.flavor_list())?;
    }
    Ok(())
  }
}

impl FromStr for TargetId {
  type Err = TargetParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::parse(s)
  }
}

impl TryFrom<String> for TargetId {
  type Error = TargetParseError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    Self::parse(&value)
  }
}

impl From<TargetId> for String {
  fn from(target: TargetId) -> Self {
    target.to_string()
  }
}

impl Ord for TargetId {
  fn cmp(&self, other: &Self) -> Ordering {
    self.to_string().cmp(&other.to_string())
  }
}

impl PartialOrd for TargetId {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}
