//! Rule keys.
//!
//! A [`RuleKey`] fingerprints everything that can change a rule's output: the
//! implementation identity plus the value of every field the kind payload
//! writes through [`AddToRuleKey`]. Rule-owned inputs contribute the producing
//! rule's key and the relative path inside its output, never an absolute
//! location, so keys are stable across checkouts and output roots.
//!
//! Every value is written tagged and length-prefixed, which keeps
//! `["ab", "c"]` and `["a", "bc"]` apart.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::trace;

use crate::consts::RULE_KEY_VERSION;
use crate::graph::RuleGraph;
use crate::source::SourcePath;
use crate::target::TargetId;
use crate::util::hash::{ContentHash, HashError, hash_path};

/// 64-character lowercase SHA-256 hex digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleKey(String);

impl RuleKey {
  /// Accepts only well-formed keys.
  pub fn from_hex(hex: &str) -> Option<Self> {
    let valid = hex.len() == 64 && hex.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
    valid.then(|| RuleKey(hex.to_string()))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for RuleKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleKeyError {
  #[error("cannot compute rule key: unknown rule {0}")]
  UnknownRule(TargetId),

  #[error("cannot hash input {path}: {source}")]
  FileHash {
    path: PathBuf,
    #[source]
    source: HashError,
  },
}

/// Values that contribute to a rule key.
pub trait AddToRuleKey {
  fn add_to_rule_key(&self, builder: &mut RuleKeyBuilder<'_>) -> Result<(), RuleKeyError>;
}

/// Supplies content hashes for source files owned by no rule.
pub trait FileHasher: Send + Sync {
  fn hash(&self, path: &Path) -> Result<ContentHash, HashError>;
}

/// Hashes files and directories relative to a project root, once per path.
pub struct ContentFileHasher {
  root: PathBuf,
  memo: Mutex<HashMap<PathBuf, ContentHash>>,
}

impl ContentFileHasher {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      memo: Mutex::new(HashMap::new()),
    }
  }
}

impl FileHasher for ContentFileHasher {
  fn hash(&self, path: &Path) -> Result<ContentHash, HashError> {
    let absolute = self.root.join(path);
    if let Some(hash) = self.memo.lock().unwrap_or_else(PoisonError::into_inner).get(&absolute) {
      return Ok(hash.clone());
    }
    let hash = hash_path(&absolute)?;
    self
      .memo
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(absolute, hash.clone());
    Ok(hash)
  }
}

/// Computes and memoizes rule keys over a frozen graph.
///
/// Safe to share between tasks; a key computed twice concurrently is identical,
/// so the memo only ever caches equal values.
pub struct RuleKeyFactory {
  graph: RuleGraph,
  file_hasher: Option<Arc<dyn FileHasher>>,
  memo: Mutex<HashMap<TargetId, RuleKey>>,
}

impl RuleKeyFactory {
  pub fn new(graph: RuleGraph) -> Self {
    Self {
      graph,
      file_hasher: None,
      memo: Mutex::new(HashMap::new()),
    }
  }

  pub fn with_file_hasher(mut self, hasher: Arc<dyn FileHasher>) -> Self {
    self.file_hasher = Some(hasher);
    self
  }

  pub fn graph(&self) -> &RuleGraph {
    &self.graph
  }

  pub fn build(&self, target: &TargetId) -> Result<RuleKey, RuleKeyError> {
    if let Some(key) = self.memo.lock().unwrap_or_else(PoisonError::into_inner).get(target) {
      return Ok(key.clone());
    }

    let rule = self
      .graph
      .get(target)
      .ok_or_else(|| RuleKeyError::UnknownRule(target.clone()))?;

    let mut builder = RuleKeyBuilder::new(self);
    builder
      .field(".type", rule.type_name())?
      .field(".version", &RULE_KEY_VERSION)?;
    rule.kind().as_impl().add_to_rule_key(&mut builder)?;
    let key = builder.finish();

    trace!(target = %target, rule_key = %key, "computed rule key");
    self
      .memo
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(target.clone(), key.clone());
    Ok(key)
  }
}

pub struct RuleKeyBuilder<'a> {
  factory: &'a RuleKeyFactory,
  hasher: Sha256,
}

impl<'a> RuleKeyBuilder<'a> {
  fn new(factory: &'a RuleKeyFactory) -> Self {
    Self {
      factory,
      hasher: Sha256::new(),
    }
  }

  /// Write a named field.
  pub fn field<T: AddToRuleKey + ?Sized>(&mut self, name: &str, value: &T) -> Result<&mut Self, RuleKeyError> {
    self.write_tagged(b'k', name.as_bytes());
    value.add_to_rule_key(self)?;
    Ok(self)
  }

  /// Write a rule's own output location. Only the path relative to the rule's
  /// output directory counts.
  pub fn output_field(&mut self, name: &str, output: &SourcePath) -> Result<&mut Self, RuleKeyError> {
    self.write_tagged(b'k', name.as_bytes());
    match output {
      SourcePath::Path(path) | SourcePath::Rule { path, .. } => {
        self.write_tagged(b'o', path.to_string_lossy().as_bytes());
      }
    }
    Ok(self)
  }

  pub fn write_str(&mut self, value: &str) {
    self.write_tagged(b's', value.as_bytes());
  }

  pub fn write_u64(&mut self, value: u64) {
    self.write_tagged(b'u', &value.to_le_bytes());
  }

  pub fn write_bool(&mut self, value: bool) {
    self.write_tagged(b'b', &[u8::from(value)]);
  }

  pub fn write_none(&mut self) {
    self.write_tagged(b'n', &[]);
  }

  /// Start a sequence of `len` values.
  pub fn begin_seq(&mut self, len: usize) {
    self.write_tagged(b'[', &(len as u64).to_le_bytes());
  }

  fn write_tagged(&mut self, tag: u8, bytes: &[u8]) {
    self.hasher.update([tag]);
    self.hasher.update((bytes.len() as u64).to_le_bytes());
    self.hasher.update(bytes);
  }

  fn write_source_path(&mut self, source: &SourcePath) -> Result<(), RuleKeyError> {
    match source {
      SourcePath::Path(path) => {
        self.write_tagged(b'p', path.to_string_lossy().as_bytes());
        if let Some(hasher) = &self.factory.file_hasher {
          let hash = hasher.hash(path).map_err(|source| RuleKeyError::FileHash {
            path: path.clone(),
            source,
          })?;
          self.write_tagged(b'h', hash.0.as_bytes());
        }
      }
      SourcePath::Rule { target, path } => {
        let key = self.factory.build(target)?;
        self.write_tagged(b'r', key.as_str().as_bytes());
        self.write_tagged(b'p', path.to_string_lossy().as_bytes());
      }
    }
    Ok(())
  }

  fn finish(self) -> RuleKey {
    RuleKey(format!("{:x}", self.hasher.finalize()))
  }
}

impl AddToRuleKey for str {
  fn add_to_rule_key(&self, builder: &mut RuleKeyBuilder<'_>) -> Result<(), RuleKeyError> {
    builder.write_str(self);
    Ok(())
  }
}

impl AddToRuleKey for String {
  fn add_to_rule_key(&self, builder: &mut RuleKeyBuilder<'_>) -> Result<(), RuleKeyError> {
    builder.write_str(self);
    Ok(())
  }
}

impl AddToRuleKey for bool {
  fn add_to_rule_key(&self, builder: &mut RuleKeyBuilder<'_>) -> Result<(), RuleKeyError> {
    builder.write_bool(*self);
    Ok(())
  }
}

impl AddToRuleKey for u32 {
  fn add_to_rule_key(&self, builder: &mut RuleKeyBuilder<'_>) -> Result<(), RuleKeyError> {
    builder.write_u64(u64::from(*self));
    Ok(())
  }
}

impl AddToRuleKey for u64 {
  fn add_to_rule_key(&self, builder: &mut RuleKeyBuilder<'_>) -> Result<(), RuleKeyError> {
    builder.write_u64(*self);
    Ok(())
  }
}

impl AddToRuleKey for PathBuf {
  fn add_to_rule_key(&self, builder: &mut RuleKeyBuilder<'_>) -> Result<(), RuleKeyError> {
    builder.write_str(&self.to_string_lossy());
    Ok(())
  }
}

impl AddToRuleKey for TargetId {
  fn add_to_rule_key(&self, builder: &mut RuleKeyBuilder<'_>) -> Result<(), RuleKeyError> {
    builder.write_str(&self.to_string());
    Ok(())
  }
}

impl AddToRuleKey for SourcePath {
  fn add_to_rule_key(&self, builder: &mut RuleKeyBuilder<'_>) -> Result<(), RuleKeyError> {
    builder.write_source_path(self)
  }
}

impl<T: AddToRuleKey> AddToRuleKey for Option<T> {
  fn add_to_rule_key(&self, builder: &mut RuleKeyBuilder<'_>) -> Result<(), RuleKeyError> {
    match self {
      Some(value) => value.add_to_rule_key(builder),
      None => {
        builder.write_none();
        Ok(())
      }
    }
  }
}

impl<T: AddToRuleKey> AddToRuleKey for [T] {
  fn add_to_rule_key(&self, builder: &mut RuleKeyBuilder<'_>) -> Result<(), RuleKeyError> {
    builder.begin_seq(self.len());
    for item in self {
      item.add_to_rule_key(builder)?;
    }
    Ok(())
  }
}

impl<T: AddToRuleKey> AddToRuleKey for Vec<T> {
  fn add_to_rule_key(&self, builder: &mut RuleKeyBuilder<'_>) -> Result<(), RuleKeyError> {
    self.as_slice().add_to_rule_key(builder)
  }
}

impl<T: AddToRuleKey> AddToRuleKey for BTreeSet<T> {
  fn add_to_rule_key(&self, builder: &mut RuleKeyBuilder<'_>) -> Result<(), RuleKeyError> {
    builder.begin_seq(self.len());
    for item in self {
      item.add_to_rule_key(builder)?;
    }
    Ok(())
  }
}

impl<K: AddToRuleKey, V: AddToRuleKey> AddToRuleKey for BTreeMap<K, V> {
  fn add_to_rule_key(&self, builder: &mut RuleKeyBuilder<'_>) -> Result<(), RuleKeyError> {
    builder.begin_seq(self.len());
    for (key, value) in self {
      key.add_to_rule_key(builder)?;
      value.add_to_rule_key(builder)?;
    }
    Ok(())
  }
}
