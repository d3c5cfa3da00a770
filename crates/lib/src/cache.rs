//! Artifact caches keyed by rule key.
//!
//! A cache maps a [`RuleKey`] to the [`BuildOutput`] a previous build of that
//! key produced. Lookups that find stale or unreadable entries report a miss
//! rather than an error so the rule is simply rebuilt.
//!
//! # Storage Layout
//!
//! ```text
//! <cache_dir>/
//! └── <rule key>.json
//! ```

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::consts::CACHE_RECORD_VERSION;
use crate::rulekey::RuleKey;
use crate::util::hash::{ContentHash, hash_path};

/// What a successful build step produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOutput {
  /// Absolute path of the primary output.
  pub path: PathBuf,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub content_hash: Option<ContentHash>,
}

impl BuildOutput {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      content_hash: None,
    }
  }

  pub fn with_content_hash(mut self, hash: ContentHash) -> Self {
    self.content_hash = Some(hash);
    self
  }
}

#[derive(Debug, Error)]
pub enum CacheError {
  #[error("cache I/O error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to serialize cache record: {0}")]
  Serialize(#[source] serde_json::Error),
}

pub trait ArtifactCache: Send + Sync {
  fn get(&self, key: &RuleKey) -> Result<Option<BuildOutput>, CacheError>;

  fn put(&self, key: &RuleKey, output: &BuildOutput) -> Result<(), CacheError>;
}

/// Process-local cache, mostly useful in tests and one-shot builds.
#[derive(Debug, Default)]
pub struct InMemoryArtifactCache {
  entries: Mutex<HashMap<RuleKey, BuildOutput>>,
}

impl InMemoryArtifactCache {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl ArtifactCache for InMemoryArtifactCache {
  fn get(&self, key: &RuleKey) -> Result<Option<BuildOutput>, CacheError> {
    let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
    Ok(entries.get(key).cloned())
  }

  fn put(&self, key: &RuleKey, output: &BuildOutput) -> Result<(), CacheError> {
    let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
    entries.insert(key.clone(), output.clone());
    Ok(())
  }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord {
  version: u32,
  rule_key: String,
  output: BuildOutput,
}

/// Cache persisted as one JSON record per rule key.
///
/// Records point at outputs in place. An entry is only a hit while its output
/// still exists and still hashes to the recorded content hash.
#[derive(Debug, Clone)]
pub struct DirArtifactCache {
  root: PathBuf,
}

impl DirArtifactCache {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  fn record_path(&self, key: &RuleKey) -> PathBuf {
    self.root.join(format!("{}.json", key))
  }

  fn io_error(path: &Path) -> impl FnOnce(io::Error) -> CacheError + '_ {
    move |source| CacheError::Io {
      path: path.to_path_buf(),
      source,
    }
  }
}

/// Whether `output` still matches what was recorded.
fn verify_output(key: &RuleKey, output: &BuildOutput) -> bool {
  if !output.path.exists() {
    debug!(rule_key = %key, path = ?output.path, "cached output is gone");
    return false;
  }
  let Some(expected) = &output.content_hash else {
    return true;
  };

  match hash_path(&output.path) {
    Ok(actual) if &actual == expected => true,
    Ok(actual) => {
      warn!(
        rule_key = %key,
        path = ?output.path,
        expected = %expected,
        actual = %actual,
        "cached output changed, will rebuild"
      );
      false
    }
    Err(e) => {
      warn!(rule_key = %key, path = ?output.path, error = %e, "failed to hash cached output, will rebuild");
      false
    }
  }
}

impl ArtifactCache for DirArtifactCache {
  fn get(&self, key: &RuleKey) -> Result<Option<BuildOutput>, CacheError> {
    let path = self.record_path(key);
    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(Self::io_error(&path)(e)),
    };

    let record: CacheRecord = match serde_json::from_str(&content) {
      Ok(record) => record,
      Err(e) => {
        warn!(rule_key = %key, path = ?path, error = %e, "corrupt cache record, ignoring");
        return Ok(None);
      }
    };

    if record.version != CACHE_RECORD_VERSION || record.rule_key != key.as_str() {
      debug!(rule_key = %key, version = record.version, "cache record does not match, ignoring");
      return Ok(None);
    }

    if !verify_output(key, &record.output) {
      return Ok(None);
    }
    Ok(Some(record.output))
  }

  fn put(&self, key: &RuleKey, output: &BuildOutput) -> Result<(), CacheError> {
    fs::create_dir_all(&self.root).map_err(Self::io_error(&self.root))?;

    let mut output = output.clone();
    if output.content_hash.is_none() {
      match hash_path(&output.path) {
        Ok(hash) => output.content_hash = Some(hash),
        Err(e) => warn!(rule_key = %key, error = %e, "failed to hash output, recording without hash"),
      }
    }

    let record = CacheRecord {
      version: CACHE_RECORD_VERSION,
      rule_key: key.as_str().to_string(),
      output,
    };
    let content = serde_json::to_string_pretty(&record).map_err(CacheError::Serialize)?;

    // Write to a temp file, then rename.
    let path = self.record_path(key);
    let temp_path = self.root.join(format!("{}.json.tmp", key));
    fs::write(&temp_path, content).map_err(Self::io_error(&temp_path))?;
    fs::rename(&temp_path, &path).map_err(Self::io_error(&path))?;
    debug!(rule_key = %key, path = ?path, "cache record written");
    Ok(())
  }
}
