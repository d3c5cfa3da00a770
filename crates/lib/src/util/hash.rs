//! Content hashing for source inputs and build outputs.
//!
//! - `ContentHash`: a full 64-character SHA-256 hex digest
//! - `hash_path()`: hash a file or a directory tree
//! - `hash_directory()`: deterministic directory hashing
//! - `hash_file()`: single file hashing
//! - `hash_bytes()`: arbitrary byte hashing

use std::fs;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

/// A full 64-character SHA-256 hash of some content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(pub String);

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HashError {
  #[error("failed to walk directory: {message}")]
  WalkDir { message: String },

  #[error("failed to read file {path}: {message}")]
  ReadFile { path: String, message: String },

  #[error("failed to read symlink {path}: {message}")]
  ReadSymlink { path: String, message: String },
}

/// Hash whatever lives at `path`: file contents for a file, the tree for a
/// directory.
pub fn hash_path(path: &Path) -> Result<ContentHash, HashError> {
  if path.is_dir() {
    hash_directory(path)
  } else {
    hash_file(path)
  }
}

/// Compute a deterministic hash of a directory's contents.
///
/// The hash covers file contents, directory structure and symlink targets, but
/// not metadata such as timestamps or permissions. An unpacked archive hashes
/// the same wherever it was unpacked.
pub fn hash_directory(path: &Path) -> Result<ContentHash, HashError> {
  let mut entries: Vec<(String, String)> = Vec::new();

  for entry in WalkDir::new(path).sort_by_file_name() {
    let entry = entry.map_err(|e| HashError::WalkDir { message: e.to_string() })?;
    let entry_path = entry.path();

    let rel_path = entry_path
      .strip_prefix(path)
      .unwrap_or(entry_path)
      .to_string_lossy()
      .replace('\\', "/");

    if rel_path.is_empty() {
      continue;
    }

    let file_type = entry.file_type();
    let entry_hash = if file_type.is_file() {
      format!("F:{}:{}", rel_path, hash_file(entry_path)?.0)
    } else if file_type.is_dir() {
      format!("D:{}", rel_path)
    } else if file_type.is_symlink() {
      let target = fs::read_link(entry_path).map_err(|e| HashError::ReadSymlink {
        path: entry_path.display().to_string(),
        message: e.to_string(),
      })?;
      format!("L:{}:{}", rel_path, hash_bytes(target.to_string_lossy().as_bytes()).0)
    } else {
      // sockets, devices
      continue;
    };

    entries.push((rel_path, entry_hash));
  }

  entries.sort_by(|a, b| a.0.cmp(&b.0));

  let mut hasher = Sha256::new();
  for (_, entry_hash) in entries {
    hasher.update(entry_hash.as_bytes());
    hasher.update(b"\n");
  }

  Ok(ContentHash(format!("{:x}", hasher.finalize())))
}

/// Hash a file's contents.
pub fn hash_file(path: &Path) -> Result<ContentHash, HashError> {
  let read_err = |e: std::io::Error| HashError::ReadFile {
    path: path.display().to_string(),
    message: e.to_string(),
  };

  let mut file = fs::File::open(path).map_err(read_err)?;
  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 8192];

  loop {
    let bytes_read = file.read(&mut buffer).map_err(read_err)?;
    if bytes_read == 0 {
      break;
    }
    hasher.update(&buffer[..bytes_read]);
  }

  Ok(ContentHash(format!("{:x}", hasher.finalize())))
}

pub fn hash_bytes(data: &[u8]) -> ContentHash {
  let mut hasher = Sha256::new();
  hasher.update(data);
  ContentHash(format!("{:x}", hasher.finalize()))
}
