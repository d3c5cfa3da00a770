//! Filesystem helpers for placing outputs.

use std::fs;
use std::io;
use std::path::Path;

/// Copy a file, or a directory recursively, to `dst`. Parent directories of
/// `dst` are created.
pub fn copy_path(src: &Path, dst: &Path) -> io::Result<()> {
  if let Some(parent) = dst.parent() {
    fs::create_dir_all(parent)?;
  }
  if src.is_dir() {
    copy_dir_all(src, dst)
  } else {
    fs::copy(src, dst).map(|_| ())
  }
}

fn copy_dir_all(src: &Path, dst: &Path) -> io::Result<()> {
  fs::create_dir_all(dst)?;
  for entry in fs::read_dir(src)? {
    let entry = entry?;
    let ty = entry.file_type()?;
    let dst_path = dst.join(entry.file_name());
    if ty.is_dir() {
      copy_dir_all(&entry.path(), &dst_path)?;
    } else {
      fs::copy(entry.path(), dst_path)?;
    }
  }
  Ok(())
}

/// Remove a file, directory, or symlink. Missing paths are fine.
pub fn remove_path(path: &Path) -> io::Result<()> {
  let Ok(metadata) = path.symlink_metadata() else {
    return Ok(());
  };
  if metadata.is_dir() {
    fs::remove_dir_all(path)
  } else {
    fs::remove_file(path)
  }
}
