//! Where rule outputs live on disk.

use std::path::{Component, Path, PathBuf};

use crate::consts::ROOT_CELL_DIR;
use crate::target::TargetId;

/// Maps targets to output directories below a single root:
/// `<root>/<cell>/<base_path>/<name_and_flavors>/`.
///
/// Targets in the root cell use [`ROOT_CELL_DIR`] for the cell component so a
/// root target can never collide with a cell named like a top-level package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
  root: PathBuf,
}

impl OutputLayout {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Always strictly below [`OutputLayout::root`]: target parsing rejects
  /// `.` and `..` components.
  pub fn output_dir(&self, target: &TargetId) -> PathBuf {
    let mut relative = PathBuf::from(target.cell().unwrap_or(ROOT_CELL_DIR));
    for component in target.base_path().split('/').filter(|c| !c.is_empty()) {
      relative.push(component);
    }
    relative.push(target.short_name_and_flavor_postfix());
    debug_assert!(
      relative.components().all(|c| matches!(c, Component::Normal(_))),
      "output dir of {target} leaves the output root"
    );
    self.root.join(relative)
  }
}
