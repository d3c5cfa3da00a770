//! Optional typed views over rules.
//!
//! A rule exposes a capability by returning `Some(&dyn Trait)` from the
//! matching accessor on [`Rule`](crate::rules::Rule). Consumers query the view
//! they need and treat `None` as "this rule does not take part", never as an
//! error.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::source::SourcePath;
use crate::target::TargetId;

/// How a native library is linked into its dependent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStyle {
  Static,
  Shared,
}

impl fmt::Display for LinkStyle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      LinkStyle::Static => f.write_str("static"),
      LinkStyle::Shared => f.write_str("shared"),
    }
  }
}

/// What a linker needs from one library, or from a whole closure once folded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NativeLinkableInput {
  /// Rules that must be built before the inputs exist.
  pub targets: BTreeSet<TargetId>,
  /// Archives or shared objects, in link order.
  pub inputs: Vec<SourcePath>,
  /// Extra linker arguments, in link order.
  pub args: Vec<String>,
}

impl NativeLinkableInput {
  /// Concatenate inputs in iteration order.
  pub fn concat(items: impl IntoIterator<Item = NativeLinkableInput>) -> Self {
    let mut merged = NativeLinkableInput::default();
    for item in items {
      merged.targets.extend(item.targets);
      merged.inputs.extend(item.inputs);
      merged.args.extend(item.args);
    }
    merged
  }

  pub fn is_empty(&self) -> bool {
    self.targets.is_empty() && self.inputs.is_empty() && self.args.is_empty()
  }
}

pub trait NativeLinkable {
  /// Link input for `style`. Each style is computed from immutable state, so
  /// repeated calls return identical values.
  fn native_linkable_input(&self, style: LinkStyle) -> NativeLinkableInput;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CxxPreprocessorInput {
  pub targets: BTreeSet<TargetId>,
  pub include_dirs: Vec<SourcePath>,
  pub flags: Vec<String>,
}

pub trait CxxPreprocessorDep {
  fn cxx_preprocessor_input(&self) -> CxxPreprocessorInput;
}

/// Location and identity of an installable Android package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApkInfo {
  pub apk_path: SourcePath,
  pub manifest_path: SourcePath,
  pub package_name: String,
}

impl ApkInfo {
  pub fn with_apk_path(&self, apk_path: SourcePath) -> Self {
    Self {
      apk_path,
      ..self.clone()
    }
  }
}

pub trait HasInstallableApk {
  fn apk_info(&self) -> ApkInfo;
}

/// Rules needed at run time but not to build the owning rule.
pub trait HasRuntimeDeps {
  fn runtime_deps(&self) -> Vec<TargetId>;
}

/// Accumulates everything an APK packaging step pulls out of its dependency
/// closure, grouped by the rule that contributed it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AndroidPackageableCollector {
  resource_dirs: BTreeMap<TargetId, Vec<SourcePath>>,
  asset_dirs: BTreeMap<TargetId, Vec<SourcePath>>,
  native_lib_dirs: BTreeMap<TargetId, Vec<SourcePath>>,
  manifests: BTreeMap<TargetId, Vec<SourcePath>>,
  classpath_entries: BTreeMap<TargetId, Vec<SourcePath>>,
}

impl AndroidPackageableCollector {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_resource_dir(&mut self, owner: &TargetId, dir: SourcePath) -> &mut Self {
    push(&mut self.resource_dirs, owner, dir);
    self
  }

  pub fn add_asset_dir(&mut self, owner: &TargetId, dir: SourcePath) -> &mut Self {
    push(&mut self.asset_dirs, owner, dir);
    self
  }

  pub fn add_native_lib_dir(&mut self, owner: &TargetId, dir: SourcePath) -> &mut Self {
    push(&mut self.native_lib_dirs, owner, dir);
    self
  }

  pub fn add_manifest(&mut self, owner: &TargetId, manifest: SourcePath) -> &mut Self {
    push(&mut self.manifests, owner, manifest);
    self
  }

  pub fn add_classpath_entry(&mut self, owner: &TargetId, jar: SourcePath) -> &mut Self {
    push(&mut self.classpath_entries, owner, jar);
    self
  }

  pub fn resource_dirs(&self) -> &BTreeMap<TargetId, Vec<SourcePath>> {
    &self.resource_dirs
  }

  pub fn asset_dirs(&self) -> &BTreeMap<TargetId, Vec<SourcePath>> {
    &self.asset_dirs
  }

  pub fn native_lib_dirs(&self) -> &BTreeMap<TargetId, Vec<SourcePath>> {
    &self.native_lib_dirs
  }

  pub fn manifests(&self) -> &BTreeMap<TargetId, Vec<SourcePath>> {
    &self.manifests
  }

  pub fn classpath_entries(&self) -> &BTreeMap<TargetId, Vec<SourcePath>> {
    &self.classpath_entries
  }

  pub fn is_empty(&self) -> bool {
    self.resource_dirs.is_empty()
      && self.asset_dirs.is_empty()
      && self.native_lib_dirs.is_empty()
      && self.manifests.is_empty()
      && self.classpath_entries.is_empty()
  }
}

fn push(map: &mut BTreeMap<TargetId, Vec<SourcePath>>, owner: &TargetId, value: SourcePath) {
  let entries = map.entry(owner.clone()).or_default();
  if !entries.contains(&value) {
    entries.push(value);
  }
}

pub trait AndroidPackageable {
  fn add_to_collector(&self, owner: &TargetId, collector: &mut AndroidPackageableCollector);
}

/// Names a capability in errors and queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
  NativeLinkable,
  CxxPreprocessor,
  InstallableApk,
  RuntimeDeps,
  AndroidPackageable,
}

impl Capability {
  pub const ALL: [Capability; 5] = [
    Capability::NativeLinkable,
    Capability::CxxPreprocessor,
    Capability::InstallableApk,
    Capability::RuntimeDeps,
    Capability::AndroidPackageable,
  ];
}

impl fmt::Display for Capability {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Capability::NativeLinkable => "native linkable",
      Capability::CxxPreprocessor => "c/c++ preprocessor dep",
      Capability::InstallableApk => "installable apk",
      Capability::RuntimeDeps => "runtime deps",
      Capability::AndroidPackageable => "android packageable",
    };
    f.write_str(name)
  }
}
