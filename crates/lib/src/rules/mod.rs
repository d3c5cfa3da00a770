//! Concrete build rules.
//!
//! A [`Rule`] is the immutable product of resolving one target description:
//! its identity, a kind-specific payload, the declared dependency classes and
//! whether its output may be shared through the artifact cache.
//!
//! Kinds are a closed enum, but capabilities are not part of the enum: each
//! accessor (`native_linkable`, `installable_apk`, ...) matches the kind and
//! hands back a trait object when that kind provides the view.

mod android;
mod cxx;
mod dotnet;
mod genrule;
mod jvm;

use std::collections::BTreeSet;

use serde::Serialize;

use crate::capability::{
  AndroidPackageable, Capability, CxxPreprocessorDep, HasInstallableApk, HasRuntimeDeps, NativeLinkable,
};
use crate::rulekey::AddToRuleKey;
use crate::source::{SourcePath, filter_rule_inputs};
use crate::target::TargetId;

pub use android::{AndroidPrebuiltAar, PrebuiltApk, UnzipAar};
pub use cxx::CxxLibrary;
pub use dotnet::PrebuiltDotnetLibrary;
pub use genrule::{ApkGenrule, Genrule};
pub use jvm::PrebuiltJar;

/// Behaviour every kind payload provides.
pub trait BuildRuleImpl: AddToRuleKey + Send + Sync {
  /// Stable name of the implementation, part of every rule key.
  fn type_name(&self) -> &'static str;

  /// Primary output, if the rule produces one.
  fn output(&self) -> Option<&SourcePath>;

  /// Every source reference the rule reads while building.
  fn source_inputs(&self) -> Vec<&SourcePath>;
}

/// Dependency classes declared on a rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DepSets {
  pub declared: BTreeSet<TargetId>,
  pub exported: BTreeSet<TargetId>,
  pub provided: BTreeSet<TargetId>,
}

impl DepSets {
  pub fn declared(deps: impl IntoIterator<Item = TargetId>) -> Self {
    Self {
      declared: deps.into_iter().collect(),
      ..Self::default()
    }
  }

  pub fn all(&self) -> BTreeSet<TargetId> {
    let mut all = self.propagated();
    all.extend(self.provided.iter().cloned());
    all
  }

  /// Declared and exported deps. Provided deps are compile-time only and
  /// never flow into packaging or linking.
  pub fn propagated(&self) -> BTreeSet<TargetId> {
    self.declared.iter().chain(&self.exported).cloned().collect()
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum RuleKind {
  #[serde(rename = "prebuilt_cxx_library")]
  CxxLibrary(CxxLibrary),
  #[serde(rename = "prebuilt_jar")]
  PrebuiltJar(PrebuiltJar),
  #[serde(rename = "unzip_aar")]
  UnzipAar(UnzipAar),
  #[serde(rename = "android_prebuilt_aar")]
  AndroidPrebuiltAar(AndroidPrebuiltAar),
  #[serde(rename = "prebuilt_dotnet_library")]
  PrebuiltDotnetLibrary(PrebuiltDotnetLibrary),
  #[serde(rename = "genrule")]
  Genrule(Genrule),
  #[serde(rename = "apk_genrule")]
  ApkGenrule(ApkGenrule),
  #[serde(rename = "prebuilt_apk")]
  PrebuiltApk(PrebuiltApk),
}

impl RuleKind {
  pub fn as_impl(&self) -> &dyn BuildRuleImpl {
    match self {
      RuleKind::CxxLibrary(k) => k,
      RuleKind::PrebuiltJar(k) => k,
      RuleKind::UnzipAar(k) => k,
      RuleKind::AndroidPrebuiltAar(k) => k,
      RuleKind::PrebuiltDotnetLibrary(k) => k,
      RuleKind::Genrule(k) => k,
      RuleKind::ApkGenrule(k) => k,
      RuleKind::PrebuiltApk(k) => k,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rule {
  target: TargetId,
  #[serde(flatten)]
  kind: RuleKind,
  deps: DepSets,
  cacheable: bool,
  #[serde(skip)]
  build_deps: BTreeSet<TargetId>,
  #[serde(skip)]
  propagated_deps: BTreeSet<TargetId>,
}

impl Rule {
  pub fn new(target: TargetId, kind: RuleKind, deps: DepSets) -> Self {
    let referenced = filter_rule_inputs(kind.as_impl().source_inputs());
    let mut build_deps = deps.all();
    build_deps.extend(referenced.iter().cloned());
    let mut propagated_deps = deps.propagated();
    propagated_deps.extend(referenced);
    Self {
      target,
      kind,
      deps,
      cacheable: true,
      build_deps,
      propagated_deps,
    }
  }

  pub fn with_cacheable(mut self, cacheable: bool) -> Self {
    self.cacheable = cacheable;
    self
  }

  pub fn target(&self) -> &TargetId {
    &self.target
  }

  pub fn kind(&self) -> &RuleKind {
    &self.kind
  }

  pub fn type_name(&self) -> &'static str {
    self.kind.as_impl().type_name()
  }

  pub fn deps(&self) -> &DepSets {
    &self.deps
  }

  pub fn declared_deps(&self) -> &BTreeSet<TargetId> {
    &self.deps.declared
  }

  pub fn exported_deps(&self) -> &BTreeSet<TargetId> {
    &self.deps.exported
  }

  pub fn provided_deps(&self) -> &BTreeSet<TargetId> {
    &self.deps.provided
  }

  /// Declared, exported and provided deps plus every rule referenced from a
  /// source input. These are the rule's DAG edges.
  pub fn build_deps(&self) -> &BTreeSet<TargetId> {
    &self.build_deps
  }

  /// Build deps minus provided deps. Packaging and link walks follow these.
  pub fn propagated_deps(&self) -> &BTreeSet<TargetId> {
    &self.propagated_deps
  }

  pub fn is_cacheable(&self) -> bool {
    self.cacheable
  }

  pub fn output(&self) -> Option<&SourcePath> {
    self.kind.as_impl().output()
  }

  pub fn source_inputs(&self) -> Vec<&SourcePath> {
    self.kind.as_impl().source_inputs()
  }

  pub fn native_linkable(&self) -> Option<&dyn NativeLinkable> {
    match &self.kind {
      RuleKind::CxxLibrary(lib) => Some(lib),
      _ => None,
    }
  }

  pub fn cxx_preprocessor_dep(&self) -> Option<&dyn CxxPreprocessorDep> {
    match &self.kind {
      RuleKind::CxxLibrary(lib) => Some(lib),
      _ => None,
    }
  }

  pub fn installable_apk(&self) -> Option<&dyn HasInstallableApk> {
    match &self.kind {
      RuleKind::ApkGenrule(apk) => Some(apk),
      RuleKind::PrebuiltApk(apk) => Some(apk),
      _ => None,
    }
  }

  pub fn runtime_deps_provider(&self) -> Option<&dyn HasRuntimeDeps> {
    match &self.kind {
      RuleKind::AndroidPrebuiltAar(aar) => Some(aar),
      _ => None,
    }
  }

  pub fn android_packageable(&self) -> Option<&dyn AndroidPackageable> {
    match &self.kind {
      RuleKind::AndroidPrebuiltAar(aar) => Some(aar),
      RuleKind::PrebuiltJar(jar) => Some(jar),
      _ => None,
    }
  }

  pub fn supports(&self, capability: Capability) -> bool {
    match capability {
      Capability::NativeLinkable => self.native_linkable().is_some(),
      Capability::CxxPreprocessor => self.cxx_preprocessor_dep().is_some(),
      Capability::InstallableApk => self.installable_apk().is_some(),
      Capability::RuntimeDeps => self.runtime_deps_provider().is_some(),
      Capability::AndroidPackageable => self.android_packageable().is_some(),
    }
  }

  pub fn capabilities(&self) -> Vec<Capability> {
    Capability::ALL.into_iter().filter(|c| self.supports(*c)).collect()
  }
}
