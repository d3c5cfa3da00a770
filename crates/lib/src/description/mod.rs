//! Target descriptions.
//!
//! A [`Description`] turns one target node (kind tag, JSON constructor args and
//! resolved dependencies) into a [`Rule`]. Descriptions are looked up by kind
//! tag in a [`DescriptionRegistry`]; the typed `Arg` is erased behind
//! [`DynDescription`] so the registry can hold every kind side by side.

mod android;
mod cxx;
mod dotnet;
mod genrule;
mod jvm;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::capability::{ApkInfo, Capability};
use crate::graph::RuleGraphBuilder;
use crate::resolve::ResolveError;
use crate::rules::{DepSets, Rule};
use crate::target::TargetId;

pub use android::{AndroidPrebuiltAarArg, AndroidPrebuiltAarDescription, PrebuiltApkArg, PrebuiltApkDescription};
pub use cxx::{PrebuiltCxxLibraryArg, PrebuiltCxxLibraryDescription};
pub use dotnet::{PrebuiltDotnetLibraryArg, PrebuiltDotnetLibraryDescription};
pub use genrule::{ApkGenruleArg, ApkGenruleDescription, GenruleArg, GenruleDescription};
pub use jvm::{PrebuiltJarArg, PrebuiltJarDescription};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptionError {
  #[error("{target}: dependency {dependency} is not a {capability}")]
  CapabilityMismatch {
    target: TargetId,
    dependency: TargetId,
    capability: Capability,
  },

  #[error("{target}: dependency {dependency} has not been resolved")]
  MissingRule { target: TargetId, dependency: TargetId },

  #[error("{target}: {message}")]
  InvalidArg { target: TargetId, message: String },
}

/// Identity and resolved dependencies handed to a description.
#[derive(Debug, Clone)]
pub struct RuleParams {
  pub target: TargetId,
  pub deps: DepSets,
}

/// Kinds that export nothing keep declared exports as plain build deps.
fn without_exports(deps: DepSets) -> DepSets {
  let DepSets {
    mut declared,
    exported,
    provided,
  } = deps;
  declared.extend(exported);
  DepSets {
    declared,
    exported: BTreeSet::new(),
    provided,
  }
}

/// What a description can see and do while creating its rule.
///
/// Lookups cover rules resolved earlier plus auxiliary rules this description
/// has registered so far. Auxiliary rules are inserted into the graph before
/// the primary rule.
pub struct RuleContext<'a> {
  rules: &'a RuleGraphBuilder,
  auxiliary: Vec<Rule>,
}

impl<'a> RuleContext<'a> {
  pub fn new(rules: &'a RuleGraphBuilder) -> Self {
    Self {
      rules,
      auxiliary: Vec::new(),
    }
  }

  pub fn get_rule(&self, target: &TargetId) -> Option<&Rule> {
    self
      .rules
      .get(target)
      .map(|rule| rule.as_ref())
      .or_else(|| self.auxiliary.iter().find(|rule| rule.target() == target))
  }

  pub fn require_rule(&self, owner: &TargetId, dependency: &TargetId) -> Result<&Rule, DescriptionError> {
    self.get_rule(dependency).ok_or_else(|| DescriptionError::MissingRule {
      target: owner.clone(),
      dependency: dependency.clone(),
    })
  }

  /// Package info of `dependency`, which must provide an installable apk.
  pub fn require_installable_apk(&self, owner: &TargetId, dependency: &TargetId) -> Result<ApkInfo, DescriptionError> {
    let rule = self.require_rule(owner, dependency)?;
    rule
      .installable_apk()
      .map(|apk| apk.apk_info())
      .ok_or_else(|| DescriptionError::CapabilityMismatch {
        target: owner.clone(),
        dependency: dependency.clone(),
        capability: Capability::InstallableApk,
      })
  }

  pub fn add_auxiliary(&mut self, rule: Rule) {
    self.auxiliary.push(rule);
  }

  pub fn into_auxiliary(self) -> Vec<Rule> {
    self.auxiliary
  }
}

/// Builds rules of one kind from typed constructor args.
pub trait Description: Send + Sync + 'static {
  type Arg: DeserializeOwned;

  /// Kind tag used in target graph input.
  const KIND: &'static str;

  /// Short name of the constructor arg type.
  fn constructor_arg_type(&self) -> &'static str {
    let full = std::any::type_name::<Self::Arg>();
    full.rsplit("::").next().unwrap_or(full)
  }

  fn create_rule(&self, ctx: &mut RuleContext<'_>, params: RuleParams, arg: Self::Arg) -> Result<Rule, DescriptionError>;
}

/// Object-safe view of a [`Description`].
pub trait DynDescription: Send + Sync {
  fn kind(&self) -> &'static str;

  fn constructor_arg_type(&self) -> &'static str;

  fn create_rule_from_json(
    &self,
    ctx: &mut RuleContext<'_>,
    params: RuleParams,
    args: &serde_json::Value,
  ) -> Result<Rule, ResolveError>;
}

impl<D: Description> DynDescription for D {
  fn kind(&self) -> &'static str {
    D::KIND
  }

  fn constructor_arg_type(&self) -> &'static str {
    Description::constructor_arg_type(self)
  }

  fn create_rule_from_json(
    &self,
    ctx: &mut RuleContext<'_>,
    params: RuleParams,
    args: &serde_json::Value,
  ) -> Result<Rule, ResolveError> {
    let args = if args.is_null() {
      serde_json::Value::Object(Default::default())
    } else {
      args.clone()
    };
    let arg: D::Arg = serde_json::from_value(args).map_err(|e| ResolveError::MalformedArg {
      target: params.target.clone(),
      kind: D::KIND.to_string(),
      message: e.to_string(),
    })?;
    Ok(self.create_rule(ctx, params, arg)?)
  }
}

/// Kind tag to description.
#[derive(Clone)]
pub struct DescriptionRegistry {
  descriptions: BTreeMap<&'static str, Arc<dyn DynDescription>>,
}

impl DescriptionRegistry {
  pub fn empty() -> Self {
    Self {
      descriptions: BTreeMap::new(),
    }
  }

  pub fn with_builtins() -> Self {
    let mut registry = Self::empty();
    registry
      .register(PrebuiltCxxLibraryDescription)
      .register(PrebuiltJarDescription)
      .register(AndroidPrebuiltAarDescription)
      .register(PrebuiltDotnetLibraryDescription)
      .register(GenruleDescription)
      .register(ApkGenruleDescription)
      .register(PrebuiltApkDescription);
    registry
  }

  /// Add or replace the description for `D::KIND`.
  pub fn register<D: Description>(&mut self, description: D) -> &mut Self {
    self.descriptions.insert(D::KIND, Arc::new(description));
    self
  }

  pub fn get(&self, kind: &str) -> Option<&Arc<dyn DynDescription>> {
    self.descriptions.get(kind)
  }

  pub fn kinds(&self) -> BTreeSet<&'static str> {
    self.descriptions.keys().copied().collect()
  }
}

impl Default for DescriptionRegistry {
  fn default() -> Self {
    Self::with_builtins()
  }
}

impl fmt::Debug for DescriptionRegistry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("DescriptionRegistry")
      .field("kinds", &self.kinds())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::{genrule, target};
  use serde_json::json;

  fn params(name: &str) -> RuleParams {
    RuleParams {
      target: target(name),
      deps: DepSets::default(),
    }
  }

  #[test]
  fn builtins_cover_every_kind() {
    let kinds = DescriptionRegistry::with_builtins().kinds();
    assert_eq!(
      kinds.into_iter().collect::<Vec<_>>(),
      vec![
        "android_prebuilt_aar",
        "apk_genrule",
        "genrule",
        "prebuilt_apk",
        "prebuilt_cxx_library",
        "prebuilt_dotnet_library",
        "prebuilt_jar",
      ]
    );
  }

  #[test]
  fn constructor_arg_type_is_short_name() {
    let registry = DescriptionRegistry::with_builtins();
    assert_eq!(
      registry.get("prebuilt_dotnet_library").unwrap().constructor_arg_type(),
      "PrebuiltDotnetLibraryArg"
    );
  }

  #[test]
  fn malformed_args_name_target_and_kind() {
    let registry = DescriptionRegistry::with_builtins();
    let builder = RuleGraphBuilder::new();
    let mut ctx = RuleContext::new(&builder);
    let err = registry
      .get("prebuilt_dotnet_library")
      .unwrap()
      .create_rule_from_json(&mut ctx, params("//net:lib"), &json!({ "assembly": 42 }))
      .unwrap_err();

    match err {
      ResolveError::MalformedArg { target: t, kind, .. } => {
        assert_eq!(t, target("//net:lib"));
        assert_eq!(kind, "prebuilt_dotnet_library");
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn unknown_fields_are_rejected() {
    let registry = DescriptionRegistry::with_builtins();
    let builder = RuleGraphBuilder::new();
    let mut ctx = RuleContext::new(&builder);
    let result = registry.get("prebuilt_dotnet_library").unwrap().create_rule_from_json(
      &mut ctx,
      params("//net:lib"),
      &json!({ "assembly": "lib.dll", "typo": true }),
    );
    assert!(matches!(result, Err(ResolveError::MalformedArg { .. })));
  }

  #[test]
  fn context_sees_auxiliary_rules() {
    let builder = RuleGraphBuilder::new();
    let mut ctx = RuleContext::new(&builder);
    ctx.add_auxiliary(genrule("//a:aux", vec![], &[]));

    assert!(ctx.get_rule(&target("//a:aux")).is_some());
    assert!(matches!(
      ctx.require_rule(&target("//a:main"), &target("//a:other")),
      Err(DescriptionError::MissingRule { .. })
    ));
    assert_eq!(ctx.into_auxiliary().len(), 1);
  }

  #[test]
  fn require_installable_apk_reports_capability_mismatch() {
    let mut builder = RuleGraphBuilder::new();
    builder.add_rule(genrule("//a:not_apk", vec![], &[])).unwrap();
    let ctx = RuleContext::new(&builder);

    assert_eq!(
      ctx.require_installable_apk(&target("//a:wrapper"), &target("//a:not_apk")),
      Err(DescriptionError::CapabilityMismatch {
        target: target("//a:wrapper"),
        dependency: target("//a:not_apk"),
        capability: Capability::InstallableApk,
      })
    );
  }
}
