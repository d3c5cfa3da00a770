use serde::Deserialize;

use crate::consts::{AAR_PREBUILT_JAR_FLAVOR, AAR_UNZIP_FLAVOR};
use crate::rules::{AndroidPrebuiltAar, DepSets, PrebuiltApk, PrebuiltJar, Rule, RuleKind, UnzipAar};
use crate::source::SourcePath;
use crate::target::{Flavor, TargetId};

use super::{Description, DescriptionError, RuleContext, RuleParams, without_exports};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AndroidPrebuiltAarArg {
  pub aar: SourcePath,
}

/// Resolves an `.aar` into three rules:
///
/// - `#aar_unzip` unpacks the archive
/// - `#aar_prebuilt_jar` re-exports the unpacked `classes.jar`
/// - the primary rule, which exports that jar and exposes the unpacked
///   resources to packaging
pub struct AndroidPrebuiltAarDescription;

impl AndroidPrebuiltAarDescription {
  fn flavored(target: &TargetId, flavor: &str) -> Result<TargetId, DescriptionError> {
    let flavor = Flavor::new(flavor).map_err(|e| DescriptionError::InvalidArg {
      target: target.clone(),
      message: e.to_string(),
    })?;
    Ok(target.with_appended_flavor(flavor))
  }
}

impl Description for AndroidPrebuiltAarDescription {
  type Arg = AndroidPrebuiltAarArg;
  const KIND: &'static str = "android_prebuilt_aar";

  fn create_rule(&self, ctx: &mut RuleContext<'_>, params: RuleParams, arg: Self::Arg) -> Result<Rule, DescriptionError> {
    let target = params.target;
    let unzip_target = Self::flavored(&target, AAR_UNZIP_FLAVOR)?;
    let jar_target = Self::flavored(&target, AAR_PREBUILT_JAR_FLAVOR)?;

    let unzip = Rule::new(
      unzip_target.clone(),
      RuleKind::UnzipAar(UnzipAar {
        aar: arg.aar,
        output: SourcePath::rule(unzip_target.clone()),
      }),
      DepSets::default(),
    );
    ctx.add_auxiliary(unzip);

    let jar_output = SourcePath::rule_output(jar_target.clone(), UnzipAar::CLASSES_JAR);
    let prebuilt_jar = Rule::new(
      jar_target.clone(),
      RuleKind::PrebuiltJar(PrebuiltJar {
        binary_jar: SourcePath::rule_output(unzip_target.clone(), UnzipAar::CLASSES_JAR),
        source_jar: None,
        output: jar_output.clone(),
      }),
      DepSets::default(),
    );
    ctx.add_auxiliary(prebuilt_jar);

    let mut deps = params.deps;
    // Classes of aar dependencies travel with this aar's own jar.
    let transitive_jars: Vec<TargetId> = deps
      .declared
      .iter()
      .filter_map(|dep| ctx.get_rule(dep))
      .filter_map(|rule| match rule.kind() {
        RuleKind::AndroidPrebuiltAar(aar) => Some(aar.prebuilt_jar_rule.clone()),
        RuleKind::PrebuiltJar(_) => Some(rule.target().clone()),
        _ => None,
      })
      .collect();
    deps.exported.insert(jar_target.clone());
    deps.exported.extend(transitive_jars);
    deps.declared.insert(unzip_target.clone());

    let kind = RuleKind::AndroidPrebuiltAar(AndroidPrebuiltAar::new(unzip_target, jar_target, jar_output));
    Ok(Rule::new(target, kind, deps))
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrebuiltApkArg {
  pub apk: SourcePath,
  pub manifest: SourcePath,
  pub package_name: String,
}

pub struct PrebuiltApkDescription;

impl Description for PrebuiltApkDescription {
  type Arg = PrebuiltApkArg;
  const KIND: &'static str = "prebuilt_apk";

  fn create_rule(&self, _ctx: &mut RuleContext<'_>, params: RuleParams, arg: Self::Arg) -> Result<Rule, DescriptionError> {
    if arg.package_name.trim().is_empty() {
      return Err(DescriptionError::InvalidArg {
        target: params.target,
        message: "package_name must not be empty".to_string(),
      });
    }
    let kind = RuleKind::PrebuiltApk(PrebuiltApk {
      apk: arg.apk,
      manifest: arg.manifest,
      package_name: arg.package_name,
    });
    Ok(Rule::new(params.target, kind, without_exports(params.deps)))
  }
}
