use serde::Serialize;

use crate::capability::{AndroidPackageable, AndroidPackageableCollector, ApkInfo, HasInstallableApk, HasRuntimeDeps};
use crate::rulekey::{AddToRuleKey, RuleKeyBuilder, RuleKeyError};
use crate::source::SourcePath;
use crate::target::TargetId;

use super::BuildRuleImpl;

/// Unpacks an `.aar` archive into the rule's output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnzipAar {
  pub aar: SourcePath,
  pub output: SourcePath,
}

impl UnzipAar {
  pub const CLASSES_JAR: &'static str = "classes.jar";
  pub const MANIFEST: &'static str = "AndroidManifest.xml";
  pub const RES_DIR: &'static str = "res";
  pub const ASSETS_DIR: &'static str = "assets";
  pub const NATIVE_LIBS_DIR: &'static str = "jni";
  pub const TEXT_SYMBOLS: &'static str = "R.txt";
}

impl AddToRuleKey for UnzipAar {
  fn add_to_rule_key(&self, builder: &mut RuleKeyBuilder<'_>) -> Result<(), RuleKeyError> {
    builder.field("aar", &self.aar)?.output_field("output", &self.output)?;
    Ok(())
  }
}

impl BuildRuleImpl for UnzipAar {
  fn type_name(&self) -> &'static str {
    "unzip_aar"
  }

  fn output(&self) -> Option<&SourcePath> {
    Some(&self.output)
  }

  fn source_inputs(&self) -> Vec<&SourcePath> {
    vec![&self.aar]
  }
}

/// An Android library archive. Everything it exposes lives in the output of
/// its unpack rule; the embedded classes are re-exported through a separate
/// prebuilt jar rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AndroidPrebuiltAar {
  pub unzip_rule: TargetId,
  pub prebuilt_jar_rule: TargetId,
  pub manifest: SourcePath,
  pub res_dir: SourcePath,
  pub assets_dir: SourcePath,
  pub native_libs_dir: SourcePath,
  pub text_symbols: SourcePath,
  pub classes_jar: SourcePath,
}

impl AndroidPrebuiltAar {
  pub fn new(unzip_rule: TargetId, prebuilt_jar_rule: TargetId, classes_jar: SourcePath) -> Self {
    let unzipped = |path: &str| SourcePath::rule_output(unzip_rule.clone(), path);
    Self {
      manifest: unzipped(UnzipAar::MANIFEST),
      res_dir: unzipped(UnzipAar::RES_DIR),
      assets_dir: unzipped(UnzipAar::ASSETS_DIR),
      native_libs_dir: unzipped(UnzipAar::NATIVE_LIBS_DIR),
      text_symbols: unzipped(UnzipAar::TEXT_SYMBOLS),
      classes_jar,
      prebuilt_jar_rule,
      unzip_rule,
    }
  }
}

impl HasRuntimeDeps for AndroidPrebuiltAar {
  fn runtime_deps(&self) -> Vec<TargetId> {
    vec![self.unzip_rule.clone()]
  }
}

impl AndroidPackageable for AndroidPrebuiltAar {
  fn add_to_collector(&self, owner: &TargetId, collector: &mut AndroidPackageableCollector) {
    collector
      .add_native_lib_dir(owner, self.native_libs_dir.clone())
      .add_resource_dir(owner, self.res_dir.clone())
      .add_asset_dir(owner, self.assets_dir.clone())
      .add_manifest(owner, self.manifest.clone());
  }
}

impl AddToRuleKey for AndroidPrebuiltAar {
  fn add_to_rule_key(&self, builder: &mut RuleKeyBuilder<'_>) -> Result<(), RuleKeyError> {
    builder
      .field("manifest", &self.manifest)?
      .field("res", &self.res_dir)?
      .field("assets", &self.assets_dir)?
      .field("native_libs", &self.native_libs_dir)?
      .field("text_symbols", &self.text_symbols)?
      .field("classes_jar", &self.classes_jar)?;
    Ok(())
  }
}

impl BuildRuleImpl for AndroidPrebuiltAar {
  fn type_name(&self) -> &'static str {
    "android_prebuilt_aar"
  }

  fn output(&self) -> Option<&SourcePath> {
    None
  }

  fn source_inputs(&self) -> Vec<&SourcePath> {
    vec![
      &self.manifest,
      &self.res_dir,
      &self.assets_dir,
      &self.native_libs_dir,
      &self.text_symbols,
      &self.classes_jar,
    ]
  }
}

/// An APK checked into the source tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrebuiltApk {
  pub apk: SourcePath,
  pub manifest: SourcePath,
  pub package_name: String,
}

impl HasInstallableApk for PrebuiltApk {
  fn apk_info(&self) -> ApkInfo {
    ApkInfo {
      apk_path: self.apk.clone(),
      manifest_path: self.manifest.clone(),
      package_name: self.package_name.clone(),
    }
  }
}

impl AddToRuleKey for PrebuiltApk {
  fn add_to_rule_key(&self, builder: &mut RuleKeyBuilder<'_>) -> Result<(), RuleKeyError> {
    builder
      .field("apk", &self.apk)?
      .field("manifest", &self.manifest)?
      .field("package_name", &self.package_name)?;
    Ok(())
  }
}

impl BuildRuleImpl for PrebuiltApk {
  fn type_name(&self) -> &'static str {
    "prebuilt_apk"
  }

  fn output(&self) -> Option<&SourcePath> {
    None
  }

  fn source_inputs(&self) -> Vec<&SourcePath> {
    vec![&self.apk, &self.manifest]
  }
}
