use serde::Serialize;

use crate::capability::{ApkInfo, HasInstallableApk};
use crate::rulekey::{AddToRuleKey, RuleKeyBuilder, RuleKeyError};
use crate::source::SourcePath;
use crate::target::TargetId;

use super::BuildRuleImpl;

/// Runs a shell command that writes a single output.
///
/// The command sees `OUT`, `SRCS`, `SRCDIR` and `GEN_DIR` in its environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Genrule {
  pub srcs: Vec<SourcePath>,
  pub cmd: String,
  pub out: String,
  #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
  pub output_type: Option<String>,
  pub output: SourcePath,
}

impl AddToRuleKey for Genrule {
  fn add_to_rule_key(&self, builder: &mut RuleKeyBuilder<'_>) -> Result<(), RuleKeyError> {
    builder
      .field("srcs", &self.srcs)?
      .field("cmd", &self.cmd)?
      .field("out", &self.out)?
      .field("type", &self.output_type)?;
    Ok(())
  }
}

impl BuildRuleImpl for Genrule {
  fn type_name(&self) -> &'static str {
    "genrule"
  }

  fn output(&self) -> Option<&SourcePath> {
    Some(&self.output)
  }

  fn source_inputs(&self) -> Vec<&SourcePath> {
    self.srcs.iter().collect()
  }
}

/// A genrule that post-processes another rule's APK into `<name>.apk`.
///
/// The wrapped APK's absolute path is exported to the command as `APK`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApkGenrule {
  #[serde(flatten)]
  pub genrule: Genrule,
  pub apk: TargetId,
  /// Package file of the wrapped rule.
  pub apk_input: SourcePath,
  /// Wrapped rule's package info with the path pointing at this rule's output.
  pub apk_info: ApkInfo,
}

impl HasInstallableApk for ApkGenrule {
  fn apk_info(&self) -> ApkInfo {
    self.apk_info.clone()
  }
}

impl AddToRuleKey for ApkGenrule {
  fn add_to_rule_key(&self, builder: &mut RuleKeyBuilder<'_>) -> Result<(), RuleKeyError> {
    self.genrule.add_to_rule_key(builder)?;
    builder
      .field("apk", &self.apk_input)?
      .field("manifest", &self.apk_info.manifest_path)?
      .field("package_name", &self.apk_info.package_name)?;
    Ok(())
  }
}

impl BuildRuleImpl for ApkGenrule {
  fn type_name(&self) -> &'static str {
    "apk_genrule"
  }

  fn output(&self) -> Option<&SourcePath> {
    Some(&self.genrule.output)
  }

  fn source_inputs(&self) -> Vec<&SourcePath> {
    let mut inputs = self.genrule.source_inputs();
    inputs.push(&self.apk_input);
    inputs.push(&self.apk_info.manifest_path);
    inputs
  }
}
