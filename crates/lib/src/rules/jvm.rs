use serde::Serialize;

use crate::capability::{AndroidPackageable, AndroidPackageableCollector};
use crate::rulekey::{AddToRuleKey, RuleKeyBuilder, RuleKeyError};
use crate::source::SourcePath;
use crate::target::TargetId;

use super::BuildRuleImpl;

/// A prebuilt jar, copied into the rule's output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrebuiltJar {
  pub binary_jar: SourcePath,
  pub source_jar: Option<SourcePath>,
  pub output: SourcePath,
}

impl AndroidPackageable for PrebuiltJar {
  fn add_to_collector(&self, owner: &TargetId, collector: &mut AndroidPackageableCollector) {
    collector.add_classpath_entry(owner, self.output.clone());
  }
}

impl AddToRuleKey for PrebuiltJar {
  fn add_to_rule_key(&self, builder: &mut RuleKeyBuilder<'_>) -> Result<(), RuleKeyError> {
    builder
      .field("binary_jar", &self.binary_jar)?
      .field("source_jar", &self.source_jar)?
      .output_field("output", &self.output)?;
    Ok(())
  }
}

impl BuildRuleImpl for PrebuiltJar {
  fn type_name(&self) -> &'static str {
    "prebuilt_jar"
  }

  fn output(&self) -> Option<&SourcePath> {
    Some(&self.output)
  }

  fn source_inputs(&self) -> Vec<&SourcePath> {
    std::iter::once(&self.binary_jar).chain(self.source_jar.iter()).collect()
  }
}
