use serde::Serialize;

use crate::rulekey::{AddToRuleKey, RuleKeyBuilder, RuleKeyError};
use crate::source::SourcePath;

use super::BuildRuleImpl;

/// A prebuilt .NET assembly, copied into the rule's output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrebuiltDotnetLibrary {
  pub assembly: SourcePath,
  pub output: SourcePath,
}

impl AddToRuleKey for PrebuiltDotnetLibrary {
  fn add_to_rule_key(&self, builder: &mut RuleKeyBuilder<'_>) -> Result<(), RuleKeyError> {
    builder
      .field("assembly", &self.assembly)?
      .output_field("output", &self.output)?;
    Ok(())
  }
}

impl BuildRuleImpl for PrebuiltDotnetLibrary {
  fn type_name(&self) -> &'static str {
    "prebuilt_dotnet_library"
  }

  fn output(&self) -> Option<&SourcePath> {
    Some(&self.output)
  }

  fn source_inputs(&self) -> Vec<&SourcePath> {
    vec![&self.assembly]
  }
}
