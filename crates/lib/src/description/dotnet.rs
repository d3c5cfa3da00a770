use serde::Deserialize;

use crate::rules::{PrebuiltDotnetLibrary, Rule, RuleKind};
use crate::source::SourcePath;

use super::{Description, DescriptionError, RuleContext, RuleParams, without_exports};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrebuiltDotnetLibraryArg {
  pub assembly: SourcePath,
}

pub struct PrebuiltDotnetLibraryDescription;

impl Description for PrebuiltDotnetLibraryDescription {
  type Arg = PrebuiltDotnetLibraryArg;
  const KIND: &'static str = "prebuilt_dotnet_library";

  fn create_rule(&self, _ctx: &mut RuleContext<'_>, params: RuleParams, arg: Self::Arg) -> Result<Rule, DescriptionError> {
    let file_name = arg
      .assembly
      .file_name()
      .unwrap_or_else(|| format!("{}.dll", params.target.short_name()));
    let kind = RuleKind::PrebuiltDotnetLibrary(PrebuiltDotnetLibrary {
      output: SourcePath::rule_output(params.target.clone(), file_name),
      assembly: arg.assembly,
    });
    Ok(Rule::new(params.target, kind, without_exports(params.deps)))
  }
}
