use serde::Deserialize;

use crate::rules::{PrebuiltJar, Rule, RuleKind};
use crate::source::SourcePath;

use super::{Description, DescriptionError, RuleContext, RuleParams};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrebuiltJarArg {
  pub binary_jar: SourcePath,
  #[serde(default)]
  pub source_jar: Option<SourcePath>,
}

pub struct PrebuiltJarDescription;

impl Description for PrebuiltJarDescription {
  type Arg = PrebuiltJarArg;
  const KIND: &'static str = "prebuilt_jar";

  fn create_rule(&self, _ctx: &mut RuleContext<'_>, params: RuleParams, arg: Self::Arg) -> Result<Rule, DescriptionError> {
    let file_name = arg
      .binary_jar
      .file_name()
      .unwrap_or_else(|| format!("{}.jar", params.target.short_name()));
    let kind = RuleKind::PrebuiltJar(PrebuiltJar {
      output: SourcePath::rule_output(params.target.clone(), file_name),
      binary_jar: arg.binary_jar,
      source_jar: arg.source_jar,
    });
    Ok(Rule::new(params.target, kind, params.deps))
  }
}
