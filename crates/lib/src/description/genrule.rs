use serde::Deserialize;

use crate::rules::{ApkGenrule, Genrule, Rule, RuleKind};
use crate::source::SourcePath;
use crate::target::TargetId;

use super::{Description, DescriptionError, RuleContext, RuleParams, without_exports};

fn default_cacheable() -> bool {
  true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenruleArg {
  #[serde(default)]
  pub srcs: Vec<SourcePath>,
  pub cmd: String,
  pub out: String,
  #[serde(default, rename = "type")]
  pub output_type: Option<String>,
  #[serde(default = "default_cacheable")]
  pub cacheable: bool,
}

pub struct GenruleDescription;

impl Description for GenruleDescription {
  type Arg = GenruleArg;
  const KIND: &'static str = "genrule";

  fn create_rule(&self, _ctx: &mut RuleContext<'_>, params: RuleParams, arg: Self::Arg) -> Result<Rule, DescriptionError> {
    validate_out(&params.target, &arg.out)?;
    let kind = RuleKind::Genrule(Genrule {
      output: SourcePath::rule_output(params.target.clone(), &arg.out),
      srcs: arg.srcs,
      cmd: arg.cmd,
      out: arg.out,
      output_type: arg.output_type,
    });
    Ok(Rule::new(params.target, kind, without_exports(params.deps)).with_cacheable(arg.cacheable))
  }
}

fn validate_out(target: &TargetId, out: &str) -> Result<(), DescriptionError> {
  let invalid = out.is_empty() || out.starts_with('/') || out.split('/').any(|c| c == "..");
  if invalid {
    return Err(DescriptionError::InvalidArg {
      target: target.clone(),
      message: format!("out must be a relative path inside the output directory, got '{}'", out),
    });
  }
  Ok(())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApkGenruleArg {
  #[serde(default)]
  pub srcs: Vec<SourcePath>,
  pub cmd: String,
  /// Rule providing the package to post-process.
  pub apk: TargetId,
  #[serde(default, rename = "type")]
  pub output_type: Option<String>,
  #[serde(default = "default_cacheable")]
  pub cacheable: bool,
}

pub struct ApkGenruleDescription;

impl Description for ApkGenruleDescription {
  type Arg = ApkGenruleArg;
  const KIND: &'static str = "apk_genrule";

  fn create_rule(&self, ctx: &mut RuleContext<'_>, params: RuleParams, arg: Self::Arg) -> Result<Rule, DescriptionError> {
    let wrapped = ctx.require_installable_apk(&params.target, &arg.apk)?;

    let out = format!("{}.apk", params.target.short_name_and_flavor_postfix());
    let output = SourcePath::rule_output(params.target.clone(), &out);
    let kind = RuleKind::ApkGenrule(ApkGenrule {
      genrule: Genrule {
        srcs: arg.srcs,
        cmd: arg.cmd,
        out,
        output_type: arg.output_type,
        output: output.clone(),
      },
      apk: arg.apk.clone(),
      apk_input: wrapped.apk_path.clone(),
      apk_info: wrapped.with_apk_path(output),
    });

    let mut deps = without_exports(params.deps);
    deps.declared.insert(arg.apk);
    Ok(Rule::new(params.target, kind, deps).with_cacheable(arg.cacheable))
  }
}
