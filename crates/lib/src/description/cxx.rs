use serde::Deserialize;

use crate::rules::{CxxLibrary, Rule, RuleKind};
use crate::source::SourcePath;

use super::{Description, DescriptionError, RuleContext, RuleParams};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrebuiltCxxLibraryArg {
  #[serde(default)]
  pub static_lib: Option<SourcePath>,
  #[serde(default)]
  pub shared_lib: Option<SourcePath>,
  #[serde(default)]
  pub header_only: bool,
  #[serde(default)]
  pub include_dirs: Vec<SourcePath>,
  #[serde(default)]
  pub exported_preprocessor_flags: Vec<String>,
  #[serde(default)]
  pub exported_linker_flags: Vec<String>,
}

pub struct PrebuiltCxxLibraryDescription;

impl Description for PrebuiltCxxLibraryDescription {
  type Arg = PrebuiltCxxLibraryArg;
  const KIND: &'static str = "prebuilt_cxx_library";

  fn create_rule(&self, _ctx: &mut RuleContext<'_>, params: RuleParams, arg: Self::Arg) -> Result<Rule, DescriptionError> {
    if !arg.header_only && arg.static_lib.is_none() && arg.shared_lib.is_none() {
      return Err(DescriptionError::InvalidArg {
        target: params.target,
        message: "a library that is not header_only needs static_lib or shared_lib".to_string(),
      });
    }

    let kind = RuleKind::CxxLibrary(CxxLibrary {
      static_lib: arg.static_lib,
      shared_lib: arg.shared_lib,
      header_only: arg.header_only,
      include_dirs: arg.include_dirs,
      exported_preprocessor_flags: arg.exported_preprocessor_flags,
      exported_linker_flags: arg.exported_linker_flags,
    });
    Ok(Rule::new(params.target, kind, params.deps))
  }
}
