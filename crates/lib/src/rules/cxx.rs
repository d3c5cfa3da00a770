use serde::Serialize;

use crate::capability::{CxxPreprocessorDep, CxxPreprocessorInput, LinkStyle, NativeLinkable, NativeLinkableInput};
use crate::rulekey::{AddToRuleKey, RuleKeyBuilder, RuleKeyError};
use crate::source::{SourcePath, filter_rule_inputs};

use super::BuildRuleImpl;

/// A prebuilt C/C++ library: a static archive, a shared object, or headers only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CxxLibrary {
  pub static_lib: Option<SourcePath>,
  pub shared_lib: Option<SourcePath>,
  pub header_only: bool,
  pub include_dirs: Vec<SourcePath>,
  pub exported_preprocessor_flags: Vec<String>,
  pub exported_linker_flags: Vec<String>,
}

impl CxxLibrary {
  fn link_input_for(&self, style: LinkStyle) -> Option<&SourcePath> {
    if self.header_only {
      return None;
    }
    match style {
      LinkStyle::Static => self.static_lib.as_ref(),
      // Fall back to the archive when no shared object was provided.
      LinkStyle::Shared => self.shared_lib.as_ref().or(self.static_lib.as_ref()),
    }
  }
}

impl NativeLinkable for CxxLibrary {
  fn native_linkable_input(&self, style: LinkStyle) -> NativeLinkableInput {
    let inputs: Vec<SourcePath> = self.link_input_for(style).cloned().into_iter().collect();
    NativeLinkableInput {
      targets: filter_rule_inputs(&inputs),
      inputs,
      args: self.exported_linker_flags.clone(),
    }
  }
}

impl CxxPreprocessorDep for CxxLibrary {
  fn cxx_preprocessor_input(&self) -> CxxPreprocessorInput {
    CxxPreprocessorInput {
      targets: filter_rule_inputs(&self.include_dirs),
      include_dirs: self.include_dirs.clone(),
      flags: self.exported_preprocessor_flags.clone(),
    }
  }
}

impl AddToRuleKey for CxxLibrary {
  fn add_to_rule_key(&self, builder: &mut RuleKeyBuilder<'_>) -> Result<(), RuleKeyError> {
    builder
      .field("static_lib", &self.static_lib)?
      .field("shared_lib", &self.shared_lib)?
      .field("header_only", &self.header_only)?
      .field("include_dirs", &self.include_dirs)?
      .field("exported_preprocessor_flags", &self.exported_preprocessor_flags)?
      .field("exported_linker_flags", &self.exported_linker_flags)?;
    Ok(())
  }
}

impl BuildRuleImpl for CxxLibrary {
  fn type_name(&self) -> &'static str {
    "prebuilt_cxx_library"
  }

  fn output(&self) -> Option<&SourcePath> {
    None
  }

  fn source_inputs(&self) -> Vec<&SourcePath> {
    self
      .static_lib
      .iter()
      .chain(self.shared_lib.iter())
      .chain(self.include_dirs.iter())
      .collect()
  }
}
