//! Variables exported to genrule commands.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::rules::{Genrule, Rule, RuleKind};
use crate::source::SourcePath;

/// Subdirectory of a rule's output directory holding copies of its sources.
pub const SRCDIR_NAME: &str = "__srcs";

pub fn srcdir(output_dir: &Path) -> PathBuf {
  output_dir.join(SRCDIR_NAME)
}

/// Environment for the command of `rule`. Empty for kinds that run no command.
///
/// `resolved` must hold the absolute path of every source input of the rule.
pub fn step_env(
  rule: &Rule,
  resolved: &BTreeMap<SourcePath, PathBuf>,
  output_dir: &Path,
  output_path: Option<&Path>,
  gen_dir: &Path,
) -> BTreeMap<String, String> {
  let mut env = BTreeMap::new();
  match rule.kind() {
    RuleKind::Genrule(genrule) => {
      genrule_env(&mut env, genrule, resolved, output_dir, output_path, gen_dir);
    }
    RuleKind::ApkGenrule(apk_genrule) => {
      genrule_env(&mut env, &apk_genrule.genrule, resolved, output_dir, output_path, gen_dir);
      if let Some(apk) = resolved.get(&apk_genrule.apk_input) {
        env.insert("APK".to_string(), display(apk));
      }
    }
    _ => {}
  }
  env
}

fn genrule_env(
  env: &mut BTreeMap<String, String>,
  genrule: &Genrule,
  resolved: &BTreeMap<SourcePath, PathBuf>,
  output_dir: &Path,
  output_path: Option<&Path>,
  gen_dir: &Path,
) {
  let srcs: Vec<String> = genrule
    .srcs
    .iter()
    .filter_map(|src| resolved.get(src))
    .map(|path| display(path))
    .collect();

  if let Some(out) = output_path {
    env.insert("OUT".to_string(), display(out));
  }
  env.insert("SRCS".to_string(), srcs.join(" "));
  env.insert("SRCDIR".to_string(), display(&srcdir(output_dir)));
  env.insert("GEN_DIR".to_string(), display(gen_dir));
}

fn display(path: &Path) -> String {
  path.to_string_lossy().to_string()
}
