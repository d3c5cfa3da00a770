//! Fixtures shared by unit tests.

use crate::graph::{RuleGraph, RuleGraphBuilder};
use crate::rules::{AndroidPrebuiltAar, CxxLibrary, DepSets, Genrule, PrebuiltJar, Rule, RuleKind};
use crate::source::SourcePath;
use crate::target::TargetId;

pub fn target(s: &str) -> TargetId {
  TargetId::parse(s).unwrap()
}

pub fn targets(list: &[&str]) -> Vec<TargetId> {
  list.iter().map(|s| target(s)).collect()
}

/// A genrule writing `out.txt`, with the given sources and declared deps.
pub fn genrule(name: &str, srcs: Vec<SourcePath>, deps: &[&str]) -> Rule {
  let id = target(name);
  let kind = RuleKind::Genrule(Genrule {
    srcs,
    cmd: "echo built > $OUT".to_string(),
    out: "out.txt".to_string(),
    output_type: None,
    output: SourcePath::rule_output(id.clone(), "out.txt"),
  });
  Rule::new(id, kind, DepSets::declared(targets(deps)))
}

pub fn genrule_with_cmd(name: &str, cmd: &str) -> Rule {
  let id = target(name);
  let kind = RuleKind::Genrule(Genrule {
    srcs: vec![],
    cmd: cmd.to_string(),
    out: "out.txt".to_string(),
    output_type: None,
    output: SourcePath::rule_output(id.clone(), "out.txt"),
  });
  Rule::new(id, kind, DepSets::default())
}

pub fn prebuilt_jar(name: &str, jar: &str) -> Rule {
  let id = target(name);
  let kind = RuleKind::PrebuiltJar(PrebuiltJar {
    binary_jar: SourcePath::path(jar),
    source_jar: None,
    output: SourcePath::rule_output(id.clone(), "lib.jar"),
  });
  Rule::new(id, kind, DepSets::default())
}

/// A static-only prebuilt C/C++ library linking `lib<short name>.a`.
pub fn cxx_library(name: &str, deps: &[&str]) -> Rule {
  let id = target(name);
  let kind = RuleKind::CxxLibrary(CxxLibrary {
    static_lib: Some(SourcePath::path(format!("lib{}.a", id.short_name()))),
    shared_lib: None,
    header_only: false,
    include_dirs: vec![],
    exported_preprocessor_flags: vec![],
    exported_linker_flags: vec![format!("-l{}", id.short_name())],
  });
  Rule::new(id, kind, DepSets::declared(targets(deps)))
}

/// An aar whose files come from `unpacked` but whose runtime dependency is
/// `runtime`, a rule it never builds against.
pub fn aar_with_runtime_dep(name: &str, unpacked: &str, runtime: &str) -> Rule {
  let id = target(name);
  let unpacked = target(unpacked);
  let mut aar = AndroidPrebuiltAar::new(
    unpacked.clone(),
    id.with_appended_flavor(crate::target::Flavor::new("aar_prebuilt_jar").unwrap()),
    SourcePath::rule_output(unpacked, "classes.jar"),
  );
  aar.unzip_rule = target(runtime);
  Rule::new(id, RuleKind::AndroidPrebuiltAar(aar), DepSets::default())
}

/// Rebuild `rule` with `provided` added to its provided deps.
pub fn with_provided(rule: Rule, provided: &[&str]) -> Rule {
  let mut deps = rule.deps().clone();
  deps.provided.extend(targets(provided));
  Rule::new(rule.target().clone(), rule.kind().clone(), deps).with_cacheable(rule.is_cacheable())
}

/// Freeze rules into a graph, inserting them in the given order.
pub fn graph_of(rules: Vec<Rule>) -> RuleGraph {
  let mut builder = RuleGraphBuilder::new();
  for rule in rules {
    builder.add_rule(rule).unwrap();
  }
  builder.freeze()
}
