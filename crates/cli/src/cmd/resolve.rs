//! Implementation of the `rgraph resolve` command.
//!
//! Resolves every target node through its description and lists the rules,
//! including auxiliary rules created along the way.

use anyhow::Result;
use serde::Serialize;

use rulegraph_lib::capability::Capability;

use super::GraphArgs;
use crate::output::{OutputFormat, print_json, print_stat, print_success};

#[derive(Serialize)]
struct RuleSummary {
  target: String,
  kind: &'static str,
  capabilities: Vec<Capability>,
  deps: Vec<String>,
}

pub fn cmd_resolve(args: &GraphArgs, jobs: Option<usize>, output: OutputFormat) -> Result<()> {
  let graph = args.load_rule_graph(jobs)?;

  let rules: Vec<RuleSummary> = graph
    .topological_order()
    .iter()
    .filter_map(|target| graph.get(target))
    .map(|rule| RuleSummary {
      target: rule.target().to_string(),
      kind: rule.type_name(),
      capabilities: rule.capabilities(),
      deps: rule.build_deps().iter().map(ToString::to_string).collect(),
    })
    .collect();

  if output.is_json() {
    return print_json(&rules);
  }

  print_success(&format!("Resolved {} rule(s)", rules.len()));
  for rule in &rules {
    println!();
    println!("{} ({})", rule.target, rule.kind);
    if !rule.capabilities.is_empty() {
      let names: Vec<String> = rule.capabilities.iter().map(ToString::to_string).collect();
      print_stat("Capabilities", &names.join(", "));
    }
    if !rule.deps.is_empty() {
      print_stat("Deps", &rule.deps.join(" "));
    }
  }
  Ok(())
}
