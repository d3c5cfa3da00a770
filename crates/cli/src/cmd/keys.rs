use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;

use rulegraph_lib::RuleKeyFactory;
use rulegraph_lib::rulekey::ContentFileHasher;

use super::{GraphArgs, parse_targets};
use crate::output::{OutputFormat, print_json};

/// Print the rule key of each target, or of every rule when none are given.
pub fn cmd_keys(args: &GraphArgs, targets: &[String], output: OutputFormat) -> Result<()> {
  let root = args.project_root()?;
  let graph = args.load_rule_graph(None)?;
  let targets = if targets.is_empty() {
    graph.targets()
  } else {
    parse_targets(targets)?
  };

  let factory = RuleKeyFactory::new(graph).with_file_hasher(Arc::new(ContentFileHasher::new(&root)));
  let mut keys = Vec::with_capacity(targets.len());
  for target in targets {
    let key = factory
      .build(&target)
      .with_context(|| format!("Failed to compute rule key for {}", target))?;
    keys.push((target, key));
  }

  if output.is_json() {
    let items: Vec<_> = keys
      .iter()
      .map(|(target, key)| json!({ "target": target, "rule_key": key }))
      .collect();
    return print_json(&items);
  }

  for (target, key) in &keys {
    println!("{}  {}", key, target);
  }
  Ok(())
}
