//! Implementation of the `rgraph query` command.

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde_json::json;

use rulegraph_lib::capability::LinkStyle;
use rulegraph_lib::packaging::{collect_android_packageables, runtime_closure, transitive_native_link_input};
use rulegraph_lib::traversal::transitive_closure;

use super::{GraphArgs, parse_targets};
use crate::output::{OutputFormat, print_json, print_stat};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum QueryKind {
  /// Build dependency closure, leaves first
  Deps,
  /// Build closure plus runtime dependencies
  Runtime,
  /// Native link input of the closure
  Link,
  /// Android packaging inputs of the closure
  Android,
}

pub fn cmd_query(
  args: &GraphArgs,
  targets: &[String],
  kind: QueryKind,
  link_style: LinkStyle,
  output: OutputFormat,
) -> Result<()> {
  let graph = args.load_rule_graph(None)?;
  let seeds = parse_targets(targets)?;

  match kind {
    QueryKind::Deps | QueryKind::Runtime => {
      let dag = match kind {
        QueryKind::Runtime => runtime_closure(&graph, &seeds),
        _ => transitive_closure(&graph, &seeds),
      }
      .context("Failed to walk dependencies")?;
      let order = dag.topological_order();
      if output.is_json() {
        let edges: Vec<_> = dag
          .edges()
          .into_iter()
          .map(|(from, to)| json!({ "from": from, "to": to }))
          .collect();
        return print_json(&json!({ "targets": order, "edges": edges }));
      }
      for target in order {
        println!("{}", target);
      }
    }
    QueryKind::Link => {
      let input = transitive_native_link_input(&graph, &seeds, link_style).context("Failed to collect link input")?;
      if output.is_json() {
        return print_json(&input);
      }
      for path in &input.inputs {
        println!("{}", path);
      }
      if !input.args.is_empty() {
        print_stat("Linker flags", &input.args.join(" "));
      }
    }
    QueryKind::Android => {
      let collector = collect_android_packageables(&graph, &seeds).context("Failed to collect packageables")?;
      if output.is_json() {
        return print_json(&collector);
      }
      let sections = [
        ("Resource dirs", collector.resource_dirs()),
        ("Asset dirs", collector.asset_dirs()),
        ("Native lib dirs", collector.native_lib_dirs()),
        ("Manifests", collector.manifests()),
        ("Classpath", collector.classpath_entries()),
      ];
      for (label, entries) in sections {
        if entries.is_empty() {
          continue;
        }
        println!("{}:", label);
        for (owner, paths) in entries {
          for path in paths {
            println!("  {}  ({})", path, owner);
          }
        }
      }
    }
  }
  Ok(())
}
