mod build;
mod keys;
mod query;
mod resolve;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use tracing::debug;

use rulegraph_lib::{
  DescriptionRegistry, RuleGraph, TargetGraph, TargetId, resolve_target_graph, resolve_target_graph_parallel,
};

pub use build::{BuildOptions, cmd_build};
pub use keys::cmd_keys;
pub use query::{QueryKind, cmd_query};
pub use resolve::cmd_resolve;

#[derive(Args, Debug, Clone)]
pub struct GraphArgs {
  /// Target graph file (JSON array of target nodes)
  #[arg(short, long, default_value = "targets.json")]
  pub graph: PathBuf,

  /// Project root that plain source paths are relative to (default: the graph file's directory)
  #[arg(long)]
  pub root: Option<PathBuf>,
}

impl GraphArgs {
  pub fn project_root(&self) -> Result<PathBuf> {
    let root = match &self.root {
      Some(root) => root.clone(),
      None => {
        let graph = dunce::canonicalize(&self.graph)
          .with_context(|| format!("Failed to locate target graph: {}", self.graph.display()))?;
        graph.parent().map(Path::to_path_buf).unwrap_or_default()
      }
    };
    dunce::canonicalize(&root).with_context(|| format!("Failed to locate project root: {}", root.display()))
  }

  pub fn load_target_graph(&self) -> Result<TargetGraph> {
    let json = std::fs::read_to_string(&self.graph)
      .with_context(|| format!("Failed to read target graph: {}", self.graph.display()))?;
    TargetGraph::from_json(&json).with_context(|| format!("Invalid target graph: {}", self.graph.display()))
  }

  /// Load and resolve the graph, concurrently when `jobs` is given.
  pub fn load_rule_graph(&self, jobs: Option<usize>) -> Result<RuleGraph> {
    let targets = self.load_target_graph()?;
    let registry = DescriptionRegistry::with_builtins();

    let rules = match jobs {
      Some(jobs) => {
        let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
        rt.block_on(resolve_target_graph_parallel(&targets, &registry, jobs))
      }
      None => resolve_target_graph(&targets, &registry),
    }
    .context("Failed to resolve target graph")?;

    debug!(targets = targets.len(), rules = rules.len(), "resolved target graph");
    Ok(rules)
  }
}

pub fn parse_targets(targets: &[String]) -> Result<Vec<TargetId>> {
  targets
    .iter()
    .map(|t| TargetId::parse(t).with_context(|| format!("Invalid target: {}", t)))
    .collect()
}
