//! Shared helpers for engine integration tests.

use std::path::Path;
use std::sync::Arc;

use rulegraph_lib::cache::ArtifactCache;
use rulegraph_lib::{
  BuildEngine, DescriptionRegistry, EngineConfig, RuleGraph, ShellStepExecutor, TargetGraph, TargetId,
  resolve_target_graph,
};
use tempfile::TempDir;

pub fn target(s: &str) -> TargetId {
  TargetId::parse(s).unwrap()
}

pub fn resolve(json: &str) -> RuleGraph {
  let graph = TargetGraph::from_json(json).unwrap();
  resolve_target_graph(&graph, &DescriptionRegistry::with_builtins()).unwrap()
}

/// A throwaway project directory.
pub struct TestProject {
  pub temp: TempDir,
}

impl TestProject {
  pub fn new() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  pub fn root(&self) -> &Path {
    self.temp.path()
  }

  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.root().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  pub fn read_file(&self, relative_path: &str) -> String {
    std::fs::read_to_string(self.root().join(relative_path)).unwrap()
  }

  pub fn config(&self) -> EngineConfig {
    EngineConfig {
      parallelism: 4,
      output_root: self.root().join("out"),
      cache_dir: Some(self.root().join("cache")),
      shell: None,
    }
  }

  pub fn engine(&self, graph: RuleGraph, cache: Arc<dyn ArtifactCache>) -> BuildEngine<ShellStepExecutor> {
    BuildEngine::new(graph, ShellStepExecutor::default(), cache, &self.config(), self.root())
  }
}
