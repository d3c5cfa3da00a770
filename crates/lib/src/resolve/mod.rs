//! Target graph resolution.
//!
//! Walks the [`TargetGraph`] dependencies-first and asks the description for
//! each node's kind to produce its rule. Auxiliary rules a description
//! registers land in the rule graph before the node's primary rule.

mod target_graph;

use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::description::{DescriptionError, DescriptionRegistry, RuleContext, RuleParams};
use crate::graph::{GraphError, RuleGraph, RuleGraphBuilder};
use crate::rules::{DepSets, Rule};
use crate::target::TargetId;

pub use target_graph::{TargetGraph, TargetGraphError, TargetNode};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
  #[error("{target}: unknown rule kind '{kind}'")]
  UnknownKind { target: TargetId, kind: String },

  #[error("{target}: invalid arguments for {kind}: {message}")]
  MalformedArg {
    target: TargetId,
    kind: String,
    message: String,
  },

  #[error(transparent)]
  Description(#[from] DescriptionError),

  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error(transparent)]
  TargetGraph(#[from] TargetGraphError),

  #[error("resolution task failed: {0}")]
  Task(String),
}

/// Resolve one node against the rules created so far. Returns auxiliary rules
/// followed by the primary rule.
fn resolve_node(
  rules: &RuleGraphBuilder,
  registry: &DescriptionRegistry,
  node: &TargetNode,
) -> Result<Vec<Rule>, ResolveError> {
  let description = registry.get(&node.kind).ok_or_else(|| ResolveError::UnknownKind {
    target: node.target.clone(),
    kind: node.kind.clone(),
  })?;

  let params = RuleParams {
    target: node.target.clone(),
    deps: DepSets {
      declared: node.deps.clone(),
      exported: node.exported_deps.clone(),
      provided: node.provided_deps.clone(),
    },
  };

  let mut ctx = RuleContext::new(rules);
  let rule = description.create_rule_from_json(&mut ctx, params, &node.args)?;
  let mut created = ctx.into_auxiliary();
  debug!(
    target = %node.target,
    kind = %node.kind,
    auxiliary = created.len(),
    "resolved target"
  );
  created.push(rule);
  Ok(created)
}

/// Resolve every node in dependency order on the calling thread.
pub fn resolve_target_graph(graph: &TargetGraph, registry: &DescriptionRegistry) -> Result<RuleGraph, ResolveError> {
  let mut builder = RuleGraphBuilder::new();
  for target in graph.topological_order() {
    let Some(node) = graph.get(&target) else {
      continue;
    };
    for rule in resolve_node(&builder, registry, node)? {
      builder.add_rule(rule)?;
    }
  }
  info!(targets = graph.len(), rules = builder.len(), "resolved target graph");
  Ok(builder.freeze())
}

/// Resolve wave by wave, creating the rules of one wave concurrently.
///
/// Nodes in a wave only read rules from earlier waves. Their results are
/// inserted by this task alone, in target order, so the resulting graph is
/// identical to [`resolve_target_graph`].
pub async fn resolve_target_graph_parallel(
  graph: &TargetGraph,
  registry: &DescriptionRegistry,
  parallelism: usize,
) -> Result<RuleGraph, ResolveError> {
  let builder = Arc::new(RwLock::new(RuleGraphBuilder::new()));
  let semaphore = Arc::new(Semaphore::new(parallelism.max(1)));
  let registry = Arc::new(registry.clone());

  for (wave_idx, wave) in graph.waves().into_iter().enumerate() {
    debug!(wave = wave_idx, targets = wave.len(), "resolving wave");

    let mut tasks = JoinSet::new();
    for target in wave {
      let Some(node) = graph.get(&target).cloned() else {
        continue;
      };
      let permit = Arc::clone(&semaphore)
        .acquire_owned()
        .await
        .map_err(|e| ResolveError::Task(e.to_string()))?;
      let builder = Arc::clone(&builder);
      let registry = Arc::clone(&registry);

      tasks.spawn_blocking(move || {
        let _permit = permit;
        let rules = builder.read().unwrap_or_else(PoisonError::into_inner);
        (node.target.clone(), resolve_node(&rules, &registry, &node))
      });
    }

    let mut results = Vec::new();
    while let Some(joined) = tasks.join_next().await {
      results.push(joined.map_err(|e| ResolveError::Task(e.to_string()))?);
    }
    results.sort_by(|a, b| a.0.cmp(&b.0));

    let mut rules = builder.write().unwrap_or_else(PoisonError::into_inner);
    for (_, created) in results {
      for rule in created? {
        rules.add_rule(rule)?;
      }
    }
  }

  let builder = Arc::try_unwrap(builder)
    .map_err(|_| ResolveError::Task("rule graph still shared after resolution".to_string()))?
    .into_inner()
    .unwrap_or_else(PoisonError::into_inner);
  info!(targets = graph.len(), rules = builder.len(), "resolved target graph");
  Ok(builder.freeze())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::target;

  const GRAPH: &str = r#"[
    { "target": "//java:guava", "kind": "prebuilt_jar", "args": { "binary_jar": "third-party/guava.jar" } },
    { "target": "//libs:support", "kind": "android_prebuilt_aar", "deps": ["//java:guava"],
      "args": { "aar": "third-party/support.aar" } },
    { "target": "//native:z", "kind": "prebuilt_cxx_library", "args": { "static_lib": "libz.a" } },
    { "target": "//gen:classes", "kind": "genrule", "deps": ["//libs:support"],
      "args": { "srcs": ["//libs:support#aar_prebuilt_jar"], "cmd": "cp $SRCS $OUT", "out": "classes.jar" } }
  ]"#;

  fn serialized(graph: &RuleGraph) -> Vec<serde_json::Value> {
    graph
      .targets()
      .iter()
      .map(|t| serde_json::to_value(graph.get(t).unwrap().as_ref()).unwrap())
      .collect()
  }

  #[test]
  fn resolves_auxiliary_rules_before_primary() {
    let graph = TargetGraph::from_json(GRAPH).unwrap();
    let rules = resolve_target_graph(&graph, &DescriptionRegistry::with_builtins()).unwrap();

    assert_eq!(rules.len(), 6);
    assert!(rules.contains(&target("//libs:support#aar_unzip")));
    assert!(rules.contains(&target("//libs:support#aar_prebuilt_jar")));
    let classes = rules.get(&target("//gen:classes")).unwrap();
    assert!(classes.build_deps().contains(&target("//libs:support#aar_prebuilt_jar")));
  }

  #[test]
  fn unknown_kind_is_reported() {
    let graph = TargetGraph::from_json(r#"[{ "target": "//a:b", "kind": "rust_binary" }]"#).unwrap();
    let err = resolve_target_graph(&graph, &DescriptionRegistry::with_builtins()).unwrap_err();
    assert_eq!(
      err,
      ResolveError::UnknownKind {
        target: target("//a:b"),
        kind: "rust_binary".to_string(),
      }
    );
  }

  #[test]
  fn reference_to_missing_flavor_fails_insertion() {
    let graph = TargetGraph::from_json(
      r#"[
        { "target": "//java:guava", "kind": "prebuilt_jar", "args": { "binary_jar": "guava.jar" } },
        { "target": "//gen:x", "kind": "genrule",
          "args": { "srcs": ["//java:guava#nope"], "cmd": "true", "out": "x" } }
      ]"#,
    )
    .unwrap();
    let err = resolve_target_graph(&graph, &DescriptionRegistry::with_builtins()).unwrap_err();
    assert!(matches!(err, ResolveError::Graph(GraphError::MissingDependency { .. })));
  }

  #[tokio::test]
  async fn parallel_resolution_matches_sequential() {
    let graph = TargetGraph::from_json(GRAPH).unwrap();
    let registry = DescriptionRegistry::with_builtins();

    let sequential = resolve_target_graph(&graph, &registry).unwrap();
    let parallel = resolve_target_graph_parallel(&graph, &registry, 4).await.unwrap();

    assert_eq!(sequential.targets(), parallel.targets());
    assert_eq!(serialized(&sequential), serialized(&parallel));
  }

  #[tokio::test]
  async fn parallel_resolution_reports_description_errors() {
    let graph = TargetGraph::from_json(
      r#"[{ "target": "//apps:bad", "kind": "prebuilt_apk",
            "args": { "apk": "a.apk", "manifest": "AndroidManifest.xml", "package_name": "" } }]"#,
    )
    .unwrap();
    let err = resolve_target_graph_parallel(&graph, &DescriptionRegistry::with_builtins(), 2)
      .await
      .unwrap_err();
    assert!(matches!(err, ResolveError::Description(DescriptionError::InvalidArg { .. })));
  }
}
