//! The target graph: unresolved nodes as read from the JSON front end.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::target::TargetId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetGraphError {
  #[error("failed to parse target graph: {0}")]
  Parse(String),

  #[error("target {0} is defined more than once")]
  DuplicateTarget(TargetId),

  #[error("target {target} depends on undefined target {dependency}")]
  MissingDependency { target: TargetId, dependency: TargetId },

  #[error("dependency cycle through {0}")]
  Cycle(TargetId),
}

/// One target description before resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetNode {
  pub target: TargetId,
  pub kind: String,
  #[serde(default)]
  pub args: serde_json::Value,
  #[serde(default)]
  pub deps: BTreeSet<TargetId>,
  #[serde(default)]
  pub exported_deps: BTreeSet<TargetId>,
  #[serde(default)]
  pub provided_deps: BTreeSet<TargetId>,
}

impl TargetNode {
  /// Targets named anywhere in `args`, other than this node itself.
  pub fn arg_references(&self) -> BTreeSet<TargetId> {
    let mut found = BTreeSet::new();
    collect_references(&self.args, &mut found);
    found.remove(&self.target);
    found
  }

  /// Declared, exported and provided deps as written.
  pub fn declared_deps(&self) -> impl Iterator<Item = &TargetId> {
    self.deps.iter().chain(&self.exported_deps).chain(&self.provided_deps)
  }
}

fn collect_references(value: &serde_json::Value, found: &mut BTreeSet<TargetId>) {
  match value {
    serde_json::Value::String(s) if s.contains("//") => {
      if let Ok(target) = TargetId::parse(s) {
        found.insert(target);
      }
    }
    serde_json::Value::Array(items) => items.iter().for_each(|v| collect_references(v, found)),
    serde_json::Value::Object(map) => map.values().for_each(|v| collect_references(v, found)),
    _ => {}
  }
}

/// The node that defines `dep`: the node of that exact name, or else the
/// unflavored node whose description creates the flavored auxiliary rule.
fn owner_of(nodes: &BTreeMap<TargetId, TargetNode>, dep: &TargetId) -> Option<TargetId> {
  if nodes.contains_key(dep) {
    return Some(dep.clone());
  }
  let owner = dep.unflavored();
  (dep.is_flavored() && nodes.contains_key(&owner)).then_some(owner)
}

/// Validated, acyclic set of target nodes.
#[derive(Debug, Clone)]
pub struct TargetGraph {
  nodes: BTreeMap<TargetId, TargetNode>,
  deps: BTreeMap<TargetId, BTreeSet<TargetId>>,
}

impl TargetGraph {
  pub fn new(nodes: Vec<TargetNode>) -> Result<Self, TargetGraphError> {
    let mut by_target = BTreeMap::new();
    for node in nodes {
      if by_target.contains_key(&node.target) {
        return Err(TargetGraphError::DuplicateTarget(node.target));
      }
      by_target.insert(node.target.clone(), node);
    }

    let mut deps = BTreeMap::new();
    for (target, node) in &by_target {
      let mut node_deps = BTreeSet::new();
      for dep in node.declared_deps() {
        node_deps.insert(Self::require_owner(&by_target, target, dep)?);
      }
      for reference in node.arg_references() {
        let owner = Self::require_owner(&by_target, target, &reference)?;
        // A node may name its own auxiliary rules.
        if &owner != target {
          node_deps.insert(owner);
        }
      }
      deps.insert(target.clone(), node_deps);
    }

    let graph = Self { nodes: by_target, deps };
    graph.verify_acyclic()?;
    Ok(graph)
  }

  fn require_owner(
    nodes: &BTreeMap<TargetId, TargetNode>,
    target: &TargetId,
    dep: &TargetId,
  ) -> Result<TargetId, TargetGraphError> {
    owner_of(nodes, dep).ok_or_else(|| TargetGraphError::MissingDependency {
      target: target.clone(),
      dependency: dep.clone(),
    })
  }

  pub fn from_json(json: &str) -> Result<Self, TargetGraphError> {
    let nodes: Vec<TargetNode> = serde_json::from_str(json).map_err(|e| TargetGraphError::Parse(e.to_string()))?;
    Self::new(nodes)
  }

  fn petgraph(&self) -> (DiGraph<TargetId, ()>, HashMap<TargetId, NodeIndex>) {
    let mut graph = DiGraph::new();
    let mut index = HashMap::new();
    for target in self.nodes.keys() {
      index.insert(target.clone(), graph.add_node(target.clone()));
    }
    // Edge from dependency to dependent.
    for (target, deps) in &self.deps {
      for dep in deps {
        graph.add_edge(index[dep], index[target], ());
      }
    }
    (graph, index)
  }

  fn verify_acyclic(&self) -> Result<(), TargetGraphError> {
    let (graph, _) = self.petgraph();
    toposort(&graph, None).map_err(|cycle| TargetGraphError::Cycle(graph[cycle.node_id()].clone()))?;
    Ok(())
  }

  pub fn get(&self, target: &TargetId) -> Option<&TargetNode> {
    self.nodes.get(target)
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  pub fn nodes(&self) -> impl Iterator<Item = &TargetNode> {
    self.nodes.values()
  }

  /// Nodes `target` must be resolved after, including references in its args.
  pub fn dependencies(&self, target: &TargetId) -> Option<&BTreeSet<TargetId>> {
    self.deps.get(target)
  }

  /// Resolution waves: every node's dependencies sit in earlier waves. Waves
  /// are sorted.
  pub fn waves(&self) -> Vec<Vec<TargetId>> {
    let (graph, _) = self.petgraph();
    let mut pending: HashMap<NodeIndex, usize> = graph
      .node_indices()
      .map(|idx| (idx, graph.neighbors_directed(idx, Direction::Incoming).count()))
      .collect();

    let mut current: Vec<NodeIndex> = pending.iter().filter(|(_, n)| **n == 0).map(|(i, _)| *i).collect();
    let mut waves = Vec::new();
    while !current.is_empty() {
      let mut next = Vec::new();
      for &idx in &current {
        for dependent in graph.neighbors_directed(idx, Direction::Outgoing) {
          if let Some(count) = pending.get_mut(&dependent) {
            *count = count.saturating_sub(1);
            if *count == 0 {
              next.push(dependent);
            }
          }
        }
      }
      let mut wave: Vec<TargetId> = current.iter().map(|idx| graph[*idx].clone()).collect();
      wave.sort();
      waves.push(wave);
      current = next;
    }
    waves
  }

  /// Dependencies before dependents, wave by wave.
  pub fn topological_order(&self) -> Vec<TargetId> {
    self.waves().into_iter().flatten().collect()
  }
}
