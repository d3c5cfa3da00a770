//! The rule graph.
//!
//! Rules are added leaves first through [`RuleGraphBuilder`]: a rule may only
//! depend on rules that are already present, so the graph is acyclic by
//! construction and every edge endpoint is a node. Once construction is done
//! the builder is frozen into a [`RuleGraph`], which is cheap to clone and safe
//! to read from many tasks at once.
//!
//! Edges point from a rule to the rules it depends on.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;
use tracing::debug;

use crate::rules::Rule;
use crate::target::TargetId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
  #[error("rule {0} is already in the graph")]
  DuplicateRule(TargetId),

  #[error("rule {target} depends on {dependency}, which has not been added")]
  MissingDependency { target: TargetId, dependency: TargetId },

  #[error("dependency cycle through {0}")]
  Cycle(TargetId),

  #[error("unknown rule {0}")]
  UnknownRule(TargetId),
}

#[derive(Debug, Default)]
struct GraphInner {
  graph: DiGraph<TargetId, ()>,
  nodes: HashMap<TargetId, NodeIndex>,
  rules: HashMap<TargetId, Arc<Rule>>,
}

impl GraphInner {
  fn neighbors(&self, target: &TargetId, direction: Direction) -> Vec<TargetId> {
    let Some(&idx) = self.nodes.get(target) else {
      return Vec::new();
    };
    let mut targets: Vec<TargetId> = self
      .graph
      .neighbors_directed(idx, direction)
      .map(|n| self.graph[n].clone())
      .collect();
    targets.sort();
    targets.dedup();
    targets
  }
}

/// Append-only graph under construction.
#[derive(Debug, Default)]
pub struct RuleGraphBuilder {
  inner: GraphInner,
}

impl RuleGraphBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  /// Insert a rule whose build dependencies are all present already.
  pub fn add_rule(&mut self, rule: Rule) -> Result<Arc<Rule>, GraphError> {
    let target = rule.target().clone();
    if self.inner.rules.contains_key(&target) {
      return Err(GraphError::DuplicateRule(target));
    }

    for dep in rule.build_deps() {
      if dep == &target {
        return Err(GraphError::Cycle(target));
      }
      if !self.inner.nodes.contains_key(dep) {
        return Err(GraphError::MissingDependency {
          target,
          dependency: dep.clone(),
        });
      }
    }

    let idx = self.inner.graph.add_node(target.clone());
    for dep in rule.build_deps() {
      let dep_idx = self.inner.nodes[dep];
      self.inner.graph.add_edge(idx, dep_idx, ());
    }
    self.inner.nodes.insert(target.clone(), idx);

    let rule = Arc::new(rule);
    self.inner.rules.insert(target.clone(), rule.clone());
    debug!(target = %target, kind = rule.type_name(), deps = rule.build_deps().len(), "added rule");
    Ok(rule)
  }

  pub fn get(&self, target: &TargetId) -> Option<&Arc<Rule>> {
    self.inner.rules.get(target)
  }

  pub fn contains(&self, target: &TargetId) -> bool {
    self.inner.rules.contains_key(target)
  }

  pub fn len(&self) -> usize {
    self.inner.rules.len()
  }

  pub fn is_empty(&self) -> bool {
    self.inner.rules.is_empty()
  }

  pub fn freeze(self) -> RuleGraph {
    RuleGraph {
      inner: Arc::new(self.inner),
    }
  }
}

/// Read-only, shareable rule graph.
#[derive(Debug, Clone, Default)]
pub struct RuleGraph {
  inner: Arc<GraphInner>,
}

impl RuleGraph {
  pub fn get(&self, target: &TargetId) -> Option<&Arc<Rule>> {
    self.inner.rules.get(target)
  }

  pub fn rule(&self, target: &TargetId) -> Result<&Arc<Rule>, GraphError> {
    self.get(target).ok_or_else(|| GraphError::UnknownRule(target.clone()))
  }

  pub fn contains(&self, target: &TargetId) -> bool {
    self.inner.rules.contains_key(target)
  }

  pub fn len(&self) -> usize {
    self.inner.rules.len()
  }

  pub fn is_empty(&self) -> bool {
    self.inner.rules.is_empty()
  }

  /// All targets, sorted.
  pub fn targets(&self) -> Vec<TargetId> {
    let mut targets: Vec<TargetId> = self.inner.rules.keys().cloned().collect();
    targets.sort();
    targets
  }

  /// Direct build dependencies of `target`, sorted.
  pub fn dependencies(&self, target: &TargetId) -> Vec<TargetId> {
    self.inner.neighbors(target, Direction::Outgoing)
  }

  /// Rules that directly depend on `target`, sorted.
  pub fn dependents(&self, target: &TargetId) -> Vec<TargetId> {
    self.inner.neighbors(target, Direction::Incoming)
  }

  /// Every rule, dependencies before dependents. Ties are broken by target
  /// order so the result is the same on every run.
  pub fn topological_order(&self) -> Vec<TargetId> {
    let mut remaining: HashMap<NodeIndex, usize> = self
      .inner
      .graph
      .node_indices()
      .map(|idx| (idx, self.inner.graph.neighbors_directed(idx, Direction::Outgoing).count()))
      .collect();

    let mut ready: BTreeSet<TargetId> = remaining
      .iter()
      .filter(|(_, deps)| **deps == 0)
      .map(|(idx, _)| self.inner.graph[*idx].clone())
      .collect();

    let mut order = Vec::with_capacity(remaining.len());
    while let Some(target) = ready.pop_first() {
      let idx = self.inner.nodes[&target];
      for dependent in self.inner.graph.neighbors_directed(idx, Direction::Incoming) {
        if let Some(count) = remaining.get_mut(&dependent) {
          *count = count.saturating_sub(1);
          if *count == 0 {
            ready.insert(self.inner.graph[dependent].clone());
          }
        }
      }
      order.push(target);
    }
    order
  }
}
