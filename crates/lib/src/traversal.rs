//! Filtered traversals over the rule graph.
//!
//! [`filtered_closure`] walks the build dependencies reachable from a set of
//! seed rules and builds a [`RuleDag`] out of the rules a predicate accepts.
//! Two predicates steer the walk:
//!
//! - `include` decides whether a reached rule becomes a node of the result
//! - `traverse` decides whether the walk continues into the rule's deps
//!
//! A rule that is not traversed is still a candidate node; its dependencies are
//! simply never reached through it. An edge `R -> D` exists in the result when
//! both rules are nodes and `D` is a direct dependency of `R` reached through
//! `R`. Edges never point at rules outside the node set.
//!
//! Each rule is visited at most once and each predicate runs at most once per
//! rule, so predicates may be expensive or effectful.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::convert::Infallible;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;
use tracing::trace;

use crate::graph::RuleGraph;
use crate::rules::Rule;
use crate::target::TargetId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraversalError<E> {
  #[error("traversal seed {0} is not in the rule graph")]
  UnknownTarget(TargetId),

  #[error("traversal predicate failed: {0}")]
  Predicate(E),
}

/// The DAG a traversal produced. Edges point from dependent to dependency.
#[derive(Debug, Clone, Default)]
pub struct RuleDag {
  graph: DiGraph<TargetId, ()>,
  index: BTreeMap<TargetId, NodeIndex>,
}

impl RuleDag {
  fn add_node(&mut self, target: &TargetId) -> NodeIndex {
    if let Some(&idx) = self.index.get(target) {
      return idx;
    }
    let idx = self.graph.add_node(target.clone());
    self.index.insert(target.clone(), idx);
    idx
  }

  /// Nodes in target order.
  pub fn nodes(&self) -> impl Iterator<Item = &TargetId> {
    self.index.keys()
  }

  /// `(dependent, dependency)` pairs, sorted.
  pub fn edges(&self) -> Vec<(TargetId, TargetId)> {
    let mut edges: Vec<(TargetId, TargetId)> = self
      .graph
      .edge_indices()
      .filter_map(|e| self.graph.edge_endpoints(e))
      .map(|(from, to)| (self.graph[from].clone(), self.graph[to].clone()))
      .collect();
    edges.sort();
    edges
  }

  pub fn contains(&self, target: &TargetId) -> bool {
    self.index.contains_key(target)
  }

  pub fn len(&self) -> usize {
    self.index.len()
  }

  pub fn is_empty(&self) -> bool {
    self.index.is_empty()
  }

  /// Direct dependencies of `target` inside this DAG, sorted.
  pub fn dependencies_of(&self, target: &TargetId) -> Vec<TargetId> {
    let Some(&idx) = self.index.get(target) else {
      return Vec::new();
    };
    self.sorted_neighbors(idx)
  }

  fn sorted_neighbors(&self, idx: NodeIndex) -> Vec<TargetId> {
    let mut deps: Vec<TargetId> = self
      .graph
      .neighbors_directed(idx, Direction::Outgoing)
      .map(|n| self.graph[n].clone())
      .collect();
    deps.sort();
    deps
  }

  /// Dependencies before dependents.
  ///
  /// Depth-first post-order, starting from every node in target order and
  /// visiting children in target order, so equal DAGs always yield the same
  /// sequence.
  pub fn topological_order(&self) -> Vec<TargetId> {
    let mut order = Vec::with_capacity(self.len());
    let mut done: HashSet<&TargetId> = HashSet::new();

    for root in self.index.keys() {
      if done.contains(root) {
        continue;
      }
      // (node, children expanded)
      let mut stack: Vec<(TargetId, bool)> = vec![(root.clone(), false)];
      while let Some((target, expanded)) = stack.pop() {
        if expanded {
          if let Some((key, _)) = self.index.get_key_value(&target)
            && done.insert(key)
          {
            order.push(target);
          }
          continue;
        }
        if done.contains(&target) {
          continue;
        }
        stack.push((target.clone(), true));
        // Reverse so the smallest child is popped first.
        for dep in self.dependencies_of(&target).into_iter().rev() {
          if !done.contains(&dep) {
            stack.push((dep, false));
          }
        }
      }
    }
    order
  }

  /// Groups of nodes whose dependencies all sit in earlier groups. The first
  /// wave holds the leaves; each wave is sorted.
  pub fn waves(&self) -> Vec<Vec<TargetId>> {
    let mut pending: HashMap<NodeIndex, usize> = self
      .graph
      .node_indices()
      .map(|idx| (idx, self.graph.neighbors_directed(idx, Direction::Outgoing).count()))
      .collect();

    let mut current: Vec<NodeIndex> = pending.iter().filter(|(_, n)| **n == 0).map(|(idx, _)| *idx).collect();
    let mut waves = Vec::new();

    while !current.is_empty() {
      let mut next = Vec::new();
      for &idx in &current {
        pending.remove(&idx);
        for dependent in self.graph.neighbors_directed(idx, Direction::Incoming) {
          if let Some(count) = pending.get_mut(&dependent) {
            *count = count.saturating_sub(1);
            if *count == 0 {
              next.push(dependent);
            }
          }
        }
      }
      let mut wave: Vec<TargetId> = current.iter().map(|idx| self.graph[*idx].clone()).collect();
      wave.sort();
      waves.push(wave);
      current = next;
    }
    waves
  }
}

/// Walk the build dependencies reachable from `seeds`, keeping rules accepted
/// by `include` and descending through rules accepted by `traverse`.
pub fn filtered_closure<'a, E, I, T>(
  graph: &RuleGraph,
  seeds: impl IntoIterator<Item = &'a TargetId>,
  include: I,
  traverse: T,
) -> Result<RuleDag, TraversalError<E>>
where
  I: FnMut(&Rule) -> Result<bool, E>,
  T: FnMut(&Rule) -> Result<bool, E>,
{
  filtered_closure_over(graph, seeds, Rule::build_deps, include, traverse)
}

/// [`filtered_closure`] following the edges `deps_of` selects instead of every
/// build dependency.
pub fn filtered_closure_over<'a, E, D, I, T>(
  graph: &RuleGraph,
  seeds: impl IntoIterator<Item = &'a TargetId>,
  deps_of: D,
  mut include: I,
  mut traverse: T,
) -> Result<RuleDag, TraversalError<E>>
where
  D: Fn(&Rule) -> &BTreeSet<TargetId>,
  I: FnMut(&Rule) -> Result<bool, E>,
  T: FnMut(&Rule) -> Result<bool, E>,
{
  let seeds: BTreeSet<&TargetId> = seeds.into_iter().collect();
  for seed in &seeds {
    if !graph.contains(seed) {
      return Err(TraversalError::UnknownTarget((*seed).clone()));
    }
  }

  let mut visited: HashSet<TargetId> = HashSet::new();
  let mut nodes: BTreeSet<TargetId> = BTreeSet::new();
  let mut candidate_edges: Vec<(TargetId, TargetId)> = Vec::new();
  // Pop order follows target order for reproducible predicate call order.
  let mut stack: Vec<TargetId> = seeds.into_iter().rev().cloned().collect();

  while let Some(target) = stack.pop() {
    if !visited.insert(target.clone()) {
      continue;
    }
    let rule = graph
      .get(&target)
      .ok_or_else(|| TraversalError::UnknownTarget(target.clone()))?;

    let included = include(rule).map_err(TraversalError::Predicate)?;
    let descend = traverse(rule).map_err(TraversalError::Predicate)?;
    trace!(target = %target, included, descend, "visited rule");

    if included {
      nodes.insert(target.clone());
    }
    if descend {
      for dep in deps_of(rule).iter().rev() {
        candidate_edges.push((target.clone(), dep.clone()));
        if !visited.contains(dep) {
          stack.push(dep.clone());
        }
      }
    }
  }

  let mut dag = RuleDag::default();
  for node in &nodes {
    dag.add_node(node);
  }
  candidate_edges.sort();
  candidate_edges.dedup();
  for (from, to) in candidate_edges {
    if nodes.contains(&from) && nodes.contains(&to) {
      let (from, to) = (dag.add_node(&from), dag.add_node(&to));
      dag.graph.add_edge(from, to, ());
    }
  }
  Ok(dag)
}

/// Every rule reachable from `seeds` through build dependencies.
pub fn transitive_closure<'a>(
  graph: &RuleGraph,
  seeds: impl IntoIterator<Item = &'a TargetId>,
) -> Result<RuleDag, TraversalError<Infallible>> {
  filtered_closure(graph, seeds, |_| Ok(true), |_| Ok(true))
}
