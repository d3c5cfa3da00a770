//! Consumers that fold capability views over a dependency closure.

use std::collections::BTreeSet;
use std::convert::Infallible;

use tracing::debug;

use crate::capability::{AndroidPackageableCollector, LinkStyle, NativeLinkableInput};
use crate::graph::RuleGraph;
use crate::target::TargetId;
use crate::rules::Rule;
use crate::traversal::{RuleDag, TraversalError, filtered_closure_over, transitive_closure};

/// Collect resources, assets, native libraries, manifests and classpath
/// entries from every android packageable rule reachable from `seeds`.
///
/// Provided deps are not followed.
pub fn collect_android_packageables<'a>(
  graph: &RuleGraph,
  seeds: impl IntoIterator<Item = &'a TargetId>,
) -> Result<AndroidPackageableCollector, TraversalError<Infallible>> {
  let dag = filtered_closure_over(
    graph,
    seeds,
    Rule::propagated_deps,
    |rule| Ok(rule.android_packageable().is_some()),
    |_| Ok(true),
  )?;

  let mut collector = AndroidPackageableCollector::new();
  for target in dag.topological_order() {
    if let Some(rule) = graph.get(&target)
      && let Some(packageable) = rule.android_packageable()
    {
      packageable.add_to_collector(&target, &mut collector);
    }
  }
  debug!(rules = dag.len(), "collected android packageables");
  Ok(collector)
}

/// Link input for `seeds` and every native library they transitively link.
///
/// The walk only descends through native linkable rules (and the seeds
/// themselves) and never into provided deps. Inputs are ordered dependents
/// before dependencies, which is what a single-pass linker needs.
pub fn transitive_native_link_input<'a>(
  graph: &RuleGraph,
  seeds: impl IntoIterator<Item = &'a TargetId>,
  style: LinkStyle,
) -> Result<NativeLinkableInput, TraversalError<Infallible>> {
  let seeds: BTreeSet<&TargetId> = seeds.into_iter().collect();
  let dag = filtered_closure_over(
    graph,
    seeds.iter().copied(),
    Rule::propagated_deps,
    |rule| Ok(rule.native_linkable().is_some()),
    |rule| Ok(rule.native_linkable().is_some() || seeds.contains(rule.target())),
  )?;

  let mut order = dag.topological_order();
  order.reverse();
  let inputs = order.iter().filter_map(|target| {
    graph
      .get(target)
      .and_then(|rule| rule.native_linkable().map(|l| l.native_linkable_input(style)))
  });
  Ok(NativeLinkableInput::concat(inputs))
}

/// Everything that must exist to run `seeds`: their build closure plus the
/// runtime dependencies of any rule in it, transitively.
pub fn runtime_closure<'a>(
  graph: &RuleGraph,
  seeds: impl IntoIterator<Item = &'a TargetId>,
) -> Result<RuleDag, TraversalError<Infallible>> {
  let mut wanted: BTreeSet<TargetId> = seeds.into_iter().cloned().collect();

  loop {
    let dag = transitive_closure(graph, &wanted)?;
    let mut added = false;
    for target in dag.nodes() {
      let Some(provider) = graph.get(target).and_then(|rule| rule.runtime_deps_provider()) else {
        continue;
      };
      for dep in provider.runtime_deps() {
        if !dag.contains(&dep) {
          if !graph.contains(&dep) {
            return Err(TraversalError::UnknownTarget(dep));
          }
          added |= wanted.insert(dep);
        }
      }
    }
    if !added {
      return Ok(dag);
    }
  }
}
