//! Rule execution.
//!
//! [`BuildEngine`] builds the dependency closure of the requested targets:
//! - waves from the closure DAG, each wave run concurrently under a semaphore
//! - rule keys looked up in the artifact cache before running a step
//! - concurrent requests for one rule key deduplicated by the in-flight registry
//! - failures recorded per rule, dependents skipped, unrelated rules continue

mod env;
mod inflight;
mod shell;
mod types;

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::cache::{ArtifactCache, BuildOutput};
use crate::config::EngineConfig;
use crate::graph::RuleGraph;
use crate::layout::OutputLayout;
use crate::packaging::runtime_closure;
use crate::rulekey::{ContentFileHasher, FileHasher, RuleKey, RuleKeyError, RuleKeyFactory};
use crate::source::SourcePathResolver;
use crate::target::TargetId;
use crate::traversal::{RuleDag, transitive_closure};
use crate::util::fs::{copy_path, remove_path};

pub use env::{SRCDIR_NAME, step_env};
pub use inflight::InFlightRegistry;
pub use shell::{ShellStepExecutor, execute_cmd};
pub use types::{
  BuildError, BuildOutcome, BuildReport, BuildStatus, ExecuteError, StepError, StepExecutor, StepRequest,
};

/// Stops a running build from scheduling further waves.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
  pub fn abort(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_aborted(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }
}

pub struct BuildEngine<E> {
  graph: RuleGraph,
  executor: Arc<E>,
  cache: Arc<dyn ArtifactCache>,
  registry: InFlightRegistry,
  keys: Arc<RuleKeyFactory>,
  layout: OutputLayout,
  project_root: PathBuf,
  parallelism: usize,
  abort: AbortHandle,
}

impl<E: StepExecutor> BuildEngine<E> {
  pub fn new(
    graph: RuleGraph,
    executor: E,
    cache: Arc<dyn ArtifactCache>,
    config: &EngineConfig,
    project_root: impl Into<PathBuf>,
  ) -> Self {
    let project_root = project_root.into();
    let config = config.clone().with_project_root(&project_root);
    let hasher: Arc<dyn FileHasher> = Arc::new(ContentFileHasher::new(&project_root));
    Self {
      keys: Arc::new(RuleKeyFactory::new(graph.clone()).with_file_hasher(hasher)),
      graph,
      executor: Arc::new(executor),
      cache,
      registry: InFlightRegistry::new(),
      layout: OutputLayout::new(config.output_root),
      project_root,
      parallelism: config.parallelism.max(1),
      abort: AbortHandle::default(),
    }
  }

  /// Share in-flight deduplication with other engines.
  pub fn with_registry(mut self, registry: InFlightRegistry) -> Self {
    self.registry = registry;
    self
  }

  pub fn with_file_hasher(mut self, hasher: Arc<dyn FileHasher>) -> Self {
    self.keys = Arc::new(RuleKeyFactory::new(self.graph.clone()).with_file_hasher(hasher));
    self
  }

  pub fn abort_handle(&self) -> AbortHandle {
    self.abort.clone()
  }

  pub fn graph(&self) -> &RuleGraph {
    &self.graph
  }

  pub fn layout(&self) -> &OutputLayout {
    &self.layout
  }

  pub fn rule_key(&self, target: &TargetId) -> Result<RuleKey, RuleKeyError> {
    self.keys.build(target)
  }

  /// Build `targets` and everything they depend on.
  pub async fn build(&self, targets: &[TargetId]) -> Result<BuildReport, ExecuteError> {
    let dag = transitive_closure(&self.graph, targets)?;
    Ok(self.run_dag(&dag).await)
  }

  /// Build what is needed to run `targets`, including runtime dependencies.
  pub async fn build_for_run(&self, targets: &[TargetId]) -> Result<BuildReport, ExecuteError> {
    let dag = runtime_closure(&self.graph, targets)?;
    Ok(self.run_dag(&dag).await)
  }

  async fn run_dag(&self, dag: &RuleDag) -> BuildReport {
    let waves = dag.waves();
    info!(rules = dag.len(), wave_count = waves.len(), "starting build");

    let mut report = BuildReport::default();
    let mut broken: HashSet<TargetId> = HashSet::new();
    let mut outputs: BTreeMap<TargetId, PathBuf> = BTreeMap::new();
    let semaphore = Arc::new(Semaphore::new(self.parallelism));

    for (wave_idx, wave) in waves.into_iter().enumerate() {
      if self.abort.is_aborted() {
        if !report.aborted {
          warn!(wave = wave_idx, "build aborted, not scheduling remaining rules");
        }
        report.aborted = true;
        report.not_started.extend(wave);
        continue;
      }
      debug!(wave = wave_idx, rules = wave.len(), "executing wave");

      let mut ready = Vec::new();
      for target in wave {
        let failed_dep = dag.dependencies_of(&target).into_iter().find(|dep| broken.contains(dep));
        if let Some(failed_dep) = failed_dep {
          warn!(target = %target, failed_dep = %failed_dep, "skipping rule due to failed dependency");
          broken.insert(target.clone());
          report.skipped.insert(target, failed_dep);
          continue;
        }

        match self.prepare(&target, &outputs) {
          Ok(Some(request)) => ready.push(request),
          Ok(None) => {
            debug!(target = %target, "rule has no output");
            report.built.insert(
              target,
              BuildOutcome {
                status: BuildStatus::NothingToBuild,
                output: None,
              },
            );
          }
          Err(e) => {
            error!(target = %target, error = %e, "failed to prepare rule");
            broken.insert(target.clone());
            report.failed.insert(target, e);
          }
        }
      }

      for (target, result) in self.execute_wave(ready, &semaphore).await {
        match result {
          Ok(outcome) => {
            info!(target = %target, status = ?outcome.status, "rule done");
            if let Some(output) = &outcome.output {
              outputs.insert(target.clone(), output.path.clone());
            }
            report.built.insert(target, outcome);
          }
          Err(e) => {
            error!(target = %target, error = %e, "rule failed");
            broken.insert(target.clone());
            report.failed.insert(target, e);
          }
        }
      }
    }

    info!(
      built = report.executed(),
      cache_hits = report.cache_hits(),
      failed = report.failed.len(),
      skipped = report.skipped.len(),
      aborted = report.aborted,
      "build complete"
    );
    report
  }

  /// Request for `target`, or `None` when the rule has nothing to build.
  fn prepare(
    &self,
    target: &TargetId,
    outputs: &BTreeMap<TargetId, PathBuf>,
  ) -> Result<Option<StepRequest>, BuildError> {
    let rule = self
      .graph
      .get(target)
      .ok_or_else(|| RuleKeyError::UnknownRule(target.clone()))?;
    let Some(output) = rule.output() else {
      return Ok(None);
    };

    let rule_key = self.keys.build(target)?;
    let resolver = SourcePathResolver::new(&self.graph, &self.layout, &self.project_root);
    let mut resolved = BTreeMap::new();
    for source in rule.source_inputs() {
      resolved.insert(source.clone(), resolver.absolute_path(source)?);
    }
    let output_dir = self.layout.output_dir(target);
    let output_path = resolver.absolute_path(output)?;
    let env = step_env(rule, &resolved, &output_dir, Some(&output_path), self.layout.root());
    let dependency_outputs = rule
      .build_deps()
      .iter()
      .filter_map(|dep| outputs.get(dep).map(|path| (dep.clone(), path.clone())))
      .collect();

    Ok(Some(StepRequest {
      target: target.clone(),
      rule_key,
      rule: Arc::clone(rule),
      output_dir,
      output_path: Some(output_path),
      resolved,
      dependency_outputs,
      env,
      project_root: self.project_root.clone(),
    }))
  }

  async fn execute_wave(
    &self,
    requests: Vec<StepRequest>,
    semaphore: &Arc<Semaphore>,
  ) -> Vec<(TargetId, Result<BuildOutcome, BuildError>)> {
    let mut join_set = JoinSet::new();
    let mut pending: BTreeSet<TargetId> = BTreeSet::new();

    for request in requests {
      pending.insert(request.target.clone());
      let semaphore = Arc::clone(semaphore);
      let registry = self.registry.clone();
      let cache = Arc::clone(&self.cache);
      let executor = Arc::clone(&self.executor);

      join_set.spawn(async move {
        let target = request.target.clone();
        // Acquire semaphore permit inside the task
        let result = match semaphore.acquire_owned().await {
          Ok(_permit) => build_one(registry, cache, executor, request).await,
          Err(e) => Err(BuildError::Interrupted {
            target: target.clone(),
            message: e.to_string(),
          }),
        };
        (target, result)
      });
    }

    let mut results = Vec::new();
    while let Some(joined) = join_set.join_next().await {
      match joined {
        Ok((target, result)) => {
          pending.remove(&target);
          results.push((target, result));
        }
        Err(e) => error!(error = %e, "build task panicked"),
      }
    }
    // Tasks that panicked never reported back.
    for target in pending {
      results.push((
        target.clone(),
        Err(BuildError::Interrupted {
          target,
          message: "build task panicked".to_string(),
        }),
      ));
    }
    results.sort_by(|a, b| a.0.cmp(&b.0));
    results
  }
}

async fn build_one<E: StepExecutor>(
  registry: InFlightRegistry,
  cache: Arc<dyn ArtifactCache>,
  executor: Arc<E>,
  request: StepRequest,
) -> Result<BuildOutcome, BuildError> {
  let target = request.target.clone();
  let key = request.rule_key.clone();
  let cacheable = request.rule.is_cacheable();
  let expected = request.output_path.clone();

  let step_target = target.clone();
  let outcome = registry
    .build(key, target.clone(), cacheable, cache, move || async move {
      executor
        .execute(request)
        .await
        .map_err(|source| BuildError::Step {
          target: step_target,
          source,
        })
    })
    .await?;

  match expected {
    Some(expected) => materialize(&target, outcome, &expected).await,
    None => Ok(outcome),
  }
}

/// Place an output produced elsewhere (a cache entry, or a rule sharing this
/// rule key) at the path this rule owns.
async fn materialize(target: &TargetId, outcome: BuildOutcome, expected: &Path) -> Result<BuildOutcome, BuildError> {
  let Some(output) = &outcome.output else {
    return Ok(outcome);
  };
  if output.path == expected {
    return Ok(outcome);
  }

  debug!(target = %target, from = ?output.path, to = ?expected, "materializing output");
  let from = output.path.clone();
  let to = expected.to_path_buf();
  let copied = tokio::task::spawn_blocking(move || {
    remove_path(&to)?;
    copy_path(&from, &to)
  })
  .await;

  let failure = match copied {
    Ok(Ok(())) => None,
    Ok(Err(e)) => Some(e.to_string()),
    Err(e) => Some(e.to_string()),
  };
  if let Some(message) = failure {
    return Err(BuildError::Materialize {
      target: target.clone(),
      message,
    });
  }

  Ok(BuildOutcome {
    status: outcome.status,
    output: Some(BuildOutput {
      path: expected.to_path_buf(),
      content_hash: output.content_hash.clone(),
    }),
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::InMemoryArtifactCache;
  use crate::source::SourcePath;
  use crate::util::testutil::{aar_with_runtime_dep, cxx_library, genrule, genrule_with_cmd, graph_of, target};
  use std::sync::Mutex;
  use tempfile::TempDir;

  /// Writes the rule key into the output instead of running anything.
  #[derive(Default)]
  struct RecordingExecutor {
    executed: Mutex<Vec<TargetId>>,
    fail: BTreeSet<TargetId>,
  }

  impl RecordingExecutor {
    fn failing(targets: &[&str]) -> Self {
      Self {
        fail: targets.iter().map(|t| target(t)).collect(),
        ..Self::default()
      }
    }

    fn executed(&self) -> Vec<TargetId> {
      self.executed.lock().unwrap().clone()
    }
  }

  impl StepExecutor for Arc<RecordingExecutor> {
    async fn execute(&self, request: StepRequest) -> Result<BuildOutput, StepError> {
      self.executed.lock().unwrap().push(request.target.clone());
      if self.fail.contains(&request.target) {
        return Err(StepError::CommandFailed {
          cmd: "false".to_string(),
          code: Some(1),
          stderr: String::new(),
        });
      }
      let out = request.output_path.unwrap();
      std::fs::create_dir_all(out.parent().unwrap()).unwrap();
      std::fs::write(&out, request.rule_key.as_str()).unwrap();
      Ok(BuildOutput::new(out))
    }
  }

  fn engine(
    graph: RuleGraph,
    executor: Arc<RecordingExecutor>,
    temp: &TempDir,
  ) -> BuildEngine<Arc<RecordingExecutor>> {
    let config = EngineConfig {
      parallelism: 2,
      output_root: temp.path().join("out"),
      ..EngineConfig::default()
    };
    BuildEngine::new(graph, executor, Arc::new(InMemoryArtifactCache::new()), &config, temp.path())
  }

  #[tokio::test]
  async fn failure_skips_dependents_only() {
    let temp = TempDir::new().unwrap();
    let graph = graph_of(vec![
      genrule("//t:bad", vec![], &[]),
      genrule("//t:good", vec![], &[]),
      genrule("//t:mid", vec![], &["//t:bad"]),
      genrule("//t:top", vec![], &["//t:mid", "//t:good"]),
      genrule("//t:other", vec![], &["//t:good"]),
    ]);
    let executor = Arc::new(RecordingExecutor::failing(&["//t:bad"]));
    let engine = engine(graph, executor, &temp);

    let report = engine
      .build(&[target("//t:top"), target("//t:other")])
      .await
      .unwrap();

    assert!(report.failed.contains_key(&target("//t:bad")));
    assert_eq!(report.skipped.get(&target("//t:mid")), Some(&target("//t:bad")));
    assert_eq!(report.skipped.get(&target("//t:top")), Some(&target("//t:mid")));
    assert_eq!(report.built[&target("//t:other")].status, BuildStatus::Built);
    assert_eq!(report.built[&target("//t:good")].status, BuildStatus::Built);
    assert!(!report.is_success());
  }

  #[tokio::test]
  async fn second_build_hits_the_cache() {
    let temp = TempDir::new().unwrap();
    let graph = graph_of(vec![genrule("//t:a", vec![], &[]), genrule("//t:b", vec![], &["//t:a"])]);
    let executor = Arc::new(RecordingExecutor::default());
    let engine = engine(graph, Arc::clone(&executor), &temp);

    let first = engine.build(&[target("//t:b")]).await.unwrap();
    assert_eq!(first.executed(), 2);

    let second = engine.build(&[target("//t:b")]).await.unwrap();
    assert_eq!(second.cache_hits(), 2);
    assert_eq!(executor.executed().len(), 2);
  }

  #[tokio::test]
  async fn rules_without_output_have_nothing_to_build() {
    let temp = TempDir::new().unwrap();
    let graph = graph_of(vec![
      cxx_library("//native:z", &[]),
      genrule("//app:bin", vec![], &["//native:z"]),
    ]);
    let executor = Arc::new(RecordingExecutor::default());
    let engine = engine(graph, Arc::clone(&executor), &temp);

    let report = engine.build(&[target("//app:bin")]).await.unwrap();
    assert_eq!(report.built[&target("//native:z")].status, BuildStatus::NothingToBuild);
    assert_eq!(executor.executed(), vec![target("//app:bin")]);
  }

  #[tokio::test]
  async fn dependency_outputs_are_passed_along() {
    let temp = TempDir::new().unwrap();
    let graph = graph_of(vec![
      genrule("//t:a", vec![], &[]),
      genrule("//t:b", vec![SourcePath::rule_output(target("//t:a"), "out.txt")], &[]),
    ]);
    let engine = engine(graph, Arc::new(RecordingExecutor::default()), &temp);
    engine.build(&[target("//t:a")]).await.unwrap();

    let outputs = BTreeMap::from([(target("//t:a"), temp.path().join("out/a"))]);
    let request = engine.prepare(&target("//t:b"), &outputs).unwrap().unwrap();
    assert_eq!(request.dependency_outputs.len(), 1);
    assert_eq!(
      request.env["SRCS"],
      temp.path().join("out/__root__/t/a/out.txt").to_string_lossy()
    );
  }

  #[tokio::test]
  async fn aborted_build_schedules_nothing() {
    let temp = TempDir::new().unwrap();
    let graph = graph_of(vec![genrule_with_cmd("//t:a", "true")]);
    let executor = Arc::new(RecordingExecutor::default());
    let engine = engine(graph, Arc::clone(&executor), &temp);

    engine.abort_handle().abort();
    let report = engine.build(&[target("//t:a")]).await.unwrap();
    assert!(report.aborted);
    assert!(report.not_started.contains(&target("//t:a")));
    assert!(executor.executed().is_empty());
  }

  #[tokio::test]
  async fn identical_rules_share_one_execution() {
    let temp = TempDir::new().unwrap();
    let graph = graph_of(vec![genrule_with_cmd("//t:x", "echo same > $OUT"), genrule_with_cmd("//t:y", "echo same > $OUT")]);
    let executor = Arc::new(RecordingExecutor::default());
    let engine = engine(graph, Arc::clone(&executor), &temp);
    assert_eq!(
      engine.rule_key(&target("//t:x")).unwrap(),
      engine.rule_key(&target("//t:y")).unwrap()
    );

    let report = engine.build(&[target("//t:x"), target("//t:y")]).await.unwrap();
    assert!(report.is_success());
    assert_eq!(executor.executed().len(), 1);
    for name in ["x", "y"] {
      let out = temp.path().join(format!("out/__root__/t/{}/out.txt", name));
      assert!(out.is_file(), "{} missing", out.display());
    }
  }

  #[tokio::test]
  async fn unknown_target_is_an_error() {
    let temp = TempDir::new().unwrap();
    let engine = engine(graph_of(vec![]), Arc::new(RecordingExecutor::default()), &temp);
    assert_eq!(
      engine.build(&[target("//t:nope")]).await.unwrap_err(),
      ExecuteError::UnknownTarget(target("//t:nope"))
    );
  }

  #[tokio::test]
  async fn runtime_deps_are_only_built_for_run() {
    let temp = TempDir::new().unwrap();
    let graph = graph_of(vec![
      genrule("//t:unpacked", vec![], &[]),
      genrule("//t:helper", vec![], &[]),
      genrule("//t:tool", vec![], &["//t:helper"]),
      aar_with_runtime_dep("//t:aar", "//t:unpacked", "//t:tool"),
      genrule("//t:app", vec![], &["//t:aar"]),
    ]);
    assert!(!graph.dependencies(&target("//t:aar")).contains(&target("//t:tool")));

    let executor = Arc::new(RecordingExecutor::default());
    let engine = engine(graph, Arc::clone(&executor), &temp);

    let report = engine.build(&[target("//t:app")]).await.unwrap();
    assert!(report.is_success());
    assert!(!report.built.contains_key(&target("//t:tool")));
    let mut executed = executor.executed();
    executed.sort();
    assert_eq!(executed, vec![target("//t:app"), target("//t:unpacked")]);

    let report = engine.build_for_run(&[target("//t:app")]).await.unwrap();
    assert!(report.is_success());
    assert_eq!(report.built[&target("//t:tool")].status, BuildStatus::Built);
    assert_eq!(report.built[&target("//t:helper")].status, BuildStatus::Built);
    assert_eq!(report.built[&target("//t:app")].status, BuildStatus::CacheHit);
  }
}
