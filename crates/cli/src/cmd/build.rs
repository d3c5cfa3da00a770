//! Implementation of the `rgraph build` command.
//!
//! Resolves the target graph, then builds the requested targets and their
//! dependencies through the shell executor. Outputs already present in the
//! cache are reused. Ctrl-C or `--timeout` stop scheduling new rules; steps
//! already running are allowed to finish.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use serde_json::json;
use tracing::{info, warn};

use rulegraph_lib::cache::ArtifactCache;
use rulegraph_lib::execute::BuildReport;
use rulegraph_lib::{BuildEngine, DirArtifactCache, EngineConfig, InMemoryArtifactCache, ShellStepExecutor};

use super::{GraphArgs, parse_targets};
use crate::output::{
  OutputFormat, format_elapsed, print_error, print_info, print_json, print_outcome, print_stat, print_success,
  print_warning,
};

#[derive(Debug, Default)]
pub struct BuildOptions {
  pub run: bool,
  pub jobs: Option<usize>,
  pub out: Option<PathBuf>,
  pub cache_dir: Option<PathBuf>,
  pub no_cache: bool,
  pub shell: Option<String>,
  pub timeout: Option<Duration>,
}

impl BuildOptions {
  /// Environment configuration with command-line overrides applied.
  fn config(&self) -> Result<EngineConfig> {
    let mut config = EngineConfig::from_env().context("Invalid engine configuration")?;
    if let Some(jobs) = self.jobs {
      config.parallelism = jobs.max(1);
    }
    if let Some(out) = &self.out {
      config.output_root = out.clone();
    }
    if let Some(cache_dir) = &self.cache_dir {
      config.cache_dir = Some(cache_dir.clone());
    }
    if self.no_cache {
      config.cache_dir = None;
    }
    if let Some(shell) = &self.shell {
      config.shell = Some(shell.clone());
    }
    Ok(config)
  }
}

pub fn cmd_build(args: &GraphArgs, targets: &[String], options: BuildOptions, output: OutputFormat) -> Result<()> {
  let root = args.project_root()?;
  let config = options.config()?.with_project_root(&root);
  let graph = args.load_rule_graph(Some(config.parallelism))?;
  let targets = parse_targets(targets)?;

  let cache: Arc<dyn ArtifactCache> = match &config.cache_dir {
    Some(dir) => Arc::new(DirArtifactCache::new(dir)),
    None => Arc::new(InMemoryArtifactCache::new()),
  };
  let executor = ShellStepExecutor::new(config.shell.clone());
  let engine = BuildEngine::new(graph, executor, cache, &config, root.clone());

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let started = Instant::now();
  let report = rt.block_on(async {
    let abort = engine.abort_handle();
    let timeout = options.timeout;
    tokio::spawn(async move {
      let deadline = async {
        match timeout {
          Some(limit) => tokio::time::sleep(limit).await,
          None => std::future::pending().await,
        }
      };
      tokio::select! {
        _ = tokio::signal::ctrl_c() => warn!("interrupted, waiting for running steps"),
        _ = deadline => warn!("timeout reached, waiting for running steps"),
      }
      abort.abort();
    });

    if options.run {
      engine.build_for_run(&targets).await
    } else {
      engine.build(&targets).await
    }
  })?;
  let elapsed = started.elapsed();
  info!(
    built = report.executed(),
    cache_hits = report.cache_hits(),
    failed = report.failed.len(),
    "build finished"
  );

  if output.is_json() {
    print_json(&report_json(&report, elapsed))?;
  } else {
    print_report(&report, elapsed, engine.layout().root());
  }

  if !report.is_success() {
    bail!("build failed");
  }
  Ok(())
}

fn report_json(report: &BuildReport, elapsed: Duration) -> serde_json::Value {
  let failed: serde_json::Map<String, serde_json::Value> = report
    .failed
    .iter()
    .map(|(target, err)| (target.to_string(), json!(err.to_string())))
    .collect();
  json!({
    "success": report.is_success(),
    "aborted": report.aborted,
    "elapsed_ms": elapsed.as_millis() as u64,
    "built": report.built,
    "failed": failed,
    "skipped": report.skipped,
    "not_started": report.not_started,
  })
}

fn print_report(report: &BuildReport, elapsed: Duration, output_root: &std::path::Path) {
  for (target, outcome) in &report.built {
    let hash = outcome.output.as_ref().and_then(|o| o.content_hash.as_ref());
    print_outcome(outcome.status, target, hash.map(|h| h.0.as_str()));
  }
  for (target, err) in &report.failed {
    print_error(&format!("{} failed: {}", target, err));
  }
  for (target, cause) in &report.skipped {
    print_warning(&format!("{} skipped: dependency {} did not build", target, cause));
  }
  if report.aborted {
    print_warning(&format!("Aborted, {} rule(s) not started", report.not_started.len()));
  }

  println!();
  if report.is_success() {
    print_success(&format!("Build complete in {}", format_elapsed(elapsed)));
  } else {
    print_info(&format!("Build finished in {}", format_elapsed(elapsed)));
  }
  print_stat("Built", &report.executed().to_string());
  print_stat("Cached", &report.cache_hits().to_string());
  print_stat("Failed", &report.failed.len().to_string());
  print_stat("Output", &output_root.display().to_string());
}
