//! Deduplication of concurrent builds of the same rule key.
//!
//! The first request for a key installs a shared future; later requests for
//! the same key await that future instead of starting their own. The future
//! removes its entry when it finishes, so a request arriving afterwards starts
//! a fresh attempt. Failures are therefore seen by every concurrent waiter but
//! never remembered.
//!
//! Entries are keyed by rule key and cacheability together, so an uncacheable
//! request never adopts a cache hit fetched for a cacheable one.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tracing::{debug, warn};

use crate::cache::{ArtifactCache, BuildOutput};
use crate::rulekey::RuleKey;
use crate::target::TargetId;

use super::types::{BuildError, BuildOutcome, BuildStatus};

type SharedBuild = Shared<BoxFuture<'static, Result<BuildOutcome, BuildError>>>;

/// Rule key and cacheable flag.
type EntryKey = (RuleKey, bool);

type Entries = Arc<Mutex<HashMap<EntryKey, SharedBuild>>>;

#[derive(Clone, Default)]
pub struct InFlightRegistry {
  entries: Entries,
}

impl std::fmt::Debug for InFlightRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("InFlightRegistry")
      .field("in_flight", &self.in_flight_len())
      .finish()
  }
}

impl InFlightRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of attempts currently registered.
  pub fn in_flight_len(&self) -> usize {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
  }

  /// Build `key` at most once among concurrent callers.
  ///
  /// Cacheable rules are looked up in `cache` first and recorded there after a
  /// successful `run`. Cache read and write failures are logged and treated as
  /// a miss or ignored respectively.
  pub async fn build<F, Fut>(
    &self,
    key: RuleKey,
    target: TargetId,
    cacheable: bool,
    cache: Arc<dyn ArtifactCache>,
    run: F,
  ) -> Result<BuildOutcome, BuildError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<BuildOutput, BuildError>> + Send + 'static,
  {
    let shared = {
      let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
      let entry_key = (key, cacheable);
      if let Some(existing) = entries.get(&entry_key) {
        debug!(target = %target, rule_key = %entry_key.0, "joining in-flight build");
        existing.clone()
      } else {
        let attempt = attempt(entry_key.clone(), target, cache, run(), Arc::clone(&self.entries));
        let shared = attempt.boxed().shared();
        entries.insert(entry_key, shared.clone());
        shared
      }
    };
    shared.await
  }
}

async fn attempt<Fut>(
  entry_key: EntryKey,
  target: TargetId,
  cache: Arc<dyn ArtifactCache>,
  run: Fut,
  entries: Entries,
) -> Result<BuildOutcome, BuildError>
where
  Fut: Future<Output = Result<BuildOutput, BuildError>> + Send + 'static,
{
  let (key, cacheable) = &entry_key;
  let result = build_or_fetch(key, &target, *cacheable, cache.as_ref(), run).await;
  entries.lock().unwrap_or_else(PoisonError::into_inner).remove(&entry_key);
  result
}

async fn build_or_fetch<Fut>(
  key: &RuleKey,
  target: &TargetId,
  cacheable: bool,
  cache: &dyn ArtifactCache,
  run: Fut,
) -> Result<BuildOutcome, BuildError>
where
  Fut: Future<Output = Result<BuildOutput, BuildError>>,
{
  if cacheable {
    match cache.get(key) {
      Ok(Some(output)) => {
        debug!(target = %target, rule_key = %key, "cache hit");
        return Ok(BuildOutcome {
          status: BuildStatus::CacheHit,
          output: Some(output),
        });
      }
      Ok(None) => {}
      Err(e) => warn!(target = %target, rule_key = %key, error = %e, "cache lookup failed, building"),
    }
  }

  let output = run.await?;
  if cacheable && let Err(e) = cache.put(key, &output) {
    warn!(target = %target, rule_key = %key, error = %e, "failed to record build in cache");
  }
  Ok(BuildOutcome {
    status: BuildStatus::Built,
    output: Some(output),
  })
}
