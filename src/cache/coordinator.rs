//! Request-path retrieval: cache hit, refetch, retry, or stale fallback.
//!
//! [`RetrievalCoordinator::resolve`] serves a plausible unexpired entry
//! straight from the store. Anything else goes to the backend through a bounded
//! retry loop. Concurrent callers for the same key share one in-flight fetch,
//! which runs on its own task so it finishes even if every caller goes away.
//!
//! Callers only ever see a payload (tagged with its [`Source`]) or
//! [`RosterError::FetchExhausted`]; backend errors stay inside the loop.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::backend::Fetcher;
use crate::config::RetryConfig;
use crate::error::{FetchError, Result, RosterError};

use super::panic_message;
use super::store::{CacheEntry, CacheStore};
use super::validator::PlausibilityCheck;

/// Where a resolved payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Plausible unexpired cache entry; no backend call.
    Cache,
    /// Fetched from the backend on this call and written back.
    Fresh,
    /// Backend unavailable or implausible; serving a previously cached entry.
    StaleFallback,
}

/// A resolved payload.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub payload: Arc<Value>,
    pub item_count: usize,
    pub source: Source,
}

impl Resolved {
    fn from_entry(entry: CacheEntry, source: Source) -> Self {
        Self {
            payload: entry.payload,
            item_count: entry.item_count,
            source,
        }
    }
}

/// Retry budget for one resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Clamped to at least 1.
    pub max_attempts: u32,
    /// Fixed wait between attempts.
    pub backoff: Duration,
    /// Upper bound on a single attempt.
    pub attempt_timeout: Duration,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            backoff: cfg.backoff(),
            attempt_timeout: cfg.attempt_timeout(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

/// Wait strategy between attempts.
#[async_trait]
pub trait RetryDelay: Send + Sync {
    async fn wait(&self, duration: Duration);
}

/// Suspends the calling task with `tokio::time::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioDelay;

#[async_trait]
impl RetryDelay for TokioDelay {
    async fn wait(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Returns immediately. For tests and diagnostics.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDelay;

#[async_trait]
impl RetryDelay for NoDelay {
    async fn wait(&self, _duration: Duration) {}
}

/// Failure shared between joined callers. Converted to
/// [`RosterError::FetchExhausted`] per caller.
#[derive(Debug, Clone)]
struct Exhausted {
    attempts: u32,
    last_error: FetchError,
}

type InFlight = Shared<BoxFuture<'static, std::result::Result<Resolved, Exhausted>>>;

/// Clears a key's in-flight slot when the fetch task ends, however it ends.
struct InFlightSlot<'a> {
    inner: &'a Inner,
    key: &'a str,
}

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        // A poisoned map is still cleared.
        let mut in_flight = match self.inner.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        in_flight.remove(self.key);
    }
}

struct Inner {
    store: Arc<CacheStore>,
    checker: Arc<dyn PlausibilityCheck>,
    fetcher: Arc<dyn Fetcher>,
    delay: Arc<dyn RetryDelay>,
    policy: RetryPolicy,
    in_flight: Mutex<HashMap<String, InFlight>>,
}

/// Cache-aware retrieval with retry, fallback and per-key fetch dedup.
#[derive(Clone)]
pub struct RetrievalCoordinator {
    inner: Arc<Inner>,
}

impl RetrievalCoordinator {
    /// Coordinator that sleeps between attempts with [`TokioDelay`].
    pub fn new(
        store: Arc<CacheStore>,
        checker: Arc<dyn PlausibilityCheck>,
        fetcher: Arc<dyn Fetcher>,
        policy: RetryPolicy,
    ) -> Self {
        Self::with_retry_delay(store, checker, fetcher, policy, Arc::new(TokioDelay))
    }

    /// Coordinator with a custom wait strategy between attempts.
    pub fn with_retry_delay(
        store: Arc<CacheStore>,
        checker: Arc<dyn PlausibilityCheck>,
        fetcher: Arc<dyn Fetcher>,
        policy: RetryPolicy,
        delay: Arc<dyn RetryDelay>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                checker,
                fetcher,
                delay,
                policy,
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.inner.store
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.inner.policy
    }

    /// Resolve `key` from cache or backend.
    pub async fn resolve(&self, key: &str) -> Result<Resolved> {
        if let Some(hit) = self.cached(key) {
            debug!(key = %key, "Cache hit");
            return Ok(hit);
        }
        self.join_or_fetch(key, true).await
    }

    /// Fetch `key` from the backend even if a good entry is cached.
    ///
    /// Retry, write-back, fallback and dedup behave as in [`Self::resolve`].
    pub async fn refresh(&self, key: &str) -> Result<Resolved> {
        info!(key = %key, "Forced refresh requested");
        self.join_or_fetch(key, false).await
    }

    /// Number of keys with a fetch currently in flight.
    pub fn in_flight_count(&self) -> usize {
        self.inner
            .in_flight
            .lock()
            .expect("in-flight map lock poisoned")
            .len()
    }

    fn cached(&self, key: &str) -> Option<Resolved> {
        let entry = self.inner.store.peek(key)?;
        if entry.is_expired() {
            debug!(key = %key, "Cached entry expired");
            return None;
        }
        if !self.inner.checker.is_plausible(key, entry.item_count) {
            warn!(
                key = %key,
                item_count = entry.item_count,
                "Cached entry is implausible, refetching"
            );
            return None;
        }
        Some(Resolved::from_entry(entry, Source::Cache))
    }

    async fn join_or_fetch(&self, key: &str, allow_cache: bool) -> Result<Resolved> {
        let shared = {
            let mut in_flight = self
                .inner
                .in_flight
                .lock()
                .expect("in-flight map lock poisoned");
            if let Some(existing) = in_flight.get(key) {
                debug!(key = %key, "Joining in-flight fetch");
                existing.clone()
            } else {
                // A fetch may have completed between the first cache check and
                // taking the lock.
                if allow_cache {
                    if let Some(hit) = self.cached(key) {
                        return Ok(hit);
                    }
                }
                // Spawned while the map lock is held, so the task's slot
                // cleanup cannot run before the insert below.
                let fut = Self::spawn_fetch(Arc::clone(&self.inner), key.to_string());
                in_flight.insert(key.to_string(), fut.clone());
                fut
            }
        };

        shared.await.map_err(|e| RosterError::FetchExhausted {
            key: key.to_string(),
            attempts: e.attempts,
            last_error: e.last_error.to_string(),
        })
    }

    fn spawn_fetch(inner: Arc<Inner>, key: String) -> InFlight {
        let task = tokio::spawn(Self::fetch_with_retry(inner, key.clone()));
        async move {
            task.await.unwrap_or_else(|e| {
                error!(key = %key, error = %e, "Fetch task failed");
                Err(Exhausted {
                    attempts: 0,
                    last_error: FetchError::Transport(format!("fetch task failed: {e}")),
                })
            })
        }
        .boxed()
        .shared()
    }

    async fn fetch_with_retry(
        inner: Arc<Inner>,
        key: String,
    ) -> std::result::Result<Resolved, Exhausted> {
        let slot = InFlightSlot {
            inner: &inner,
            key: &key,
        };
        // Taken before any await so a concurrent monitor eviction cannot
        // remove the fallback from under us.
        let fallback = inner.store.peek(&key);
        let outcome = Self::attempt_loop(&inner, &key).await;
        drop(slot);

        let exhausted = match outcome {
            Ok(resolved) => return Ok(resolved),
            Err(exhausted) => exhausted,
        };

        // Prefer whatever is in the store now (it may be newer), else our copy.
        match inner.store.peek(&key).or(fallback) {
            Some(entry) => {
                warn!(
                    key = %key,
                    attempts = exhausted.attempts,
                    last_error = %exhausted.last_error,
                    item_count = entry.item_count,
                    stored_at = %entry.stored_at,
                    "Backend unavailable, serving stale cache entry"
                );
                Ok(Resolved::from_entry(entry, Source::StaleFallback))
            }
            None => {
                warn!(
                    key = %key,
                    attempts = exhausted.attempts,
                    last_error = %exhausted.last_error,
                    "Fetch exhausted with no cached entry"
                );
                Err(exhausted)
            }
        }
    }

    async fn attempt_loop(inner: &Inner, key: &str) -> std::result::Result<Resolved, Exhausted> {
        let max_attempts = inner.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let error = match AssertUnwindSafe(Self::attempt(inner, key))
                .catch_unwind()
                .await
            {
                Ok(Ok(resolved)) => {
                    if attempt > 1 {
                        info!(key = %key, attempt, "Fetch succeeded after retry");
                    }
                    return Ok(resolved);
                }
                Ok(Err(e)) => e,
                Err(panic) => {
                    let reason = panic_message(&*panic);
                    error!(key = %key, attempt, error = %reason, "Fetch attempt panicked");
                    FetchError::Remote(format!("fetch panicked: {reason}"))
                }
            };

            warn!(
                key = %key,
                attempt,
                max_attempts,
                error = %error,
                "Fetch attempt failed"
            );

            if attempt >= max_attempts || !error.is_retryable() {
                return Err(Exhausted {
                    attempts: attempt,
                    last_error: error,
                });
            }
            inner.delay.wait(inner.policy.backoff).await;
        }
    }

    async fn attempt(inner: &Inner, key: &str) -> std::result::Result<Resolved, FetchError> {
        let fetched = tokio::time::timeout(inner.policy.attempt_timeout, inner.fetcher.fetch(key))
            .await
            .map_err(|_| {
                FetchError::Transport(format!(
                    "attempt timed out after {:?}",
                    inner.policy.attempt_timeout
                ))
            })??;

        if !inner.checker.is_plausible(key, fetched.item_count) {
            return Err(FetchError::Implausible {
                item_count: fetched.item_count,
            });
        }

        let payload = Arc::new(fetched.payload);
        inner.store.put(key, Arc::clone(&payload), fetched.item_count);
        debug!(key = %key, item_count = fetched.item_count, "Stored fresh result");
        Ok(Resolved {
            payload,
            item_count: fetched.item_count,
            source: Source::Fresh,
        })
    }
}
