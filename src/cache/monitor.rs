//! Background sweep that evicts implausible entries and publishes health.
//!
//! State machine: Idle -> Scanning -> Idle on a fixed-period timer, and
//! Idle -> Stopped when the shutdown signal fires. A sweep runs without
//! yielding, so shutdown is only observed between sweeps and a snapshot is
//! always published for every eviction.

use std::collections::BTreeSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::{Result, RosterError};
use crate::health::{HealthReporter, HealthSnapshot, MonitorShared};

use super::panic_message;
use super::store::CacheStore;
use super::validator::PlausibilityCheck;

/// Verdict for one key in a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Healthy,
    AllowlistedEmpty,
    Problematic,
    /// Removed by someone else between `list_keys` and inspection.
    Vanished,
}

/// Periodic cache health sweeper.
pub struct HealthMonitor {
    store: Arc<CacheStore>,
    checker: Arc<dyn PlausibilityCheck>,
    shared: Arc<MonitorShared>,
}

impl HealthMonitor {
    pub fn new(
        store: Arc<CacheStore>,
        checker: Arc<dyn PlausibilityCheck>,
        check_interval: Duration,
    ) -> Self {
        Self {
            store,
            checker,
            shared: Arc::new(MonitorShared::new(check_interval)),
        }
    }

    /// Read-only handle for health endpoints.
    pub fn reporter(&self) -> HealthReporter {
        HealthReporter::new(Arc::clone(&self.shared))
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Run one sweep now and publish its snapshot.
    pub fn run_cycle(&self) -> Arc<HealthSnapshot> {
        sweep(&self.store, self.checker.as_ref(), &self.shared)
    }

    /// Spawn the sweep loop. The first sweep runs immediately.
    ///
    /// Fails with [`RosterError::Config`] for a zero interval and with
    /// [`RosterError::MonitorRunning`] if a loop is already active.
    pub fn start(&self) -> Result<MonitorHandle> {
        if self.shared.check_interval().is_zero() {
            return Err(RosterError::Config(
                "monitor interval must be greater than zero".into(),
            ));
        }
        if self.shared.set_running(true) {
            return Err(RosterError::MonitorRunning);
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let store = Arc::clone(&self.store);
        let checker = Arc::clone(&self.checker);
        let shared = Arc::clone(&self.shared);
        let period = shared.check_interval();

        // Captured by the task so it drops even if the task is never polled.
        let running = RunningFlag(Arc::clone(&shared));

        info!(interval_secs = period.as_secs(), "Cache health monitor started");

        let join = tokio::spawn(async move {
            let _running = running;
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    changed = shutdown_rx.changed() => {
                        // A dropped sender counts as shutdown too.
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        sweep(&store, checker.as_ref(), &shared);
                    }
                }
            }
        });

        Ok(MonitorHandle { shutdown_tx, join })
    }
}

/// Clears the running flag when the sweep task exits, panics or is aborted.
struct RunningFlag(Arc<MonitorShared>);

impl Drop for RunningFlag {
    fn drop(&mut self) {
        self.0.set_running(false);
        info!("Cache health monitor stopped");
    }
}

/// Owner of a running sweep loop.
pub struct MonitorHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl MonitorHandle {
    /// Signal shutdown and wait for the loop to exit.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.join.await {
            error!(error = %e, "Cache health monitor task failed");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

fn sweep(
    store: &CacheStore,
    checker: &dyn PlausibilityCheck,
    shared: &MonitorShared,
) -> Arc<HealthSnapshot> {
    let expired = store.purge_expired();
    if !expired.is_empty() {
        debug!(count = expired.len(), keys = ?expired, "Purged expired entries");
    }

    let mut total = 0usize;
    let mut healthy = 0usize;
    let mut problematic = BTreeSet::new();
    let mut allowlisted_empty = BTreeSet::new();

    for key in store.list_keys() {
        let verdict = match catch_unwind(AssertUnwindSafe(|| inspect(store, checker, &key))) {
            Ok(v) => v,
            Err(panic) => {
                let reason = panic_message(&*panic);
                error!(key = %key, error = %reason, "Health check failed for key, skipping");
                continue;
            }
        };

        match verdict {
            Verdict::Vanished => continue,
            Verdict::Healthy => healthy += 1,
            Verdict::AllowlistedEmpty => {
                healthy += 1;
                allowlisted_empty.insert(key);
            }
            Verdict::Problematic => {
                problematic.insert(key);
            }
        }
        total += 1;
    }

    let snapshot = HealthSnapshot::from_sweep(total, healthy, problematic, allowlisted_empty);
    if snapshot.problematic_keys.is_empty() {
        info!(
            healthy = snapshot.healthy_keys,
            total = snapshot.total_keys,
            "Cache health is good"
        );
    } else {
        warn!(
            problematic = ?snapshot.problematic_keys,
            healthy = snapshot.healthy_keys,
            total = snapshot.total_keys,
            "Evicted implausible cache entries"
        );
    }
    shared.publish(snapshot)
}

fn inspect(store: &CacheStore, checker: &dyn PlausibilityCheck, key: &str) -> Verdict {
    let Some(entry) = store.peek(key) else {
        return Verdict::Vanished;
    };

    if checker.is_plausible(key, entry.item_count) {
        return if entry.item_count == 0 && checker.is_known_empty(key) {
            Verdict::AllowlistedEmpty
        } else {
            Verdict::Healthy
        };
    }

    // Re-checked under the shard lock: a fresh put since the peek survives.
    let evicted = store.evict_if(key, |current| !checker.is_plausible(key, current.item_count));
    if evicted {
        warn!(key = %key, item_count = entry.item_count, "Evicted implausible cache entry");
        Verdict::Problematic
    } else {
        Verdict::Healthy
    }
}
