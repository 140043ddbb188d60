//! Cache health snapshot and its read-only reporter.
//!
//! The [`crate::cache::HealthMonitor`] publishes a fresh [`HealthSnapshot`]
//! after every sweep. [`HealthReporter`] hands out the latest one without
//! blocking; before the first sweep completes it returns the initial
//! [`OverallStatus::Unknown`] snapshot.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use tokio::sync::watch;

// ============================================================================
// HealthSnapshot
// ============================================================================

/// Overall verdict of a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    /// No sweep has completed yet.
    Unknown,
    /// The last sweep found nothing to evict.
    Healthy,
    /// The last sweep evicted at least one implausible entry.
    Degraded,
}

impl OverallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverallStatus::Unknown => "unknown",
            OverallStatus::Healthy => "healthy",
            OverallStatus::Degraded => "degraded",
        }
    }
}

/// Point-in-time summary of cache correctness. Immutable once published.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSnapshot {
    pub overall_status: OverallStatus,
    /// Keys evaluated in the sweep.
    pub total_keys: usize,
    /// Keys that passed the plausibility check (allowlisted empties included).
    pub healthy_keys: usize,
    /// Keys found implausible and evicted.
    pub problematic_keys: BTreeSet<String>,
    /// Keys holding zero items that are on the known-empty allowlist.
    pub empty_allowlisted_keys: BTreeSet<String>,
    /// When the sweep finished.
    pub generated_at: DateTime<Utc>,
}

impl HealthSnapshot {
    /// Placeholder published before the first sweep.
    pub fn unknown() -> Self {
        Self {
            overall_status: OverallStatus::Unknown,
            total_keys: 0,
            healthy_keys: 0,
            problematic_keys: BTreeSet::new(),
            empty_allowlisted_keys: BTreeSet::new(),
            generated_at: Utc::now(),
        }
    }

    /// Assemble a sweep result; status is `degraded` iff anything was problematic.
    pub fn from_sweep(
        total_keys: usize,
        healthy_keys: usize,
        problematic_keys: BTreeSet<String>,
        empty_allowlisted_keys: BTreeSet<String>,
    ) -> Self {
        let overall_status = if problematic_keys.is_empty() {
            OverallStatus::Healthy
        } else {
            OverallStatus::Degraded
        };
        Self {
            overall_status,
            total_keys,
            healthy_keys,
            problematic_keys,
            empty_allowlisted_keys,
            generated_at: Utc::now(),
        }
    }
}

// ============================================================================
// MonitorState
// ============================================================================

/// Run-state of the health monitor as seen by readers.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorState {
    pub running: bool,
    #[serde(rename = "check_interval_secs", serialize_with = "as_secs")]
    pub check_interval: Duration,
    pub last_snapshot: Arc<HealthSnapshot>,
}

fn as_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}

/// State shared between the monitor (writer) and reporters (readers).
pub(crate) struct MonitorShared {
    running: AtomicBool,
    check_interval: Duration,
    snapshot_tx: watch::Sender<Arc<HealthSnapshot>>,
}

impl MonitorShared {
    pub(crate) fn new(check_interval: Duration) -> Self {
        let (snapshot_tx, _) = watch::channel(Arc::new(HealthSnapshot::unknown()));
        Self {
            running: AtomicBool::new(false),
            check_interval,
            snapshot_tx,
        }
    }

    /// Swap in a new snapshot. Readers see either the old or the new one.
    pub(crate) fn publish(&self, snapshot: HealthSnapshot) -> Arc<HealthSnapshot> {
        let snapshot = Arc::new(snapshot);
        self.snapshot_tx.send_replace(Arc::clone(&snapshot));
        snapshot
    }

    /// Set the running flag, returning the previous value.
    pub(crate) fn set_running(&self, running: bool) -> bool {
        self.running.swap(running, Ordering::SeqCst)
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn check_interval(&self) -> Duration {
        self.check_interval
    }

    fn subscribe(&self) -> watch::Receiver<Arc<HealthSnapshot>> {
        self.snapshot_tx.subscribe()
    }
}

// ============================================================================
// HealthReporter
// ============================================================================

/// Read-only view of the monitor's latest snapshot and run-state.
#[derive(Clone)]
pub struct HealthReporter {
    shared: Arc<MonitorShared>,
    snapshot_rx: watch::Receiver<Arc<HealthSnapshot>>,
}

impl HealthReporter {
    pub(crate) fn new(shared: Arc<MonitorShared>) -> Self {
        let snapshot_rx = shared.subscribe();
        Self {
            shared,
            snapshot_rx,
        }
    }

    /// Most recently published snapshot.
    pub fn snapshot(&self) -> Arc<HealthSnapshot> {
        Arc::clone(&self.snapshot_rx.borrow())
    }

    pub fn monitor_state(&self) -> MonitorState {
        MonitorState {
            running: self.shared.is_running(),
            check_interval: self.shared.check_interval(),
            last_snapshot: self.snapshot(),
        }
    }

    /// Wait for the next published snapshot. Used by tests and the CLI sweep.
    pub async fn changed(&mut self) -> Option<Arc<HealthSnapshot>> {
        self.snapshot_rx.changed().await.ok()?;
        Some(Arc::clone(&self.snapshot_rx.borrow_and_update()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_initial_snapshot_is_unknown() {
        let shared = Arc::new(MonitorShared::new(Duration::from_secs(1800)));
        let reporter = HealthReporter::new(shared);
        let snap = reporter.snapshot();
        assert_eq!(snap.overall_status, OverallStatus::Unknown);
        assert_eq!(snap.total_keys, 0);
        assert!(snap.problematic_keys.is_empty());

        let state = reporter.monitor_state();
        assert!(!state.running);
        assert_eq!(state.check_interval, Duration::from_secs(1800));
    }

    #[test]
    fn test_from_sweep_status() {
        let healthy = HealthSnapshot::from_sweep(2, 2, BTreeSet::new(), keys(&["students:b22"]));
        assert_eq!(healthy.overall_status, OverallStatus::Healthy);

        let degraded = HealthSnapshot::from_sweep(2, 1, keys(&["students:b23"]), BTreeSet::new());
        assert_eq!(degraded.overall_status, OverallStatus::Degraded);
        assert_eq!(degraded.overall_status.as_str(), "degraded");
    }

    #[test]
    fn test_publish_replaces_wholesale() {
        let shared = Arc::new(MonitorShared::new(Duration::from_secs(60)));
        let reporter = HealthReporter::new(Arc::clone(&shared));
        shared.publish(HealthSnapshot::from_sweep(1, 0, keys(&["k"]), BTreeSet::new()));
        assert_eq!(reporter.snapshot().overall_status, OverallStatus::Degraded);
        shared.publish(HealthSnapshot::from_sweep(0, 0, BTreeSet::new(), BTreeSet::new()));
        let snap = reporter.snapshot();
        assert_eq!(snap.overall_status, OverallStatus::Healthy);
        assert!(snap.problematic_keys.is_empty());
    }

    #[test]
    fn test_running_flag() {
        let shared = Arc::new(MonitorShared::new(Duration::from_secs(60)));
        let reporter = HealthReporter::new(Arc::clone(&shared));
        assert!(!shared.set_running(true));
        assert!(reporter.monitor_state().running);
        assert!(shared.set_running(false));
        assert!(!reporter.monitor_state().running);
    }

    #[test]
    fn test_monitor_state_json_shape() {
        let shared = Arc::new(MonitorShared::new(Duration::from_secs(1800)));
        let reporter = HealthReporter::new(shared);
        let json = serde_json::to_value(reporter.monitor_state()).unwrap();
        assert_eq!(json["running"], false);
        assert_eq!(json["check_interval_secs"], 1800);
        assert_eq!(json["last_snapshot"]["overall_status"], "unknown");
        assert!(json["last_snapshot"]["problematic_keys"].is_array());
    }

    #[tokio::test]
    async fn test_changed_sees_next_publish() {
        let shared = Arc::new(MonitorShared::new(Duration::from_secs(60)));
        let mut reporter = HealthReporter::new(Arc::clone(&shared));
        let publisher = Arc::clone(&shared);
        tokio::spawn(async move {
            publisher.publish(HealthSnapshot::from_sweep(3, 3, BTreeSet::new(), BTreeSet::new()));
        });
        let snap = reporter.changed().await.unwrap();
        assert_eq!(snap.total_keys, 3);
    }
}
