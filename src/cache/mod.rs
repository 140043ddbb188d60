//! Self-healing cache between the agent's tools and the GraphQL backend.
//!
//! - [`CacheStore`]: key -> entry map with per-entry TTL.
//! - [`Validator`]: plausibility of a payload's item count.
//! - [`RetrievalCoordinator`]: request path with retry, stale fallback and
//!   per-key fetch dedup.
//! - [`HealthMonitor`]: periodic sweep evicting implausible entries.

pub mod coordinator;
pub mod monitor;
pub mod store;
pub mod validator;

pub use coordinator::{
    NoDelay, Resolved, RetrievalCoordinator, RetryDelay, RetryPolicy, Source, TokioDelay,
};
pub use monitor::{HealthMonitor, MonitorHandle};
pub use store::{CacheEntry, CacheStore, EntrySummary};
pub use validator::{PlausibilityCheck, Validator};

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
