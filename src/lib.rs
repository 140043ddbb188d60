//! rostercache: a self-healing cache in front of a roster GraphQL backend.
//!
//! Reads go through [`cache::RetrievalCoordinator`], which serves plausible
//! cached payloads, refetches with bounded retries, and falls back to stale
//! data when the backend is down. [`cache::HealthMonitor`] periodically evicts
//! implausible entries and publishes a [`health::HealthSnapshot`].

pub mod api;
pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod health;

pub use backend::{Fetched, Fetcher, GraphQlFetcher, Resource};
pub use cache::{
    CacheStore, HealthMonitor, MonitorHandle, PlausibilityCheck, Resolved, RetrievalCoordinator,
    RetryPolicy, Source, Validator,
};
pub use config::Config;
pub use error::{FetchError, Result, RosterError};
pub use health::{HealthReporter, HealthSnapshot, MonitorState, OverallStatus};
