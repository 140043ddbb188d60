//! Error types for rostercache.
//!
//! Two layers:
//! - [`FetchError`] is the taxonomy of a single backend attempt. The retrieval
//!   coordinator handles these locally and never hands them to callers.
//! - [`RosterError`] is the crate-level error. Of its variants, only
//!   [`RosterError::FetchExhausted`] is produced on the request path.

use thiserror::Error;

/// Outcome of a failed backend attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Network failure or timeout talking to the backend.
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered with an application-level error.
    #[error("remote error: {0}")]
    Remote(String),

    /// The backend answered successfully but the content looks wrong
    /// (zero items for a key that should never be empty).
    #[error("implausible result: {item_count} items")]
    Implausible { item_count: usize },

    /// The key does not name a resource the backend can serve.
    #[error("unknown resource key '{0}'")]
    UnknownResource(String),
}

impl FetchError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::UnknownResource(_))
    }
}

/// Crate-level error type.
#[derive(Debug, Error)]
pub enum RosterError {
    /// No fresh data could be obtained and nothing is cached for the key.
    #[error("fetch exhausted for '{key}' after {attempts} attempt(s): {last_error}")]
    FetchExhausted {
        key: String,
        attempts: u32,
        last_error: String,
    },

    /// Invalid or unreadable configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The health monitor loop is already running.
    #[error("health monitor is already running")]
    MonitorRunning,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, RosterError>;
