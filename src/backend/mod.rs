//! Fetch boundary to the remote data backend.
//!
//! [`Fetcher`] abstracts a single remote query for a resource key so the
//! retrieval coordinator can be driven by a test double. [`GraphQlFetcher`] is
//! the production implementation.

pub mod graphql;
pub mod resource;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::FetchError;

pub use graphql::GraphQlFetcher;
pub use resource::Resource;

/// A successful backend response.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    /// The `data` object returned by the backend.
    pub payload: Value,
    /// Number of items in the payload (roster size, contest count, ...).
    pub item_count: usize,
}

impl Fetched {
    pub fn new(payload: Value, item_count: usize) -> Self {
        Self {
            payload,
            item_count,
        }
    }
}

/// Performs one remote query.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the resource named by `key`.
    async fn fetch(&self, key: &str) -> Result<Fetched, FetchError>;
}
