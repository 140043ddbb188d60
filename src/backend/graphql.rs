//! GraphQL fetcher over reqwest.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::BackendConfig;
use crate::error::{FetchError, Result, RosterError};

use super::{Fetched, Fetcher, Resource};

/// Production [`Fetcher`] posting GraphQL documents to the backend.
pub struct GraphQlFetcher {
    client: Client,
    endpoint: String,
}

impl GraphQlFetcher {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| RosterError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: config.url.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn execute(&self, resource: &Resource) -> std::result::Result<Value, FetchError> {
        let body = json!({
            "query": resource.query(),
            "variables": resource.variables(),
        });

        debug!(resource = %resource, endpoint = %self.endpoint, "GraphQL request");

        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| FetchError::Transport(format!("GraphQL request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(FetchError::Remote(format!(
                "backend returned HTTP {}: {}",
                status.as_u16(),
                truncate(&text, 200)
            )));
        }

        let mut envelope: Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Transport(format!("timed out reading GraphQL response: {}", e))
            } else {
                FetchError::Remote(format!("failed to parse GraphQL response: {}", e))
            }
        })?;

        if let Some(errors) = envelope.get("errors").filter(|e| !e.is_null()) {
            return Err(FetchError::Remote(format!("GraphQL error: {}", errors)));
        }

        Ok(envelope
            .get_mut("data")
            .map(Value::take)
            .unwrap_or_else(|| json!({})))
    }
}

#[async_trait]
impl Fetcher for GraphQlFetcher {
    async fn fetch(&self, key: &str) -> std::result::Result<Fetched, FetchError> {
        let resource =
            Resource::parse(key).ok_or_else(|| FetchError::UnknownResource(key.to_string()))?;
        let data = self.execute(&resource).await?;
        let item_count = resource.count_items(&data);
        Ok(Fetched::new(data, item_count))
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
