//! `rostercache cache`: admin operations against a running server.

use anyhow::{bail, Context, Result};
use reqwest::{Client, Method, StatusCode, Url};
use serde_json::Value;

use super::CacheSubcommand;

/// Thin HTTP client for the `/api/cache` routes.
struct AdminClient {
    client: Client,
    base: Url,
    token: Option<String>,
}

impl AdminClient {
    fn new(base: &str, token: Option<String>) -> Result<Self> {
        let base = Url::parse(base).with_context(|| format!("invalid server URL '{base}'"))?;
        Ok(Self {
            client: Client::new(),
            base,
            token,
        })
    }

    /// Build `<base>/<segments...>`, percent-encoding each segment.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("server URL cannot be a base: {}", self.base))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, method: Method, segments: &[&str]) -> Result<(StatusCode, Value)> {
        let url = self.url(segments)?;
        let mut req = self.client.request(method, url.clone());
        if let Some(ref token) = self.token {
            req = req.bearer_auth(token);
        }
        let resp = req
            .send()
            .await
            .with_context(|| format!("request to {url} failed; is the server running?"))?;
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            bail!("server rejected the admin token (HTTP 401)");
        }
        let body = resp.json::<Value>().await.unwrap_or(Value::Null);
        Ok((status, body))
    }
}

fn error_message(body: &Value) -> &str {
    body["error"].as_str().unwrap_or("unknown error")
}

/// Handle `rostercache cache` subcommands.
pub(crate) async fn cmd_cache(action: CacheSubcommand, base: &str, token: Option<String>) -> Result<()> {
    let client = AdminClient::new(base, token)?;
    for line in run_action(&client, action).await? {
        println!("{line}");
    }
    Ok(())
}

async fn run_action(client: &AdminClient, action: CacheSubcommand) -> Result<Vec<String>> {
    match action {
        CacheSubcommand::Info => {
            let (_, health) = client.send(Method::GET, &["api", "cache", "health"]).await?;
            let (_, entries) = client.send(Method::GET, &["api", "cache", "entries"]).await?;
            Ok(render_info(&health, &entries))
        }
        CacheSubcommand::Clear { key } => {
            let (status, body) = client
                .send(Method::DELETE, &["api", "cache", "entries", &key])
                .await?;
            match status {
                StatusCode::OK => Ok(vec![format!("Cleared cache for: {key}")]),
                StatusCode::NOT_FOUND => Ok(vec![format!("No cache entry for: {key}")]),
                _ => bail!("clear failed: {}", error_message(&body)),
            }
        }
        CacheSubcommand::ClearAll => {
            let (status, body) = client.send(Method::DELETE, &["api", "cache", "entries"]).await?;
            if !status.is_success() {
                bail!("clear failed: {}", error_message(&body));
            }
            Ok(vec![format!(
                "Cleared {} cached entries.",
                body["cleared"].as_u64().unwrap_or(0)
            )])
        }
        CacheSubcommand::Test { key, refresh } => {
            let (status, body) = if refresh {
                client
                    .send(Method::POST, &["api", "cache", "entries", &key, "refresh"])
                    .await?
            } else {
                client.send(Method::GET, &["api", "resources", &key]).await?
            };
            if !status.is_success() {
                bail!("{key}: {}", error_message(&body));
            }
            Ok(vec![format!(
                "{key}: {} items (source: {})",
                body["item_count"].as_u64().unwrap_or(0),
                body["source"].as_str().unwrap_or("?")
            )])
        }
        CacheSubcommand::Sweep => {
            let (status, body) = client.send(Method::POST, &["api", "cache", "sweep"]).await?;
            if !status.is_success() {
                bail!("sweep failed: {}", error_message(&body));
            }
            Ok(render_snapshot(&body["cache_health"]))
        }
    }
}

fn join_keys(keys: &Value) -> String {
    let keys: Vec<&str> = keys
        .as_array()
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    if keys.is_empty() {
        "-".to_string()
    } else {
        keys.join(", ")
    }
}

fn render_snapshot(snap: &Value) -> Vec<String> {
    vec![
        format!(
            "Status: {} (at {})",
            snap["overall_status"].as_str().unwrap_or("unknown"),
            snap["generated_at"].as_str().unwrap_or("-")
        ),
        format!(
            "Keys: {} total, {} healthy",
            snap["total_keys"].as_u64().unwrap_or(0),
            snap["healthy_keys"].as_u64().unwrap_or(0)
        ),
        format!("Evicted: {}", join_keys(&snap["problematic_keys"])),
        format!("Allowlisted empty: {}", join_keys(&snap["empty_allowlisted_keys"])),
    ]
}

fn render_info(health: &Value, entries: &Value) -> Vec<String> {
    let mut lines = render_snapshot(&health["cache_health"]);
    let monitor = &health["monitor_status"];
    lines.push(format!(
        "Monitor: {} (every {}s)",
        if monitor["running"].as_bool().unwrap_or(false) {
            "running"
        } else {
            "stopped"
        },
        monitor["check_interval_secs"].as_u64().unwrap_or(0)
    ));
    lines.push(String::new());

    let rows = entries["entries"].as_array().map(Vec::as_slice).unwrap_or(&[]);
    if rows.is_empty() {
        lines.push("No cached entries.".to_string());
        return lines;
    }

    lines.push(format!(
        "{:<40} {:>8} {:<26} {:<8}",
        "Key", "Items", "Stored", "Expired"
    ));
    lines.push("-".repeat(85));
    for row in rows {
        lines.push(format!(
            "{:<40} {:>8} {:<26} {:<8}",
            row["key"].as_str().unwrap_or("?"),
            row["item_count"].as_u64().unwrap_or(0),
            row["stored_at"].as_str().unwrap_or("-"),
            if row["expired"].as_bool().unwrap_or(false) {
                "yes"
            } else {
                "no"
            },
        ));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rostercache::api::{build_router, AppState};
    use rostercache::backend::{Fetched, Fetcher};
    use rostercache::cache::{CacheStore, HealthMonitor, RetrievalCoordinator, RetryPolicy, Validator};
    use rostercache::error::FetchError;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    /// Serves three batches; anything else is unknown.
    struct StubFetcher;

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn fetch(&self, key: &str) -> Result<Fetched, FetchError> {
            match key {
                "batches" => Ok(Fetched::new(json!({ "allBatches": [{}, {}, {}] }), 3)),
                other => Err(FetchError::UnknownResource(other.to_string())),
            }
        }
    }

    async fn spawn_server(token: Option<&str>) -> (String, Arc<CacheStore>) {
        let store = Arc::new(CacheStore::new(Duration::from_secs(3600)));
        let checker = Arc::new(Validator::new(Vec::<String>::new()));
        let coordinator = RetrievalCoordinator::new(
            Arc::clone(&store),
            checker.clone(),
            Arc::new(StubFetcher),
            RetryPolicy {
                max_attempts: 1,
                backoff: Duration::ZERO,
                attempt_timeout: Duration::from_secs(5),
            },
        );
        let monitor = Arc::new(HealthMonitor::new(
            Arc::clone(&store),
            checker,
            Duration::from_secs(60),
        ));
        let state = AppState::new(coordinator, monitor).with_admin_token(token.map(String::from));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, build_router(state)).await.unwrap();
        });
        (format!("http://{addr}"), store)
    }

    #[tokio::test]
    async fn test_cache_test_then_clear() {
        let (base, store) = spawn_server(None).await;
        let client = AdminClient::new(&base, None).unwrap();

        let out = run_action(
            &client,
            CacheSubcommand::Test {
                key: "batches".into(),
                refresh: false,
            },
        )
        .await
        .unwrap();
        assert_eq!(out, vec!["batches: 3 items (source: fresh)"]);
        assert_eq!(store.len(), 1);

        let out = run_action(&client, CacheSubcommand::Clear { key: "batches".into() })
            .await
            .unwrap();
        assert_eq!(out, vec!["Cleared cache for: batches"]);
        let out = run_action(&client, CacheSubcommand::Clear { key: "batches".into() })
            .await
            .unwrap();
        assert_eq!(out, vec!["No cache entry for: batches"]);
    }

    #[tokio::test]
    async fn test_cache_test_unknown_key_fails() {
        let (base, _store) = spawn_server(None).await;
        let client = AdminClient::new(&base, None).unwrap();
        let err = run_action(
            &client,
            CacheSubcommand::Test {
                key: "teachers:x".into(),
                refresh: false,
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("teachers:x"));
    }

    #[tokio::test]
    async fn test_info_and_sweep() {
        let (base, store) = spawn_server(None).await;
        store.put("students:b1", json!({ "students": [] }), 0);
        store.put("batches", json!({ "allBatches": [{}] }), 1);
        let client = AdminClient::new(&base, None).unwrap();

        let out = run_action(&client, CacheSubcommand::Info).await.unwrap();
        assert!(out[0].starts_with("Status: unknown"));
        assert!(out.iter().any(|l| l.starts_with("batches")));

        let out = run_action(&client, CacheSubcommand::Sweep).await.unwrap();
        assert!(out[0].starts_with("Status: degraded"));
        assert_eq!(out[2], "Evicted: students:b1");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_admin_token_enforced() {
        let (base, store) = spawn_server(Some("tok")).await;
        store.put("a", json!({}), 1);

        let anonymous = AdminClient::new(&base, None).unwrap();
        let err = run_action(&anonymous, CacheSubcommand::ClearAll)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("401"));
        assert_eq!(store.len(), 1);

        let admin = AdminClient::new(&base, Some("tok".into())).unwrap();
        let out = run_action(&admin, CacheSubcommand::ClearAll).await.unwrap();
        assert_eq!(out, vec!["Cleared 1 cached entries."]);
    }

    #[test]
    fn test_url_encodes_key_segment() {
        let client = AdminClient::new("http://127.0.0.1:3001/", None).unwrap();
        let url = client
            .url(&["api", "resources", "leaderboard:b1:Weekly Contest 460"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:3001/api/resources/leaderboard:b1:Weekly%20Contest%20460"
        );
    }

    #[test]
    fn test_render_info_empty() {
        let health = json!({
            "cache_health": { "overall_status": "healthy", "total_keys": 0, "healthy_keys": 0,
                              "problematic_keys": [], "empty_allowlisted_keys": [] },
            "monitor_status": { "running": true, "check_interval_secs": 1800 },
        });
        let lines = render_info(&health, &json!({ "entries": [] }));
        assert!(lines[0].starts_with("Status: healthy"));
        assert_eq!(lines[2], "Evicted: -");
        assert_eq!(lines[4], "Monitor: running (every 1800s)");
        assert_eq!(lines.last().unwrap(), "No cached entries.");
    }
}
