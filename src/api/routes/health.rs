//! Liveness and cache health endpoints.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::api::server::AppState;

/// GET /api/health: liveness probe.
pub async fn get_health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /api/cache/health: latest sweep snapshot plus monitor run-state.
pub async fn get_cache_health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let monitor = state.reporter.monitor_state();
    Json(json!({
        "cache_health": monitor.last_snapshot,
        "monitor_status": {
            "running": monitor.running,
            "check_interval_secs": monitor.check_interval.as_secs(),
        },
        "cached_keys": state.coordinator.store().len(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::server::test_support::state_with;
    use crate::backend::MockFetcher;

    #[tokio::test]
    async fn test_get_health_returns_ok() {
        let Json(body) = get_health().await;
        assert_eq!(body["status"], "ok");
        assert!(body["version"].is_string());
    }

    #[tokio::test]
    async fn test_cache_health_before_first_sweep() {
        let state = Arc::new(state_with(MockFetcher::new()));
        let Json(body) = get_cache_health(State(state)).await;
        assert_eq!(body["cache_health"]["overall_status"], "unknown");
        assert_eq!(body["monitor_status"]["running"], false);
        assert_eq!(body["monitor_status"]["check_interval_secs"], 1800);
        assert_eq!(body["cached_keys"], 0);
    }

    #[tokio::test]
    async fn test_cache_health_reflects_sweep() {
        let state = Arc::new(state_with(MockFetcher::new()));
        let store = state.coordinator.store();
        store.put("students:batch23-27", json!({ "students": [] }), 0);
        store.put("batches", json!({ "allBatches": [{}] }), 1);
        state.monitor.run_cycle();

        let Json(body) = get_cache_health(State(Arc::clone(&state))).await;
        let health = &body["cache_health"];
        assert_eq!(health["overall_status"], "degraded");
        assert_eq!(health["total_keys"], 2);
        assert_eq!(health["healthy_keys"], 1);
        assert_eq!(health["problematic_keys"], json!(["students:batch23-27"]));
        assert_eq!(body["cached_keys"], 1);
    }
}
