//! Cache administration routes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use super::error_response;
use super::resources::resolved_body;
use crate::api::server::AppState;

/// GET /api/cache/entries
pub async fn list_entries(State(state): State<Arc<AppState>>) -> Json<Value> {
    let store = state.coordinator.store();
    Json(json!({
        "entries": store.summaries(),
        "ttl_secs": store.ttl().as_secs(),
    }))
}

/// DELETE /api/cache/entries/{key}
pub async fn clear_entry(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> (StatusCode, Json<Value>) {
    if state.coordinator.store().evict(&key) {
        info!(key = %key, "Cache entry cleared");
        (StatusCode::OK, Json(json!({ "cleared": key })))
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no cache entry for '{}'", key) })),
        )
    }
}

/// DELETE /api/cache/entries
pub async fn clear_all(State(state): State<Arc<AppState>>) -> Json<Value> {
    let removed = state.coordinator.store().clear_all();
    info!(removed, "Cache cleared");
    Json(json!({ "cleared": removed }))
}

/// POST /api/cache/entries/{key}/refresh
pub async fn refresh_entry(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.coordinator.refresh(&key).await {
        Ok(resolved) => (StatusCode::OK, Json(resolved_body(&key, &resolved))),
        Err(e) => error_response(&e),
    }
}

/// POST /api/cache/sweep: run one health cycle now.
pub async fn sweep(State(state): State<Arc<AppState>>) -> Json<Value> {
    let snapshot = state.monitor.run_cycle();
    Json(json!({ "cache_health": snapshot }))
}
