//! Resource reads through the retrieval coordinator.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

use super::error_response;
use crate::api::server::AppState;
use crate::cache::Resolved;

pub(crate) fn resolved_body(key: &str, resolved: &Resolved) -> Value {
    json!({
        "key": key,
        "source": resolved.source,
        "item_count": resolved.item_count,
        "data": resolved.payload.as_ref(),
    })
}

/// GET /api/resources/{key}
///
/// Cache hit, fresh fetch and stale fallback all answer 200 with `source`
/// telling them apart. 503 only when nothing could be fetched or served.
pub async fn get_resource(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.coordinator.resolve(&key).await {
        Ok(resolved) => (StatusCode::OK, Json(resolved_body(&key, &resolved))),
        Err(e) => error_response(&e),
    }
}
