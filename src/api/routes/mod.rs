//! Route handlers, grouped by resource.

pub mod cache;
pub mod health;
pub mod resources;

use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::error::RosterError;

/// Map a library error to an HTTP status and JSON body.
pub(crate) fn error_response(err: &RosterError) -> (StatusCode, Json<Value>) {
    let status = match err {
        RosterError::FetchExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
        RosterError::MonitorRunning => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": err.to_string() })))
}
