//! Axum API server for the roster cache.

use axum::http::{HeaderName, Method};
use axum::middleware as axum_mw;
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::cache::{HealthMonitor, RetrievalCoordinator};
use crate::config::ServerConfig;
use crate::health::HealthReporter;

/// Shared state for all API handlers.
#[derive(Clone)]
pub struct AppState {
    /// Cache-first reads with retry and stale fallback.
    pub coordinator: RetrievalCoordinator,
    /// Used by `POST /api/cache/sweep` to run an on-demand cycle.
    pub monitor: Arc<HealthMonitor>,
    /// Latest published health snapshot.
    pub reporter: HealthReporter,
    /// When `Some`, mutating cache routes require `Authorization: Bearer <token>`.
    pub admin_token: Option<String>,
}

impl AppState {
    pub fn new(coordinator: RetrievalCoordinator, monitor: Arc<HealthMonitor>) -> Self {
        let reporter = monitor.reporter();
        Self {
            coordinator,
            monitor,
            reporter,
            admin_token: None,
        }
    }

    pub fn with_admin_token(mut self, token: Option<String>) -> Self {
        self.admin_token = token;
        self
    }
}

/// Build the axum router with all API routes.
pub fn build_router(state: AppState) -> Router {
    let shared_state = Arc::new(state);

    // The dashboard is served from a different origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([
            HeaderName::from_static("content-type"),
            HeaderName::from_static("authorization"),
        ]);

    Router::new()
        .route("/api/health", get(super::routes::health::get_health))
        .route(
            "/api/cache/health",
            get(super::routes::health::get_cache_health),
        )
        .route(
            "/api/resources/{key}",
            get(super::routes::resources::get_resource),
        )
        .route(
            "/api/cache/entries",
            get(super::routes::cache::list_entries).delete(super::routes::cache::clear_all),
        )
        .route(
            "/api/cache/entries/{key}",
            axum::routing::delete(super::routes::cache::clear_entry),
        )
        .route(
            "/api/cache/entries/{key}/refresh",
            post(super::routes::cache::refresh_entry),
        )
        .route("/api/cache/sweep", post(super::routes::cache::sweep))
        .layer(axum_mw::from_fn_with_state(
            shared_state.clone(),
            super::middleware::admin_auth_middleware,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(shared_state)
}

/// Bind and serve until `shutdown` resolves.
pub async fn start_server<F>(
    config: &ServerConfig,
    state: AppState,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Roster cache API listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::state_with;
    use super::*;
    use crate::backend::MockFetcher;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    #[test]
    fn test_app_state_new() {
        let state = state_with(MockFetcher::new());
        assert!(state.admin_token.is_none());
        let state = state.with_admin_token(Some("tok".into()));
        assert_eq!(state.admin_token.as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let app = build_router(state_with(MockFetcher::new()));
        let req = Request::builder()
            .uri("/api/nope")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cors_preflight_allows_delete() {
        let app = build_router(state_with(MockFetcher::new()));
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/cache/entries")
            .header("origin", "http://localhost:5173")
            .header("access-control-request-method", "DELETE")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp
            .headers()
            .contains_key("access-control-allow-origin"));
    }

    #[tokio::test]
    async fn test_start_server_shuts_down() {
        let config = ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            admin_token: None,
        };
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            start_server(&config, state_with(MockFetcher::new()), async {
                let _ = rx.await;
            })
            .await
            .map_err(|e| e.to_string())
        });
        tx.send(()).unwrap();
        let result = tokio::time::timeout(std::time::Duration::from_secs(2), server)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
