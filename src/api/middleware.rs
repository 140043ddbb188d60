//! Admin token guard.
//!
//! When an admin token is configured, any non-read request under
//! `/api/cache/` must carry `Authorization: Bearer <token>`. Reads, the
//! liveness probe and resource lookups stay open.

use axum::{
    extract::State,
    http::{Method, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::warn;

use super::server::AppState;

fn is_admin_request(method: &Method, path: &str) -> bool {
    let read_only = *method == Method::GET || *method == Method::HEAD || *method == Method::OPTIONS;
    path.starts_with("/api/cache/") && !read_only
}

fn token_matches(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

pub async fn admin_auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected) = state.admin_token.as_deref() else {
        return Ok(next.run(request).await);
    };
    if !is_admin_request(request.method(), request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let authorized = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .is_some_and(|token| token_matches(token, expected));

    if authorized {
        return Ok(next.run(request).await);
    }
    warn!(
        method = %request.method(),
        path = %request.uri().path(),
        "Rejected admin request without valid token"
    );
    Err(StatusCode::UNAUTHORIZED)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::server::test_support::state_with;
    use crate::backend::MockFetcher;
    use axum::{
        body::Body,
        middleware as axum_mw,
        routing::{get, post},
        Router,
    };
    use tower::util::ServiceExt;

    fn make_app(token: Option<&str>) -> Router {
        let state =
            Arc::new(state_with(MockFetcher::new()).with_admin_token(token.map(String::from)));
        Router::new()
            .route("/api/health", get(|| async { "ok" }))
            .route(
                "/api/cache/entries",
                get(|| async { "list" }).delete(|| async { "cleared" }),
            )
            .route("/api/cache/sweep", post(|| async { "swept" }))
            .layer(axum_mw::from_fn_with_state(state, admin_auth_middleware))
    }

    async fn status(app: Router, method: Method, uri: &str, auth: Option<&str>) -> StatusCode {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(auth) = auth {
            builder = builder.header("authorization", auth);
        }
        app.oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_no_token_configured_allows_everything() {
        let app = make_app(None);
        assert_eq!(
            status(app, Method::DELETE, "/api/cache/entries", None).await,
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn test_reads_skip_auth() {
        assert_eq!(
            status(make_app(Some("tok")), Method::GET, "/api/cache/entries", None).await,
            StatusCode::OK
        );
        assert_eq!(
            status(make_app(Some("tok")), Method::GET, "/api/health", None).await,
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn test_mutation_without_token_returns_401() {
        assert_eq!(
            status(make_app(Some("tok")), Method::POST, "/api/cache/sweep", None).await,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn test_mutation_wrong_token_returns_401() {
        assert_eq!(
            status(
                make_app(Some("tok")),
                Method::DELETE,
                "/api/cache/entries",
                Some("Bearer nope")
            )
            .await,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status(
                make_app(Some("tok")),
                Method::DELETE,
                "/api/cache/entries",
                Some("tok")
            )
            .await,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn test_mutation_valid_token() {
        assert_eq!(
            status(
                make_app(Some("tok")),
                Method::POST,
                "/api/cache/sweep",
                Some("Bearer tok")
            )
            .await,
            StatusCode::OK
        );
    }

    #[test]
    fn test_token_matches_length_mismatch() {
        assert!(token_matches("abc", "abc"));
        assert!(!token_matches("abc", "abcd"));
        assert!(!token_matches("", "abc"));
    }
}
