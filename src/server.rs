//! HTTP server setup and request handlers

use std::future::Future;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::data::{StatsView, UpstreamError};
use crate::query::QueryService;
use crate::refresh::RefreshError;

/// Failure payload returned with a 5xx status
struct ApiError(RefreshError);

impl ApiError {
    /// Client-facing message; details stay in the log
    fn message(&self) -> String {
        match &self.0 {
            RefreshError::Upstream(UpstreamError::Status(code)) => {
                format!("upstream returned status {}", code)
            }
            RefreshError::Upstream(UpstreamError::Timeout(_)) => {
                "upstream request timed out".to_string()
            }
            RefreshError::Upstream(UpstreamError::Transport(_)) => {
                "upstream request failed".to_string()
            }
            RefreshError::Upstream(UpstreamError::Decode(_)) => {
                "upstream response could not be decoded".to_string()
            }
            RefreshError::Store(_) => "snapshot store unavailable".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(error = %self.0, "failed to serve stats");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": self.message() })),
        )
            .into_response()
    }
}

/// Builds the application router
pub fn router(query: QueryService) -> Router {
    Router::new()
        .route("/", get(stats))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(query)
}

/// Serves `router` on `listener` until `shutdown` resolves
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("HTTP server listening on http://{}/", addr);
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

/// Health check endpoint
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "statcache"
    }))
}

/// Current stats endpoint
async fn stats(State(query): State<QueryService>) -> Result<Json<StatsView>, ApiError> {
    query.get_stats().await.map(Json).map_err(ApiError)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::data::{Fetcher, Snapshot};
    use crate::refresh::{CoordinatorConfig, RefreshCoordinator};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    struct FixedFetcher(Result<Snapshot, UpstreamError>);

    #[async_trait]
    impl Fetcher for FixedFetcher {
        async fn fetch(&self) -> Result<Snapshot, UpstreamError> {
            self.0.clone()
        }
    }

    fn app(response: Result<Snapshot, UpstreamError>) -> Router {
        let coordinator = RefreshCoordinator::new(
            Arc::new(FixedFetcher(response)),
            Arc::new(MemoryStore::new()),
            CoordinatorConfig::default(),
        );
        router(QueryService::new(coordinator))
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_stats_endpoint_returns_latest() {
        let snapshot = Snapshot::from_value(json!({"deaths": 5})).unwrap();

        let (status, body) = get_json(app(Ok(snapshot)), "/").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"latest": {"deaths": 5}}));
    }

    #[tokio::test]
    async fn test_stats_endpoint_maps_failure_to_500() {
        let (status, body) = get_json(app(Err(UpstreamError::Status(503))), "/").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"error": "upstream returned status 503"}));
    }

    #[tokio::test]
    async fn test_error_body_does_not_leak_details() {
        let failure = UpstreamError::Transport(
            "error sending request for url (http://internal.example:8080/api/stats)".to_string(),
        );

        let (status, body) = get_json(app(Err(failure)), "/").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"error": "upstream request failed"}));
    }

    #[test]
    fn test_store_error_message_is_generic() {
        let error = ApiError(RefreshError::Store(crate::cache::StoreError::Corrupt(
            "expected value at line 1 column 1".to_string(),
        )));

        assert_eq!(error.message(), "snapshot store unavailable");
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (status, body) = get_json(app(Err(UpstreamError::Status(503))), "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }
}
