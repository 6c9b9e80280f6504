//! Router construction and server host for the API.

use std::any::Any;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{DefaultBodyLimit, MatchedPath},
    http::{HeaderName, Method, Request, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use scanlab_pipeline::Pipeline;
use scanlab_telemetry::{Metrics, REQUEST_ID_HEADER, build_sha};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any as AnyOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{Span, error, info};

use crate::error::{ApiServerError, ApiServerResult};
use crate::http::constants::{
    MULTIPART_OVERHEAD_BYTES, ROUTE_HEALTH, ROUTE_METRICS, ROUTE_UPLOAD,
};
use crate::http::errors::{ApiError, method_not_allowed, not_found};
use crate::http::health::{health, metrics};
use crate::http::telemetry::HttpMetricsLayer;
use crate::http::upload::upload;
use crate::state::ApiState;

/// Axum router wrapper hosting the scan analysis API.
pub struct ApiServer {
    router: Router,
}

impl ApiServer {
    /// Build the router around a configured pipeline and metrics registry.
    #[must_use]
    pub fn new(pipeline: Pipeline, telemetry: Metrics) -> Self {
        let body_limit = usize::try_from(pipeline.intake().max_bytes())
            .unwrap_or(usize::MAX)
            .saturating_add(MULTIPART_OVERHEAD_BYTES);
        let state = Arc::new(ApiState::new(pipeline, telemetry.clone()));

        let cors_layer = CorsLayer::new()
            .allow_origin(AnyOrigin)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([CONTENT_TYPE, HeaderName::from_static(REQUEST_ID_HEADER)])
            .expose_headers([HeaderName::from_static(REQUEST_ID_HEADER)]);
        let trace_layer = TraceLayer::new_for_http()
            .make_span_with(|request: &Request<_>| {
                let route = request
                    .extensions()
                    .get::<MatchedPath>()
                    .map_or_else(|| request.uri().path(), MatchedPath::as_str);
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("");
                tracing::info_span!(
                    "http.request",
                    method = %request.method(),
                    route = %route,
                    request_id = %request_id,
                    build_sha = %build_sha(),
                    status_code = tracing::field::Empty,
                    latency_ms = tracing::field::Empty
                )
            })
            .on_request(|_request: &Request<_>, _span: &Span| {})
            .on_response(|response: &Response, latency: Duration, span: &Span| {
                span.record("status_code", response.status().as_u16());
                let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
                span.record("latency_ms", latency_ms);
            });
        let layered = ServiceBuilder::new()
            .layer(scanlab_telemetry::set_request_id_layer())
            .layer(scanlab_telemetry::propagate_request_id_layer())
            .layer(trace_layer)
            .layer(HttpMetricsLayer::new(telemetry));

        let router = Router::new()
            .route(ROUTE_HEALTH, get(health))
            .route(ROUTE_METRICS, get(metrics))
            .route(
                ROUTE_UPLOAD,
                post(upload)
                    .fallback(method_not_allowed)
                    .layer(DefaultBodyLimit::max(body_limit)),
            )
            .route_layer(layered)
            .fallback(not_found)
            .layer(cors_layer)
            .layer(CatchPanicLayer::custom(panic_response))
            .with_state(state);

        Self { router }
    }

    /// The fully layered router, for embedding or in-process testing.
    #[must_use]
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Serve the API on `addr` until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener fails to bind or the server terminates unexpectedly.
    pub async fn serve<F>(self, addr: SocketAddr, shutdown: F) -> ApiServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ApiServerError::Bind { addr, source })?;
        info!(%addr, "starting api");
        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|source| ApiServerError::Serve { source })
    }
}

fn panic_response(_panic: Box<dyn Any + Send + 'static>) -> Response {
    error!("request handler panicked");
    ApiError::internal("Internal server error").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use axum::body::{Body, to_bytes};
    use axum::http::StatusCode;
    use scanlab_pipeline::{IntakePolicy, ProcessRoutine, StoragePlacement};
    use serde_json::Value;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn server(dir: &TempDir) -> Result<(ApiServer, Metrics)> {
        let pipeline = Pipeline::new(
            IntakePolicy::new(1024, ["png"], ["image/png"]),
            StoragePlacement::new(dir.path().join("uploads")),
            Arc::new(ProcessRoutine::new(
                "/definitely/not/a/routine",
                Vec::new(),
                dir.path(),
                Duration::from_secs(1),
            )),
        );
        let metrics = Metrics::new()?;
        Ok((ApiServer::new(pipeline, metrics.clone()), metrics))
    }

    async fn json_body(response: Response) -> Result<Value> {
        let bytes = to_bytes(response.into_body(), 1024 * 1024).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    #[tokio::test]
    async fn health_reports_ok() -> Result<()> {
        let dir = TempDir::new()?;
        let (server, _) = server(&dir)?;
        let response = server
            .into_router()
            .oneshot(Request::builder().uri("/health").body(Body::empty())?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
        let body = json_body(response).await?;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["message"], "Medical scan analysis API is running");
        Ok(())
    }

    #[tokio::test]
    async fn upload_route_rejects_other_methods() -> Result<()> {
        let dir = TempDir::new()?;
        let (server, _) = server(&dir)?;
        let response = server
            .into_router()
            .oneshot(Request::builder().uri("/api/upload").body(Body::empty())?)
            .await?;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        let body = json_body(response).await?;
        assert_eq!(body["error"], "Method not allowed");
        assert_eq!(body["kind"], "method_not_allowed");
        Ok(())
    }

    #[tokio::test]
    async fn unknown_paths_get_a_json_not_found() -> Result<()> {
        let dir = TempDir::new()?;
        let (server, _) = server(&dir)?;
        let response = server
            .into_router()
            .oneshot(Request::builder().uri("/nope").body(Body::empty())?)
            .await?;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await?["kind"], "not_found");
        Ok(())
    }

    #[tokio::test]
    async fn metrics_count_routed_requests() -> Result<()> {
        let dir = TempDir::new()?;
        let (server, metrics) = server(&dir)?;
        let router = server.into_router();
        router
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty())?)
            .await?;
        let response = router
            .oneshot(Request::builder().uri("/metrics").body(Body::empty())?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        let text = String::from_utf8(to_bytes(response.into_body(), 1024 * 1024).await?.to_vec())?;
        assert!(text.contains("http_requests_total{code=\"200\",route=\"/health\"} 1"));
        assert!(metrics.render()?.contains("route=\"/metrics\""));
        Ok(())
    }

    #[tokio::test]
    async fn cors_preflight_allows_post_from_any_origin() -> Result<()> {
        let dir = TempDir::new()?;
        let (server, _) = server(&dir)?;
        let response = server
            .into_router()
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/upload")
                    .header("origin", "http://localhost:3000")
                    .header("access-control-request-method", "POST")
                    .body(Body::empty())?,
            )
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .and_then(|value| value.to_str().ok()),
            Some("*")
        );
        Ok(())
    }
}
