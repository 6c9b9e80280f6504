//! HTTP metrics middleware.
//!
//! Counts every routed request by matched route and status code, and runs the
//! handler inside the task-local request context so pipeline spans can quote
//! the request identifier.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use axum::extract::MatchedPath;
use axum::http::Request;
use scanlab_telemetry::{Metrics, REQUEST_ID_HEADER, with_request_context};
use tower::{Layer, Service};

const UNMATCHED_ROUTE: &str = "unmatched";

/// Wraps routed services to record request metrics.
#[derive(Clone)]
pub(crate) struct HttpMetricsLayer {
    telemetry: Metrics,
}

impl HttpMetricsLayer {
    pub(crate) const fn new(telemetry: Metrics) -> Self {
        Self { telemetry }
    }
}

impl<S> Layer<S> for HttpMetricsLayer {
    type Service = HttpMetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        HttpMetricsService {
            inner,
            telemetry: self.telemetry.clone(),
        }
    }
}

#[derive(Clone)]
pub(crate) struct HttpMetricsService<S> {
    inner: S,
    telemetry: Metrics,
}

impl<S, B> Service<Request<B>> for HttpMetricsService<S>
where
    S: Service<Request<B>, Response = axum::response::Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        // Label by matched route only; unknown paths share one label.
        let route = req
            .extensions()
            .get::<MatchedPath>()
            .map_or(UNMATCHED_ROUTE, MatchedPath::as_str)
            .to_string();
        let request_id = req
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let telemetry = self.telemetry.clone();
        let fut = self.inner.call(req);

        Box::pin(async move {
            with_request_context(request_id, async move {
                let response = fut.await?;
                telemetry.inc_http_request(&route, response.status().as_u16());
                Ok(response)
            })
            .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    use axum::body::Body;
    use axum::response::Response;
    use scanlab_telemetry::current_request_id;
    use tower::{ServiceBuilder, ServiceExt, service_fn};

    #[tokio::test]
    async fn counts_requests_and_exposes_request_id() -> anyhow::Result<()> {
        let metrics = Metrics::new()?;
        let service = ServiceBuilder::new()
            .layer(HttpMetricsLayer::new(metrics.clone()))
            .service(service_fn(|_req: Request<Body>| async {
                assert_eq!(current_request_id().as_deref(), Some("req-7"));
                Ok::<_, Infallible>(Response::new(Body::empty()))
            }));
        let request = Request::builder()
            .uri("/nowhere")
            .header(REQUEST_ID_HEADER, "req-7")
            .body(Body::empty())?;
        let response = service.oneshot(request).await?;
        assert_eq!(response.status().as_u16(), 200);
        assert!(
            metrics
                .render()?
                .contains("http_requests_total{code=\"200\",route=\"unmatched\"} 1")
        );
        Ok(())
    }
}
