//! Prometheus-backed metrics registry.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes only the counters/gauges the upload pipeline and HTTP surface need.

use std::sync::Arc;
use std::time::Duration;

use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
    core::Collector,
};

use crate::error::{Result, TelemetryError};

/// Prometheus-backed metrics registry shared across services.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    http_requests_total: IntCounterVec,
    pipeline_outcomes_total: IntCounterVec,
    upload_bytes_total: IntCounter,
    analyses_in_flight: IntGauge,
    analysis_duration_ms: IntGauge,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be built or
    /// registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let http_requests_total = collector(
            "http_requests_total",
            IntCounterVec::new(
                Opts::new("http_requests_total", "Total HTTP requests received"),
                &["route", "code"],
            ),
        )?;
        let pipeline_outcomes_total = collector(
            "pipeline_outcomes_total",
            IntCounterVec::new(
                Opts::new(
                    "pipeline_outcomes_total",
                    "Upload pipeline runs by final outcome kind",
                ),
                &["kind"],
            ),
        )?;
        let upload_bytes_total = collector(
            "upload_bytes_total",
            IntCounter::with_opts(Opts::new(
                "upload_bytes_total",
                "Bytes accepted by upload intake",
            )),
        )?;
        let analyses_in_flight = collector(
            "analyses_in_flight",
            IntGauge::with_opts(Opts::new(
                "analyses_in_flight",
                "External analysis processes currently running",
            )),
        )?;
        let analysis_duration_ms = collector(
            "analysis_duration_ms",
            IntGauge::with_opts(Opts::new(
                "analysis_duration_ms",
                "Wall-clock duration of the most recent analysis (ms)",
            )),
        )?;

        register(&registry, "http_requests_total", &http_requests_total)?;
        register(&registry, "pipeline_outcomes_total", &pipeline_outcomes_total)?;
        register(&registry, "upload_bytes_total", &upload_bytes_total)?;
        register(&registry, "analyses_in_flight", &analyses_in_flight)?;
        register(&registry, "analysis_duration_ms", &analysis_duration_ms)?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                http_requests_total,
                pipeline_outcomes_total,
                upload_bytes_total,
                analyses_in_flight,
                analysis_duration_ms,
            }),
        })
    }

    /// Increment the HTTP request counter for the given route and status code.
    pub fn inc_http_request(&self, route: &str, status: u16) {
        self.inner
            .http_requests_total
            .with_label_values(&[route, &status.to_string()])
            .inc();
    }

    /// Count one finished pipeline run under its outcome kind.
    pub fn inc_pipeline_outcome(&self, kind: &str) {
        self.inner
            .pipeline_outcomes_total
            .with_label_values(&[kind])
            .inc();
    }

    /// Add accepted upload bytes.
    pub fn add_upload_bytes(&self, bytes: u64) {
        self.inner.upload_bytes_total.inc_by(bytes);
    }

    /// Mark an external analysis as started.
    pub fn analysis_started(&self) {
        self.inner.analyses_in_flight.inc();
    }

    /// Mark an external analysis as finished and record its duration.
    pub fn analysis_finished(&self, elapsed: Duration) {
        self.inner.analyses_in_flight.dec();
        self.inner
            .analysis_duration_ms
            .set(i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX));
    }

    /// Render all registered collectors in the Prometheus text format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or produces invalid UTF-8.
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.inner.registry.gather(), &mut buffer)
            .map_err(|source| TelemetryError::MetricsEncode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::MetricsUtf8 { source })
    }
}

fn collector<T>(name: &'static str, built: prometheus::Result<T>) -> Result<T> {
    built.map_err(|source| TelemetryError::MetricsCollector { name, source })
}

fn register<C>(registry: &Registry, name: &'static str, collector: &C) -> Result<()>
where
    C: Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::MetricsRegister { name, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysis_gauges_track_lifecycle() -> Result<()> {
        let metrics = Metrics::new()?;
        metrics.analysis_started();
        metrics.analysis_started();
        metrics.analysis_finished(Duration::from_millis(250));
        let rendered = metrics.render()?;
        assert!(rendered.contains("analyses_in_flight 1"));
        assert!(rendered.contains("analysis_duration_ms 250"));
        Ok(())
    }

    #[test]
    fn render_includes_labelled_counters() -> Result<()> {
        let metrics = Metrics::new()?;
        metrics.inc_http_request("/api/upload", 200);
        metrics.inc_pipeline_outcome("timeout");
        metrics.add_upload_bytes(1024);
        let rendered = metrics.render()?;
        assert!(rendered.contains("http_requests_total{code=\"200\",route=\"/api/upload\"} 1"));
        assert!(rendered.contains("pipeline_outcomes_total{kind=\"timeout\"} 1"));
        assert!(rendered.contains("upload_bytes_total 1024"));
        Ok(())
    }
}
