//! Shared HTTP constants (routes, field names, limits).

pub(crate) const ROUTE_HEALTH: &str = "/health";
pub(crate) const ROUTE_METRICS: &str = "/metrics";
pub(crate) const ROUTE_UPLOAD: &str = "/api/upload";

/// Multipart field names accepted for the scan file.
pub(crate) const UPLOAD_FIELDS: &[&str] = &["file", "scan"];

/// Allowance for multipart framing on top of the intake size limit.
pub(crate) const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub(crate) const HEALTH_MESSAGE: &str = "Medical scan analysis API is running";
pub(crate) const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

pub(crate) const KIND_METHOD_NOT_ALLOWED: &str = "method_not_allowed";
pub(crate) const KIND_NOT_FOUND: &str = "not_found";
pub(crate) const KIND_INTERNAL: &str = "internal";
