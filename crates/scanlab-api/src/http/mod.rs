//! HTTP surface modules (router, handlers, middleware).

/// Shared constants for the HTTP surface.
pub(crate) mod constants;
/// Error payload helpers.
pub(crate) mod errors;
/// Health and metrics endpoints.
pub(crate) mod health;
/// Router construction and server host.
pub mod router;
/// Metrics middleware for HTTP requests.
pub(crate) mod telemetry;
/// Multipart upload endpoint.
pub(crate) mod upload;
