//! Response bodies served by the API besides the pipeline result itself.

use serde::Serialize;

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `ok` while the process is serving.
    pub status: &'static str,
    /// Human-readable liveness message.
    pub message: &'static str,
    /// Build identifier of the running binary.
    pub build: String,
}

/// Error body shared by every non-success response: `{ error, kind }`.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    /// Human-readable message.
    pub error: String,
    /// Machine-readable classification.
    pub kind: &'static str,
}
