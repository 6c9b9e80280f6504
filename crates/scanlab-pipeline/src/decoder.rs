//! Turning captured routine output into a [`ResultRecord`].
//!
//! # Design
//! - The routine may print diagnostics before its result, so the **last
//!   non-blank line** of stdout is taken as the single JSON document. Earlier
//!   lines are ignored.
//! - The document must be an object carrying a boolean `success`.
//!   `success: false` is the routine reporting its own failure; its `error`
//!   text is passed through for redaction by the caller.
//! - On success `metrics` and its three numbers are mandatory. Missing
//!   `anomalies` decode as empty, missing `processed_image` as an empty string.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};
use crate::model::{Anomaly, ResultRecord, ScanMetrics};

const SUCCESS_FIELD: &str = "success";
const ERROR_FIELD: &str = "error";

#[derive(Deserialize)]
struct SuccessDocument {
    metrics: ScanMetrics,
    #[serde(default)]
    anomalies: Vec<Anomaly>,
    #[serde(default)]
    processed_image: String,
}

/// Decode the routine's standard output.
///
/// # Errors
///
/// Returns `Decode` when no well-formed result document is found and
/// `RoutineReported` when the document has `success: false`.
pub fn decode(raw_output: &str) -> PipelineResult<ResultRecord> {
    let line = select_document_line(raw_output)
        .ok_or_else(|| PipelineError::decode("empty_output", None))?;
    let value: Value = serde_json::from_str(line)
        .map_err(|source| PipelineError::decode("invalid_json", Some(source)))?;
    let Value::Object(mut document) = value else {
        return Err(PipelineError::decode("not_an_object", None));
    };

    let success = document
        .get(SUCCESS_FIELD)
        .and_then(Value::as_bool)
        .ok_or_else(|| PipelineError::decode("missing_success_flag", None))?;

    if !success {
        let message = match document.remove(ERROR_FIELD) {
            Some(Value::String(message)) => message,
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        return Err(PipelineError::RoutineReported { message });
    }

    let parsed: SuccessDocument = serde_json::from_value(Value::Object(document))
        .map_err(|source| PipelineError::decode("schema_mismatch", Some(source)))?;
    debug!(anomalies = parsed.anomalies.len(), "decoded analysis result");
    Ok(ResultRecord {
        metrics: parsed.metrics,
        anomalies: parsed.anomalies,
        processed_image: parsed.processed_image,
    })
}

fn select_document_line(raw_output: &str) -> Option<&str> {
    raw_output
        .lines()
        .map(str::trim)
        .rev()
        .find(|line| !line.is_empty())
}
