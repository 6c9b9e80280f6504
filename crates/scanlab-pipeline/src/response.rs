//! Mapping stage results onto the externally visible response.
//!
//! # Design
//! - Total: every `PipelineError` variant has exactly one status and message.
//! - Messages never include paths, exit codes or stderr; that detail is logged
//!   here instead, at `warn` for client rejections and `error` otherwise.

use tracing::{error, warn};

use crate::error::{PipelineError, PipelineResult, ValidationReason};
use crate::model::{PipelineResponse, ResultRecord};

const BYTES_PER_MIB: u64 = 1024 * 1024;
const ROUTINE_MESSAGE_MAX_CHARS: usize = 200;
const REDACTED: &str = "[redacted]";

/// Map the final stage result.
#[must_use]
pub fn map_outcome(result: PipelineResult<ResultRecord>) -> PipelineResponse {
    match result {
        Ok(record) => PipelineResponse::Ok(record),
        Err(err) => map_error(&err),
    }
}

/// Map a pipeline error, logging its internal detail.
#[must_use]
pub fn map_error(err: &PipelineError) -> PipelineResponse {
    let kind = err.kind();
    let (http_status, message) = match err {
        PipelineError::Validation { reason } => {
            warn!(kind = kind.as_str(), reason = ?reason, "upload rejected");
            (400, validation_message(reason))
        }
        PipelineError::Storage {
            operation,
            path,
            source,
        } => {
            error!(
                kind = kind.as_str(),
                operation,
                path = %path.display(),
                error = %source,
                "upload storage failed"
            );
            (500, "Failed to save uploaded file".to_string())
        }
        PipelineError::Process {
            exit,
            stderr_excerpt,
        } => {
            error!(
                kind = kind.as_str(),
                exit = %exit,
                stderr = %stderr_excerpt,
                "analysis process failed"
            );
            (500, "Image processing failed".to_string())
        }
        PipelineError::Timeout { after } => {
            error!(
                kind = kind.as_str(),
                after_secs = after.as_secs_f64(),
                "analysis process timed out"
            );
            (500, "Image processing timed out".to_string())
        }
        PipelineError::Decode { reason, source } => {
            let detail = source.as_ref().map(ToString::to_string);
            error!(
                kind = kind.as_str(),
                reason,
                detail = ?detail,
                "analysis output could not be decoded"
            );
            (500, "Image processing returned an invalid result".to_string())
        }
        PipelineError::RoutineReported { message } => {
            warn!(kind = kind.as_str(), message = %message, "analysis routine reported failure");
            let message = if message.trim().is_empty() {
                "Image processing failed".to_string()
            } else {
                message.clone()
            };
            (500, message)
        }
        PipelineError::Internal { operation, detail } => {
            error!(
                kind = kind.as_str(),
                operation,
                detail = %detail,
                "pipeline failed unexpectedly"
            );
            (500, "Internal server error".to_string())
        }
    };
    PipelineResponse::Error {
        kind,
        message,
        http_status,
    }
}

fn validation_message(reason: &ValidationReason) -> String {
    match reason {
        ValidationReason::NoFile => "No file uploaded".to_string(),
        ValidationReason::BadType {
            allowed_extensions,
            ..
        } => format!(
            "Invalid file type. Allowed types are: {}",
            allowed_extensions.join(", ")
        ),
        ValidationReason::TooLarge { limit_bytes, .. } => {
            let mib = limit_bytes / BYTES_PER_MIB;
            if mib == 0 {
                format!("File too large. Maximum size is {limit_bytes} bytes")
            } else {
                format!("File too large. Maximum size is {mib} MB")
            }
        }
    }
}

/// Strip local paths from a routine-supplied message and bound its length.
///
/// Known directories are replaced wherever they occur; any remaining
/// whitespace-delimited token that looks like an absolute path is replaced
/// as a whole.
pub(crate) fn redact_routine_message(message: &str, secrets: &[&str]) -> String {
    let mut known = message.trim().to_string();
    for secret in secrets.iter().filter(|secret| !secret.is_empty()) {
        known = known.replace(secret, REDACTED);
    }
    let mut redacted = String::with_capacity(known.len());
    for piece in known.split_inclusive(char::is_whitespace) {
        let token = piece.trim_end_matches(char::is_whitespace);
        redacted.push_str(if is_path_token(token) { REDACTED } else { token });
        redacted.push_str(&piece[token.len()..]);
    }
    if redacted.chars().count() > ROUTINE_MESSAGE_MAX_CHARS {
        redacted = redacted.chars().take(ROUTINE_MESSAGE_MAX_CHARS).collect();
    }
    redacted
}

/// POSIX roots, UNC shares, `X:\` style drive prefixes, and paths left under
/// an already redacted directory, after any opening quote or bracket.
fn is_path_token(token: &str) -> bool {
    let token = token.trim_start_matches(['\'', '"', '(', '<', '=']);
    if let Some(rest) = token.strip_prefix(REDACTED) {
        return rest.starts_with(['/', '\\']);
    }
    match token.trim_start_matches('[').as_bytes() {
        [b'/' | b'\\', _, ..] => true,
        [drive, b':', b'\\' | b'/', ..] => drive.is_ascii_alphabetic(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::model::ExitInfo;
    use std::io;
    use std::path::PathBuf;
    use std::time::Duration;

    fn error_parts(response: &PipelineResponse) -> (ErrorKind, &str, u16) {
        match response {
            PipelineResponse::Error {
                kind,
                message,
                http_status,
            } => (*kind, message.as_str(), *http_status),
            PipelineResponse::Ok(_) => panic!("expected an error response"),
        }
    }

    #[test]
    fn validation_failures_are_client_errors() {
        let response = map_error(&PipelineError::validation(ValidationReason::NoFile));
        assert_eq!(error_parts(&response), (ErrorKind::NoFile, "No file uploaded", 400));

        let response = map_error(&PipelineError::validation(ValidationReason::BadType {
            field: "extension",
            value: Some("exe".to_string()),
            allowed_extensions: vec!["png".to_string(), "dcm".to_string()],
        }));
        assert_eq!(
            error_parts(&response),
            (
                ErrorKind::BadType,
                "Invalid file type. Allowed types are: png, dcm",
                400
            )
        );

        let response = map_error(&PipelineError::validation(ValidationReason::TooLarge {
            received_bytes: 52_428_801,
            limit_bytes: 52_428_800,
        }));
        assert_eq!(
            error_parts(&response),
            (ErrorKind::TooLarge, "File too large. Maximum size is 50 MB", 400)
        );
    }

    #[test]
    fn internal_detail_never_reaches_the_message() {
        let responses = [
            map_error(&PipelineError::Storage {
                operation: "write",
                path: PathBuf::from("/srv/uploads/scan-1.png"),
                source: io::Error::other("disk full"),
            }),
            map_error(&PipelineError::Process {
                exit: ExitInfo::Code(3),
                stderr_excerpt: "Traceback: /srv/uploads/scan-1.png".to_string(),
            }),
            map_error(&PipelineError::Timeout {
                after: Duration::from_secs(120),
            }),
            map_error(&PipelineError::Decode {
                reason: "invalid_json",
                source: None,
            }),
            map_error(&PipelineError::Internal {
                operation: "pipeline.join",
                detail: "task panicked".to_string(),
            }),
        ];
        for response in &responses {
            let (_, message, status) = error_parts(response);
            assert_eq!(status, 500);
            assert!(!message.contains("/srv"));
            assert!(!message.contains('3'));
            assert!(!message.contains("panicked"));
        }
        assert_eq!(error_parts(&responses[2]).1, "Image processing timed out");
    }

    #[test]
    fn routine_message_is_passed_through_or_defaulted() {
        let response = map_error(&PipelineError::RoutineReported {
            message: "unsupported bit depth".to_string(),
        });
        assert_eq!(
            error_parts(&response),
            (ErrorKind::RoutineReportedFailure, "unsupported bit depth", 500)
        );
        let response = map_error(&PipelineError::RoutineReported {
            message: "  ".to_string(),
        });
        assert_eq!(error_parts(&response).1, "Image processing failed");
    }

    #[test]
    fn map_outcome_passes_success_through() {
        let record = ResultRecord {
            metrics: crate::model::ScanMetrics {
                entropy: 1.0,
                contrast: 2.0,
                brightness: 3.0,
            },
            anomalies: Vec::new(),
            processed_image: String::new(),
        };
        assert_eq!(
            map_outcome(Ok(record.clone())),
            PipelineResponse::Ok(record)
        );
    }

    #[test]
    fn redaction_removes_paths_and_bounds_length() {
        let message = "cannot open /srv/uploads/scan-1.png in /srv/uploads";
        let redacted =
            redact_routine_message(message, &["/srv/uploads/scan-1.png", "/srv/uploads", ""]);
        assert_eq!(redacted, "cannot open [redacted] in [redacted]");
        let long = "x".repeat(500);
        assert_eq!(redact_routine_message(&long, &[]).chars().count(), 200);
    }

    #[test]
    fn redaction_replaces_unknown_absolute_paths() {
        let redacted = redact_routine_message(
            "Error processing image: cannot open /opt/analyzer/models/weights.pt",
            &[],
        );
        assert_eq!(redacted, "Error processing image: cannot open [redacted]");

        let redacted = redact_routine_message(
            "missing 'C:\\models\\weights.pt'\tsee \\\\share\\logs and D:/tmp",
            &[],
        );
        assert_eq!(redacted, "missing [redacted]\tsee [redacted] and [redacted]");

        let kept = redact_routine_message("ratio 1/2 and/or a lone / is fine", &[]);
        assert_eq!(kept, "ratio 1/2 and/or a lone / is fine");
    }
}
