//! # Design
//!
//! - One taxonomy for every stage: each stage fails with exactly one variant.
//! - Messages stay constant; paths, exit details and stderr live in fields and
//!   are only ever logged, never shown to users.
//! - User-facing text is produced solely by `response.rs`.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::model::ExitInfo;

/// Result alias for pipeline stages.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Why intake rejected an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationReason {
    /// The request carried no file, an empty filename, or zero bytes.
    NoFile,
    /// Extension or content type is outside the allow-list.
    BadType {
        /// Which declaration failed (`extension` or `content_type`).
        field: &'static str,
        /// Declared value, when one was supplied.
        value: Option<String>,
        /// Extensions the service accepts.
        allowed_extensions: Vec<String>,
    },
    /// The upload exceeded the size limit.
    TooLarge {
        /// Bytes received before rejection.
        received_bytes: u64,
        /// Configured limit.
        limit_bytes: u64,
    },
}

/// Errors produced by pipeline stages.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Intake rejected the upload.
    #[error("upload rejected")]
    Validation {
        /// Rejection reason.
        reason: ValidationReason,
    },
    /// Persisting or re-reading the stored upload failed.
    #[error("upload storage failed")]
    Storage {
        /// Operation that failed.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// The analysis process failed to launch or exited unsuccessfully.
    #[error("analysis process failed")]
    Process {
        /// Exit details.
        exit: ExitInfo,
        /// Tail of the captured standard error.
        stderr_excerpt: String,
    },
    /// The analysis process exceeded its time budget.
    #[error("analysis process timed out")]
    Timeout {
        /// Budget that was exceeded.
        after: Duration,
    },
    /// Captured output was not a well-formed result document.
    #[error("analysis output could not be decoded")]
    Decode {
        /// Machine-readable reason.
        reason: &'static str,
        /// Underlying JSON error, when parsing failed.
        source: Option<serde_json::Error>,
    },
    /// The routine returned `success: false`.
    #[error("analysis routine reported failure")]
    RoutineReported {
        /// Routine-supplied message, already redacted.
        message: String,
    },
    /// A failure outside the taxonomy (panic, join error).
    #[error("pipeline failed unexpectedly")]
    Internal {
        /// Operation that failed.
        operation: &'static str,
        /// Diagnostic detail for logs.
        detail: String,
    },
}

impl PipelineError {
    /// Shorthand for a validation rejection.
    #[must_use]
    pub const fn validation(reason: ValidationReason) -> Self {
        Self::Validation { reason }
    }

    pub(crate) const fn storage(
        operation: &'static str,
        path: PathBuf,
        source: io::Error,
    ) -> Self {
        Self::Storage {
            operation,
            path,
            source,
        }
    }

    pub(crate) const fn decode(reason: &'static str, source: Option<serde_json::Error>) -> Self {
        Self::Decode { reason, source }
    }

    /// Classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { reason } => match reason {
                ValidationReason::NoFile => ErrorKind::NoFile,
                ValidationReason::BadType { .. } => ErrorKind::BadType,
                ValidationReason::TooLarge { .. } => ErrorKind::TooLarge,
            },
            Self::Storage { .. } => ErrorKind::StorageFailure,
            Self::Process { .. } => ErrorKind::ProcessFailure,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Decode { .. } => ErrorKind::DecodeFailure,
            Self::RoutineReported { .. } => ErrorKind::RoutineReportedFailure,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }
}

/// Machine-readable failure classification exposed in error payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No file in the request.
    NoFile,
    /// Extension or content type not allowed.
    BadType,
    /// Upload exceeded the size limit.
    TooLarge,
    /// Upload could not be stored.
    StorageFailure,
    /// Analysis process failed.
    ProcessFailure,
    /// Analysis process timed out.
    Timeout,
    /// Analysis output was malformed.
    DecodeFailure,
    /// Analysis routine reported its own failure.
    RoutineReportedFailure,
    /// Unclassified failure.
    Internal,
}

impl ErrorKind {
    /// Stable snake-case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoFile => "no_file",
            Self::BadType => "bad_type",
            Self::TooLarge => "too_large",
            Self::StorageFailure => "storage_failure",
            Self::ProcessFailure => "process_failure",
            Self::Timeout => "timeout",
            Self::DecodeFailure => "decode_failure",
            Self::RoutineReportedFailure => "routine_reported_failure",
            Self::Internal => "internal",
        }
    }

    /// Whether the failure stems from the client's upload.
    #[must_use]
    pub const fn is_validation(self) -> bool {
        matches!(self, Self::NoFile | Self::BadType | Self::TooLarge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn kind_covers_every_variant() {
        let cases = vec![
            (
                PipelineError::validation(ValidationReason::NoFile),
                ErrorKind::NoFile,
            ),
            (
                PipelineError::validation(ValidationReason::BadType {
                    field: "extension",
                    value: Some("exe".to_string()),
                    allowed_extensions: vec!["png".to_string()],
                }),
                ErrorKind::BadType,
            ),
            (
                PipelineError::validation(ValidationReason::TooLarge {
                    received_bytes: 11,
                    limit_bytes: 10,
                }),
                ErrorKind::TooLarge,
            ),
            (
                PipelineError::storage(
                    "write",
                    PathBuf::from("uploads/scan.png"),
                    io::Error::other("disk full"),
                ),
                ErrorKind::StorageFailure,
            ),
            (
                PipelineError::Process {
                    exit: ExitInfo::Code(1),
                    stderr_excerpt: String::new(),
                },
                ErrorKind::ProcessFailure,
            ),
            (
                PipelineError::Timeout {
                    after: Duration::from_secs(1),
                },
                ErrorKind::Timeout,
            ),
            (PipelineError::decode("empty_output", None), ErrorKind::DecodeFailure),
            (
                PipelineError::RoutineReported {
                    message: "bad scan".to_string(),
                },
                ErrorKind::RoutineReportedFailure,
            ),
            (
                PipelineError::Internal {
                    operation: "pipeline.join",
                    detail: "panicked".to_string(),
                },
                ErrorKind::Internal,
            ),
        ];
        for (err, kind) in cases {
            assert_eq!(err.kind(), kind);
        }
    }

    #[test]
    fn storage_error_preserves_source() {
        let err = PipelineError::storage(
            "create_dir",
            PathBuf::from("uploads"),
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.to_string(), "upload storage failed");
        assert!(err.source().is_some());
    }

    #[test]
    fn only_intake_kinds_are_validation() {
        assert!(ErrorKind::TooLarge.is_validation());
        assert!(!ErrorKind::StorageFailure.is_validation());
        assert_eq!(ErrorKind::RoutineReportedFailure.as_str(), "routine_reported_failure");
    }
}
