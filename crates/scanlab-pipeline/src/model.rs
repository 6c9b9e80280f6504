//! Data carried between pipeline stages.
//!
//! # Design
//! - `UploadRequest` is transient and owned by one run.
//! - `StoredFile` and `AnalysisInvocation` are immutable once built.
//! - `ResultRecord` mirrors the schema the frontend renders; the decoder is the
//!   only stage that produces one.

use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// Raw upload as received from the transport.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    /// Filename declared by the client, if any.
    pub filename: Option<String>,
    /// Content type declared by the client, if any.
    pub content_type: Option<String>,
    /// Uploaded bytes.
    pub bytes: Vec<u8>,
}

impl UploadRequest {
    /// Build an upload from its declared metadata and bytes.
    #[must_use]
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            filename: Some(filename.into()),
            content_type: Some(content_type.into()),
            bytes: bytes.into(),
        }
    }
}

/// Upload persisted to the working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Absolute path of the stored copy.
    pub path: PathBuf,
    /// Filename the client declared.
    pub original_name: String,
    /// Number of bytes written.
    pub size_bytes: u64,
    /// Lower-cased extension preserved from the original name.
    pub extension: String,
}

/// Fully specified launch of the external analysis routine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisInvocation {
    command: String,
    args: Vec<String>,
    working_directory: PathBuf,
}

impl AnalysisInvocation {
    pub(crate) const fn new(
        command: String,
        args: Vec<String>,
        working_directory: PathBuf,
    ) -> Self {
        Self {
            command,
            args,
            working_directory,
        }
    }

    /// Executable to launch.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Arguments in launch order; the stored file path is last.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Directory the routine runs in.
    #[must_use]
    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }
}

/// How an analysis process ended when it did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitInfo {
    /// Process exited with a status code.
    Code(i32),
    /// Process was terminated by a signal.
    Signal(i32),
    /// Process could not be started.
    LaunchFailed {
        /// Launch error description.
        reason: String,
    },
    /// Waiting on the process failed.
    WaitFailed {
        /// Wait error description.
        reason: String,
    },
}

impl Display for ExitInfo {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(formatter, "exit code {code}"),
            Self::Signal(signal) => write!(formatter, "signal {signal}"),
            Self::LaunchFailed { reason } => write!(formatter, "launch failed: {reason}"),
            Self::WaitFailed { reason } => write!(formatter, "wait failed: {reason}"),
        }
    }
}

/// Result of one analysis invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisOutcome {
    /// Process exited zero; stdout is the result channel.
    Success {
        /// Captured standard output.
        stdout: String,
    },
    /// Process failed to launch or exited unsuccessfully.
    ProcessFailure {
        /// Exit details.
        exit: ExitInfo,
        /// Captured standard error.
        stderr: String,
    },
    /// Process exceeded its time budget and was terminated.
    Timeout {
        /// Budget that was exceeded.
        after: Duration,
    },
    /// Process exited zero but wrote more than the stdout capture limit.
    OutputTruncated {
        /// Capture limit that was hit.
        limit_bytes: usize,
    },
}

/// Image statistics reported by the analysis routine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanMetrics {
    /// Shannon entropy of the scan.
    pub entropy: f64,
    /// Contrast measure.
    pub contrast: f64,
    /// Mean brightness.
    pub brightness: f64,
}

/// One region flagged by the analysis routine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    /// Pixel coordinates `[x, y]`.
    pub location: (i64, i64),
    /// Relative intensity of the finding.
    pub intensity: f64,
    /// Routine-specific classification.
    #[serde(rename = "type")]
    pub kind: String,
}

/// Validated outcome of a successful analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Always present on success.
    pub metrics: ScanMetrics,
    /// Possibly empty, in routine order.
    pub anomalies: Vec<Anomaly>,
    /// Processed image (data URI, base64 payload, or reference).
    pub processed_image: String,
}

/// The single externally observable output of a pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineResponse {
    /// Analysis succeeded.
    Ok(ResultRecord),
    /// Some stage failed.
    Error {
        /// Failure classification.
        kind: ErrorKind,
        /// User-facing message; never contains paths or diagnostics.
        message: String,
        /// HTTP status to answer with.
        http_status: u16,
    },
}

impl PipelineResponse {
    /// HTTP status for this response.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::Ok(_) => 200,
            Self::Error { http_status, .. } => *http_status,
        }
    }

    /// Label used for logs and metrics (`ok` or the error kind).
    #[must_use]
    pub const fn outcome_label(&self) -> &'static str {
        match self {
            Self::Ok(_) => "ok",
            Self::Error { kind, .. } => kind.as_str(),
        }
    }

    /// JSON body for the response.
    #[must_use]
    pub fn body(&self) -> ResponseBody<'_> {
        match self {
            Self::Ok(record) => ResponseBody::Success(record),
            Self::Error { kind, message, .. } => ResponseBody::Failure {
                error: message,
                kind: *kind,
            },
        }
    }
}

/// Wire shape of a [`PipelineResponse`].
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ResponseBody<'a> {
    /// `{ metrics, anomalies, processed_image }`.
    Success(&'a ResultRecord),
    /// `{ error, kind }`.
    Failure {
        /// Human-readable message.
        error: &'a str,
        /// Machine-readable classification.
        kind: ErrorKind,
    },
}
