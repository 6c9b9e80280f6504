//! Environment variable names and default values.
//!
//! # Design
//! - Keep every variable name in one place so the loader, the CLI and the
//!   documentation agree.
//! - Defaults target a single-host deployment: 50 MiB scans, a Python
//!   routine launched from the working directory, uploads deleted after use.

/// Listener IP address.
pub const ENV_BIND_ADDR: &str = "SCANLAB_BIND_ADDR";
/// Listener port.
pub const ENV_HTTP_PORT: &str = "SCANLAB_HTTP_PORT";
/// Directory receiving stored uploads.
pub const ENV_UPLOAD_DIR: &str = "SCANLAB_UPLOAD_DIR";
/// Maximum accepted upload size in bytes.
pub const ENV_MAX_UPLOAD_BYTES: &str = "SCANLAB_MAX_UPLOAD_BYTES";
/// Comma-separated extension allow-list.
pub const ENV_ALLOWED_EXTENSIONS: &str = "SCANLAB_ALLOWED_EXTENSIONS";
/// Comma-separated content-type allow-list.
pub const ENV_ALLOWED_CONTENT_TYPES: &str = "SCANLAB_ALLOWED_CONTENT_TYPES";
/// Keep stored uploads after the response is produced.
pub const ENV_RETAIN_UPLOADS: &str = "SCANLAB_RETAIN_UPLOADS";
/// Executable launched for each analysis.
pub const ENV_ANALYZER_COMMAND: &str = "SCANLAB_ANALYZER_COMMAND";
/// Whitespace-separated arguments placed before the stored path.
pub const ENV_ANALYZER_ARGS: &str = "SCANLAB_ANALYZER_ARGS";
/// Working directory of the analysis routine.
pub const ENV_ANALYZER_WORKDIR: &str = "SCANLAB_ANALYZER_WORKDIR";
/// Analysis timeout in seconds.
pub const ENV_ANALYZER_TIMEOUT_SECS: &str = "SCANLAB_ANALYZER_TIMEOUT_SECS";
/// Cap on captured analysis stdout.
pub const ENV_ANALYZER_MAX_OUTPUT_BYTES: &str = "SCANLAB_ANALYZER_MAX_OUTPUT_BYTES";
/// Number of analyses allowed to run at once.
pub const ENV_MAX_CONCURRENT_ANALYSES: &str = "SCANLAB_MAX_CONCURRENT_ANALYSES";
/// Log level filter used when `RUST_LOG` is absent.
pub const ENV_LOG_LEVEL: &str = "SCANLAB_LOG_LEVEL";
/// Log output format (`json` or `pretty`).
pub const ENV_LOG_FORMAT: &str = "SCANLAB_LOG_FORMAT";

/// Default listener address.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1";
/// Default listener port.
pub const DEFAULT_HTTP_PORT: u16 = 7080;
/// Default upload directory, relative to the process working directory.
pub const DEFAULT_UPLOAD_DIR: &str = "uploads";
/// Default upload limit (50 MiB, sized for CT scans).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;
/// Default extension allow-list.
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] =
    &["jpeg", "jpg", "png", "gif", "bmp", "tiff", "dcm"];
/// Default content-type allow-list.
pub const DEFAULT_ALLOWED_CONTENT_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/bmp",
    "image/tiff",
    "application/dicom",
    "application/octet-stream",
];
/// Default analysis executable.
pub const DEFAULT_ANALYZER_COMMAND: &str = "python3";
/// Default analysis arguments preceding the stored path.
pub const DEFAULT_ANALYZER_ARGS: &[&str] = &["quantum_processing.py"];
/// Default working directory for the analysis routine.
pub const DEFAULT_ANALYZER_WORKDIR: &str = ".";
/// Default analysis timeout.
pub const DEFAULT_ANALYZER_TIMEOUT_SECS: u64 = 120;
/// Default stdout capture cap (64 MiB; processed images arrive base64 encoded).
pub const DEFAULT_ANALYZER_MAX_OUTPUT_BYTES: u64 = 64 * 1024 * 1024;
/// Default number of concurrent analyses.
pub const DEFAULT_MAX_CONCURRENT_ANALYSES: u64 = 4;
/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";
