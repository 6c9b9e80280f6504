//! Typed configuration sections.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

/// Fully resolved service configuration.
#[derive(Debug, Clone, Serialize)]
pub struct ScanlabConfig {
    /// HTTP listener settings.
    pub server: ServerConfig,
    /// Upload intake limits and allow-lists.
    pub intake: IntakeConfig,
    /// Stored upload placement and retention.
    pub storage: StorageConfig,
    /// External analysis routine invocation.
    pub analyzer: AnalyzerConfig,
    /// Logging preferences.
    pub logging: LoggingSettings,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize)]
pub struct ServerConfig {
    /// Interface the API binds to.
    pub bind_addr: IpAddr,
    /// TCP port the API listens on.
    pub http_port: u16,
}

impl ServerConfig {
    /// Socket address assembled from the bind address and port.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.http_port)
    }
}

/// Upload intake limits and allow-lists.
#[derive(Debug, Clone, Serialize)]
pub struct IntakeConfig {
    /// Largest accepted upload in bytes.
    pub max_upload_bytes: u64,
    /// Lower-cased extensions (without the dot) accepted at intake.
    pub allowed_extensions: Vec<String>,
    /// Lower-cased content types accepted at intake.
    pub allowed_content_types: Vec<String>,
}

/// What happens to a stored upload once the response has been produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Remove the stored file after the pipeline completes.
    Delete,
    /// Leave the stored file for external cleanup.
    Retain,
}

/// Stored upload placement and retention.
#[derive(Debug, Clone, Serialize)]
pub struct StorageConfig {
    /// Directory receiving stored uploads; created on demand.
    pub upload_dir: PathBuf,
    /// Cleanup policy applied after each run.
    pub retention: RetentionPolicy,
}

/// External analysis routine invocation.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzerConfig {
    /// Executable launched per analysis.
    pub command: String,
    /// Arguments placed before the stored file path.
    pub args: Vec<String>,
    /// Working directory the routine resolves its assets from.
    pub working_dir: PathBuf,
    /// Seconds before a running analysis is terminated.
    pub timeout_secs: u64,
    /// Cap on captured standard output.
    pub max_output_bytes: usize,
    /// Analyses allowed to run at the same time.
    pub max_concurrent: usize,
}

impl AnalyzerConfig {
    /// Invocation timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Requested log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormatSetting {
    /// Structured JSON lines.
    Json,
    /// Human-readable output.
    Pretty,
    /// Pick by build profile.
    Inferred,
}

/// Logging preferences.
#[derive(Debug, Clone, Serialize)]
pub struct LoggingSettings {
    /// Level filter applied when `RUST_LOG` is absent.
    pub level: String,
    /// Output format.
    pub format: LogFormatSetting,
}
