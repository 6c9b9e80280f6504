//! Assemble [`ScanlabConfig`] from environment variables.
//!
//! # Design
//! - Every lookup goes through an injectable function so tests never touch the
//!   process environment.
//! - Unset variables fall back to the defaults in `defaults.rs`; set but invalid
//!   variables fail the load.

use std::path::PathBuf;

use tracing::debug;

use crate::defaults::{
    DEFAULT_ALLOWED_CONTENT_TYPES, DEFAULT_ALLOWED_EXTENSIONS, DEFAULT_ANALYZER_ARGS,
    DEFAULT_ANALYZER_COMMAND, DEFAULT_ANALYZER_MAX_OUTPUT_BYTES, DEFAULT_ANALYZER_TIMEOUT_SECS,
    DEFAULT_ANALYZER_WORKDIR, DEFAULT_BIND_ADDR, DEFAULT_HTTP_PORT, DEFAULT_LOG_LEVEL,
    DEFAULT_MAX_CONCURRENT_ANALYSES, DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_UPLOAD_DIR,
    ENV_ALLOWED_CONTENT_TYPES, ENV_ALLOWED_EXTENSIONS, ENV_ANALYZER_ARGS, ENV_ANALYZER_COMMAND,
    ENV_ANALYZER_MAX_OUTPUT_BYTES, ENV_ANALYZER_TIMEOUT_SECS, ENV_ANALYZER_WORKDIR,
    ENV_BIND_ADDR, ENV_HTTP_PORT, ENV_LOG_FORMAT, ENV_LOG_LEVEL, ENV_MAX_CONCURRENT_ANALYSES,
    ENV_MAX_UPLOAD_BYTES, ENV_RETAIN_UPLOADS, ENV_UPLOAD_DIR,
};
use crate::error::{ConfigError, ConfigResult};
use crate::model::{
    AnalyzerConfig, IntakeConfig, LogFormatSetting, LoggingSettings, RetentionPolicy,
    ScanlabConfig, ServerConfig, StorageConfig,
};
use crate::validate::{
    parse_args, parse_flag, parse_ip, parse_list, parse_log_format, parse_non_empty, parse_port,
    parse_u64,
};

impl ScanlabConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidField`] when a set variable cannot be
    /// parsed or violates its constraints.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through a caller-supplied variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidField`] when a set variable cannot be
    /// parsed or violates its constraints.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let server = ServerConfig {
            bind_addr: parse_ip(
                ENV_BIND_ADDR,
                get(ENV_BIND_ADDR).as_deref().unwrap_or(DEFAULT_BIND_ADDR),
            )?,
            http_port: match get(ENV_HTTP_PORT) {
                Some(raw) => parse_port(ENV_HTTP_PORT, &raw)?,
                None => DEFAULT_HTTP_PORT,
            },
        };

        let intake = IntakeConfig {
            max_upload_bytes: match get(ENV_MAX_UPLOAD_BYTES) {
                Some(raw) => parse_u64(ENV_MAX_UPLOAD_BYTES, &raw, 1)?,
                None => DEFAULT_MAX_UPLOAD_BYTES,
            },
            allowed_extensions: match get(ENV_ALLOWED_EXTENSIONS) {
                Some(raw) => parse_list(ENV_ALLOWED_EXTENSIONS, &raw)?,
                None => owned(DEFAULT_ALLOWED_EXTENSIONS),
            },
            allowed_content_types: match get(ENV_ALLOWED_CONTENT_TYPES) {
                Some(raw) => parse_list(ENV_ALLOWED_CONTENT_TYPES, &raw)?,
                None => owned(DEFAULT_ALLOWED_CONTENT_TYPES),
            },
        };

        let retain = match get(ENV_RETAIN_UPLOADS) {
            Some(raw) => parse_flag(ENV_RETAIN_UPLOADS, &raw)?,
            None => false,
        };
        let storage = StorageConfig {
            upload_dir: PathBuf::from(
                get(ENV_UPLOAD_DIR)
                    .as_deref()
                    .unwrap_or(DEFAULT_UPLOAD_DIR)
                    .trim(),
            ),
            retention: if retain {
                RetentionPolicy::Retain
            } else {
                RetentionPolicy::Delete
            },
        };

        let analyzer = AnalyzerConfig {
            command: parse_non_empty(
                ENV_ANALYZER_COMMAND,
                get(ENV_ANALYZER_COMMAND)
                    .as_deref()
                    .unwrap_or(DEFAULT_ANALYZER_COMMAND),
            )?,
            args: lookup(ENV_ANALYZER_ARGS)
                .map_or_else(|| owned(DEFAULT_ANALYZER_ARGS), |raw| parse_args(&raw)),
            working_dir: PathBuf::from(
                get(ENV_ANALYZER_WORKDIR)
                    .as_deref()
                    .unwrap_or(DEFAULT_ANALYZER_WORKDIR)
                    .trim(),
            ),
            timeout_secs: match get(ENV_ANALYZER_TIMEOUT_SECS) {
                Some(raw) => parse_u64(ENV_ANALYZER_TIMEOUT_SECS, &raw, 1)?,
                None => DEFAULT_ANALYZER_TIMEOUT_SECS,
            },
            max_output_bytes: to_usize(
                ENV_ANALYZER_MAX_OUTPUT_BYTES,
                match get(ENV_ANALYZER_MAX_OUTPUT_BYTES) {
                    Some(raw) => parse_u64(ENV_ANALYZER_MAX_OUTPUT_BYTES, &raw, 1)?,
                    None => DEFAULT_ANALYZER_MAX_OUTPUT_BYTES,
                },
            )?,
            max_concurrent: to_usize(
                ENV_MAX_CONCURRENT_ANALYSES,
                match get(ENV_MAX_CONCURRENT_ANALYSES) {
                    Some(raw) => parse_u64(ENV_MAX_CONCURRENT_ANALYSES, &raw, 1)?,
                    None => DEFAULT_MAX_CONCURRENT_ANALYSES,
                },
            )?,
        };

        let logging = LoggingSettings {
            level: get(ENV_LOG_LEVEL).map_or_else(
                || DEFAULT_LOG_LEVEL.to_string(),
                |raw| raw.trim().to_string(),
            ),
            format: match get(ENV_LOG_FORMAT) {
                Some(raw) => parse_log_format(ENV_LOG_FORMAT, &raw)?,
                None => LogFormatSetting::Inferred,
            },
        };

        let config = Self {
            server,
            intake,
            storage,
            analyzer,
            logging,
        };
        debug!(
            addr = %config.server.socket_addr(),
            upload_dir = %config.storage.upload_dir.display(),
            analyzer = %config.analyzer.command,
            "configuration loaded"
        );
        Ok(config)
    }
}

fn owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_string()).collect()
}

fn to_usize(field: &'static str, value: u64) -> ConfigResult<usize> {
    usize::try_from(value).map_err(|_| ConfigError::InvalidField {
        field,
        reason: "out_of_range",
        value: Some(value.to_string()),
    })
}
