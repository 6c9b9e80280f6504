//! # Design
//!
//! - Load configuration once from the environment and fail fast on bad values.
//! - Prepare the upload directory and check the analyzer working directory before binding.
//! - Keep serving separate from logging installation so the boot sequence is testable.

use std::future::Future;
use std::path::Path;

use scanlab_api::ApiServer;
use scanlab_config::{LogFormatSetting, ScanlabConfig};
use scanlab_pipeline::Pipeline;
use scanlab_telemetry::{GlobalContextGuard, LogFormat, LoggingConfig, Metrics, build_sha};
use tracing::{info, warn};

use crate::error::{AppError, AppResult};

/// Dependencies required to bootstrap the scan analysis service.
pub(crate) struct BootstrapDependencies {
    config: ScanlabConfig,
    telemetry: Metrics,
}

impl BootstrapDependencies {
    /// Construct production dependencies from the environment for the binary entrypoint.
    pub(crate) fn from_env() -> AppResult<Self> {
        let config =
            ScanlabConfig::from_env().map_err(|err| AppError::config("config.from_env", err))?;
        Self::new(config)
    }

    pub(crate) fn new(config: ScanlabConfig) -> AppResult<Self> {
        let telemetry =
            Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;
        Ok(Self { config, telemetry })
    }
}

/// Entry point for the service boot sequence.
///
/// Serves until the process receives Ctrl-C.
///
/// # Errors
///
/// Returns an error if configuration, logging, directory preparation, or
/// the API server fails.
pub async fn run_app() -> AppResult<()> {
    let dependencies = BootstrapDependencies::from_env()?;
    run_app_with(dependencies, shutdown_signal()).await
}

/// Boot sequence that relies entirely on injected dependencies.
pub(crate) async fn run_app_with<F>(
    dependencies: BootstrapDependencies,
    shutdown: F,
) -> AppResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let logging = LoggingConfig {
        level: &dependencies.config.logging.level,
        format: log_format(dependencies.config.logging.format),
        build_sha: build_sha(),
    };
    scanlab_telemetry::init_logging(&logging)
        .map_err(|err| AppError::telemetry("telemetry.init", err))?;
    let _context = GlobalContextGuard::new("bootstrap");

    serve(dependencies, shutdown).await
}

async fn serve<F>(dependencies: BootstrapDependencies, shutdown: F) -> AppResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let BootstrapDependencies { config, telemetry } = dependencies;
    info!(
        upload_dir = %config.storage.upload_dir.display(),
        analyzer = %config.analyzer.command,
        timeout_secs = config.analyzer.timeout_secs,
        "scan analysis service bootstrap starting"
    );

    prepare_directories(&config).await?;

    let pipeline = Pipeline::from_config(&config).with_metrics(telemetry.clone());
    let server = ApiServer::new(pipeline, telemetry);
    server
        .serve(config.server.socket_addr(), shutdown)
        .await
        .map_err(|err| AppError::api_server("api_server.serve", err))?;

    info!("scan analysis service stopped");
    Ok(())
}

pub(crate) const fn log_format(setting: LogFormatSetting) -> LogFormat {
    match setting {
        LogFormatSetting::Json => LogFormat::Json,
        LogFormatSetting::Pretty => LogFormat::Pretty,
        LogFormatSetting::Inferred => LogFormat::infer(),
    }
}

pub(crate) async fn prepare_directories(config: &ScanlabConfig) -> AppResult<()> {
    let upload_dir = &config.storage.upload_dir;
    tokio::fs::create_dir_all(upload_dir)
        .await
        .map_err(|err| AppError::io("upload_dir.create", Some(upload_dir.clone()), err))?;

    let working_dir = &config.analyzer.working_dir;
    if !is_directory(working_dir).await {
        return Err(AppError::InvalidConfig {
            field: "analyzer_workdir",
            reason: "not_a_directory",
            value: Some(working_dir.display().to_string()),
        });
    }
    Ok(())
}

async fn is_directory(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|metadata| metadata.is_dir())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
