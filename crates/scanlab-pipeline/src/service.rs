//! Orchestration of one upload from intake to response.
//!
//! # Design
//! - Stages run strictly in order and the first failure short-circuits to the
//!   response mapper. Every request ends in exactly one `PipelineResponse`.
//! - Each run executes in its own task inside a `pipeline.run` span, so a
//!   dropped caller does not cancel it. The analysis gets a nested task; a
//!   panic there surfaces as `Internal` and the stored file is still released.
//! - A semaphore bounds concurrent analyses; callers over the limit wait.
//! - The retention policy is applied once the stage chain has finished,
//!   whatever the outcome, including a panicking analysis task.

use std::sync::Arc;
use std::time::Instant;

use scanlab_config::{RetentionPolicy, ScanlabConfig};
use scanlab_telemetry::{Metrics, current_request_id};
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::{Instrument, debug, info, info_span};
use uuid::Uuid;

use crate::decoder;
use crate::error::{PipelineError, PipelineResult};
use crate::intake::IntakePolicy;
use crate::invoker::{AnalysisRoutine, ProcessRoutine};
use crate::model::{AnalysisOutcome, PipelineResponse, ResultRecord, StoredFile, UploadRequest};
use crate::response::{map_error, map_outcome, redact_routine_message};
use crate::storage::StoragePlacement;

const DEFAULT_MAX_CONCURRENT: usize = 4;

/// The upload-to-result pipeline.
#[derive(Clone)]
pub struct Pipeline {
    intake: Arc<IntakePolicy>,
    storage: Arc<StoragePlacement>,
    routine: Arc<dyn AnalysisRoutine>,
    retention: RetentionPolicy,
    permits: Arc<Semaphore>,
    metrics: Option<Metrics>,
}

impl Pipeline {
    /// Pipeline with the default retention (`Delete`) and concurrency limit.
    #[must_use]
    pub fn new(
        intake: IntakePolicy,
        storage: StoragePlacement,
        routine: Arc<dyn AnalysisRoutine>,
    ) -> Self {
        Self {
            intake: Arc::new(intake),
            storage: Arc::new(storage),
            routine,
            retention: RetentionPolicy::Delete,
            permits: Arc::new(Semaphore::new(DEFAULT_MAX_CONCURRENT)),
            metrics: None,
        }
    }

    /// Pipeline assembled from the full service configuration.
    #[must_use]
    pub fn from_config(config: &ScanlabConfig) -> Self {
        Self::new(
            IntakePolicy::from_config(&config.intake),
            StoragePlacement::from_config(&config.storage),
            Arc::new(ProcessRoutine::from_config(&config.analyzer)),
        )
        .with_retention(config.storage.retention)
        .with_max_concurrent(config.analyzer.max_concurrent)
    }

    /// Override the stored-file retention policy.
    #[must_use]
    pub const fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    /// Override how many analyses may run at once (at least one).
    #[must_use]
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.permits = Arc::new(Semaphore::new(max_concurrent.max(1)));
        self
    }

    /// Record outcomes and analysis timings in `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Intake policy, for transports that check declarations early.
    #[must_use]
    pub fn intake(&self) -> &IntakePolicy {
        &self.intake
    }

    /// Process one upload and produce its response.
    pub async fn run(&self, upload: UploadRequest) -> PipelineResponse {
        let upload_id = Uuid::new_v4();
        let span = info_span!(
            "pipeline.run",
            upload_id = %upload_id,
            request_id = current_request_id().as_deref().unwrap_or("-"),
        );
        let pipeline = self.clone();
        let handle =
            tokio::spawn(async move { pipeline.execute(upload).await }.instrument(span.clone()));
        let result = handle.await.unwrap_or_else(|join_err| Err(join_failure(&join_err)));
        let response = span.in_scope(|| map_outcome(result));
        self.record_outcome(&response);
        response
    }

    /// Map an error raised outside [`Pipeline::run`], such as an early
    /// transport-level rejection, and count it like any other outcome.
    #[must_use]
    pub fn reject(&self, err: &PipelineError) -> PipelineResponse {
        let response = map_error(err);
        self.record_outcome(&response);
        response
    }

    /// Run every stage without mapping the result. The analysis runs in its
    /// own task; the stored file stays here so retention still applies when
    /// that task panics.
    async fn execute(&self, upload: UploadRequest) -> PipelineResult<ResultRecord> {
        let accepted = self.intake.validate(&upload)?;
        if let Some(metrics) = &self.metrics {
            metrics.add_upload_bytes(accepted.size_bytes);
        }
        let stored = self.storage.place(&accepted, &upload.bytes).await?;
        drop(upload);
        info!(size_bytes = stored.size_bytes, extension = %stored.extension, "upload stored");

        let pipeline = self.clone();
        let task_stored = stored.clone();
        let handle = tokio::spawn(
            async move { pipeline.analyse(&task_stored).await }.in_current_span(),
        );
        let result = handle.await.unwrap_or_else(|join_err| Err(join_failure(&join_err)));
        self.storage.release(&stored, self.retention).await;
        result
    }

    async fn analyse(&self, stored: &StoredFile) -> PipelineResult<ResultRecord> {
        let readable = self.storage.verify_readable(stored).await?;
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|err| PipelineError::Internal {
                operation: "pipeline.permit",
                detail: err.to_string(),
            })?;

        if let Some(metrics) = &self.metrics {
            metrics.analysis_started();
        }
        let started = Instant::now();
        let outcome = self.routine.invoke(&readable).await;
        let elapsed = started.elapsed();
        if let Some(metrics) = &self.metrics {
            metrics.analysis_finished(elapsed);
        }
        debug!(
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "analysis finished"
        );

        let raw_output = match outcome {
            AnalysisOutcome::Success { stdout } => stdout,
            AnalysisOutcome::ProcessFailure { exit, stderr } => {
                return Err(PipelineError::Process {
                    exit,
                    stderr_excerpt: stderr,
                });
            }
            AnalysisOutcome::Timeout { after } => return Err(PipelineError::Timeout { after }),
            AnalysisOutcome::OutputTruncated { limit_bytes } => {
                debug!(limit_bytes, "discarding truncated analysis output");
                return Err(PipelineError::decode("output_truncated", None));
            }
        };

        decoder::decode(&raw_output).map_err(|err| match err {
            PipelineError::RoutineReported { message } => {
                let path = stored.path.to_string_lossy();
                let root = stored
                    .path
                    .parent()
                    .map(|parent| parent.to_string_lossy())
                    .unwrap_or_default();
                let working_dir = self
                    .routine
                    .working_dir()
                    .map(|dir| dir.to_string_lossy())
                    .unwrap_or_default();
                PipelineError::RoutineReported {
                    message: redact_routine_message(
                        &message,
                        &[path.as_ref(), root.as_ref(), working_dir.as_ref()],
                    ),
                }
            }
            other => other,
        })
    }

    fn record_outcome(&self, response: &PipelineResponse) {
        let label = response.outcome_label();
        info!(outcome = label, status = response.http_status(), "pipeline run finished");
        if let Some(metrics) = &self.metrics {
            metrics.inc_pipeline_outcome(label);
        }
    }
}

fn join_failure(err: &JoinError) -> PipelineError {
    PipelineError::Internal {
        operation: "pipeline.join",
        detail: err.to_string(),
    }
}
