//! `POST /api/upload`: multipart intake feeding the pipeline.
//!
//! # Design
//! - The first part named `file` or `scan` is the upload; other parts are skipped.
//! - Declared name and content type are checked as soon as the part header is
//!   read, before any of its body is consumed.
//! - The body is streamed chunk by chunk and abandoned the moment it exceeds
//!   the intake limit, so oversized uploads are never buffered or stored.

use std::sync::Arc;

use axum::{
    Json,
    extract::{
        Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use scanlab_pipeline::{
    IntakePolicy, PipelineError, PipelineResponse, PipelineResult, UploadRequest,
    ValidationReason,
};
use tracing::debug;

use crate::http::constants::UPLOAD_FIELDS;
use crate::state::ApiState;

pub(crate) async fn upload(
    State(state): State<Arc<ApiState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let response = match read_upload(state.pipeline.intake(), multipart).await {
        Ok(upload) => state.pipeline.run(upload).await,
        Err(err) => state.pipeline.reject(&err),
    };
    render(&response)
}

fn render(response: &PipelineResponse) -> Response {
    let status =
        StatusCode::from_u16(response.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(response.body())).into_response()
}

async fn read_upload(
    intake: &IntakePolicy,
    multipart: Result<Multipart, MultipartRejection>,
) -> PipelineResult<UploadRequest> {
    let mut multipart = multipart.map_err(|rejection| {
        debug!(error = %rejection, "request is not a multipart upload");
        no_file()
    })?;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|err| transport_error(intake, &err, 0))?
    {
        if !field
            .name()
            .is_some_and(|name| UPLOAD_FIELDS.contains(&name))
        {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        intake.check_declared(filename.as_deref(), content_type.as_deref())?;

        let mut bytes = Vec::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|err| transport_error(intake, &err, byte_count(bytes.len())))?
        {
            intake.check_size(byte_count(bytes.len() + chunk.len()))?;
            bytes.extend_from_slice(&chunk);
        }
        return Ok(UploadRequest {
            filename,
            content_type,
            bytes,
        });
    }
    Err(no_file())
}

fn transport_error(
    intake: &IntakePolicy,
    err: &MultipartError,
    received_bytes: u64,
) -> PipelineError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return PipelineError::validation(ValidationReason::TooLarge {
            received_bytes,
            limit_bytes: intake.max_bytes(),
        });
    }
    debug!(error = %err, "malformed multipart body");
    no_file()
}

const fn no_file() -> PipelineError {
    PipelineError::validation(ValidationReason::NoFile)
}

fn byte_count(len: usize) -> u64 {
    u64::try_from(len).unwrap_or(u64::MAX)
}
