#![cfg(unix)]
//! End-to-end pipeline runs against synthetic analysis routines.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use scanlab_config::RetentionPolicy;
use scanlab_pipeline::{
    ErrorKind, IntakePolicy, Pipeline, PipelineResponse, ProcessRoutine, StoragePlacement,
    UploadRequest,
};
use scanlab_test_support::{RoutineScript, SAMPLE_RESULT_JSON, routines::sample_result_body};
use tempfile::TempDir;

const LIMIT_BYTES: u64 = 64 * 1024;

fn pipeline_for(routine: &RoutineScript, uploads: &Path, timeout: Duration) -> Pipeline {
    pipeline_with_output_cap(routine, uploads, timeout, 1024 * 1024)
}

fn pipeline_with_output_cap(
    routine: &RoutineScript,
    uploads: &Path,
    timeout: Duration,
    max_output_bytes: usize,
) -> Pipeline {
    let process = ProcessRoutine::new(routine.command(), routine.args(), routine.dir(), timeout)
        .with_max_output_bytes(max_output_bytes);
    Pipeline::new(
        IntakePolicy::new(
            LIMIT_BYTES,
            ["jpeg", "jpg", "png", "gif", "bmp", "tiff", "dcm"],
            ["image/jpeg", "image/png", "application/dicom"],
        ),
        StoragePlacement::new(uploads),
        Arc::new(process),
    )
}

fn png(size: usize) -> UploadRequest {
    UploadRequest::new("brain.png", "image/png", vec![0x89_u8; size])
}

fn stored_count(uploads: &Path) -> Result<usize> {
    if !uploads.exists() {
        return Ok(0);
    }
    Ok(std::fs::read_dir(uploads)?.count())
}

/// True once `pid` no longer exists or is a zombie awaiting its reaper.
fn process_is_gone(pid: i32) -> bool {
    match kill(Pid::from_raw(pid), None::<Signal>) {
        Err(Errno::ESRCH) => true,
        _ => std::fs::read_to_string(format!("/proc/{pid}/stat")).is_ok_and(|stat| {
            stat.rsplit_once(')')
                .is_some_and(|(_, rest)| rest.trim_start().starts_with('Z'))
        }),
    }
}

async fn wait_until_gone(pid: i32) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if process_is_gone(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    process_is_gone(pid)
}

fn error_kind(response: &PipelineResponse) -> Option<ErrorKind> {
    match response {
        PipelineResponse::Error { kind, .. } => Some(*kind),
        PipelineResponse::Ok(_) => None,
    }
}

#[tokio::test]
async fn successful_routine_output_round_trips_into_the_response() -> Result<()> {
    let routine = RoutineScript::echo_after_diagnostics(
        &["Loading quantum model...", "Processing complete!"],
        SAMPLE_RESULT_JSON,
    )?;
    let work = TempDir::new()?;
    let uploads = work.path().join("uploads");
    let pipeline = pipeline_for(&routine, &uploads, Duration::from_secs(10));

    let response = pipeline.run(png(512)).await;
    assert_eq!(response.http_status(), 200);
    let body = serde_json::to_value(response.body())?;
    assert_eq!(body, sample_result_body()?);

    let invocations = routine.invocations()?;
    assert_eq!(invocations.len(), 1);
    let stored = Path::new(&invocations[0]);
    assert!(stored.is_absolute());
    assert!(stored.starts_with(uploads.canonicalize()?));
    assert_eq!(stored.extension().and_then(|ext| ext.to_str()), Some("png"));
    assert_eq!(stored_count(&uploads)?, 0, "default retention deletes the upload");
    Ok(())
}

#[tokio::test]
async fn oversized_upload_is_rejected_before_anything_is_stored() -> Result<()> {
    let routine = RoutineScript::echo_json(SAMPLE_RESULT_JSON)?;
    let work = TempDir::new()?;
    let uploads = work.path().join("uploads");
    let pipeline = pipeline_for(&routine, &uploads, Duration::from_secs(10));

    let limit = usize::try_from(LIMIT_BYTES)?;
    let response = pipeline.run(png(limit + 1)).await;
    assert_eq!(error_kind(&response), Some(ErrorKind::TooLarge));
    assert_eq!(response.http_status(), 400);
    assert_eq!(stored_count(&uploads)?, 0);
    assert!(routine.invocations()?.is_empty());

    let at_limit = pipeline.run(png(limit)).await;
    assert_eq!(at_limit.http_status(), 200);
    Ok(())
}

#[tokio::test]
async fn type_checks_apply_to_extension_and_content_type_independently() -> Result<()> {
    let routine = RoutineScript::echo_json(SAMPLE_RESULT_JSON)?;
    let work = TempDir::new()?;
    let uploads = work.path().join("uploads");
    let pipeline = pipeline_for(&routine, &uploads, Duration::from_secs(10));

    let wrong_extension = pipeline
        .run(UploadRequest::new("scan.exe", "image/png", b"MZ".to_vec()))
        .await;
    assert_eq!(error_kind(&wrong_extension), Some(ErrorKind::BadType));

    let wrong_content_type = pipeline
        .run(UploadRequest::new("scan.png", "application/x-msdownload", b"MZ".to_vec()))
        .await;
    assert_eq!(error_kind(&wrong_content_type), Some(ErrorKind::BadType));

    let missing = pipeline.run(UploadRequest::default()).await;
    assert_eq!(error_kind(&missing), Some(ErrorKind::NoFile));
    assert_eq!(stored_count(&uploads)?, 0);
    Ok(())
}

#[tokio::test]
async fn non_zero_exit_is_a_process_failure_without_leaking_stderr() -> Result<()> {
    let routine = RoutineScript::exit_with(3, "Traceback: /secret/path/model.pt missing")?;
    let work = TempDir::new()?;
    let pipeline = pipeline_for(&routine, &work.path().join("uploads"), Duration::from_secs(10));

    match pipeline.run(png(16)).await {
        PipelineResponse::Error {
            kind,
            message,
            http_status,
        } => {
            assert_eq!(kind, ErrorKind::ProcessFailure);
            assert_eq!(http_status, 500);
            assert!(!message.contains("/secret"));
            assert!(!message.contains("Traceback"));
        }
        PipelineResponse::Ok(record) => bail!("unexpected success: {record:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn hung_routine_times_out_and_is_killed() -> Result<()> {
    let routine = RoutineScript::sleep_for(30)?;
    let work = TempDir::new()?;
    let pipeline = pipeline_for(&routine, &work.path().join("uploads"), Duration::from_millis(500));

    let started = Instant::now();
    let response = pipeline.run(png(16)).await;
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(error_kind(&response), Some(ErrorKind::Timeout));
    assert_eq!(response.http_status(), 500);

    let Some(pid) = routine.recorded_pid()? else {
        bail!("routine never recorded its pid");
    };
    let liveness = kill(Pid::from_raw(pid), None::<Signal>);
    assert_eq!(liveness, Err(Errno::ESRCH), "routine process must be gone");
    Ok(())
}

#[tokio::test]
async fn timeout_kills_the_whole_process_group() -> Result<()> {
    let routine = RoutineScript::spawn_sleeping_grandchild(30)?;
    let work = TempDir::new()?;
    let pipeline = pipeline_for(&routine, &work.path().join("uploads"), Duration::from_millis(500));

    let response = pipeline.run(png(16)).await;
    assert_eq!(error_kind(&response), Some(ErrorKind::Timeout));

    let Some(shell) = routine.recorded_pid()? else {
        bail!("routine never recorded its pid");
    };
    let Some(sleeper) = routine.recorded_grandchild_pid()? else {
        bail!("routine never started its grandchild");
    };
    assert_eq!(
        kill(Pid::from_raw(shell), None::<Signal>),
        Err(Errno::ESRCH),
        "the reaped routine shell must be gone"
    );
    assert!(wait_until_gone(sleeper).await, "grandchild {sleeper} survived the timeout");
    Ok(())
}

#[tokio::test]
async fn output_past_the_capture_limit_is_never_decoded() -> Result<()> {
    let final_line = r#"{"success": false, "error": "the real verdict"}"#;
    let routine = RoutineScript::echo_after_diagnostics(&[SAMPLE_RESULT_JSON], final_line)?;
    let work = TempDir::new()?;
    let uploads = work.path().join("uploads");
    let pipeline = pipeline_with_output_cap(
        &routine,
        &uploads,
        Duration::from_secs(10),
        SAMPLE_RESULT_JSON.len() + 1,
    );

    let response = pipeline.run(png(16)).await;
    assert_eq!(error_kind(&response), Some(ErrorKind::DecodeFailure));
    assert_eq!(response.http_status(), 500);
    assert_eq!(stored_count(&uploads)?, 0);

    let roomy = pipeline_for(&routine, &uploads, Duration::from_secs(10));
    assert_eq!(
        error_kind(&roomy.run(png(16)).await),
        Some(ErrorKind::RoutineReportedFailure)
    );
    Ok(())
}

#[tokio::test]
async fn malformed_output_is_a_decode_failure() -> Result<()> {
    let routine = RoutineScript::emit_garbage()?;
    let work = TempDir::new()?;
    let pipeline = pipeline_for(&routine, &work.path().join("uploads"), Duration::from_secs(10));
    let response = pipeline.run(png(16)).await;
    assert_eq!(error_kind(&response), Some(ErrorKind::DecodeFailure));
    assert_eq!(response.http_status(), 500);
    Ok(())
}

#[tokio::test]
async fn routine_reported_failure_passes_its_message_through() -> Result<()> {
    let routine = RoutineScript::report_failure("Image could not be decoded")?;
    let work = TempDir::new()?;
    let pipeline = pipeline_for(&routine, &work.path().join("uploads"), Duration::from_secs(10));
    match pipeline.run(png(16)).await {
        PipelineResponse::Error { kind, message, .. } => {
            assert_eq!(kind, ErrorKind::RoutineReportedFailure);
            assert_eq!(message, "Image could not be decoded");
        }
        PipelineResponse::Ok(record) => bail!("unexpected success: {record:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn resubmission_yields_the_same_result_under_a_new_name() -> Result<()> {
    let routine = RoutineScript::echo_json(SAMPLE_RESULT_JSON)?;
    let work = TempDir::new()?;
    let uploads = work.path().join("uploads");
    let pipeline = pipeline_for(&routine, &uploads, Duration::from_secs(10))
        .with_retention(RetentionPolicy::Retain);

    let first = pipeline.run(png(64)).await;
    let second = pipeline.run(png(64)).await;
    assert_eq!(first, second);
    assert_eq!(first.http_status(), 200);

    let invocations = routine.invocations()?;
    assert_eq!(invocations.len(), 2);
    assert_ne!(invocations[0], invocations[1]);
    assert_eq!(stored_count(&uploads)?, 2, "retained uploads stay on disk");
    Ok(())
}

#[tokio::test]
async fn concurrent_uploads_get_distinct_stored_paths() -> Result<()> {
    let routine = RoutineScript::echo_json(SAMPLE_RESULT_JSON)?;
    let work = TempDir::new()?;
    let pipeline = pipeline_for(&routine, &work.path().join("uploads"), Duration::from_secs(10));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let pipeline = pipeline.clone();
        handles.push(tokio::spawn(async move { pipeline.run(png(32)).await }));
    }
    for handle in handles {
        assert_eq!(handle.await?.http_status(), 200);
    }

    let mut invocations = routine.invocations()?;
    assert_eq!(invocations.len(), 8);
    invocations.sort();
    invocations.dedup();
    assert_eq!(invocations.len(), 8);
    Ok(())
}

#[tokio::test]
async fn missing_routine_binary_is_a_process_failure() -> Result<()> {
    let work = TempDir::new()?;
    let pipeline = Pipeline::new(
        IntakePolicy::new(LIMIT_BYTES, ["png"], ["image/png"]),
        StoragePlacement::new(work.path().join("uploads")),
        Arc::new(ProcessRoutine::new(
            "/definitely/not/a/routine",
            Vec::new(),
            work.path(),
            Duration::from_secs(5),
        )),
    );
    let response = pipeline.run(png(16)).await;
    assert_eq!(error_kind(&response), Some(ErrorKind::ProcessFailure));
    assert_eq!(stored_count(&work.path().join("uploads"))?, 0);
    Ok(())
}
