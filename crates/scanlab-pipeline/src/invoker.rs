//! Launching the external analysis routine.
//!
//! # Design
//! - The routine is a seam (`AnalysisRoutine`) so the pipeline can be driven by
//!   in-process fakes; `ProcessRoutine` is the production implementation.
//! - The stored path is passed as a single argument, never through a shell.
//! - Both pipes are drained concurrently with the wait so a chatty routine can
//!   not block on a full pipe. Bytes past the capture caps are read and dropped.
//! - Output that overruns the stdout cap is never decoded; the run reports
//!   `OutputTruncated` instead of a partial `Success`.
//! - On timeout the whole process group is killed and the child reaped before
//!   returning.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use scanlab_config::AnalyzerConfig;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::model::{AnalysisInvocation, AnalysisOutcome, ExitInfo};
use crate::storage::ReadableFile;

const DEFAULT_STDERR_EXCERPT_BYTES: usize = 2048;
const READ_CHUNK_BYTES: usize = 8192;
const PIPE_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Something that can analyse a stored scan.
#[async_trait]
pub trait AnalysisRoutine: Send + Sync {
    /// Analyse the verified file and report how the run ended.
    async fn invoke(&self, file: &ReadableFile<'_>) -> AnalysisOutcome;

    /// Directory the routine runs in, scrubbed from any message it reports.
    fn working_dir(&self) -> Option<&Path> {
        None
    }
}

/// Runs the analysis routine as a child process.
#[derive(Debug, Clone)]
pub struct ProcessRoutine {
    command: String,
    args: Vec<String>,
    working_dir: PathBuf,
    timeout: Duration,
    max_output_bytes: usize,
    stderr_excerpt_bytes: usize,
}

impl ProcessRoutine {
    /// Routine launching `command` with `args` followed by the stored path.
    #[must_use]
    pub fn new(
        command: impl Into<String>,
        args: Vec<String>,
        working_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            command: command.into(),
            args,
            working_dir: working_dir.into(),
            timeout,
            max_output_bytes: usize::MAX,
            stderr_excerpt_bytes: DEFAULT_STDERR_EXCERPT_BYTES,
        }
    }

    /// Routine described by the analyzer configuration section.
    #[must_use]
    pub fn from_config(config: &AnalyzerConfig) -> Self {
        Self::new(
            config.command.clone(),
            config.args.clone(),
            config.working_dir.clone(),
            config.timeout(),
        )
        .with_max_output_bytes(config.max_output_bytes)
    }

    /// Cap the captured standard output.
    #[must_use]
    pub const fn with_max_output_bytes(mut self, max_output_bytes: usize) -> Self {
        self.max_output_bytes = max_output_bytes;
        self
    }

    /// Time budget for one invocation.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Build the invocation for a verified file.
    #[must_use]
    pub fn invocation(&self, file: &ReadableFile<'_>) -> AnalysisInvocation {
        let mut args = self.args.clone();
        args.push(file.path().to_string_lossy().into_owned());
        AnalysisInvocation::new(self.command.clone(), args, self.working_dir.clone())
    }

    async fn run(&self, invocation: &AnalysisInvocation) -> AnalysisOutcome {
        let mut command = Command::new(invocation.command());
        command
            .args(invocation.args())
            .current_dir(invocation.working_directory())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                warn!(
                    command = invocation.command(),
                    error = %err,
                    "failed to launch analysis routine"
                );
                return AnalysisOutcome::ProcessFailure {
                    exit: ExitInfo::LaunchFailed {
                        reason: err.to_string(),
                    },
                    stderr: String::new(),
                };
            }
        };
        info!(pid = child.id(), command = invocation.command(), "analysis routine started");

        let mut stdout_reader = tokio::spawn(read_capped(
            child.stdout.take(),
            self.max_output_bytes,
            Keep::Head,
        ));
        let mut stderr_reader = tokio::spawn(read_capped(
            child.stderr.take(),
            self.stderr_excerpt_bytes,
            Keep::Tail,
        ));

        let Ok(status) = timeout(self.timeout, child.wait()).await else {
            terminate(&mut child).await;
            stdout_reader.abort();
            stderr_reader.abort();
            warn!(after_secs = self.timeout.as_secs_f64(), "analysis routine timed out");
            return AnalysisOutcome::Timeout {
                after: self.timeout,
            };
        };

        let stdout = join_reader(&mut stdout_reader).await;
        let stderr = join_reader(&mut stderr_reader).await;

        match status {
            Ok(status) if status.success() && stdout.truncated => {
                warn!(
                    limit_bytes = self.max_output_bytes,
                    "analysis routine output exceeded the capture limit"
                );
                AnalysisOutcome::OutputTruncated {
                    limit_bytes: self.max_output_bytes,
                }
            }
            Ok(status) if status.success() => {
                debug!(stdout_bytes = stdout.bytes.len(), "analysis routine succeeded");
                AnalysisOutcome::Success {
                    stdout: String::from_utf8_lossy(&stdout.bytes).into_owned(),
                }
            }
            Ok(status) => AnalysisOutcome::ProcessFailure {
                exit: exit_info(status),
                stderr: String::from_utf8_lossy(&stderr.bytes).into_owned(),
            },
            Err(err) => AnalysisOutcome::ProcessFailure {
                exit: ExitInfo::WaitFailed {
                    reason: err.to_string(),
                },
                stderr: String::from_utf8_lossy(&stderr.bytes).into_owned(),
            },
        }
    }
}

#[async_trait]
impl AnalysisRoutine for ProcessRoutine {
    async fn invoke(&self, file: &ReadableFile<'_>) -> AnalysisOutcome {
        let invocation = self.invocation(file);
        self.run(&invocation).await
    }

    fn working_dir(&self) -> Option<&Path> {
        Some(&self.working_dir)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keep {
    Head,
    Tail,
}

#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    truncated: bool,
}

async fn read_capped<R>(reader: Option<R>, cap: usize, keep: Keep) -> Captured
where
    R: AsyncRead + Unpin,
{
    let mut captured = Captured::default();
    let Some(mut reader) = reader else {
        return captured;
    };
    let mut chunk = vec![0_u8; READ_CHUNK_BYTES];
    loop {
        let read = match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) => {
                debug!(error = %err, "analysis output pipe closed with error");
                break;
            }
        };
        let data = &chunk[..read];
        match keep {
            Keep::Head => {
                let room = cap.saturating_sub(captured.bytes.len());
                if data.len() > room {
                    captured.truncated = true;
                }
                captured.bytes.extend_from_slice(&data[..room.min(data.len())]);
            }
            Keep::Tail => {
                captured.bytes.extend_from_slice(data);
                if captured.bytes.len() > cap {
                    let excess = captured.bytes.len() - cap;
                    captured.bytes.drain(..excess);
                    captured.truncated = true;
                }
            }
        }
    }
    captured
}

async fn join_reader(reader: &mut JoinHandle<Captured>) -> Captured {
    match timeout(PIPE_DRAIN_GRACE, &mut *reader).await {
        Ok(Ok(captured)) => captured,
        Ok(Err(err)) => {
            warn!(error = %err, "analysis output reader failed");
            Captured::default()
        }
        Err(_) => {
            reader.abort();
            warn!("analysis output pipe still open after exit; discarding");
            Captured::default()
        }
    }
}

async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id().and_then(|id| i32::try_from(id).ok()) {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;
        if let Err(err) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
            debug!(pid, error = %err, "process group already gone");
        }
    }
    if let Err(err) = child.start_kill() {
        debug!(error = %err, "analysis routine already exited");
    }
    if let Err(err) = child.wait().await {
        warn!(error = %err, "failed to reap timed out analysis routine");
    }
}

fn exit_info(status: ExitStatus) -> ExitInfo {
    if let Some(code) = status.code() {
        return ExitInfo::Code(code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return ExitInfo::Signal(signal);
        }
    }
    ExitInfo::WaitFailed {
        reason: format!("unrecognised exit status {status}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn head_capture_drops_bytes_past_the_cap() {
        let input: &[u8] = b"0123456789";
        let captured = read_capped(Some(input), 4, Keep::Head).await;
        assert_eq!(captured.bytes, b"0123");
        assert!(captured.truncated);
    }

    #[tokio::test]
    async fn tail_capture_keeps_the_last_bytes() {
        let input: &[u8] = b"first line\nlast line";
        let captured = read_capped(Some(input), 9, Keep::Tail).await;
        assert_eq!(captured.bytes, b"last line");
        assert!(captured.truncated);
    }

    #[tokio::test]
    async fn missing_pipe_captures_nothing() {
        let captured = read_capped::<&[u8]>(None, 4, Keep::Head).await;
        assert!(captured.bytes.is_empty());
        assert!(!captured.truncated);
    }

    #[test]
    fn builder_applies_output_cap() {
        let routine = ProcessRoutine::new(
            "python3",
            vec!["analyse.py".into()],
            ".",
            Duration::from_secs(5),
        )
        .with_max_output_bytes(128);
        assert_eq!(routine.max_output_bytes, 128);
        assert_eq!(routine.timeout(), Duration::from_secs(5));
        assert_eq!(routine.working_dir(), Some(Path::new(".")));
    }
}
