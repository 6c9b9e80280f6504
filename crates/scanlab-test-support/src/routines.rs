//! Synthetic analysis routines backed by `/bin/sh` scripts.
//!
//! Every script records the path it was handed and fails with exit code 97 if
//! that path is not readable, so suites can assert on what the pipeline
//! actually passed to the routine.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde_json::{Value, json};
use tempfile::TempDir;

/// A result document in the shape a well-behaved routine prints.
pub const SAMPLE_RESULT_JSON: &str = r#"{"success": true, "metrics": {"entropy": 7.42, "contrast": 0.318, "brightness": 0.547}, "anomalies": [{"location": [120, 88], "intensity": 0.91, "type": "hyperintense"}, {"location": [40, 200], "intensity": 0.64, "type": "hypointense"}], "processed_image": "data:image/png;base64,iVBORw0KGgo="}"#;

/// Exit code used when the routine was handed an unreadable path.
pub const MISSING_INPUT_EXIT: i32 = 97;

const SHELL: &str = "/bin/sh";
const SCRIPT_NAME: &str = "routine.sh";
const INVOCATIONS_LOG: &str = "invocations.log";
const PID_FILE: &str = "routine.pid";
const GRANDCHILD_PID_FILE: &str = "grandchild.pid";

/// A throwaway routine script and the directory holding it.
#[derive(Debug)]
pub struct RoutineScript {
    dir: TempDir,
    script: PathBuf,
}

impl RoutineScript {
    /// Routine printing `document` on stdout and exiting zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the script cannot be written.
    pub fn echo_json(document: &str) -> Result<Self> {
        Self::echo_after_diagnostics(&[], document)
    }

    /// Routine printing diagnostic lines before `document`.
    ///
    /// # Errors
    ///
    /// Returns an error if the script cannot be written.
    pub fn echo_after_diagnostics(diagnostics: &[&str], document: &str) -> Result<Self> {
        let mut body = String::new();
        for line in diagnostics {
            body.push_str(&heredoc(line));
        }
        body.push_str(&heredoc(document));
        body.push_str("exit 0\n");
        Self::write(&body)
    }

    /// Routine reporting its own failure with `message`.
    ///
    /// # Errors
    ///
    /// Returns an error if the script cannot be written.
    pub fn report_failure(message: &str) -> Result<Self> {
        let document = json!({"success": false, "error": message}).to_string();
        Self::echo_json(&document)
    }

    /// Routine writing `stderr` and exiting with `code`.
    ///
    /// # Errors
    ///
    /// Returns an error if the script cannot be written.
    pub fn exit_with(code: i32, stderr: &str) -> Result<Self> {
        let body = format!(
            "cat >&2 <<'SCANLAB_EOF'\n{stderr}\nSCANLAB_EOF\nexit {code}\n"
        );
        Self::write(&body)
    }

    /// Routine that records its pid and then sleeps for `seconds`.
    ///
    /// # Errors
    ///
    /// Returns an error if the script cannot be written.
    pub fn sleep_for(seconds: u64) -> Result<Self> {
        let body = format!("echo $$ > \"$SCANLAB_ROUTINE_DIR/{PID_FILE}\"\nexec sleep {seconds}\n");
        Self::write(&body)
    }

    /// Routine that backgrounds a `sleep` for `seconds`, records both pids,
    /// and waits on the sleeper. Only a process-group kill reaches the sleeper.
    ///
    /// # Errors
    ///
    /// Returns an error if the script cannot be written.
    pub fn spawn_sleeping_grandchild(seconds: u64) -> Result<Self> {
        let body = format!(
            "sleep {seconds} &\n\
             echo $! > \"$SCANLAB_ROUTINE_DIR/{GRANDCHILD_PID_FILE}\"\n\
             echo $$ > \"$SCANLAB_ROUTINE_DIR/{PID_FILE}\"\n\
             wait\n"
        );
        Self::write(&body)
    }

    /// Routine printing output that is not a result document.
    ///
    /// # Errors
    ///
    /// Returns an error if the script cannot be written.
    pub fn emit_garbage() -> Result<Self> {
        Self::write("echo 'Processing complete!'\necho 'result: <not json>'\nexit 0\n")
    }

    /// Executable to configure as the analysis command.
    #[must_use]
    pub const fn command(&self) -> &'static str {
        SHELL
    }

    /// Arguments to configure before the stored path.
    #[must_use]
    pub fn args(&self) -> Vec<String> {
        vec![self.script.display().to_string()]
    }

    /// Directory holding the script and its side files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Paths the routine was invoked with, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the invocation log exists but cannot be read.
    pub fn invocations(&self) -> Result<Vec<String>> {
        let log = self.dir.path().join(INVOCATIONS_LOG);
        if !log.exists() {
            return Ok(Vec::new());
        }
        Ok(fs::read_to_string(log)?
            .lines()
            .map(str::to_string)
            .collect())
    }

    /// Pid of the routine's own shell, once it has started. Recorded by
    /// [`RoutineScript::sleep_for`] and [`RoutineScript::spawn_sleeping_grandchild`].
    ///
    /// # Errors
    ///
    /// Returns an error if the pid file holds something other than a number.
    pub fn recorded_pid(&self) -> Result<Option<i32>> {
        self.read_pid(PID_FILE)
    }

    /// Pid of the sleeper started by [`RoutineScript::spawn_sleeping_grandchild`].
    ///
    /// # Errors
    ///
    /// Returns an error if the pid file holds something other than a number.
    pub fn recorded_grandchild_pid(&self) -> Result<Option<i32>> {
        self.read_pid(GRANDCHILD_PID_FILE)
    }

    fn read_pid(&self, name: &str) -> Result<Option<i32>> {
        let pid_file = self.dir.path().join(name);
        if !pid_file.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(pid_file)?.trim().parse()?))
    }

    fn write(body: &str) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("scanlab-routine-").tempdir()?;
        let script = dir.path().join(SCRIPT_NAME);
        let dir_literal = shell_quote(&dir.path().display().to_string());
        let prelude = format!(
            "SCANLAB_ROUTINE_DIR={dir_literal}\n\
             printf '%s\\n' \"$1\" >> \"$SCANLAB_ROUTINE_DIR/{INVOCATIONS_LOG}\"\n\
             if [ ! -r \"$1\" ]; then echo \"input not readable\" >&2; exit {MISSING_INPUT_EXIT}; fi\n"
        );
        fs::write(&script, format!("{prelude}{body}"))?;
        Ok(Self { dir, script })
    }
}

/// The parsed form of [`SAMPLE_RESULT_JSON`] without the `success` flag.
///
/// # Errors
///
/// Returns an error if the constant is not valid JSON.
pub fn sample_result_body() -> Result<Value> {
    let mut value: Value = serde_json::from_str(SAMPLE_RESULT_JSON)?;
    if let Some(object) = value.as_object_mut() {
        object.remove("success");
    }
    Ok(value)
}

fn heredoc(text: &str) -> String {
    format!("cat <<'SCANLAB_EOF'\n{text}\nSCANLAB_EOF\n")
}

fn shell_quote(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', r"'\''"))
}
