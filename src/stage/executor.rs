//! Process launching behind a trait so the pipeline can be driven by a
//! scripted executor in tests.

use super::StageSpec;
use crate::errors::StageError;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

/// Raw result of one finished process.
#[derive(Debug, Clone, Default)]
pub struct ProcessReport {
    pub exit_code: i32,
    /// Everything the tool wrote to stderr, verbatim (lossy UTF-8).
    pub diagnostics: String,
    pub stdout: String,
    pub duration: Duration,
}

#[async_trait]
pub trait StageExecutor: Send + Sync {
    /// Launch the tool described by `spec` and wait for it to exit.
    ///
    /// Only a failure to launch is an error; a non-zero exit is reported
    /// through [`ProcessReport::exit_code`].
    async fn execute(&self, spec: &StageSpec) -> Result<ProcessReport, StageError>;
}

/// Executes stages as child processes via `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExecutor;

#[async_trait]
impl StageExecutor for ProcessExecutor {
    async fn execute(&self, spec: &StageSpec) -> Result<ProcessReport, StageError> {
        let start = Instant::now();

        let child = Command::new(&spec.program)
            .args(spec.os_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .current_dir(&spec.working_dir)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| StageError::SpawnFailed {
                program: spec.program.clone(),
                source,
            })?;

        tracing::debug!(stage = %spec.stage, pid = child.id().unwrap_or(0), "process spawned");

        let output = child
            .wait_with_output()
            .await
            .map_err(|source| StageError::SpawnFailed {
                program: spec.program.clone(),
                source,
            })?;

        // A signal-terminated child has no code.
        let exit_code = output.status.code().unwrap_or(-1);

        Ok(ProcessReport {
            exit_code,
            diagnostics: String::from_utf8_lossy(&output.stderr).into_owned(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            duration: start.elapsed(),
        })
    }
}
