//! Match engine execution.
//!
//! Runs the external match simulator to completion with a hard timeout.
//! The engine writes its trace to a file; stdout is only logged, stderr is
//! captured for diagnostics.

use arena_proto::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, trace, warn};

use crate::process::{TERMINATION_GRACE, shutdown};

/// How an engine run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineRun {
    /// Exit code, or `None` when the engine died from a signal.
    pub exit_code: Option<i32>,
    /// Everything the engine wrote to stderr.
    pub stderr: String,
    /// Where the engine was told to write its trace.
    pub output_path: PathBuf,
}

impl EngineRun {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Returns true if the engine left a trace file behind.
    pub fn trace_exists(&self) -> bool {
        self.output_path.is_file()
    }
}

/// A fully assembled engine invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchEngineProcess {
    command: String,
    arguments: Vec<String>,
    output_path: PathBuf,
}

impl MatchEngineProcess {
    /// Creates an invocation. `arguments` must already direct the engine to
    /// write its trace to `output_path`.
    pub fn new(
        command: impl Into<String>,
        arguments: Vec<String>,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            command: command.into(),
            arguments,
            output_path: output_path.into(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Runs the engine until it exits or `timeout` elapses.
    ///
    /// On timeout the engine receives SIGTERM, then SIGKILL after a short
    /// grace period, and the run fails with [`Error::MatchTimeout`].
    pub async fn run(&self, timeout: Duration) -> Result<EngineRun> {
        let mut command = Command::new(&self.command);
        command
            .args(&self.arguments)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(
            command = %self.command,
            args = ?self.arguments,
            output = %self.output_path.display(),
            "Spawning match engine"
        );

        let mut child = command.spawn().map_err(|e| Error::EngineFailure {
            exit_code: None,
            diagnostic: format!("failed to spawn `{}`: {e}", self.command),
        })?;

        // Read stdout and stderr concurrently so that neither pipe fills up
        // while the other is being drained.
        let stdout_handle = child.stdout.take();
        let stderr_handle = child.stderr.take();

        let completion = async {
            let stdout_future = async {
                if let Some(stdout) = stdout_handle {
                    let mut lines = BufReader::new(stdout).lines();
                    while let Some(line) = lines.next_line().await? {
                        trace!(%line, "engine stdout");
                    }
                }
                Ok::<_, std::io::Error>(())
            };

            let stderr_future = async {
                let mut lines_out = Vec::new();
                if let Some(stderr) = stderr_handle {
                    let mut lines = BufReader::new(stderr).lines();
                    while let Some(line) = lines.next_line().await? {
                        lines_out.push(line);
                    }
                }
                Ok::<_, std::io::Error>(lines_out)
            };

            let ((), stderr_lines) = tokio::try_join!(stdout_future, stderr_future)?;
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, stderr_lines))
        };

        let outcome = tokio::time::timeout(timeout, completion).await;
        match outcome {
            Ok(result) => {
                let (status, stderr_lines) = result?;
                debug!(exit_code = ?status.code(), "Match engine exited");
                Ok(EngineRun {
                    exit_code: status.code(),
                    stderr: stderr_lines.join("\n"),
                    output_path: self.output_path.clone(),
                })
            }
            Err(_) => {
                warn!(
                    timeout_secs = timeout.as_secs(),
                    "Match timeout reached, terminating engine"
                );
                shutdown(&mut child, TERMINATION_GRACE).await;
                Err(Error::MatchTimeout(timeout))
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn shell_engine(script: &str, output: &Path) -> MatchEngineProcess {
        // `sh -c script <output>` binds the output path to $0.
        MatchEngineProcess::new(
            "sh",
            vec![
                "-c".to_string(),
                script.to_string(),
                output.display().to_string(),
            ],
            output,
        )
    }

    #[tokio::test]
    async fn test_run_writes_trace_and_captures_stderr() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("trace.jsonl");
        let engine = shell_engine(
            "echo '{\"turn\":1}' > \"$0\"; echo 'starting game' >&2; echo done",
            &output,
        );

        let run = engine.run(Duration::from_secs(10)).await.unwrap();

        assert!(run.success());
        assert!(run.trace_exists());
        assert_eq!(run.stderr, "starting game");
        assert_eq!(run.output_path, output);
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_reported_not_raised() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("trace.jsonl");
        let engine = shell_engine("echo 'bad board' >&2; exit 4", &output);

        let run = engine.run(Duration::from_secs(10)).await.unwrap();

        assert_eq!(run.exit_code, Some(4));
        assert!(!run.success());
        assert!(!run.trace_exists());
        assert!(run.stderr.contains("bad board"));
    }

    #[tokio::test]
    async fn test_timeout_terminates_engine() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("trace.jsonl");
        let engine = shell_engine("exec sleep 30", &output);

        let started = std::time::Instant::now();
        let err = engine.run(Duration::from_millis(100)).await.unwrap_err();

        assert!(matches!(err, Error::MatchTimeout(d) if d == Duration::from_millis(100)));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_missing_binary_is_engine_failure() {
        let engine = MatchEngineProcess::new("/nonexistent/battlesnake", vec![], "/tmp/x.jsonl");
        let err = engine.run(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, Error::EngineFailure { exit_code: None, .. }));
    }
}
