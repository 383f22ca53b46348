//! Decision-function servers running as local child processes.
//!
//! A server is launched as `program args… <port>` and counts as ready once
//! it prints the readiness marker on stdout. Anything it prints on stderr is
//! logged and the last few lines are kept for diagnostics.

use arena_proto::{Error, Result};
use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{debug, info};

use crate::process::signal_terminate;

/// Number of stderr lines kept for failure diagnostics.
const STDERR_TAIL_LINES: usize = 20;

/// How long to wait for the exit status after a server closes stdout.
const EXIT_STATUS_WAIT: Duration = Duration::from_millis(250);

/// Launch parameters for one decision server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSpec {
    /// Contestant label, also used as the name passed to the engine.
    pub label: String,
    pub program: String,
    /// Arguments placed before the port.
    pub args: Vec<String>,
    pub port: u16,
}

impl ServerSpec {
    /// URL the engine uses to reach this server.
    pub fn endpoint(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }
}

/// Startup state of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Pending,
    Ready,
    Failed,
}

/// One decision function served on a designated local port.
///
/// The child is signalled on [`terminate`](Self::terminate) or on drop,
/// whichever comes first.
#[derive(Debug)]
pub struct EphemeralServerProcess {
    label: String,
    port: u16,
    child: Child,
    stdout: Option<Lines<BufReader<ChildStdout>>>,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
    readiness: Readiness,
    terminated: bool,
}

impl EphemeralServerProcess {
    /// Spawns the server. A spawn failure is reported as a start fault for
    /// this side.
    pub fn launch(spec: &ServerSpec) -> Result<Self> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .arg(spec.port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(
            server = %spec.label,
            program = %spec.program,
            args = ?spec.args,
            port = spec.port,
            "Spawning decision server"
        );

        let mut child = command.spawn().map_err(|e| Error::ProcessStartTimeout {
            side: spec.label.clone(),
            reason: format!("failed to spawn `{}`: {e}", spec.program),
        })?;

        let stdout = child.stdout.take().map(|out| BufReader::new(out).lines());
        let stderr_tail = Arc::new(Mutex::new(VecDeque::new()));
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain_stderr(
                spec.label.clone(),
                stderr,
                Arc::clone(&stderr_tail),
            ));
        }

        Ok(Self {
            label: spec.label.clone(),
            port: spec.port,
            child,
            stdout,
            stderr_tail,
            readiness: Readiness::Pending,
            terminated: false,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn endpoint(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness
    }

    /// Reads stdout until a line contains `marker` (case-insensitive).
    ///
    /// Unbounded on its own; callers race it against their readiness
    /// timeout. Closing stdout before the marker appears fails the start.
    pub async fn wait_ready(&mut self, marker: &str) -> Result<()> {
        if self.readiness == Readiness::Ready {
            return Ok(());
        }

        let marker = marker.to_lowercase();
        let found = match self.stdout.as_mut() {
            Some(lines) => read_until_marker(lines, &marker, &self.label).await,
            None => Ok(false),
        };

        match found {
            Ok(true) => {
                self.readiness = Readiness::Ready;
                info!(server = %self.label, port = self.port, "Decision server ready");
                if let Some(lines) = self.stdout.take() {
                    tokio::spawn(drain_stdout(self.label.clone(), lines));
                }
                Ok(())
            }
            Ok(false) => {
                self.readiness = Readiness::Failed;
                let reason = self.early_exit_reason().await;
                Err(Error::ProcessStartTimeout {
                    side: self.label.clone(),
                    reason,
                })
            }
            Err(e) => {
                self.readiness = Readiness::Failed;
                Err(Error::ProcessStartTimeout {
                    side: self.label.clone(),
                    reason: format!("stdout unreadable: {e}"),
                })
            }
        }
    }

    /// Signals the server to stop. Idempotent.
    pub fn terminate(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        debug!(server = %self.label, "Terminating decision server");
        signal_terminate(&mut self.child);
    }

    async fn early_exit_reason(&mut self) -> String {
        let status = tokio::time::timeout(EXIT_STATUS_WAIT, self.child.wait())
            .await
            .ok()
            .and_then(std::result::Result::ok);
        let mut reason = match status {
            Some(status) => format!("exited ({status}) before signalling readiness"),
            None => "closed stdout before signalling readiness".to_string(),
        };
        let tail = self
            .stderr_tail
            .lock()
            .map(|tail| tail.iter().cloned().collect::<Vec<_>>().join("\n"))
            .unwrap_or_default();
        if !tail.is_empty() {
            reason.push_str(": ");
            reason.push_str(&tail);
        }
        reason
    }
}

impl Drop for EphemeralServerProcess {
    fn drop(&mut self) {
        self.terminate();
    }
}

async fn read_until_marker(
    lines: &mut Lines<BufReader<ChildStdout>>,
    marker: &str,
    label: &str,
) -> std::io::Result<bool> {
    while let Some(line) = lines.next_line().await? {
        debug!(server = %label, %line, "stdout");
        if line.to_lowercase().contains(marker) {
            return Ok(true);
        }
    }
    Ok(false)
}

// Keeps the pipe empty after readiness so the server never blocks on writes.
async fn drain_stdout(label: String, mut lines: Lines<BufReader<ChildStdout>>) {
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(server = %label, %line, "stdout");
    }
}

async fn drain_stderr(label: String, stderr: ChildStderr, tail: Arc<Mutex<VecDeque<String>>>) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(server = %label, %line, "stderr");
        if let Ok(mut tail) = tail.lock() {
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell_server(label: &str, script: &str, port: u16) -> ServerSpec {
        // `sh -c script <port>` binds the port to $0.
        ServerSpec {
            label: label.to_string(),
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            port,
        }
    }

    #[tokio::test]
    async fn test_ready_after_marker() {
        let spec = shell_server(
            "candidate",
            "echo loading; echo \"Snake server on port $0\"; exec sleep 30",
            8101,
        );
        let mut server = EphemeralServerProcess::launch(&spec).unwrap();
        assert_eq!(server.readiness(), Readiness::Pending);

        tokio::time::timeout(Duration::from_secs(5), server.wait_ready("server on port"))
            .await
            .expect("marker should arrive quickly")
            .unwrap();

        assert_eq!(server.readiness(), Readiness::Ready);
        assert_eq!(server.endpoint(), "http://127.0.0.1:8101");
        server.terminate();
        server.terminate();
    }

    #[tokio::test]
    async fn test_exit_before_marker_fails_start() {
        let spec = shell_server("reference", "echo booting; echo oops >&2; exit 3", 8102);
        let mut server = EphemeralServerProcess::launch(&spec).unwrap();

        let err = tokio::time::timeout(Duration::from_secs(5), server.wait_ready("server on port"))
            .await
            .unwrap()
            .unwrap_err();

        match err {
            Error::ProcessStartTimeout { side, reason } => {
                assert_eq!(side, "reference");
                assert!(reason.contains("before signalling readiness"), "{reason}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(server.readiness(), Readiness::Failed);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_start_fault() {
        let spec = ServerSpec {
            label: "candidate".to_string(),
            program: "/nonexistent/snake-server".to_string(),
            args: vec![],
            port: 8103,
        };
        let err = EphemeralServerProcess::launch(&spec).unwrap_err();
        assert!(matches!(err, Error::ProcessStartTimeout { ref side, .. } if side == "candidate"));
    }

    #[test]
    fn test_spec_endpoint() {
        let spec = shell_server("x", "true", 9000);
        assert_eq!(spec.endpoint(), "http://127.0.0.1:9000");
    }
}
