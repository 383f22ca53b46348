//! Child process termination.
//!
//! Children get SIGTERM first. Where a caller can afford to wait, SIGKILL
//! follows once the grace period expires.

use std::time::Duration;
use tokio::process::Child;
use tracing::debug;

/// Time a child gets between SIGTERM and SIGKILL.
pub(crate) const TERMINATION_GRACE: Duration = Duration::from_secs(2);

/// Sends SIGTERM to the child. Does nothing once the child has been reaped.
///
/// Synchronous so that it can run from drop guards.
#[cfg(unix)]
pub(crate) fn signal_terminate(child: &mut Child) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    if let Some(id) = child.id() {
        let pid = Pid::from_raw(id as i32);
        debug!(%pid, "Sending SIGTERM");
        let _ = kill(pid, Signal::SIGTERM);
    }
}

/// Kills the child. Non-Unix platforms have no graceful signal to send.
#[cfg(not(unix))]
pub(crate) fn signal_terminate(child: &mut Child) {
    debug!("Killing child process");
    let _ = child.start_kill();
}

/// Terminates the child and reaps it.
///
/// Sends SIGTERM, waits up to `grace` for the child to exit, then sends
/// SIGKILL.
pub(crate) async fn shutdown(child: &mut Child, grace: Duration) {
    signal_terminate(child);
    if tokio::time::timeout(grace, child.wait()).await.is_err() {
        debug!(grace_ms = grace.as_millis() as u64, "Grace period expired, sending SIGKILL");
        let _ = child.kill().await;
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tokio::process::Command;

    #[tokio::test]
    async fn test_shutdown_stops_sleeping_child() {
        let mut child = Command::new("sleep")
            .arg("30")
            .stdout(Stdio::null())
            .spawn()
            .unwrap();

        shutdown(&mut child, Duration::from_secs(2)).await;

        let status = child.try_wait().unwrap();
        assert!(status.is_some(), "child should have been reaped");
        assert!(!status.unwrap().success());
    }

    #[tokio::test]
    async fn test_shutdown_escalates_when_sigterm_is_ignored() {
        let mut child = Command::new("sh")
            .args(["-c", "trap '' TERM; sleep 30"])
            .stdout(Stdio::null())
            .spawn()
            .unwrap();
        // Let the shell install its trap before signalling.
        tokio::time::sleep(Duration::from_millis(200)).await;

        shutdown(&mut child, Duration::from_millis(200)).await;

        assert!(child.try_wait().unwrap().is_some());
    }
}
