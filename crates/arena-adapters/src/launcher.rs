//! Process launching seam.
//!
//! The match runner only talks to these traits. `SystemLauncher` spawns real
//! child processes; tests provide scripted launchers instead.

use arena_proto::Result;
use async_trait::async_trait;
use std::time::Duration;

use crate::engine_process::{EngineRun, MatchEngineProcess};
use crate::server_process::{EphemeralServerProcess, ServerSpec};

/// A launched decision server as seen by the runner.
#[async_trait]
pub trait DecisionServer: Send {
    /// Contestant label.
    fn label(&self) -> &str;

    /// URL the engine uses to reach the server.
    fn endpoint(&self) -> String;

    /// Resolves once the server has signalled readiness.
    ///
    /// Not bounded in time; the caller applies the readiness timeout.
    async fn wait_ready(&mut self, marker: &str) -> Result<()>;

    /// Signals the server to stop. Must be idempotent and must not block.
    fn terminate(&mut self);
}

/// Starts decision servers and runs the match engine.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Spawns a decision server without waiting for readiness.
    fn launch_server(&self, spec: &ServerSpec) -> Result<Box<dyn DecisionServer>>;

    /// Runs the engine to completion, failing with a timeout fault once
    /// `timeout` elapses.
    async fn run_engine(&self, engine: &MatchEngineProcess, timeout: Duration)
    -> Result<EngineRun>;
}

/// Launcher backed by real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

#[async_trait]
impl DecisionServer for EphemeralServerProcess {
    fn label(&self) -> &str {
        EphemeralServerProcess::label(self)
    }

    fn endpoint(&self) -> String {
        EphemeralServerProcess::endpoint(self)
    }

    async fn wait_ready(&mut self, marker: &str) -> Result<()> {
        EphemeralServerProcess::wait_ready(self, marker).await
    }

    fn terminate(&mut self) {
        EphemeralServerProcess::terminate(self);
    }
}

#[async_trait]
impl ProcessLauncher for SystemLauncher {
    fn launch_server(&self, spec: &ServerSpec) -> Result<Box<dyn DecisionServer>> {
        Ok(Box::new(EphemeralServerProcess::launch(spec)?))
    }

    async fn run_engine(
        &self,
        engine: &MatchEngineProcess,
        timeout: Duration,
    ) -> Result<EngineRun> {
        engine.run(timeout).await
    }
}
