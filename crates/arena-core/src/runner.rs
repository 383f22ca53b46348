//! Local match runner.
//!
//! Stands up both decision servers, waits for them to become ready, runs the
//! engine against them and parses the trace. Servers and the scratch
//! directory are released by a drop guard, so teardown happens exactly once
//! whether the match succeeds, faults, times out or is cancelled.

use arena_adapters::{DecisionServer, EngineRun, ProcessLauncher, ServerSpec, SystemLauncher};
use arena_proto::{Error, MatchResult, Result};
use futures::future::try_join_all;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, GameKind};
use crate::trace::interpret_trace;

/// Readiness marker printed by the stock server wrapper.
pub const DEFAULT_READY_MARKER: &str = "server on port";

/// File name of the engine trace inside the scratch directory.
const TRACE_FILE: &str = "trace.jsonl";

/// Timeouts and paths for a runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerSettings {
    /// Stdout substring that marks a server as ready (case-insensitive).
    pub ready_marker: String,
    pub ready_timeout: Duration,
    pub match_timeout: Duration,
    /// Parent for scratch directories. System temp dir when `None`.
    pub work_root: Option<PathBuf>,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            ready_marker: DEFAULT_READY_MARKER.to_string(),
            ready_timeout: Duration::from_secs(5),
            match_timeout: Duration::from_secs(30),
            work_root: None,
        }
    }
}

/// How to run the engine for a match.
#[derive(Debug, Clone, Default)]
pub struct EngineSetup {
    pub config: EngineConfig,
    pub game: GameKind,
    pub seed: Option<u64>,
}

impl EngineSetup {
    /// Copy of this setup with a different seed.
    #[must_use]
    pub fn with_seed(&self, seed: Option<u64>) -> Self {
        Self {
            seed,
            ..self.clone()
        }
    }
}

/// Runs one candidate-vs-reference match at a time.
#[derive(Debug)]
pub struct LocalMatchRunner<L = SystemLauncher> {
    launcher: L,
    settings: RunnerSettings,
}

impl LocalMatchRunner<SystemLauncher> {
    /// Runner that spawns real child processes.
    pub fn system(settings: RunnerSettings) -> Self {
        Self::new(SystemLauncher, settings)
    }
}

impl<L: ProcessLauncher> LocalMatchRunner<L> {
    pub fn new(launcher: L, settings: RunnerSettings) -> Self {
        Self { launcher, settings }
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    /// Plays one match and reports it from the candidate's point of view.
    ///
    /// Fails with `ProcessStartTimeout` if either server never becomes
    /// ready (the engine is not started then), `MatchTimeout` if the engine
    /// overruns, and `EngineFailure` if it exits non-zero without a trace.
    /// A degenerate trace is not a failure: it yields a flagged zero-turn
    /// draw.
    pub async fn run_match(
        &self,
        candidate: &ServerSpec,
        reference: &ServerSpec,
        engine: &EngineSetup,
    ) -> Result<MatchResult> {
        let workdir = self.create_workdir()?;
        let output_path = workdir.path().join(TRACE_FILE);
        let mut teardown = scopeguard::guard(Teardown::new(workdir), Teardown::run);

        info!(
            candidate = %candidate.label,
            reference = %reference.label,
            "Starting decision servers"
        );
        teardown.servers.push(self.launcher.launch_server(candidate)?);
        teardown.servers.push(self.launcher.launch_server(reference)?);

        let marker = self.settings.ready_marker.as_str();
        let limit = self.settings.ready_timeout;
        try_join_all(
            teardown
                .servers
                .iter_mut()
                .map(|server| ready_within(server.as_mut(), marker, limit)),
        )
        .await?;

        let contestants: Vec<(&str, String)> = teardown
            .servers
            .iter()
            .map(|server| (server.label(), server.endpoint()))
            .collect();
        let invocation =
            engine
                .config
                .invocation(engine.game, &contestants, &output_path, engine.seed);

        info!(game = %engine.game, seed = ?engine.seed, "Running match engine");
        let run = self
            .launcher
            .run_engine(&invocation, self.settings.match_timeout)
            .await?;

        let result = score_run(&run, &candidate.label, &reference.label).await?;
        info!(result = %result, "Match finished");
        Ok(result)
    }

    fn create_workdir(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("snake-arena-");
        let dir = match &self.settings.work_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        debug!(path = %dir.path().display(), "Created match directory");
        Ok(dir)
    }
}

async fn ready_within(
    server: &mut dyn DecisionServer,
    marker: &str,
    limit: Duration,
) -> Result<()> {
    let side = server.label().to_string();
    let outcome = tokio::time::timeout(limit, server.wait_ready(marker)).await;
    match outcome {
        Ok(ready) => ready,
        Err(_) => {
            warn!(server = %side, timeout_secs = limit.as_secs(), "Server readiness timed out");
            Err(Error::ProcessStartTimeout {
                side,
                reason: format!("no readiness marker within {}s", limit.as_secs()),
            })
        }
    }
}

/// Turns a finished engine run into a result.
async fn score_run(run: &EngineRun, candidate: &str, reference: &str) -> Result<MatchResult> {
    if !run.trace_exists() {
        if run.success() {
            warn!("Engine exited cleanly without writing a trace");
            return Ok(MatchResult::fallback_draw(
                "engine exited cleanly without writing a trace",
            ));
        }
        let diagnostic = if run.stderr.trim().is_empty() {
            "engine produced no trace and no stderr output".to_string()
        } else {
            run.stderr.trim().to_string()
        };
        return Err(Error::EngineFailure {
            exit_code: run.exit_code,
            diagnostic,
        });
    }

    let content = tokio::fs::read_to_string(&run.output_path).await?;
    let result = interpret_trace(&content, candidate, reference);
    if run.success() || result.diagnostic().is_some() {
        return Ok(result);
    }
    let code = run
        .exit_code
        .map_or_else(|| "a signal".to_string(), |code| format!("code {code}"));
    Ok(result.with_diagnostic(format!("engine exited with {code} after writing a trace")))
}

/// Resources released when a match ends, however it ends.
struct Teardown {
    servers: Vec<Box<dyn DecisionServer>>,
    workdir: Option<TempDir>,
}

impl Teardown {
    fn new(workdir: TempDir) -> Self {
        Self {
            servers: Vec::with_capacity(2),
            workdir: Some(workdir),
        }
    }

    fn run(mut self) {
        for server in &mut self.servers {
            server.terminate();
        }
        if let Some(dir) = self.workdir.take() {
            let path = dir.path().to_path_buf();
            match dir.close() {
                Ok(()) => debug!(path = %path.display(), "Removed match directory"),
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove match directory"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{EngineBehavior, MockLauncher, ServerBehavior};
    use arena_proto::Outcome;

    fn spec(label: &str, port: u16) -> ServerSpec {
        ServerSpec {
            label: label.to_string(),
            program: "unused".to_string(),
            args: vec![],
            port,
        }
    }

    #[tokio::test]
    async fn test_non_zero_exit_with_trace_is_still_scored() {
        let launcher = MockLauncher::new(EngineBehavior::WriteTrace {
            content: "{\"turn\": 12}\n{\"winnerName\": \"reference\"}\n".to_string(),
            exit_code: 1,
        });
        let runner = LocalMatchRunner::new(launcher, RunnerSettings::default());

        let result = runner
            .run_match(&spec("candidate", 8001), &spec("reference", 8002), &EngineSetup::default())
            .await
            .unwrap();

        assert_eq!(result.outcome(), Outcome::Loss);
        assert_eq!(result.turn_count(), 12);
        assert!(result.diagnostic().unwrap().contains("code 1"));
    }

    #[tokio::test]
    async fn test_clean_exit_without_trace_is_fallback() {
        let launcher = MockLauncher::new(EngineBehavior::NoTrace {
            exit_code: 0,
            stderr: String::new(),
        });
        let runner = LocalMatchRunner::new(launcher, RunnerSettings::default());

        let result = runner
            .run_match(&spec("candidate", 8001), &spec("reference", 8002), &EngineSetup::default())
            .await
            .unwrap();

        assert!(result.is_fallback());
        assert_eq!(result.outcome(), Outcome::Draw);
    }

    #[tokio::test(start_paused = true)]
    async fn test_readiness_timeout_names_the_side() {
        let launcher = MockLauncher::new(EngineBehavior::default())
            .with_server("reference", ServerBehavior::NeverReady);
        let runner = LocalMatchRunner::new(launcher, RunnerSettings::default());

        let err = runner
            .run_match(&spec("candidate", 8001), &spec("reference", 8002), &EngineSetup::default())
            .await
            .unwrap_err();

        match err {
            Error::ProcessStartTimeout { side, reason } => {
                assert_eq!(side, "reference");
                assert!(reason.contains("5s"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(runner.launcher().engine_runs(), 0);
    }

    #[test]
    fn test_with_seed() {
        let setup = EngineSetup {
            seed: Some(1),
            ..EngineSetup::default()
        };
        assert_eq!(setup.with_seed(Some(9)).seed, Some(9));
        assert_eq!(setup.with_seed(None).game, GameKind::Battlesnake);
    }
}
