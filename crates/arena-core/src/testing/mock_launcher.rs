//! Mock process launcher for runner tests.
//!
//! Servers and the engine follow scripted behaviors, and every launch,
//! termination and engine run is recorded for assertions.

use arena_adapters::{DecisionServer, EngineRun, MatchEngineProcess, ProcessLauncher, ServerSpec};
use arena_proto::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// How a mock decision server starts up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerBehavior {
    #[default]
    Ready,
    /// Never prints the readiness marker.
    NeverReady,
    /// Exits before printing the readiness marker.
    ExitsEarly,
    /// The program cannot be spawned at all.
    FailsToSpawn,
}

/// How the mock engine behaves once started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineBehavior {
    /// Writes `content` as the trace and exits with `exit_code`.
    WriteTrace { content: String, exit_code: i32 },
    /// Exits with `exit_code` without writing a trace.
    NoTrace { exit_code: i32, stderr: String },
    /// Runs past the match timeout.
    Overrun,
    /// Never finishes; for cancellation tests.
    Stall,
}

impl Default for EngineBehavior {
    fn default() -> Self {
        EngineBehavior::WriteTrace {
            content: "{\"turn\": 42}\n{\"winnerName\": \"candidate\", \"isDraw\": false}\n"
                .to_string(),
            exit_code: 0,
        }
    }
}

#[derive(Debug, Default)]
struct LaunchLog {
    launched: Vec<String>,
    terminated: Vec<String>,
    output_paths: Vec<PathBuf>,
    seeds: Vec<Option<u64>>,
}

/// Launcher whose servers and engine follow scripted behaviors.
///
/// Clones share one log.
#[derive(Debug, Clone)]
pub struct MockLauncher {
    servers: HashMap<String, ServerBehavior>,
    engine: EngineBehavior,
    log: Arc<Mutex<LaunchLog>>,
}

impl MockLauncher {
    /// All servers become ready; the engine follows `engine`.
    pub fn new(engine: EngineBehavior) -> Self {
        Self {
            servers: HashMap::new(),
            engine,
            log: Arc::new(Mutex::new(LaunchLog::default())),
        }
    }

    /// Scripts the server labelled `label`.
    pub fn with_server(mut self, label: &str, behavior: ServerBehavior) -> Self {
        self.servers.insert(label.to_string(), behavior);
        self
    }

    /// Labels of launched servers, in launch order.
    pub fn launches(&self) -> Vec<String> {
        self.log().launched.clone()
    }

    /// Labels passed to `terminate`, one entry per call.
    pub fn terminated(&self) -> Vec<String> {
        self.log().terminated.clone()
    }

    pub fn terminations(&self) -> usize {
        self.log().terminated.len()
    }

    pub fn engine_runs(&self) -> usize {
        self.log().output_paths.len()
    }

    /// Trace paths handed to the engine, one per run.
    pub fn output_paths(&self) -> Vec<PathBuf> {
        self.log().output_paths.clone()
    }

    /// `--seed` values passed to the engine, one per run.
    pub fn seeds(&self) -> Vec<Option<u64>> {
        self.log().seeds.clone()
    }

    fn log(&self) -> MutexGuard<'_, LaunchLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ProcessLauncher for MockLauncher {
    fn launch_server(&self, spec: &ServerSpec) -> Result<Box<dyn DecisionServer>> {
        let behavior = self.servers.get(&spec.label).copied().unwrap_or_default();
        if behavior == ServerBehavior::FailsToSpawn {
            return Err(Error::ProcessStartTimeout {
                side: spec.label.clone(),
                reason: format!("failed to spawn `{}`", spec.program),
            });
        }
        self.log().launched.push(spec.label.clone());
        Ok(Box::new(MockServer {
            label: spec.label.clone(),
            port: spec.port,
            behavior,
            log: Arc::clone(&self.log),
        }))
    }

    async fn run_engine(
        &self,
        engine: &MatchEngineProcess,
        timeout: Duration,
    ) -> Result<EngineRun> {
        {
            let mut log = self.log();
            log.output_paths.push(engine.output_path().to_path_buf());
            log.seeds.push(seed_argument(engine.arguments()));
        }
        let output_path = engine.output_path().to_path_buf();

        match &self.engine {
            EngineBehavior::WriteTrace { content, exit_code } => {
                tokio::fs::write(&output_path, content).await?;
                Ok(EngineRun {
                    exit_code: Some(*exit_code),
                    stderr: String::new(),
                    output_path,
                })
            }
            EngineBehavior::NoTrace { exit_code, stderr } => Ok(EngineRun {
                exit_code: Some(*exit_code),
                stderr: stderr.clone(),
                output_path,
            }),
            EngineBehavior::Overrun => {
                tokio::time::sleep(timeout).await;
                Err(Error::MatchTimeout(timeout))
            }
            EngineBehavior::Stall => std::future::pending().await,
        }
    }
}

fn seed_argument(arguments: &[String]) -> Option<u64> {
    arguments
        .windows(2)
        .find(|pair| pair[0] == "--seed")
        .and_then(|pair| pair[1].parse().ok())
}

struct MockServer {
    label: String,
    port: u16,
    behavior: ServerBehavior,
    log: Arc<Mutex<LaunchLog>>,
}

#[async_trait]
impl DecisionServer for MockServer {
    fn label(&self) -> &str {
        &self.label
    }

    fn endpoint(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    async fn wait_ready(&mut self, _marker: &str) -> Result<()> {
        match self.behavior {
            ServerBehavior::Ready | ServerBehavior::FailsToSpawn => Ok(()),
            ServerBehavior::NeverReady => std::future::pending().await,
            ServerBehavior::ExitsEarly => Err(Error::ProcessStartTimeout {
                side: self.label.clone(),
                reason: "exited (exit status: 1) before signalling readiness".to_string(),
            }),
        }
    }

    fn terminate(&mut self) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .terminated
            .push(self.label.clone());
    }
}
