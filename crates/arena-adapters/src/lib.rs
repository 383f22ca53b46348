//! # arena-adapters
//!
//! Adapters between the arena orchestration core and the outside world:
//! - `EphemeralServerProcess`: one decision function served on a local port
//! - `MatchEngineProcess`: the external match simulator writing a trace file
//! - `RemoteJobClient`: submission and job-status calls to the evaluation service
//!
//! The `ProcessLauncher` and `JobStatusSource` traits are the seams the core
//! drives, so that tests can substitute scripted implementations.

mod client_error;
mod engine_process;
mod launcher;
mod process;
mod remote_client;
mod server_process;

pub use client_error::ClientError;
pub use engine_process::{EngineRun, MatchEngineProcess};
pub use launcher::{DecisionServer, ProcessLauncher, SystemLauncher};
pub use remote_client::{JobStatusSource, RemoteJobClient};
pub use server_process::{EphemeralServerProcess, Readiness, ServerSpec};
