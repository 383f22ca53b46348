//! # arena-core
//!
//! Match orchestration for Snake Arena.
//!
//! This crate provides:
//! - Configuration loading and validation (`arena.yml`)
//! - The local match runner: two decision servers, one engine run, guaranteed teardown
//! - Trace parsing into a uniform `MatchResult`
//! - Best-of-N series against reference opponents
//! - The submission poll loop that waits on remote evaluation jobs

mod config;
mod poll_loop;
mod runner;
mod series;
mod trace;
pub mod testing;

pub use config::{
    API_URL_ENV, ArenaConfig, ConfigError, ConfigWarning, EngineConfig, GameKind, LocalConfig,
    RemoteConfig, ServerCommand, TOKEN_ENV,
};
pub use poll_loop::{PollPhase, PollProgress, PollSettings, PollState, SubmissionPollLoop};
pub use runner::{DEFAULT_READY_MARKER, EngineSetup, LocalMatchRunner, RunnerSettings};
pub use series::{SeriesReport, run_series};
pub use trace::{interpret_trace, parse_trace};
