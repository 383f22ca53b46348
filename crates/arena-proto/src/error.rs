//! Error types shared across Snake Arena.

use std::time::Duration;

/// Faults surfaced by the match runner and the submission poll loop.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A contestant server never printed its readiness marker.
    #[error("{side} server did not become ready: {reason}")]
    ProcessStartTimeout { side: String, reason: String },

    /// The engine exited abnormally without leaving a trace behind.
    #[error("match engine failed (exit code {}): {diagnostic}", display_code(.exit_code))]
    EngineFailure {
        exit_code: Option<i32>,
        diagnostic: String,
    },

    /// The engine ran past the match timeout and was terminated.
    #[error("match engine did not finish within {0:?}")]
    MatchTimeout(Duration),

    /// A trace was present but too short to read a result from.
    #[error("malformed trace: {0}")]
    MalformedOutput(String),

    /// Status queries kept failing until the poll budget ran out.
    #[error("evaluation backend unavailable: {0}")]
    BackendFailure(String),

    /// The backend never registered the submitted job.
    #[error("job {job_id} was not registered after {polls} status checks")]
    JobNeverStarted { job_id: String, polls: u32 },

    /// The job did not reach a terminal status within the wait budget.
    #[error("job {job_id} did not finish within {elapsed:?}")]
    PollTimeout { job_id: String, elapsed: Duration },

    /// The submission was rejected until the retry window passes.
    #[error("submission rate limited, retry after {}s", .retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn display_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

impl Error {
    /// Returns the process exit code for this fault.
    ///
    /// - 1: the match or job could not produce a result
    /// - 2: a wall-clock or rate budget was exhausted
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::ProcessStartTimeout { .. }
            | Error::EngineFailure { .. }
            | Error::MalformedOutput(_)
            | Error::BackendFailure(_)
            | Error::JobNeverStarted { .. }
            | Error::Io(_) => 1,
            Error::MatchTimeout(_) | Error::PollTimeout { .. } | Error::RateLimited { .. } => 2,
        }
    }

    /// Short machine-readable name of the fault.
    pub fn as_str(&self) -> &'static str {
        match self {
            Error::ProcessStartTimeout { .. } => "process_start_timeout",
            Error::EngineFailure { .. } => "engine_failure",
            Error::MatchTimeout(_) => "match_timeout",
            Error::MalformedOutput(_) => "malformed_output",
            Error::BackendFailure(_) => "backend_failure",
            Error::JobNeverStarted { .. } => "job_never_started",
            Error::PollTimeout { .. } => "poll_timeout",
            Error::RateLimited { .. } => "rate_limited",
            Error::Io(_) => "io",
        }
    }
}

/// Result alias used throughout the arena crates.
pub type Result<T> = std::result::Result<T, Error>;
