//! Scripted job status source.

use arena_adapters::{ClientError, JobStatusSource};
use arena_proto::{JobSnapshot, JobStatus, MatchSummary, Outcome};
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// One scripted answer to a status query.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Snapshot(JobSnapshot),
    /// The query fails with a 503 carrying this message.
    Fail(String),
}

/// Answers status queries from a script, one step per call.
///
/// Once the script runs out the last step is repeated, so a single step
/// describes a job stuck in that state.
#[derive(Debug)]
pub struct ScriptedStatusSource {
    steps: Vec<ScriptStep>,
    cursor: Mutex<usize>,
    calls: AtomicUsize,
}

impl ScriptedStatusSource {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps,
            cursor: Mutex::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of status queries answered so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Option<ScriptStep> {
        let mut cursor = self.cursor.lock().unwrap_or_else(|e| e.into_inner());
        let step = self.steps.get(*cursor).or_else(|| self.steps.last()).cloned();
        if *cursor < self.steps.len() {
            *cursor += 1;
        }
        step
    }
}

#[async_trait]
impl JobStatusSource for ScriptedStatusSource {
    async fn fetch_status(&self, job_id: &str) -> Result<JobSnapshot, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.next_step() {
            Some(ScriptStep::Snapshot(snapshot)) => Ok(snapshot),
            Some(ScriptStep::Fail(message)) => Err(ClientError::Status {
                status: 503,
                message,
            }),
            None => Ok(JobSnapshot::not_found(job_id)),
        }
    }
}

/// Snapshot of `job_id` in `status` with one won match per opponent.
pub fn job_snapshot(job_id: &str, status: JobStatus, opponents: &[&str]) -> JobSnapshot {
    let mut snapshot = JobSnapshot::not_found(job_id);
    snapshot.status = status;
    snapshot.matches = opponents
        .iter()
        .map(|opponent| match_summary(opponent, Outcome::Win))
        .collect();
    snapshot
}

/// A finished sub-match against `opponent`.
pub fn match_summary(opponent: &str, outcome: Outcome) -> MatchSummary {
    MatchSummary {
        opponent: opponent.to_string(),
        outcome,
        turns: 100,
        winner: None,
    }
}
