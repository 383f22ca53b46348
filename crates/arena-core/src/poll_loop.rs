//! Submission poll loop.
//!
//! Waits for a remote job to finish. Every iteration sleeps the poll
//! interval, fetches a snapshot and advances an explicit state machine:
//!
//! ```text
//! AwaitingJob --(any status but not_found)--> Running --(complete)--> Complete
//!      |                                         |
//!      +--(failed)-------------------------------+--(failed)-------> Failed
//! ```
//!
//! Newly observed sub-matches are streamed to the caller exactly once and in
//! order. The loop ends with `JobNeverStarted` when the job stays unknown past
//! the not-found grace, and with `PollTimeout` (or `BackendFailure` if the
//! job was never seen and queries kept failing) at the poll ceiling.

use arena_adapters::JobStatusSource;
use arena_proto::{Error, JobSnapshot, JobStatus, MatchResult, MatchSummary, Result};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Stand-in deadline when the configured budget does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365);

/// Timing budget of the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Sleep before each status query.
    pub interval: Duration,
    /// Not-found answers tolerated before the job counts as never started.
    pub not_found_grace: u32,
    /// Total status queries before giving up.
    pub max_polls: u32,
}

impl PollSettings {
    /// Total wall-clock wait: one interval per allowed poll.
    pub fn budget(&self) -> Duration {
        self.interval.saturating_mul(self.max_polls)
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            not_found_grace: 20,
            max_polls: 100,
        }
    }
}

/// Where the loop is in the job's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    /// Submitted, but the backend has not reported the job yet.
    AwaitingJob,
    Running,
    Complete,
    Failed,
}

/// Local bookkeeping for one job.
#[derive(Debug, Clone)]
pub struct PollState {
    job_id: String,
    last_observed_match_count: usize,
    polls_elapsed: u32,
    not_found_polls: u32,
    started_at: Instant,
    deadline: Instant,
    phase: PollPhase,
    total_opponents: Option<u32>,
    last_error: Option<String>,
}

impl PollState {
    fn new(job_id: &str, budget: Duration) -> Self {
        let started_at = Instant::now();
        Self {
            job_id: job_id.to_string(),
            last_observed_match_count: 0,
            polls_elapsed: 0,
            not_found_polls: 0,
            started_at,
            deadline: started_at
                .checked_add(budget)
                .unwrap_or_else(|| started_at + FAR_FUTURE),
            phase: PollPhase::AwaitingJob,
            total_opponents: None,
            last_error: None,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Sub-matches already handed to the caller.
    pub fn last_observed_match_count(&self) -> usize {
        self.last_observed_match_count
    }

    pub fn polls_elapsed(&self) -> u32 {
        self.polls_elapsed
    }

    pub fn phase(&self) -> PollPhase {
        self.phase
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Wall-clock instant at which the loop gives up.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    fn progress(&self) -> PollProgress {
        PollProgress {
            phase: self.phase,
            polls: self.polls_elapsed,
            matches_seen: self.last_observed_match_count,
            total_opponents: self.total_opponents,
            elapsed: self.elapsed(),
        }
    }

    /// Emits every sub-match past the ones already seen, in order.
    fn emit_new_matches<F>(&mut self, matches: &[MatchSummary], on_match: &mut F)
    where
        F: FnMut(usize, &MatchSummary),
    {
        if matches.len() < self.last_observed_match_count {
            warn!(
                job_id = %self.job_id,
                reported = matches.len(),
                seen = self.last_observed_match_count,
                "Match history shrank, ignoring"
            );
            return;
        }
        for (index, summary) in matches
            .iter()
            .enumerate()
            .skip(self.last_observed_match_count)
        {
            on_match(index, summary);
        }
        self.last_observed_match_count = matches.len();
    }
}

/// Snapshot handed to the progress callback after every non-terminal poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollProgress {
    pub phase: PollPhase,
    pub polls: u32,
    pub matches_seen: usize,
    /// Opponents the backend plans to play, when it says.
    pub total_opponents: Option<u32>,
    pub elapsed: Duration,
}

/// Drives one job to a terminal state.
pub struct SubmissionPollLoop<'a, S: ?Sized> {
    source: &'a S,
    settings: PollSettings,
}

impl<'a, S> SubmissionPollLoop<'a, S>
where
    S: JobStatusSource + ?Sized,
{
    pub fn new(source: &'a S, settings: PollSettings) -> Self {
        Self { source, settings }
    }

    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    /// Polls until the job completes or fails, streaming each new sub-match
    /// to `on_match` with its index in the job's history.
    ///
    /// A failed job resolves to an `Error`-outcome result carrying the job's
    /// message; only budget exhaustion and never-started jobs are faults.
    pub async fn await_completion<F>(&self, job_id: &str, on_match: F) -> Result<MatchResult>
    where
        F: FnMut(usize, &MatchSummary),
    {
        self.await_with_progress(job_id, on_match, |_| {}).await
    }

    /// Like [`await_completion`](Self::await_completion), additionally
    /// reporting progress after every poll that leaves the job live.
    pub async fn await_with_progress<F, P>(
        &self,
        job_id: &str,
        mut on_match: F,
        mut on_progress: P,
    ) -> Result<MatchResult>
    where
        F: FnMut(usize, &MatchSummary),
        P: FnMut(&PollProgress),
    {
        let mut state = PollState::new(job_id, self.settings.budget());
        info!(job_id, budget_secs = self.settings.budget().as_secs(), "Waiting for job to complete");

        while state.polls_elapsed < self.settings.max_polls {
            // A slow status query counts against the same budget as the sleeps.
            let query = tokio::time::timeout_at(state.deadline, async {
                tokio::time::sleep(self.settings.interval).await;
                self.source.fetch_status(job_id).await
            });
            let Ok(fetched) = query.await else {
                warn!(job_id, poll = state.polls_elapsed + 1, "Poll budget ran out mid-query");
                break;
            };
            state.polls_elapsed += 1;

            match fetched {
                Ok(snapshot) => {
                    if let Some(result) = self.observe(&mut state, snapshot, &mut on_match)? {
                        return Ok(result);
                    }
                }
                Err(e) => {
                    warn!(job_id, poll = state.polls_elapsed, error = %e, "Status query failed, retrying");
                    state.last_error = Some(e.to_string());
                }
            }
            on_progress(&state.progress());
        }

        Err(Self::exhausted(&state))
    }

    /// Applies one snapshot. Returns the final result once the job is
    /// terminal.
    fn observe<F>(
        &self,
        state: &mut PollState,
        snapshot: JobSnapshot,
        on_match: &mut F,
    ) -> Result<Option<MatchResult>>
    where
        F: FnMut(usize, &MatchSummary),
    {
        if snapshot.total_opponents.is_some() {
            state.total_opponents = snapshot.total_opponents;
        }

        if snapshot.status == JobStatus::NotFound {
            if state.phase == PollPhase::AwaitingJob {
                state.not_found_polls += 1;
                debug!(job_id = %state.job_id, not_found = state.not_found_polls, "Job not registered yet");
                if state.not_found_polls > self.settings.not_found_grace {
                    return Err(Error::JobNeverStarted {
                        job_id: state.job_id.clone(),
                        polls: state.not_found_polls,
                    });
                }
            } else {
                debug!(job_id = %state.job_id, "Known job briefly not found, treating as transient");
            }
            return Ok(None);
        }

        if state.phase == PollPhase::AwaitingJob {
            info!(job_id = %state.job_id, status = ?snapshot.status, "Job registered");
            state.phase = PollPhase::Running;
        }
        state.emit_new_matches(&snapshot.matches, on_match);

        match snapshot.status {
            JobStatus::Failed => {
                state.phase = PollPhase::Failed;
                let message = snapshot
                    .error
                    .unwrap_or_else(|| "job failed without an error message".to_string());
                warn!(job_id = %state.job_id, %message, "Job failed");
                Ok(Some(MatchResult::error(message)))
            }
            JobStatus::Complete => {
                state.phase = PollPhase::Complete;
                let result = match snapshot.result {
                    Some(payload) => payload.to_match_result(),
                    None => MatchResult::error("job completed without a result payload"),
                };
                info!(job_id = %state.job_id, result = %result, "Job complete");
                Ok(Some(result))
            }
            JobStatus::Pending | JobStatus::Running | JobStatus::NotFound | JobStatus::Unknown => {
                Ok(None)
            }
        }
    }

    fn exhausted(state: &PollState) -> Error {
        match (&state.phase, &state.last_error) {
            (PollPhase::AwaitingJob, Some(last_error)) => {
                Error::BackendFailure(last_error.clone())
            }
            _ => Error::PollTimeout {
                job_id: state.job_id.clone(),
                elapsed: state.elapsed(),
            },
        }
    }
}
