//! Remote job wire types.
//!
//! These mirror what the evaluation service reports. The client never
//! mutates a job; a fresh [`JobSnapshot`] is decoded on every poll.

use crate::result::{MatchResult, Outcome};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a remote job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[serde(alias = "queued")]
    Pending,
    Running,
    #[serde(alias = "completed")]
    Complete,
    Failed,
    #[serde(alias = "notfound")]
    NotFound,
    /// A status string this client does not know. Treated as a live job.
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    /// Returns true for statuses after which the job never changes again.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed)
    }
}

/// One finished sub-match of a remote evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSummary {
    pub opponent: String,
    pub outcome: Outcome,
    #[serde(default)]
    pub turns: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,
}

/// Final payload of a completed job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    /// Overall outcome, when the backend reports one.
    #[serde(default)]
    pub outcome: Option<Outcome>,
    #[serde(default)]
    pub turns: u32,
    #[serde(default)]
    pub winner: Option<String>,
    #[serde(default)]
    pub wins: u32,
    #[serde(default)]
    pub losses: u32,
    #[serde(default)]
    pub draws: u32,
    #[serde(default)]
    pub message: Option<String>,
}

impl JobResult {
    /// Converts the payload into the uniform [`MatchResult`].
    ///
    /// Without an explicit outcome the win/loss tally decides.
    pub fn to_match_result(&self) -> MatchResult {
        let outcome = self.outcome.unwrap_or(match self.wins.cmp(&self.losses) {
            std::cmp::Ordering::Greater => Outcome::Win,
            std::cmp::Ordering::Less => Outcome::Loss,
            std::cmp::Ordering::Equal => Outcome::Draw,
        });
        let result = MatchResult::new(
            outcome,
            self.turns,
            self.winner.clone().unwrap_or_default(),
        );
        match &self.message {
            Some(message) => result.with_diagnostic(message.clone()),
            None => result,
        }
    }
}

/// Snapshot of a job as returned by a status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub job_id: String,
    pub status: JobStatus,
    /// Append-only history of finished sub-matches.
    #[serde(default)]
    pub matches: Vec<MatchSummary>,
    #[serde(default)]
    pub total_opponents: Option<u32>,
    #[serde(default)]
    pub result: Option<JobResult>,
    #[serde(default)]
    pub error: Option<String>,
}

impl JobSnapshot {
    /// Snapshot for a job the backend does not (yet) know about.
    pub fn not_found(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::NotFound,
            matches: Vec::new(),
            total_opponents: None,
            result: None,
            error: None,
        }
    }
}

/// Code submission sent to the evaluation service.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub code: String,
    pub language: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub game: String,
}

/// Accepted submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitResponse {
    /// Evaluation continues asynchronously under this job id.
    Queued { job_id: String },
    /// The service evaluated the code synchronously.
    Completed(JobResult),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_decodes_camel_case() {
        let json = r#"{
            "jobId": "job-1",
            "status": "running",
            "matches": [
                {"opponent": "aggressive-hunter", "outcome": "win", "turns": 120}
            ],
            "totalOpponents": 3
        }"#;
        let snapshot: JobSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.job_id, "job-1");
        assert_eq!(snapshot.status, JobStatus::Running);
        assert_eq!(snapshot.matches.len(), 1);
        assert_eq!(snapshot.matches[0].outcome, Outcome::Win);
        assert_eq!(snapshot.total_opponents, Some(3));
        assert!(snapshot.result.is_none());
    }

    #[test]
    fn test_unknown_status_is_not_terminal() {
        let snapshot: JobSnapshot =
            serde_json::from_str(r#"{"jobId": "j", "status": "warming_up"}"#).unwrap();
        assert_eq!(snapshot.status, JobStatus::Unknown);
        assert!(!snapshot.status.is_terminal());
    }

    #[test]
    fn test_status_aliases() {
        let queued: JobStatus = serde_json::from_str("\"queued\"").unwrap();
        let completed: JobStatus = serde_json::from_str("\"completed\"").unwrap();
        assert_eq!(queued, JobStatus::Pending);
        assert_eq!(completed, JobStatus::Complete);
        assert!(completed.is_terminal());
    }

    #[test]
    fn test_job_result_uses_tally_without_outcome() {
        let result = JobResult {
            wins: 1,
            losses: 2,
            ..JobResult::default()
        };
        assert_eq!(result.to_match_result().outcome(), Outcome::Loss);

        let explicit = JobResult {
            outcome: Some(Outcome::Win),
            turns: 88,
            winner: Some("me".to_string()),
            ..JobResult::default()
        };
        let converted = explicit.to_match_result();
        assert_eq!(converted.outcome(), Outcome::Win);
        assert_eq!(converted.turn_count(), 88);
        assert_eq!(converted.raw_winner_label(), "me");
    }

    #[test]
    fn test_submit_request_skips_missing_model() {
        let request = SubmitRequest {
            code: "def decide_move(d): return 'up'".to_string(),
            language: "python".to_string(),
            name: "my-snake".to_string(),
            model: None,
            game: "battlesnake".to_string(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("model").is_none());
        assert_eq!(json["language"], "python");
    }
}
