//! HTTP client for the remote evaluation service.
//!
//! Two calls: submit a strategy and fetch a job snapshot. Everything else
//! about remote evaluation lives in the poll loop.

use arena_proto::{JobResult, JobSnapshot, SubmitRequest, SubmitResponse};
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::time::Duration;
use tracing::debug;

use crate::client_error::ClientError;

/// Back-off used when a 429 carries no usable retry hint.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Source of job snapshots for the poll loop.
#[async_trait]
pub trait JobStatusSource: Send + Sync {
    async fn fetch_status(&self, job_id: &str) -> Result<JobSnapshot, ClientError>;
}

/// Client for the submission API.
#[derive(Debug, Clone)]
pub struct RemoteJobClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl RemoteJobClient {
    /// Creates a client. `request_timeout` bounds every individual call.
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("snake-arena/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Sends `token` as a bearer credential on every call.
    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Submits a strategy for evaluation.
    ///
    /// The service either queues a job or, for cached submissions, answers
    /// with the final result straight away.
    pub async fn submit(&self, request: &SubmitRequest) -> Result<SubmitResponse, ClientError> {
        let url = format!("{}/api/submissions", self.base_url);
        debug!(%url, name = %request.name, language = %request.language, "Submitting strategy");

        let response = self.authorized(self.http.post(&url)).json(request).send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let header_hint = retry_after_header(response.headers());
            let body = response.text().await.unwrap_or_default();
            let retry_after = header_hint
                .or_else(|| retry_after_body(&body))
                .unwrap_or(DEFAULT_RETRY_AFTER);
            return Err(ClientError::RateLimited { retry_after });
        }
        if !status.is_success() {
            return Err(ClientError::from_response(response).await);
        }

        let body = response.text().await?;
        parse_submit_body(&body)
    }

    /// Fetches the current snapshot of a job. A 404 is reported as a
    /// `NotFound` snapshot rather than an error.
    pub async fn status(&self, job_id: &str) -> Result<JobSnapshot, ClientError> {
        let url = format!("{}/api/jobs/{}", self.base_url, job_id);
        let response = self.authorized(self.http.get(&url)).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(JobSnapshot::not_found(job_id));
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ClientError::RateLimited {
                retry_after: retry_after_header(response.headers()).unwrap_or(DEFAULT_RETRY_AFTER),
            });
        }
        if !status.is_success() {
            return Err(ClientError::from_response(response).await);
        }

        let mut snapshot: JobSnapshot = response.json().await?;
        if snapshot.job_id.is_empty() {
            snapshot.job_id = job_id.to_string();
        }
        Ok(snapshot)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[async_trait]
impl JobStatusSource for RemoteJobClient {
    async fn fetch_status(&self, job_id: &str) -> Result<JobSnapshot, ClientError> {
        self.status(job_id).await
    }
}

/// Reads a `Retry-After` header given in seconds.
pub(crate) fn retry_after_header(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Reads a `retryAfter` seconds field from a JSON error body.
pub(crate) fn retry_after_body(body: &str) -> Option<Duration> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("retryAfter")?
        .as_u64()
        .map(Duration::from_secs)
}

/// Interprets a successful submission body.
///
/// A body with a `jobId` is a queued job. A body with a `result` object is an
/// immediate answer.
pub(crate) fn parse_submit_body(body: &str) -> Result<SubmitResponse, ClientError> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| ClientError::UnexpectedResponse(format!("invalid JSON: {e}")))?;

    if let Some(job_id) = value.get("jobId").and_then(|v| v.as_str()) {
        return Ok(SubmitResponse::Queued {
            job_id: job_id.to_string(),
        });
    }
    if let Some(result) = value.get("result") {
        let result: JobResult = serde_json::from_value(result.clone())
            .map_err(|e| ClientError::UnexpectedResponse(format!("invalid result: {e}")))?;
        return Ok(SubmitResponse::Completed(result));
    }
    Err(ClientError::UnexpectedResponse(
        "submission response has neither jobId nor result".to_string(),
    ))
}
