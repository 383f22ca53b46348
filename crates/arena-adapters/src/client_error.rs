//! Errors from the remote evaluation API.

use std::time::Duration;

/// Maximum length of a response body echoed into an error message.
const MAX_MESSAGE_LEN: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Network failure, request timeout or undecodable body.
    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The service asked us to back off.
    #[error("rate limited, retry after {}s", .retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    /// A success response without the fields we need.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl ClientError {
    /// Builds a `Status` error from a failed response, extracting the
    /// service's `error`/`message` field when the body is JSON.
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "failed to read response text".to_string());
        ClientError::Status {
            status,
            message: error_message(&body),
        }
    }

    /// The back-off window, when the service supplied one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ClientError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

impl From<ClientError> for arena_proto::Error {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::RateLimited { retry_after } => {
                arena_proto::Error::RateLimited { retry_after }
            }
            other => arena_proto::Error::BackendFailure(other.to_string()),
        }
    }
}

pub(crate) fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["error", "message"] {
            if let Some(message) = value.get(key).and_then(|v| v.as_str()) {
                return message.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.chars().count() > MAX_MESSAGE_LEN {
        let truncated: String = trimmed.chars().take(MAX_MESSAGE_LEN).collect();
        format!("{truncated}...")
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_prefers_json_fields() {
        assert_eq!(error_message(r#"{"error": "invalid code"}"#), "invalid code");
        assert_eq!(error_message(r#"{"message": "slow down"}"#), "slow down");
        assert_eq!(error_message("  Bad Gateway \n"), "Bad Gateway");
    }

    #[test]
    fn test_error_message_truncates_long_bodies() {
        let body = "x".repeat(500);
        let message = error_message(&body);
        assert_eq!(message.len(), MAX_MESSAGE_LEN + 3);
        assert!(message.ends_with("..."));
    }

    #[test]
    fn test_conversion_into_arena_error() {
        let limited = ClientError::RateLimited {
            retry_after: Duration::from_secs(120),
        };
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(120)));
        let converted: arena_proto::Error = limited.into();
        assert!(matches!(
            converted,
            arena_proto::Error::RateLimited { retry_after } if retry_after.as_secs() == 120
        ));

        let status = ClientError::Status {
            status: 503,
            message: "maintenance".to_string(),
        };
        let converted: arena_proto::Error = status.into();
        match converted {
            arena_proto::Error::BackendFailure(message) => {
                assert_eq!(message, "HTTP 503: maintenance");
            }
            other => panic!("unexpected conversion: {other:?}"),
        }
    }
}
