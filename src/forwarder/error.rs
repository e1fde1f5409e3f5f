use reqwest::StatusCode;
use thiserror::Error;

/// Failure of a single send to the sensor-state endpoint
#[derive(Debug, Error)]
pub enum ForwardError {
    /// 401/403: the token is wrong. Never retried.
    #[error("endpoint rejected the access token ({status})")]
    Auth { status: StatusCode },

    /// 5xx, timeout or network failure. Retried with backoff.
    #[error("transient delivery failure: {reason}")]
    Transient { reason: String },

    /// Any other non-2xx answer, usually a payload the endpoint does not accept
    #[error("endpoint refused the update ({status}): {body}")]
    Client { status: StatusCode, body: String },
}

impl ForwardError {
    pub fn is_retriable(&self) -> bool {
        matches!(self, ForwardError::Transient { .. })
    }

    /// Classifies a non-success status code.
    pub fn from_status(status: StatusCode, body: String) -> Self {
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            ForwardError::Auth { status }
        } else if status.is_server_error() {
            ForwardError::Transient {
                reason: format!("server answered {}", status),
            }
        } else {
            ForwardError::Client { status, body }
        }
    }
}

impl From<reqwest::Error> for ForwardError {
    fn from(error: reqwest::Error) -> Self {
        let kind = if error.is_timeout() {
            "timeout"
        } else if error.is_connect() {
            "connect"
        } else {
            "request"
        };
        ForwardError::Transient {
            reason: format!("{} error: {}", kind, error),
        }
    }
}
