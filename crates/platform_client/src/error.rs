use reqwest::StatusCode;
use thiserror::Error;

/// The error taxonomy every [`crate::PlatformClient`] call reports into (§7).
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Network failure, 5xx, or timeout — safe to retry with backoff.
    #[error("transient platform error: {0}")]
    Transient(String),
    /// 401 — the access token is dead; the next refresh-loop tick should fix it.
    #[error("platform request was unauthorized")]
    Unauthorized,
    /// 429 or a daily-quota response body.
    #[error("platform quota exceeded")]
    QuotaExceeded,
    /// 404 on a resource, or 410 from the WebSub hub.
    #[error("platform resource not found")]
    NotFound,
    /// Response body didn't parse into the shape we expected.
    #[error("malformed platform response: {0}")]
    Malformed(String),
}

impl PlatformError {
    /// Maps a completed HTTP response's status code to an error class.
    /// Call sites still need to inspect the body for quota-specific 4xx shapes
    /// the Platform uses instead of a bare 429.
    pub fn from_status(status: StatusCode) -> Option<Self> {
        if status.is_success() {
            return None;
        }

        Some(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Unauthorized,
            StatusCode::TOO_MANY_REQUESTS => Self::QuotaExceeded,
            StatusCode::NOT_FOUND | StatusCode::GONE => Self::NotFound,
            status if status.is_server_error() => {
                Self::Transient(format!("platform returned {status}"))
            }
            status => Self::Transient(format!("platform returned {status}")),
        })
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<reqwest::Error> for PlatformError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() || error.is_connect() {
            Self::Transient(error.to_string())
        } else {
            Self::Transient(error.to_string())
        }
    }
}

impl From<serde_json::Error> for PlatformError {
    fn from(error: serde_json::Error) -> Self {
        Self::Malformed(error.to_string())
    }
}
