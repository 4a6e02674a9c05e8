use std::time::Duration;
use thiserror::Error;

use crate::model::ErrorKind;

/// Failure of one Canvas REST call, classified by how callers should react.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("canvas rejected the access token ({status})")]
    Auth { status: u16 },
    #[error("canvas resource not found: {path}")]
    NotFound { path: String },
    #[error("rate limited by canvas")]
    RateLimited { retry_after: Option<Duration> },
    #[error("canvas server error {status}: {body}")]
    Server { status: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("canvas request failed {status}: {body}")]
    Client { status: u16, body: String },
    #[error("invalid canvas response: {0}")]
    Decode(String),
    #[error("invalid canvas request: {0}")]
    InvalidRequest(String),
}

impl FetchError {
    /// Map a non-2xx status onto the error taxonomy.
    pub fn from_status(status: u16, path: &str, body: String, retry_after: Option<Duration>) -> Self {
        match status {
            401 | 403 => FetchError::Auth { status },
            404 => FetchError::NotFound {
                path: path.to_string(),
            },
            429 => FetchError::RateLimited { retry_after },
            500..=599 => FetchError::Server { status, body },
            _ => FetchError::Client { status, body },
        }
    }

    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_builder() {
            return FetchError::InvalidRequest(err.to_string());
        }
        if err.is_decode() {
            return FetchError::Decode(err.to_string());
        }
        FetchError::Network(err.to_string())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::RateLimited { .. } | FetchError::Server { .. } | FetchError::Network(_)
        )
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            FetchError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Auth { .. } => ErrorKind::Auth,
            FetchError::NotFound { .. } => ErrorKind::NotFound,
            FetchError::RateLimited { .. } | FetchError::Server { .. } | FetchError::Network(_) => {
                ErrorKind::Transient
            }
            FetchError::Client { .. } | FetchError::Decode(_) | FetchError::InvalidRequest(_) => {
                ErrorKind::Validation
            }
        }
    }
}
