//! Error taxonomy for REST calls.

use log::{error, info};
use reqwest::StatusCode;
use serde_json::Value;

/// Coarse classification of an [`ApiError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The server answered with a non-success status.
    Server,
    /// The request was sent but no response arrived (includes timeouts and
    /// cancellations).
    NoResponse,
    /// The request could not be built or sent.
    Setup,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP {}: {}", .status.as_u16(), describe(.status, .message))]
    Status {
        status: StatusCode,
        message: Option<String>,
    },

    #[error("Request canceled: {reason}")]
    Cancelled { reason: String },

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("No response received from {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request error: {0}")]
    Setup(String),
}

impl ApiError {
    /// Builds a status error, pulling the server's message out of a JSON
    /// body of the form `{"error": "..."}` when there is one.
    pub fn from_response_body(status: StatusCode, body: &str) -> Self {
        let message = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| match v.get("error") {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Object(o)) => o
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                _ => None,
            });
        ApiError::Status { status, message }
    }

    /// Maps a transport failure from reqwest.
    pub(crate) fn from_transport(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout {
                url: url.to_string(),
            }
        } else if err.is_builder() {
            ApiError::Setup(err.to_string())
        } else {
            ApiError::Network {
                url: url.to_string(),
                source: err,
            }
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Status { .. } => ErrorKind::Server,
            ApiError::Cancelled { .. } | ApiError::Timeout { .. } | ApiError::Network { .. } => {
                ErrorKind::NoResponse
            }
            ApiError::Setup(_) => ErrorKind::Setup,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, ApiError::Cancelled { .. })
    }

    /// Logs the error according to its class. The error itself is left for
    /// the caller to propagate.
    pub fn log(&self, base_url: &str) {
        match self {
            ApiError::Cancelled { reason } => {
                info!("[API] Request canceled: {}", reason);
            }
            ApiError::Status { status, message } => {
                error!("[API] Error {}: {}", status.as_u16(), describe(status, message));
            }
            ApiError::Timeout { url } => {
                error!("[API] No response received: request to {} timed out", url);
            }
            ApiError::Network { source, .. } => {
                error!("[API] No response received: {}", source);
                error!(
                    "[API] This may be a connectivity or CORS issue. Check that the backend server is running at {}",
                    base_url
                );
            }
            ApiError::Setup(message) => {
                error!("[API] Request error: {}", message);
            }
        }
    }
}

fn describe<'a>(status: &StatusCode, message: &'a Option<String>) -> &'a str {
    message
        .as_deref()
        .or(status.canonical_reason())
        .unwrap_or("request failed")
}
