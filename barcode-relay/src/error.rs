//! Relay error types
//!
//! Every failure is surfaced to the caller as a server error. Nothing here
//! is retried; the caller is already in a poll loop.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;

/// Maximum number of upstream body bytes kept in an `UpstreamError`
const REASON_LIMIT: usize = 256;

#[derive(Debug, Error)]
pub enum RelayError {
    /// Upstream unreachable, connection refused, or timed out.
    #[error("Transport failure: {message}")]
    TransportFailure { message: String, timed_out: bool },

    /// Upstream answered with a non-success status.
    #[error("Upstream error (status {status}): {reason}")]
    UpstreamError { status: u16, reason: String },

    /// Upstream answered 2xx but `results[0].doc` is missing.
    #[error("Malformed upstream response: {0}")]
    MalformedUpstreamResponse(String),
}

impl RelayError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::TransportFailure {
            message: message.into(),
            timed_out: false,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::TransportFailure {
            message: message.into(),
            timed_out: true,
        }
    }

    /// Build an `UpstreamError`, keeping only the head of the upstream body.
    pub fn upstream(status: u16, body: &str) -> Self {
        let reason = match body.char_indices().nth(REASON_LIMIT) {
            Some((cut, _)) => format!("{}...", &body[..cut]),
            None => body.to_string(),
        };
        Self::UpstreamError { status, reason }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedUpstreamResponse(message.into())
    }

    /// Stable machine-readable tag used in error bodies and logs
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::TransportFailure { .. } => "transport_failure",
            Self::UpstreamError { .. } => "upstream_error",
            Self::MalformedUpstreamResponse(_) => "malformed_upstream_response",
        }
    }

    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::TransportFailure { timed_out: true, .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::TransportFailure { .. }
            | Self::UpstreamError { .. }
            | Self::MalformedUpstreamResponse(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::timeout(err.to_string())
        } else {
            Self::transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        Self::malformed(err.to_string())
    }
}

/// Error response JSON structure
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
    pub status: u16,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        tracing::warn!(kind = self.kind(), status = status.as_u16(), "{}", self);

        let body = Json(ErrorResponse {
            error: self.to_string(),
            kind: self.kind().to_string(),
            status: status.as_u16(),
        });

        (status, body).into_response()
    }
}
