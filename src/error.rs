//! Error taxonomy for session and request handling.
//!
//! DESIGN
//! ======
//! `ClientError` is the only error type callers of the client see. The core
//! recovers exactly one failure locally (a 401 answered by a single refresh
//! and retry); everything else propagates to the caller unchanged.
//!
//! Errors are `Clone` because one refresh outcome is broadcast to every
//! request waiting on it.

use crate::config::ConfigError;

/// Message surfaced for transport failures, shared with the CLI output.
pub const NETWORK_UNAVAILABLE_MESSAGE: &str = "Network error: Could not reach the server";

/// Message surfaced when the session could not be renewed.
pub const SESSION_EXPIRED_MESSAGE: &str = "Session expired. Please log in again.";

/// Stable machine-readable classification for an error.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

/// Errors produced by the authenticated client and session manager.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The transport failed before any response was received.
    #[error("{}", NETWORK_UNAVAILABLE_MESSAGE)]
    NetworkUnavailable { detail: String },

    /// A completed HTTP exchange returned a non-2xx status.
    #[error("{message}")]
    RequestFailed { status: u16, message: String },

    /// The credential refresh failed or was impossible; the session has been wiped.
    #[error("{}", SESSION_EXPIRED_MESSAGE)]
    SessionExpired,

    /// Local input was rejected before any network call.
    #[error("{0}")]
    Validation(String),

    /// A successful response carried a body that could not be decoded.
    #[error("invalid response body: {0}")]
    InvalidBody(String),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl ClientError {
    /// HTTP status of a failed exchange, if there was one.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RequestFailed { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl ErrorCode for ClientError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NetworkUnavailable { .. } => "E_NETWORK_UNAVAILABLE",
            Self::RequestFailed { .. } => "E_REQUEST_FAILED",
            Self::SessionExpired => "E_SESSION_EXPIRED",
            Self::Validation(_) => "E_VALIDATION",
            Self::InvalidBody(_) => "E_INVALID_BODY",
            Self::Config(_) => "E_CONFIG",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::NetworkUnavailable { .. } | Self::RequestFailed { status: 429 | 500..=599, .. })
    }
}

/// Fallback message for a failed status when the body carries none.
#[must_use]
pub fn default_status_message(status: u16) -> String {
    match status {
        400 => "Invalid input".to_owned(),
        401 => "Unauthorized".to_owned(),
        500 => "Server error".to_owned(),
        other => format!("Request failed ({other})"),
    }
}

#[derive(serde::Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Extract the backend's `{ "error": ... }` message, falling back to the status table.
#[must_use]
pub fn error_message(status: u16, body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error.or(b.message))
        .map(|m| m.trim().to_owned())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| default_status_message(status))
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
