//! Error type shared by every layer of the client.
//!
//! ERROR HANDLING
//! ==============
//! `ApiError` is `Clone` because a single renewal outcome is fanned out to
//! every call waiting on it. Underlying `reqwest`/`serde_json` errors are
//! flattened to strings for the same reason.

use crate::config::AuthPolicy;

/// Errors produced by transport, gateway and pipeline operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The backend answered with a non-success status.
    #[error("request rejected: status {status}: {message}")]
    Status { status: u16, message: String },

    /// The HTTP request could not be completed.
    #[error("request failed: {0}")]
    Request(String),

    /// The response body could not be decoded.
    #[error("response parse failed: {0}")]
    Parse(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    /// A configuration value could not be parsed.
    #[error("config parse failed: {0}")]
    ConfigParse(String),
}

impl ApiError {
    /// HTTP status carried by a `Status` error.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this error is one the pipeline would answer with a renewal.
    #[must_use]
    pub fn is_auth_failure(&self, policy: &AuthPolicy) -> bool {
        self.status().is_some_and(|s| policy.is_auth_failure(s))
    }

    /// Build a `Status` error from a raw response body.
    ///
    /// Prefers the JSON `message` field the backend attaches to rejections and
    /// falls back to the body text.
    #[must_use]
    pub fn from_body(status: u16, body: &[u8]) -> Self {
        let message = serde_json::from_slice::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_owned))
            .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_owned());
        Self::Status { status, message }
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
