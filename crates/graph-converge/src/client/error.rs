//! Transport-level error types.

use std::time::Duration;

use thiserror::Error;

/// A failed call against the remote API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The service answered with a non-success status.
    #[error("HTTP {status} ({code}): {message}")]
    Status {
        status: u16,
        code: String,
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Failed to create HTTP client: {0}")]
    Setup(String),
}

impl ApiError {
    pub fn status(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::Status {
            status,
            code: code.into(),
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn not_found() -> Self {
        Self::status(404, "ResourceNotFound", "Resource not found")
    }

    pub fn forbidden() -> Self {
        Self::status(403, "Forbidden", "Insufficient privileges to complete the operation")
    }

    pub fn throttled(retry_after: Option<Duration>) -> Self {
        ApiError::Status {
            status: 429,
            code: "TooManyRequests".to_string(),
            message: "Too many requests".to_string(),
            retry_after,
        }
    }

    /// HTTP status, when the service answered at all.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// How long the service asked the caller to wait, if it said.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ApiError::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Result type for transport calls.
pub type Result<T> = std::result::Result<T, ApiError>;
