//! Error classification for failed remote calls.

use std::fmt;

use crate::client::ApiError;
use crate::error::{OperationError, Step};

/// What a failure means to the convergence controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Local pre-flight failure from construct.
    Validation,
    Permission,
    NotFound,
    Throttled,
    Transient,
    /// The service answered with something that could not be decoded.
    Malformed,
    Fatal,
    /// The operation deadline passed or the read-back budget ran out.
    Timeout,
}

impl ErrorKind {
    /// Returns true if the caller may retry the call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Throttled | ErrorKind::Transient)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Permission => "permission",
            ErrorKind::NotFound => "not found",
            ErrorKind::Throttled => "throttled",
            ErrorKind::Transient => "transient",
            ErrorKind::Malformed => "malformed response",
            ErrorKind::Fatal => "fatal",
            ErrorKind::Timeout => "timeout",
        };
        f.write_str(name)
    }
}

/// Error codes the service uses that override the plain status mapping.
const THROTTLE_CODES: &[&str] = &["toomanyrequests", "activitylimitreached", "throttled"];
const PERMISSION_CODES: &[&str] = &[
    "authorization_requestdenied",
    "accessdenied",
    "forbidden",
    "unauthorized",
    "invalidauthenticationtoken",
];
const NOT_FOUND_CODES: &[&str] = &["resourcenotfound", "request_resourcenotfound", "itemnotfound"];

/// Classifies a failed call.
pub fn classify(err: &ApiError) -> ErrorKind {
    match err {
        ApiError::Network(_) | ApiError::Timeout => ErrorKind::Transient,
        ApiError::Decode(_) => ErrorKind::Malformed,
        ApiError::Setup(_) => ErrorKind::Fatal,
        ApiError::Status { status, code, .. } => {
            let code = code.to_lowercase();

            if THROTTLE_CODES.contains(&code.as_str()) {
                return ErrorKind::Throttled;
            }
            if PERMISSION_CODES.contains(&code.as_str()) {
                return ErrorKind::Permission;
            }
            if NOT_FOUND_CODES.contains(&code.as_str()) {
                return ErrorKind::NotFound;
            }

            match status {
                401 | 403 => ErrorKind::Permission,
                404 => ErrorKind::NotFound,
                429 => ErrorKind::Throttled,
                408 | 500 | 502 | 503 | 504 => ErrorKind::Transient,
                _ => ErrorKind::Fatal,
            }
        }
    }
}

/// Builds the surfaced diagnostic for a failed call.
///
/// `permissions` is the capability set the step needed; it is attached only
/// to permission failures.
pub fn diagnose(
    err: &ApiError,
    step: Step,
    object_kind: &str,
    permissions: &[String],
) -> OperationError {
    let kind = classify(err);
    let diagnostic = OperationError {
        retry_after: err.retry_after(),
        ..OperationError::new(step, kind, object_kind, err.to_string())
    };
    if kind == ErrorKind::Permission {
        diagnostic.with_permissions(permissions)
    } else {
        diagnostic
    }
}
