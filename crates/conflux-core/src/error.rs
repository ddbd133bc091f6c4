//! Shared error type across conflux crates.

use thiserror::Error;

/// Stable error codes surfaced to embedders and bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Bad input to a public API.
    InvalidArgument,
    /// Malformed message field or JSON document.
    InvalidMessage,
    /// Out-of-order lifecycle transition.
    LifecycleViolation,
    /// Thread affinity or ownership broken.
    IntegrityViolation,
    /// Addon, extension, or path lookup failed.
    NotFound,
    /// Duplicate addon registration.
    AlreadyRegistered,
    /// A phase or path deadline expired.
    Timeout,
    /// Target run loop or connection is gone.
    Closed,
    /// Operation was cancelled by teardown.
    Cancelled,
    /// Internal error.
    Internal,
}

impl ErrorCode {
    /// String representation used in logs and result details.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            ErrorCode::InvalidMessage => "INVALID_MESSAGE",
            ErrorCode::LifecycleViolation => "LIFECYCLE_VIOLATION",
            ErrorCode::IntegrityViolation => "INTEGRITY_VIOLATION",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::AlreadyRegistered => "ALREADY_REGISTERED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Closed => "CLOSED",
            ErrorCode::Cancelled => "CANCELLED",
            ErrorCode::Internal => "INTERNAL",
        }
    }

    /// Numeric code for C-style consumers.
    pub fn code(self) -> u32 {
        match self {
            ErrorCode::InvalidArgument => 1,
            ErrorCode::InvalidMessage => 2,
            ErrorCode::LifecycleViolation => 3,
            ErrorCode::IntegrityViolation => 4,
            ErrorCode::NotFound => 5,
            ErrorCode::AlreadyRegistered => 6,
            ErrorCode::Timeout => 7,
            ErrorCode::Closed => 8,
            ErrorCode::Cancelled => 9,
            ErrorCode::Internal => 100,
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, ConfluxError>;

/// Unified error type used by core and runtime.
#[derive(Debug, Clone, Error)]
pub enum ConfluxError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid value for field `{field}`: {reason}")]
    InvalidFieldValue { field: String, reason: String },
    #[error("invalid json: {0}")]
    InvalidJson(String),
    #[error("{entity}: cannot {action} while {state}")]
    LifecycleViolation {
        entity: String,
        action: String,
        state: String,
    },
    #[error("integrity violation: {0}")]
    IntegrityViolation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already registered: {0}")]
    AlreadyRegistered(String),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("closed: {0}")]
    Closed(String),
    #[error("cancelled: {0}")]
    Cancelled(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl ConfluxError {
    /// Map an error to its stable code.
    pub fn code(&self) -> ErrorCode {
        match self {
            ConfluxError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            ConfluxError::InvalidFieldValue { .. } | ConfluxError::InvalidJson(_) => {
                ErrorCode::InvalidMessage
            }
            ConfluxError::LifecycleViolation { .. } => ErrorCode::LifecycleViolation,
            ConfluxError::IntegrityViolation(_) => ErrorCode::IntegrityViolation,
            ConfluxError::NotFound(_) => ErrorCode::NotFound,
            ConfluxError::AlreadyRegistered(_) => ErrorCode::AlreadyRegistered,
            ConfluxError::Timeout(_) => ErrorCode::Timeout,
            ConfluxError::Closed(_) => ErrorCode::Closed,
            ConfluxError::Cancelled(_) => ErrorCode::Cancelled,
            ConfluxError::Internal(_) => ErrorCode::Internal,
        }
    }

    pub fn field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfluxError::InvalidFieldValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Thread/ownership invariant broken, a programmer error. Logged at
    /// `error`; debug builds stop here. In release the caller tears down
    /// the offending entity.
    #[allow(clippy::assertions_on_constants)]
    pub fn integrity(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::error!(reason = %msg, "integrity violation");
        debug_assert!(false, "integrity violation: {msg}");
        ConfluxError::IntegrityViolation(msg)
    }
}

impl From<serde_json::Error> for ConfluxError {
    fn from(e: serde_json::Error) -> Self {
        ConfluxError::InvalidJson(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        let e = ConfluxError::field("width", "expected int32");
        assert_eq!(e.code(), ErrorCode::InvalidMessage);
        assert_eq!(e.code().as_str(), "INVALID_MESSAGE");
        assert_eq!(e.code().code(), 2);
        assert_eq!(
            e.to_string(),
            "invalid value for field `width`: expected int32"
        );
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "integrity violation: env used off its thread")]
    fn integrity_violation_stops_debug_builds() {
        let _ = ConfluxError::integrity("env used off its thread");
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn integrity_violation_is_returned_in_release() {
        let e = ConfluxError::integrity("env used off its thread");
        assert_eq!(e.code(), ErrorCode::IntegrityViolation);
    }
}
