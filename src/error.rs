//! Error types for iniq.
//!
//! All fallible operations in the crate return [`IniqError`]. The retry
//! policy in the orchestrator is driven entirely by [`IniqError::retry_class`],
//! a closed taxonomy, never by matching substrings of error messages.

use thiserror::Error;

/// Main error type for iniq operations.
#[derive(Error, Debug)]
pub enum IniqError {
    /// IO errors (file operations, permissions at the fs layer).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed input, conflicting flags, bad usernames, invalid toggle
    /// tokens. Never retried; fatal for critical features.
    #[error("{0}")]
    Validation(String),

    /// The caller lacks the privileges for the requested mutation.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Network fetch failures and timeouts. Retried with backoff.
    #[error("transient error: {0}")]
    Transient(String),

    /// The current user was added to the admin group but the membership is
    /// not effective in this session. Aborts the whole run with a re-login
    /// instruction.
    #[error("group membership pending: {0}")]
    GroupMembershipPending(String),

    /// Host OS or distribution iniq does not know how to configure.
    #[error("unsupported system: {0}")]
    Unsupported(String),

    /// External command failures and other system-level errors.
    #[error("system error: {0}")]
    System(String),

    /// JSON config file errors.
    #[error("config error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for iniq operations.
pub type Result<T> = std::result::Result<T, IniqError>;

/// How the orchestrator treats a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Configuration/validation shaped: record failure, never retry.
    Fatal,
    /// Offer interactive remediation (join admin group) or fail.
    Permission,
    /// Network/timeout shaped: sleep 2s, retry.
    Transient,
    /// Abort the entire run and ask the user to log out and back in.
    AbortRun,
    /// Anything else: sleep 1s, retry up to the attempt budget.
    Retryable,
}

impl IniqError {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a permission error.
    pub fn permission(msg: impl Into<String>) -> Self {
        Self::Permission(msg.into())
    }

    /// Create a transient error.
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Create a system error.
    pub fn system(msg: impl Into<String>) -> Self {
        Self::System(msg.into())
    }

    /// Create an unsupported-system error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Classify this error for the orchestrator's retry loop.
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::Validation(_) | Self::Unsupported(_) | Self::Json(_) => RetryClass::Fatal,
            Self::Permission(_) => RetryClass::Permission,
            Self::Transient(_) => RetryClass::Transient,
            Self::GroupMembershipPending(_) => RetryClass::AbortRun,
            Self::Io(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                RetryClass::Permission
            }
            // A missing file will not appear by waiting; retrying only
            // stretches the failure out.
            Self::Io(e) if e.kind() == std::io::ErrorKind::NotFound => RetryClass::Fatal,
            Self::Io(_) | Self::System(_) => RetryClass::Retryable,
        }
    }
}
