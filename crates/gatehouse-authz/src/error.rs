//! Error types for the authorization core

use std::time::Duration;

use thiserror::Error;
use tonic::Status;

/// Authorization error types
///
/// None of these ever carry a token or credential in their message.
#[derive(Debug, Error)]
pub enum Error {
    /// The bearer token was rejected by the identity validator
    #[error("token validation failed: {message}")]
    InvalidToken {
        /// Validator message
        message: String,
    },

    /// The collaborator has no record of the requested key (method, subject)
    #[error("not found: {what}")]
    NotFound {
        /// What was looked up
        what: String,
    },

    /// A collaborator service could not be reached or failed
    #[error("{service} unavailable: {message}")]
    Unavailable {
        /// Collaborator name (e.g., "rbac", "identity")
        service: String,
        /// Error message
        message: String,
    },

    /// A collaborator call exceeded its deadline
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Deadline that was exceeded
        after: Duration,
    },

    /// Configuration error
    #[error("configuration error: {message}")]
    Configuration {
        /// Error message
        message: String,
    },

    /// Audit record could not be produced
    #[error("audit error: {message}")]
    Audit {
        /// Error message
        message: String,
    },
}

impl Error {
    /// Create a token validation error
    pub fn invalid_token(msg: impl Into<String>) -> Self {
        Self::InvalidToken {
            message: msg.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create a collaborator unavailability error
    pub fn unavailable(service: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Unavailable {
            service: service.into(),
            message: msg.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    /// Create an audit error
    pub fn audit(msg: impl Into<String>) -> Self {
        Self::Audit {
            message: msg.into(),
        }
    }

    /// Whether the collaborator reported "no such record"
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Whether this error means the caller failed to authenticate
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Error::InvalidToken { .. })
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match &err {
            Error::InvalidToken { .. } => Status::unauthenticated(err.to_string()),
            Error::Unavailable { .. } | Error::Timeout { .. } => {
                Status::unavailable(err.to_string())
            }
            Error::NotFound { .. } => Status::not_found(err.to_string()),
            Error::Configuration { .. } | Error::Audit { .. } => {
                Status::internal(err.to_string())
            }
        }
    }
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, Error>;
