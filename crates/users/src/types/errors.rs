//! Error taxonomy shared by entities, repositories, and services.

use std::error::Error as StdError;
use thiserror::Error;

/// Boxed cause carried by [`DomainError::Internal`].
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

const SESSION: &str = "session";
const SESSION_PAST_EXPIRY: &str = "session expired";

/// Domain errors. Storage adapters translate driver failures into one of
/// these variants; nothing engine specific travels further up.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("{resource} not found: {message}")]
    NotFound { resource: String, message: String },

    #[error("{resource} conflict: {message}")]
    Conflict { resource: String, message: String },

    #[error("authentication failed: {message}")]
    Authentication { message: String },

    #[error("access denied: {message}")]
    Authorization { message: String },

    #[error("internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl DomainError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            message: message.into(),
        }
    }

    pub fn conflict(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conflict {
            resource: resource.into(),
            message: message.into(),
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    pub fn internal_with<E>(message: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Internal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn user_not_found() -> Self {
        Self::not_found("user", "user not found")
    }

    /// Uniform credential failure. Never says which credential was wrong.
    pub fn invalid_credentials() -> Self {
        Self::authentication("invalid credentials")
    }

    pub fn account_suspended() -> Self {
        Self::authorization("account suspended")
    }

    pub fn account_inactive() -> Self {
        Self::authorization("account inactive")
    }

    pub fn invalid_session_token() -> Self {
        Self::authentication("invalid session token")
    }

    /// Returned by the service when a session exists but its lifetime ran out.
    pub fn session_expired() -> Self {
        Self::authentication("session expired")
    }

    pub fn session_not_found() -> Self {
        Self::not_found(SESSION, "session not found")
    }

    pub fn session_deactivated() -> Self {
        Self::not_found(SESSION, "session deactivated")
    }

    /// Lookup miss caused by the read-time expiry check in a session store.
    pub fn session_past_expiry() -> Self {
        Self::not_found(SESSION, SESSION_PAST_EXPIRY)
    }

    pub fn is_session_past_expiry(&self) -> bool {
        matches!(
            self,
            Self::NotFound { resource, message } if resource == SESSION && message == SESSION_PAST_EXPIRY
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Only infrastructure faults may be retried, and only by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Short machine-readable label, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::NotFound { .. } => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::Authentication { .. } => "authentication",
            Self::Authorization { .. } => "authorization",
            Self::Internal { .. } => "internal",
        }
    }

    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}

// Causes are not comparable, so equality only looks at the visible parts.
impl PartialEq for DomainError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Validation { field: a, message: m },
                Self::Validation { field: b, message: n },
            ) => a == b && m == n,
            (
                Self::NotFound { resource: a, message: m },
                Self::NotFound { resource: b, message: n },
            ) => a == b && m == n,
            (
                Self::Conflict { resource: a, message: m },
                Self::Conflict { resource: b, message: n },
            ) => a == b && m == n,
            (Self::Authentication { message: m }, Self::Authentication { message: n }) => m == n,
            (Self::Authorization { message: m }, Self::Authorization { message: n }) => m == n,
            (Self::Internal { message: m, .. }, Self::Internal { message: n, .. }) => m == n,
            _ => false,
        }
    }
}

/// Errors raised by an event sink.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("event queue is full")]
    QueueFull,

    #[error("event queue is closed")]
    Closed,

    #[error("event sink rejected event: {0}")]
    Rejected(String),
}
