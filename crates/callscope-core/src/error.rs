//! Error types for Callscope
//!
//! Provides the error taxonomy shared by every crate:
//! - Auth failures from the session store and provider
//! - Scope downgrades (self-corrected, logged only)
//! - Query failures from the storage service
//! - Local field validation

use crate::config::ConfigError;

/// Auth failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Wrong email or password
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Account exists but the email address was never confirmed
    #[error("email not confirmed")]
    EmailUnconfirmed,

    /// Provider throttled the request
    #[error("rate limited")]
    RateLimited,

    /// A refresh token left over from a previous session was rejected
    #[error("stale refresh token")]
    StaleRefreshToken,

    /// Session no longer valid
    #[error("session expired")]
    SessionExpired,

    /// A sign-in attempt is already running
    #[error("sign-in already in progress")]
    SignInInProgress,

    /// Provider unreachable
    #[error("auth provider unreachable: {0}")]
    Network(String),

    /// Session state machine rejected a transition
    #[error("illegal session transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

impl AuthError {
    /// Whether this error ends the current session
    #[inline]
    #[must_use]
    pub fn ends_session(&self) -> bool {
        matches!(
            self,
            Self::SessionExpired | Self::StaleRefreshToken | Self::InvalidCredentials
        )
    }
}

/// Reasons a requested scope was downgraded by the resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    /// `"all"` requested by a role that may not see every account
    #[error("\"all\" scope is restricted to superAdmin")]
    IllegalAllRequest,

    /// Requested account is not assigned to the user
    #[error("requested account is not assigned to the user")]
    UnassignedAccountRequest,

    /// User has no assigned accounts
    #[error("no accounts assigned")]
    NoAccounts,
}

/// Storage query failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// Network or availability failure worth retrying
    #[error("transient network failure: {0}")]
    NetworkTransient(String),

    /// Storage service refused the request
    #[error("authorization denied: {0}")]
    AuthorizationDenied(String),

    /// Target row does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Scope changed while the query was in flight
    #[error("query issued under scope generation {issued} superseded by generation {current}")]
    Superseded { issued: u64, current: u64 },

    /// Row could not be decoded into its domain type
    #[error("decode failed: {0}")]
    Decode(String),
}

impl QueryError {
    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkTransient(_))
    }
}

impl From<serde_json::Error> for QueryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Field-level validation failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    /// Create validation error for field
    #[inline]
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Combined Callscope error
#[derive(Debug, thiserror::Error)]
pub enum CallscopeError {
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("scope error: {0}")]
    Scope(#[from] ScopeError),

    #[error("query error: {0}")]
    Query(#[from] QueryError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for Callscope operations
pub type CallscopeResult<T> = Result<T, CallscopeError>;
