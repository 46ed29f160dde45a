//! Session state machine
//!
//! ```text
//! Unauthenticated -> Authenticating -> Authenticated
//! Authenticated   -> Refreshing     -> Authenticated | Expired
//! Expired         -> Unauthenticated
//! ```
//!
//! Explicit sign-out may leave any signed-in state for `Unauthenticated`.

use callscope_core::AuthError;
use serde::Serialize;
use std::fmt;

/// Lifecycle state of the session store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    #[default]
    Unauthenticated,
    Authenticating,
    Authenticated,
    Refreshing,
    Expired,
}

impl SessionState {
    /// Every state, for table-driven tests
    pub const ALL: [SessionState; 5] = [
        SessionState::Unauthenticated,
        SessionState::Authenticating,
        SessionState::Authenticated,
        SessionState::Refreshing,
        SessionState::Expired,
    ];

    /// Whether protected routes may render
    #[inline]
    #[must_use]
    pub fn is_signed_in(&self) -> bool {
        matches!(self, SessionState::Authenticated | SessionState::Refreshing)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Unauthenticated => "unauthenticated",
            SessionState::Authenticating => "authenticating",
            SessionState::Authenticated => "authenticated",
            SessionState::Refreshing => "refreshing",
            SessionState::Expired => "expired",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validates a state transition.
pub fn validate_transition(from: SessionState, to: SessionState) -> Result<(), AuthError> {
    if allowed(from, to) {
        Ok(())
    } else {
        Err(AuthError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

pub fn allowed_transitions(from: SessionState) -> Vec<SessionState> {
    use SessionState::*;
    match from {
        Unauthenticated => vec![Authenticating],
        Authenticating => vec![Authenticated, Unauthenticated],
        Authenticated => vec![Refreshing, Expired, Unauthenticated],
        Refreshing => vec![Authenticated, Expired, Unauthenticated],
        Expired => vec![Unauthenticated],
    }
}

fn allowed(from: SessionState, to: SessionState) -> bool {
    allowed_transitions(from).into_iter().any(|s| s == to)
}
