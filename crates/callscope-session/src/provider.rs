//! Auth provider contracts
//!
//! The hosted auth service is consumed through [`AuthProvider`]; locally
//! cached artifacts (the persisted session) through [`LocalAuthStore`].

use async_trait::async_trait;
use callscope_core::{AuthError, Session, User, ValidationError};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use std::fmt;

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("Invalid email regex"));

/// Locally validated sign-in credentials
///
/// Only [`Credentials::new`] builds these, so the provider never sees a
/// malformed email or an empty password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    email: String,
    password: String,
}

impl Credentials {
    pub fn new(email: &str, password: &str) -> Result<Self, ValidationError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(ValidationError::new("email", "email is required"));
        }
        if !EMAIL.is_match(email) {
            return Err(ValidationError::new("email", "email address is malformed"));
        }
        if password.is_empty() {
            return Err(ValidationError::new("password", "password is required"));
        }
        Ok(Self {
            email: email.to_lowercase(),
            password: password.to_string(),
        })
    }

    #[inline]
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    #[inline]
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Hosted auth service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Exchange credentials for a session
    async fn sign_in(&self, credentials: &Credentials) -> Result<Session, AuthError>;

    /// Revoke the session server-side
    async fn sign_out(&self, session: &Session) -> Result<(), AuthError>;

    /// Extend the session
    async fn refresh(&self, session: &Session) -> Result<Session, AuthError>;

    /// Profile (role, display name, language) of the session's user
    async fn fetch_profile(&self, session: &Session) -> Result<User, AuthError>;
}

/// Locally persisted auth artifacts
pub trait LocalAuthStore: Send + Sync {
    fn load(&self) -> Option<Session>;

    fn save(&self, session: &Session);

    /// Remove every cached artifact
    fn clear(&self);
}

/// In-process [`LocalAuthStore`]
#[derive(Debug, Default)]
pub struct MemoryLocalAuthStore {
    session: Mutex<Option<Session>>,
    clears: Mutex<usize>,
}

impl MemoryLocalAuthStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a session, as left by a previous run
    #[must_use]
    pub fn with_session(session: Session) -> Self {
        Self {
            session: Mutex::new(Some(session)),
            clears: Mutex::new(0),
        }
    }

    /// Number of times the store was cleared
    #[must_use]
    pub fn clear_count(&self) -> usize {
        *self.clears.lock()
    }
}

impl LocalAuthStore for MemoryLocalAuthStore {
    fn load(&self) -> Option<Session> {
        self.session.lock().clone()
    }

    fn save(&self, session: &Session) {
        *self.session.lock() = Some(session.clone());
    }

    fn clear(&self) {
        *self.session.lock() = None;
        *self.clears.lock() += 1;
    }
}
