//! Fake auth provider, notifier and clocks

use async_trait::async_trait;
use callscope_core::{AuthError, Clock, Session, User, UserId};
use callscope_session::{AuthProvider, Credentials, Notice, Notifier};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Scriptable [`AuthProvider`]
#[derive(Debug)]
pub struct FakeAuthProvider {
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
    users: DashMap<String, (String, User)>,
    profiles: DashMap<UserId, User>,
    delay: Mutex<Option<Duration>>,
    sign_in_errors: Mutex<VecDeque<AuthError>>,
    refresh_error: Mutex<Option<AuthError>>,
    sign_in_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    sign_out_calls: AtomicUsize,
}

impl FakeAuthProvider {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            ttl: chrono::Duration::hours(1),
            users: DashMap::new(),
            profiles: DashMap::new(),
            delay: Mutex::new(None),
            sign_in_errors: Mutex::new(VecDeque::new()),
            refresh_error: Mutex::new(None),
            sign_in_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            sign_out_calls: AtomicUsize::new(0),
        }
    }

    /// Register a user that can sign in with `email` / `password`
    pub fn with_user(self, email: &str, password: &str, user: User) -> Self {
        self.profiles.insert(user.id, user.clone());
        self.users
            .insert(email.to_lowercase(), (password.to_string(), user));
        self
    }

    pub fn with_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Delay every provider call
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Fail the next sign-in with `err`
    pub fn fail_next_sign_in(&self, err: AuthError) {
        self.sign_in_errors.lock().push_back(err);
    }

    /// Fail every refresh with `err` (or stop failing with `None`)
    pub fn fail_refresh(&self, err: Option<AuthError>) {
        *self.refresh_error.lock() = err;
    }

    pub fn sign_in_calls(&self) -> usize {
        self.sign_in_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }

    /// Session as the provider would issue it now
    pub fn issue(&self, user_id: UserId) -> Session {
        Session {
            user_id,
            access_token: format!("access-{}", Uuid::new_v4()),
            refresh_token: format!("refresh-{}", Uuid::new_v4()),
            expires_at: self.clock.now() + self.ttl,
        }
    }

    async fn pause(&self) {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl AuthProvider for FakeAuthProvider {
    async fn sign_in(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if let Some(err) = self.sign_in_errors.lock().pop_front() {
            return Err(err);
        }
        let user_id = match self.users.get(credentials.email()) {
            Some(entry) if entry.0 == credentials.password() => entry.1.id,
            _ => return Err(AuthError::InvalidCredentials),
        };
        Ok(self.issue(user_id))
    }

    async fn sign_out(&self, _session: &Session) -> Result<(), AuthError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn refresh(&self, session: &Session) -> Result<Session, AuthError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        let failure = self.refresh_error.lock().clone();
        match failure {
            Some(err) => Err(err),
            None => Ok(self.issue(session.user_id)),
        }
    }

    async fn fetch_profile(&self, session: &Session) -> Result<User, AuthError> {
        self.profiles
            .get(&session.user_id)
            .map(|u| u.clone())
            .ok_or(AuthError::SessionExpired)
    }
}

/// Notifier that keeps every notice
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.notices.lock().len()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().push(notice);
    }
}

/// Wall-clock time that advances with tokio's (possibly paused) clock
#[derive(Debug)]
pub struct TokioClock {
    origin: DateTime<Utc>,
    start: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: Utc::now(),
            start: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.start.elapsed()).unwrap_or_else(|_| chrono::Duration::zero());
        self.origin + elapsed
    }
}
