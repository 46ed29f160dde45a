//! Session store
//!
//! Owns the session lifecycle on top of an [`AuthProvider`]:
//! - Sign-in with local validation, clean-slate reset and a single retry on
//!   a stale refresh token
//! - Best-effort sign-out
//! - Refresh with overlap suppression
//! - Restore of a persisted session on app load
//!
//! State is published through a `watch` channel; this store is its only
//! writer. Losing a session outside an explicit sign-out raises the
//! single-shot expiry notification.
//!
//! An attached [`ScopeStore`] follows the session: it is bound to the
//! signed-in user and reset whenever the session leaves the signed-in
//! states.

use crate::notifier::ExpiryNotifier;
use crate::provider::{AuthProvider, Credentials, LocalAuthStore};
use crate::state::{validate_transition, SessionState};
use callscope_access::ScopeStore;
use callscope_core::{AuthError, Clock, Session, User};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

/// Published session state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub session: Option<Session>,
    pub user: Option<User>,
    /// Last successful sign-in or refresh
    pub last_refresh: Option<DateTime<Utc>>,
    /// Signed out because the session was lost, not by the user
    pub expired: bool,
}

fn clear_identity(snapshot: &mut SessionSnapshot) {
    snapshot.session = None;
    snapshot.user = None;
    snapshot.last_refresh = None;
}

struct InProgress<'a>(&'a AtomicBool);

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Session lifecycle owner
pub struct SessionStore {
    provider: Arc<dyn AuthProvider>,
    local: Arc<dyn LocalAuthStore>,
    clock: Arc<dyn Clock>,
    expiry: Arc<ExpiryNotifier>,
    scope: Option<Arc<ScopeStore>>,
    tx: watch::Sender<SessionSnapshot>,
    signing_in: AtomicBool,
    refresh_lock: Mutex<()>,
    refresh_round: AtomicU64,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("state", &self.state())
            .field("signing_in", &self.signing_in.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    #[must_use]
    pub fn new(
        provider: Arc<dyn AuthProvider>,
        local: Arc<dyn LocalAuthStore>,
        clock: Arc<dyn Clock>,
        expiry: Arc<ExpiryNotifier>,
    ) -> Self {
        let (tx, _rx) = watch::channel(SessionSnapshot::default());
        Self {
            provider,
            local,
            clock,
            expiry,
            scope: None,
            tx,
            signing_in: AtomicBool::new(false),
            refresh_lock: Mutex::new(()),
            refresh_round: AtomicU64::new(0),
        }
    }

    /// Attach the account scope that must not outlive the session
    #[must_use]
    pub fn with_scope(mut self, scope: Arc<ScopeStore>) -> Self {
        self.scope = Some(scope);
        self.sync_scope();
        self
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.tx.borrow().state
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.tx.borrow().clone()
    }

    #[must_use]
    pub fn current_session(&self) -> Option<Session> {
        self.tx.borrow().session.clone()
    }

    #[must_use]
    pub fn current_user(&self) -> Option<User> {
        self.tx.borrow().user.clone()
    }

    #[must_use]
    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.tx.borrow().last_refresh
    }

    /// Observe state changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    #[must_use]
    pub fn expiry(&self) -> &Arc<ExpiryNotifier> {
        &self.expiry
    }

    /// Sign in with locally validated credentials
    ///
    /// A second call while one is running fails with
    /// [`AuthError::SignInInProgress`] without reaching the provider.
    pub async fn sign_in(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        if self
            .signing_in
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(email = credentials.email(), "sign-in already in progress");
            return Err(AuthError::SignInInProgress);
        }
        let _in_progress = InProgress(&self.signing_in);

        self.clean_slate();
        self.transition(SessionState::Authenticating, |_| {})?;

        match self.authenticate(credentials).await {
            Ok((session, user)) => {
                self.local.save(&session);
                let epoch = self.expiry.open_epoch();
                let now = self.clock.now();
                tracing::info!(user = %user.id, role = %user.role, epoch, "signed in");
                let published = session.clone();
                self.transition(SessionState::Authenticated, move |snap| {
                    snap.session = Some(published);
                    snap.user = Some(user);
                    snap.last_refresh = Some(now);
                    snap.expired = false;
                })?;
                Ok(session)
            }
            Err(err) => {
                tracing::warn!(email = credentials.email(), error = %err, "sign-in failed");
                self.local.clear();
                self.transition(SessionState::Unauthenticated, clear_identity)?;
                Err(err)
            }
        }
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<(Session, User), AuthError> {
        let session = match self.provider.sign_in(credentials).await {
            Err(AuthError::StaleRefreshToken) => {
                tracing::warn!("stale refresh token rejected; clearing local auth state and retrying");
                self.local.clear();
                self.provider.sign_in(credentials).await?
            }
            other => other?,
        };
        let user = self.provider.fetch_profile(&session).await?;
        Ok((session, user))
    }

    /// Sign out; provider failures are logged, local state is always cleared
    pub async fn sign_out(&self) {
        let snapshot = self.snapshot();
        if let Some(session) = snapshot.session.as_ref() {
            if let Err(err) = self.provider.sign_out(session).await {
                tracing::warn!(error = %err, "provider sign-out failed; clearing local state anyway");
            }
        }
        self.local.clear();
        if self.state() != SessionState::Unauthenticated {
            if let Err(err) = self.transition(SessionState::Unauthenticated, |snap| {
                clear_identity(snap);
                snap.expired = false;
            }) {
                tracing::error!(error = %err, "sign-out transition rejected");
            }
        }
        tracing::info!(user = ?snapshot.user.map(|u| u.id), "signed out");
    }

    /// Extend the current session
    ///
    /// Callers arriving while a refresh is in flight wait for it and share
    /// its outcome; the provider sees one call.
    pub async fn refresh_session(&self) -> Result<Session, AuthError> {
        let round = self.refresh_round.load(Ordering::Acquire);
        let _lock = self.refresh_lock.lock().await;

        let snapshot = self.snapshot();
        if self.refresh_round.load(Ordering::Acquire) != round {
            tracing::debug!("refresh completed while waiting; reusing its outcome");
            return match (snapshot.state, snapshot.session) {
                (SessionState::Authenticated, Some(session)) => Ok(session),
                _ => Err(AuthError::SessionExpired),
            };
        }

        let current = match (snapshot.state, snapshot.session) {
            (SessionState::Authenticated, Some(session)) => session,
            _ => return Err(AuthError::SessionExpired),
        };

        self.transition(SessionState::Refreshing, |_| {})?;
        let result = self.provider.refresh(&current).await;
        self.refresh_round.fetch_add(1, Ordering::AcqRel);
        let now = self.clock.now();

        match result {
            Ok(session) => {
                self.local.save(&session);
                let published = session.clone();
                self.transition(SessionState::Authenticated, move |snap| {
                    snap.session = Some(published);
                    snap.last_refresh = Some(now);
                })?;
                tracing::debug!(expires_at = %session.expires_at, "session refreshed");
                Ok(session)
            }
            Err(AuthError::Network(reason)) if !current.is_expired(now) => {
                tracing::warn!(%reason, "refresh unreachable; keeping unexpired session");
                self.transition(SessionState::Authenticated, |_| {})?;
                Err(AuthError::Network(reason))
            }
            Err(err) => {
                // Expired -> Unauthenticated happens inside lose_session.
                self.lose_session(SessionState::Refreshing, &err.to_string());
                Err(err)
            }
        }
    }

    /// Rehydrate a persisted session on app load
    pub async fn restore(&self) -> Result<Option<User>, AuthError> {
        if self.state().is_signed_in() {
            return Ok(self.current_user());
        }
        let Some(session) = self.local.load() else {
            return Ok(None);
        };
        if session.is_expired(self.clock.now()) {
            tracing::info!(expires_at = %session.expires_at, "persisted session already expired");
            self.local.clear();
            return Ok(None);
        }

        self.transition(SessionState::Authenticating, |_| {})?;
        match self.provider.fetch_profile(&session).await {
            Ok(user) => {
                self.expiry.open_epoch();
                tracing::info!(user = %user.id, "session restored");
                let restored = user.clone();
                self.transition(SessionState::Authenticated, move |snap| {
                    snap.session = Some(session);
                    snap.user = Some(restored);
                    snap.last_refresh = None;
                    snap.expired = false;
                })?;
                Ok(Some(user))
            }
            Err(err) => {
                if err.ends_session() {
                    self.local.clear();
                }
                tracing::warn!(error = %err, "session restore failed");
                self.transition(SessionState::Unauthenticated, clear_identity)?;
                Err(err)
            }
        }
    }

    /// Expire the session if its access token is past expiry
    pub fn check_expiry(&self) -> bool {
        let snapshot = self.snapshot();
        match snapshot.session {
            Some(session) if snapshot.state.is_signed_in() && session.is_expired(self.clock.now()) => {
                self.lose_session(snapshot.state, "access token past expiry")
            }
            _ => false,
        }
    }

    /// Session was lost outside an explicit sign-out (e.g. provider event)
    pub fn session_lost(&self, reason: &str) -> bool {
        let state = self.state();
        if state.is_signed_in() {
            self.lose_session(state, reason)
        } else {
            false
        }
    }

    fn lose_session(&self, from: SessionState, reason: &str) -> bool {
        let lang = self
            .tx
            .borrow()
            .user
            .as_ref()
            .map(|u| u.language)
            .unwrap_or_default();

        if let Err(err) = self.transition(SessionState::Expired, |snap| {
            clear_identity(snap);
            snap.expired = true;
        }) {
            tracing::debug!(%from, error = %err, "session already left signed-in state");
            return false;
        }
        self.local.clear();
        tracing::warn!(%from, reason, "session lost");
        self.expiry.notify_expired(lang);

        if let Err(err) = self.transition(SessionState::Unauthenticated, |_| {}) {
            tracing::error!(error = %err, "expired session could not be closed");
        }
        true
    }

    fn clean_slate(&self) {
        self.local.clear();
        if self.state() != SessionState::Unauthenticated {
            if let Err(err) = self.transition(SessionState::Unauthenticated, |snap| {
                clear_identity(snap);
                snap.expired = false;
            }) {
                tracing::error!(error = %err, "could not reset session before sign-in");
            }
        }
    }

    fn transition(
        &self,
        to: SessionState,
        update: impl FnOnce(&mut SessionSnapshot),
    ) -> Result<(), AuthError> {
        let mut outcome = Ok(());
        self.tx.send_if_modified(|snap| match validate_transition(snap.state, to) {
            Ok(()) => {
                tracing::debug!(from = %snap.state, %to, "session transition");
                snap.state = to;
                update(snap);
                true
            }
            Err(err) => {
                outcome = Err(err);
                false
            }
        });
        if outcome.is_ok() {
            self.sync_scope();
        }
        outcome
    }

    fn sync_scope(&self) {
        let Some(scope) = self.scope.as_ref() else {
            return;
        };
        let (state, user) = {
            let snap = self.tx.borrow();
            (snap.state, snap.user.as_ref().map(|u| u.id))
        };
        match user {
            Some(user) if state.is_signed_in() => scope.bind(user),
            _ => scope.reset(),
        }
    }
}
