//! Process-wide selected scope
//!
//! [`ScopeStore`] is the single source of truth for the current resolution.
//! Every screen reads it; only [`AccountScope`] publishes resolutions, and it
//! only publishes values produced by the resolver. The session binds the
//! store to the signed-in user and resets it when the session ends. Each
//! change bumps a generation counter that in-flight queries use to detect
//! that their scope is gone.

use crate::directory::{AccountDirectory, DirectoryError};
use crate::resolver::{resolve, EffectiveScope, Resolution};
use crate::selector::ScopeSelectorView;
use async_trait::async_trait;
use callscope_core::{QueryError, SelectedScope, User, UserId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

/// Who the store is scoping for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Binding {
    /// Not attached to a session; each resolution carries its own user
    #[default]
    Detached,
    /// Attached to a session with this signed-in user
    SignedIn(UserId),
    /// Attached to a session with no one signed in
    SignedOut,
}

/// Current resolution plus its generation
///
/// Fields are private: snapshots come from [`ScopeStore::current`] or
/// [`ScopeStore::subscribe`], or are the empty default.
#[derive(Debug, Clone, Default)]
pub struct ScopeSnapshot {
    generation: u64,
    binding: Binding,
    resolution: Option<Arc<Resolution>>,
}

impl ScopeSnapshot {
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    #[must_use]
    pub fn binding(&self) -> Binding {
        self.binding
    }

    /// User whose rows the scope may expose
    #[must_use]
    pub fn principal(&self) -> Option<UserId> {
        match self.binding {
            Binding::Detached => self.resolution.as_ref().map(|r| r.user_id()),
            Binding::SignedIn(user) => Some(user),
            Binding::SignedOut => None,
        }
    }

    /// Resolution, provided it was made for the principal
    #[must_use]
    pub fn resolution(&self) -> Option<&Arc<Resolution>> {
        let principal = self.principal()?;
        self.resolution
            .as_ref()
            .filter(|r| r.user_id() == principal)
    }

    /// Effective scope, treating "not loaded yet" as no accounts
    #[must_use]
    pub fn effective(&self) -> EffectiveScope {
        self.resolution()
            .map_or(EffectiveScope::NoAccounts, |r| r.effective())
    }
}

/// Value tagged with the scope generation it was produced under
#[derive(Debug, Clone, PartialEq)]
pub struct Scoped<T> {
    value: T,
    generation: u64,
    scope: EffectiveScope,
}

impl<T> Scoped<T> {
    pub(crate) fn new(value: T, generation: u64, scope: EffectiveScope) -> Self {
        Self {
            value,
            generation,
            scope,
        }
    }

    #[inline]
    #[must_use]
    pub fn value(&self) -> &T {
        &self.value
    }

    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    #[must_use]
    pub fn scope(&self) -> EffectiveScope {
        self.scope
    }

    /// Unwrap without a freshness check; prefer [`ScopeStore::accept`]
    #[must_use]
    pub fn into_inner(self) -> T {
        self.value
    }
}

/// Shared holder of the selected scope
///
/// Besides the resolution the store tracks its [`Binding`] and a request
/// counter. Binding another user or signing out invalidates every
/// resolution still being computed.
#[derive(Debug)]
pub struct ScopeStore {
    tx: watch::Sender<ScopeSnapshot>,
    requests: AtomicU64,
}

impl ScopeStore {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ScopeSnapshot::default());
        Self {
            tx,
            requests: AtomicU64::new(0),
        }
    }

    /// Current snapshot
    #[must_use]
    pub fn current(&self) -> ScopeSnapshot {
        self.tx.borrow().clone()
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.tx.borrow().generation
    }

    /// Subscribe to scope changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ScopeSnapshot> {
        self.tx.subscribe()
    }

    /// Hand out a result only if its scope is still current
    pub fn accept<T>(&self, scoped: Scoped<T>) -> Option<T> {
        let current = self.generation();
        if scoped.generation == current {
            Some(scoped.value)
        } else {
            tracing::debug!(
                issued = scoped.generation,
                current,
                scope = %scoped.scope,
                "discarding result from superseded scope"
            );
            None
        }
    }

    /// Bind the scope to the signed-in user
    ///
    /// A resolution made for anyone else is dropped. Rebinding the same user
    /// is a no-op.
    pub fn bind(&self, user_id: UserId) {
        self.rebind(Binding::SignedIn(user_id));
    }

    /// Destroy the scope until the next [`bind`](Self::bind)
    ///
    /// Used on sign-out, expiry and at the start of a sign-in. Selections in
    /// flight are discarded and new ones are refused.
    pub fn reset(&self) {
        self.rebind(Binding::SignedOut);
    }

    fn rebind(&self, binding: Binding) {
        let changed = self.tx.send_if_modified(|snapshot| {
            if snapshot.binding == binding {
                return false;
            }
            self.requests.fetch_add(1, Ordering::AcqRel);
            snapshot.generation += 1;
            snapshot.binding = binding;
            let keep = matches!(
                (binding, snapshot.resolution.as_ref()),
                (Binding::SignedIn(user), Some(r)) if r.user_id() == user
            );
            if !keep {
                snapshot.resolution = None;
            }
            true
        });
        if changed {
            tracing::debug!(?binding, "scope rebound");
        }
    }

    /// Reserve a ticket for a resolution about to be computed
    pub(crate) fn reserve(&self) -> u64 {
        self.requests.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn is_latest(&self, ticket: u64) -> bool {
        self.requests.load(Ordering::Acquire) == ticket
    }

    /// Publish `resolution` if `ticket` is still the latest request and
    /// the resolution belongs to the bound user
    pub(crate) fn publish(
        &self,
        ticket: u64,
        resolution: Arc<Resolution>,
    ) -> Result<u64, DirectoryError> {
        let mut outcome = Err(DirectoryError::Superseded);
        self.tx.send_if_modified(|snapshot| {
            if !self.is_latest(ticket) {
                return false;
            }
            let requested = resolution.user_id();
            match snapshot.binding {
                Binding::SignedOut => {
                    outcome = Err(DirectoryError::SignedOut);
                    return false;
                }
                Binding::SignedIn(principal) if principal != requested => {
                    outcome = Err(DirectoryError::PrincipalMismatch {
                        principal,
                        requested,
                    });
                    return false;
                }
                Binding::SignedIn(_) | Binding::Detached => {}
            }
            snapshot.generation += 1;
            snapshot.resolution = Some(resolution);
            outcome = Ok(snapshot.generation);
            true
        });
        outcome
    }
}

impl Default for ScopeStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Remembered scope selection between loads
#[async_trait]
pub trait ScopeHintStore: Send + Sync {
    async fn load_hint(&self, user_id: UserId) -> Result<Option<SelectedScope>, QueryError>;

    async fn save_hint(&self, user_id: UserId, scope: SelectedScope) -> Result<(), QueryError>;

    async fn clear_hint(&self, user_id: UserId) -> Result<(), QueryError>;
}

/// In-process hint store
#[derive(Debug, Default)]
pub struct MemoryHintStore {
    hints: Mutex<HashMap<UserId, SelectedScope>>,
}

impl MemoryHintStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScopeHintStore for MemoryHintStore {
    async fn load_hint(&self, user_id: UserId) -> Result<Option<SelectedScope>, QueryError> {
        Ok(self.hints.lock().await.get(&user_id).copied())
    }

    async fn save_hint(&self, user_id: UserId, scope: SelectedScope) -> Result<(), QueryError> {
        self.hints.lock().await.insert(user_id, scope);
        Ok(())
    }

    async fn clear_hint(&self, user_id: UserId) -> Result<(), QueryError> {
        self.hints.lock().await.remove(&user_id);
        Ok(())
    }
}

/// Resolver-backed writer of the [`ScopeStore`]
///
/// Selections are applied one at a time in call order, and a selection that
/// a newer one (or a sign-in/out) overtook is never published.
pub struct AccountScope {
    directory: Arc<AccountDirectory>,
    hints: Arc<dyn ScopeHintStore>,
    store: Arc<ScopeStore>,
    serial: Mutex<()>,
}

impl std::fmt::Debug for AccountScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountScope")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl AccountScope {
    #[must_use]
    pub fn new(
        directory: Arc<AccountDirectory>,
        hints: Arc<dyn ScopeHintStore>,
        store: Arc<ScopeStore>,
    ) -> Self {
        Self {
            directory,
            hints,
            store,
            serial: Mutex::new(()),
        }
    }

    /// Shared store this writer publishes to
    #[must_use]
    pub fn store(&self) -> &Arc<ScopeStore> {
        &self.store
    }

    /// Resolve the initial scope on app load
    ///
    /// The remembered hint is only a request: it goes through the resolver
    /// like any other selection, so revoked accounts fall back to a legal
    /// scope.
    pub async fn load(&self, user: &User) -> Result<Arc<Resolution>, DirectoryError> {
        let hint = match self.hints.load_hint(user.id).await {
            Ok(hint) => hint,
            Err(err) => {
                tracing::warn!(user = %user.id, error = %err, "scope hint unavailable");
                None
            }
        };
        self.apply(user, hint).await
    }

    /// Switch to a newly requested scope
    pub async fn select(
        &self,
        user: &User,
        requested: SelectedScope,
    ) -> Result<Arc<Resolution>, DirectoryError> {
        self.apply(user, Some(requested)).await
    }

    /// Selector view for the current resolution
    #[must_use]
    pub fn selector(&self, user: &User) -> Option<ScopeSelectorView> {
        self.store
            .current()
            .resolution()
            .filter(|r| r.user_id() == user.id)
            .map(|r| ScopeSelectorView::for_resolution(r, user.language))
    }

    /// Forget the current scope (sign-out)
    pub fn clear(&self) {
        self.store.reset();
    }

    async fn apply(
        &self,
        user: &User,
        requested: Option<SelectedScope>,
    ) -> Result<Arc<Resolution>, DirectoryError> {
        let ticket = self.store.reserve();
        let _serial = self.serial.lock().await;
        if !self.store.is_latest(ticket) {
            tracing::debug!(user = %user.id, ticket, "scope selection overtaken before it ran");
            return Err(DirectoryError::Superseded);
        }

        let accounts = self.directory.candidate_accounts(user).await?;
        let resolution = Arc::new(resolve(user, &accounts, requested));
        let generation = self.store.publish(ticket, resolution.clone())?;

        let persisted = match resolution.selected() {
            Some(selected) => self.hints.save_hint(user.id, selected).await,
            None => self.hints.clear_hint(user.id).await,
        };
        if let Err(err) = persisted {
            tracing::warn!(user = %user.id, error = %err, "failed to persist scope hint");
        }

        tracing::info!(
            user = %user.id,
            scope = %resolution.effective(),
            generation,
            downgraded = resolution.is_downgraded(),
            "scope published"
        );
        Ok(resolution)
    }
}
