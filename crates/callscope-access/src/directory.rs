//! Account directory
//!
//! Exposes every tenant account (privileged view) and the accounts assigned
//! to a user, plus the superAdmin-only mutations:
//! - account creation and status toggling
//! - idempotent user/account assignment
//!
//! Reads are cached with moka and invalidated on every mutation.

use crate::retry::RetryPolicy;
use async_trait::async_trait;
use callscope_core::{
    Account, AccountId, AccountStatus, Clock, DirectoryConfig, QueryError, Role, User,
    UserAccountAssignment, UserId, ValidationError,
};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Storage contract for accounts and assignments
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Every account
    async fn list_accounts(&self) -> Result<Vec<Account>, QueryError>;

    /// Account ids assigned to `user_id`
    async fn list_assignments(&self, user_id: UserId) -> Result<Vec<AccountId>, QueryError>;

    async fn insert_account(&self, account: Account) -> Result<Account, QueryError>;

    /// Fails with [`QueryError::NotFound`] for unknown ids
    async fn update_status(&self, id: AccountId, status: AccountStatus) -> Result<(), QueryError>;

    async fn insert_assignment(&self, assignment: UserAccountAssignment) -> Result<(), QueryError>;

    async fn delete_assignment(&self, assignment: UserAccountAssignment) -> Result<(), QueryError>;
}

/// Directory errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    /// Input rejected locally
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Account does not exist
    #[error("account not found: {0}")]
    NotFound(AccountId),

    /// Actor's role may not perform the mutation
    #[error("role {role} may not manage accounts")]
    Denied { role: Role },

    /// Storage failure
    #[error("storage error: {0}")]
    Query(#[from] QueryError),

    /// A newer selection, sign-in or sign-out replaced this one
    #[error("scope selection superseded")]
    Superseded,

    /// Resolution made for a user other than the signed-in one
    #[error("scope belongs to {principal}, not {requested}")]
    PrincipalMismatch {
        principal: UserId,
        requested: UserId,
    },

    /// No one is signed in
    #[error("no signed-in user to scope")]
    SignedOut,
}

/// Account directory over an [`AccountStore`]
pub struct AccountDirectory {
    store: Arc<dyn AccountStore>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    all: Cache<(), Arc<Vec<Account>>>,
    assigned: Cache<UserId, Arc<Vec<Account>>>,
}

impl std::fmt::Debug for AccountDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountDirectory")
            .field("retry", &self.retry)
            .field("cached_users", &self.assigned.entry_count())
            .finish_non_exhaustive()
    }
}

impl AccountDirectory {
    /// Create directory with cache settings
    #[must_use]
    pub fn new(
        store: Arc<dyn AccountStore>,
        clock: Arc<dyn Clock>,
        config: &DirectoryConfig,
        retry: RetryPolicy,
    ) -> Self {
        let ttl = Duration::from_secs(config.cache_ttl_secs);
        Self {
            store,
            clock,
            retry,
            all: Cache::builder().max_capacity(1).time_to_live(ttl).build(),
            assigned: Cache::builder()
                .max_capacity(config.cache_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Every account, ordered by name
    ///
    /// Privileged view: callers gate it to superAdmin; scope enforcement
    /// happens in the resolver.
    pub async fn list_all_accounts(&self) -> Result<Arc<Vec<Account>>, DirectoryError> {
        if let Some(cached) = self.all.get(&()).await {
            return Ok(cached);
        }
        let mut accounts = self
            .retry
            .run("list_accounts", || self.store.list_accounts())
            .await?;
        sort_for_display(&mut accounts);
        let accounts = Arc::new(accounts);
        self.all.insert((), accounts.clone()).await;
        Ok(accounts)
    }

    /// Accounts assigned to `user_id`, ordered by name
    pub async fn list_assigned_accounts(
        &self,
        user_id: UserId,
    ) -> Result<Arc<Vec<Account>>, DirectoryError> {
        if let Some(cached) = self.assigned.get(&user_id).await {
            return Ok(cached);
        }
        let ids = self
            .retry
            .run("list_assignments", || self.store.list_assignments(user_id))
            .await?;
        let all = self.list_all_accounts().await?;
        let assigned: Vec<Account> = all.iter().filter(|a| ids.contains(&a.id)).cloned().collect();
        let assigned = Arc::new(assigned);
        self.assigned.insert(user_id, assigned.clone()).await;
        Ok(assigned)
    }

    /// Accounts `user` may pick a scope from
    ///
    /// superAdmin picks from every account; everyone else from their
    /// assignments.
    pub async fn candidate_accounts(&self, user: &User) -> Result<Arc<Vec<Account>>, DirectoryError> {
        if user.role.can_view_all_accounts() {
            self.list_all_accounts().await
        } else {
            self.list_assigned_accounts(user.id).await
        }
    }

    /// Create an active account
    pub async fn create_account(&self, actor: &User, name: &str) -> Result<Account, DirectoryError> {
        ensure_manager(actor)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::new("name", "account name must not be empty").into());
        }

        let account = self
            .store
            .insert_account(Account::new(name, self.clock.now()))
            .await?;
        tracing::info!(actor = %actor.id, account = %account.id, name = %account.name, "account created");
        self.invalidate_all();
        Ok(account)
    }

    /// Toggle account status
    pub async fn set_account_status(
        &self,
        actor: &User,
        account_id: AccountId,
        status: AccountStatus,
    ) -> Result<(), DirectoryError> {
        ensure_manager(actor)?;
        match self.store.update_status(account_id, status).await {
            Ok(()) => {}
            Err(QueryError::NotFound(_)) => return Err(DirectoryError::NotFound(account_id)),
            Err(err) => return Err(err.into()),
        }
        tracing::info!(actor = %actor.id, account = %account_id, ?status, "account status changed");
        self.invalidate_all();
        Ok(())
    }

    /// Assign `user_id` to `account_id`; a no-op if already assigned
    pub async fn assign_user(
        &self,
        actor: &User,
        user_id: UserId,
        account_id: AccountId,
    ) -> Result<(), DirectoryError> {
        ensure_manager(actor)?;
        let all = self.list_all_accounts().await?;
        if !all.iter().any(|a| a.id == account_id) {
            return Err(DirectoryError::NotFound(account_id));
        }

        let current = self.store.list_assignments(user_id).await?;
        if current.contains(&account_id) {
            tracing::debug!(user = %user_id, account = %account_id, "already assigned");
            return Ok(());
        }

        self.store
            .insert_assignment(UserAccountAssignment {
                user_id,
                account_id,
            })
            .await?;
        tracing::info!(actor = %actor.id, user = %user_id, account = %account_id, "user assigned");
        self.assigned.invalidate(&user_id).await;
        Ok(())
    }

    /// Remove an assignment; a no-op if absent
    pub async fn unassign_user(
        &self,
        actor: &User,
        user_id: UserId,
        account_id: AccountId,
    ) -> Result<(), DirectoryError> {
        ensure_manager(actor)?;
        let current = self.store.list_assignments(user_id).await?;
        if !current.contains(&account_id) {
            tracing::debug!(user = %user_id, account = %account_id, "not assigned");
            return Ok(());
        }

        self.store
            .delete_assignment(UserAccountAssignment {
                user_id,
                account_id,
            })
            .await?;
        tracing::info!(actor = %actor.id, user = %user_id, account = %account_id, "user unassigned");
        self.assigned.invalidate(&user_id).await;
        Ok(())
    }

    /// Drop every cached listing
    pub fn invalidate_all(&self) {
        self.all.invalidate_all();
        self.assigned.invalidate_all();
    }
}

fn ensure_manager(actor: &User) -> Result<(), DirectoryError> {
    if actor.role.can_manage_accounts() {
        Ok(())
    } else {
        tracing::warn!(actor = %actor.id, role = %actor.role, "account mutation denied");
        Err(DirectoryError::Denied { role: actor.role })
    }
}

fn sort_for_display(accounts: &mut [Account]) {
    accounts.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.id.cmp(&b.id))
    });
}
