//! In-memory account and row stores

use async_trait::async_trait;
use callscope_access::{AccountStore, Filter, RowStore, ScopedQuery, ACCOUNT_COLUMN};
use callscope_core::{
    Account, AccountId, AccountScoped, AccountStatus, QueryError, Table, UserAccountAssignment,
    UserId,
};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Account store backed by process memory
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: RwLock<Vec<Account>>,
    assignments: DashMap<UserId, Vec<AccountId>>,
    list_calls: AtomicUsize,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        let store = Self::new();
        store.accounts.write().extend(accounts);
        store
    }

    pub fn add_account(&self, account: Account) {
        self.accounts.write().push(account);
    }

    /// Assign directly, bypassing the directory (and its cache)
    pub fn assign(&self, user_id: UserId, account_id: AccountId) {
        let mut entry = self.assignments.entry(user_id).or_default();
        if !entry.contains(&account_id) {
            entry.push(account_id);
        }
    }

    /// Revoke directly, bypassing the directory (and its cache)
    pub fn revoke(&self, user_id: UserId, account_id: AccountId) {
        if let Some(mut entry) = self.assignments.get_mut(&user_id) {
            entry.retain(|id| *id != account_id);
        }
    }

    pub fn assignments_of(&self, user_id: UserId) -> Vec<AccountId> {
        self.assignments
            .get(&user_id)
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }

    pub fn account(&self, id: AccountId) -> Option<Account> {
        self.accounts.read().iter().find(|a| a.id == id).cloned()
    }

    /// Number of listing calls (accounts plus assignments)
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn list_accounts(&self) -> Result<Vec<Account>, QueryError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.accounts.read().clone())
    }

    async fn list_assignments(&self, user_id: UserId) -> Result<Vec<AccountId>, QueryError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.assignments_of(user_id))
    }

    async fn insert_account(&self, account: Account) -> Result<Account, QueryError> {
        self.add_account(account.clone());
        Ok(account)
    }

    async fn update_status(&self, id: AccountId, status: AccountStatus) -> Result<(), QueryError> {
        let mut accounts = self.accounts.write();
        let account = accounts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| QueryError::NotFound(format!("accounts/{id}")))?;
        account.status = status;
        Ok(())
    }

    async fn insert_assignment(&self, assignment: UserAccountAssignment) -> Result<(), QueryError> {
        self.assign(assignment.user_id, assignment.account_id);
        Ok(())
    }

    async fn delete_assignment(&self, assignment: UserAccountAssignment) -> Result<(), QueryError> {
        self.revoke(assignment.user_id, assignment.account_id);
        Ok(())
    }
}

/// Row store backed by process memory
///
/// Applies a [`ScopedQuery`] the way the storage service would. Failure
/// injection, latency and a "leaky" mode that ignores the account filter are
/// available for isolation tests.
#[derive(Debug, Default)]
pub struct MemoryRowStore {
    tables: RwLock<HashMap<Table, Vec<Value>>>,
    queries: Mutex<Vec<ScopedQuery>>,
    failures: Mutex<VecDeque<QueryError>>,
    delay: Mutex<Option<Duration>>,
    leaky: AtomicBool,
}

impl MemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a domain row into its table
    pub fn insert<T: AccountScoped + Serialize>(&self, row: &T) {
        let value = serde_json::to_value(row).expect("row serializes");
        self.insert_raw(T::TABLE, value);
    }

    /// Insert an arbitrary JSON row
    pub fn insert_raw(&self, table: Table, row: Value) {
        self.tables.write().entry(table).or_default().push(row);
    }

    /// Fail the next `n` selects with `err`
    pub fn fail_next(&self, n: usize, err: QueryError) {
        let mut failures = self.failures.lock();
        for _ in 0..n {
            failures.push_back(err.clone());
        }
    }

    /// Delay every select
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Ignore the account filter, as a misconfigured backend would
    pub fn set_leaky(&self, leaky: bool) {
        self.leaky.store(leaky, Ordering::SeqCst);
    }

    /// Queries received so far
    pub fn queries(&self) -> Vec<ScopedQuery> {
        self.queries.lock().clone()
    }

    pub fn select_calls(&self) -> usize {
        self.queries.lock().len()
    }
}

#[async_trait]
impl RowStore for MemoryRowStore {
    async fn select(&self, query: &ScopedQuery) -> Result<Vec<Value>, QueryError> {
        self.queries.lock().push(query.clone());

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.failures.lock().pop_front() {
            return Err(err);
        }

        let leaky = self.leaky.load(Ordering::SeqCst);
        let filters: Vec<Filter> = query
            .filters()
            .into_iter()
            .filter(|f| !(leaky && matches!(f, Filter::Eq { column, .. } if column == ACCOUNT_COLUMN)))
            .collect();

        let mut rows: Vec<Value> = self
            .tables
            .read()
            .get(&query.table())
            .map(|rows| {
                rows.iter()
                    .filter(|row| filters.iter().all(|f| f.matches(row)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        query.arrange(&mut rows);
        Ok(rows)
    }
}
