//! Scoped query building
//!
//! Every domain read goes through [`ScopedQueryBuilder`]. A [`DomainQuery`]
//! describes what a screen wants; it cannot be sent anywhere on its own.
//! Only the builder turns it into a [`ScopedQuery`], and [`RowStore`] only
//! accepts [`ScopedQuery`], so a fetch that skips the account filter does not
//! compile.
//!
//! # Filter injection
//!
//! | effective scope | store call |
//! |-----------------|------------|
//! | `Account(id)`   | base filters + `account_id = id` |
//! | `AllAccounts`   | base filters only (superAdmin) |
//! | `NoAccounts`    | none; empty result |

use crate::resolver::{EffectiveScope, Resolution};
use crate::retry::RetryPolicy;
use crate::scope_store::{ScopeSnapshot, ScopeStore, Scoped};
use async_trait::async_trait;
use callscope_core::telemetry::AUDIT_TARGET;
use callscope_core::{
    AccountId, AccountScoped, BehaviorRecord, CallId, CallRecord, FeedbackRecord, PromptRecord,
    QueryError, Table,
};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Column every scoped table carries
pub const ACCOUNT_COLUMN: &str = "account_id";

/// Row filter in the storage contract
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `column = value`
    Eq { column: String, value: Value },
    /// `column in (values)`
    In { column: String, values: Vec<Value> },
    /// `column >= value`
    Gte { column: String, value: Value },
    /// `column <= value`
    Lte { column: String, value: Value },
    /// Any of the nested filters
    Or(Vec<Filter>),
}

impl Filter {
    #[must_use]
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            column: column.into(),
            value: value.into(),
        }
    }

    #[must_use]
    pub fn gte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Gte {
            column: column.into(),
            value: value.into(),
        }
    }

    #[must_use]
    pub fn lte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lte {
            column: column.into(),
            value: value.into(),
        }
    }

    #[must_use]
    pub fn in_list(column: impl Into<String>, values: Vec<Value>) -> Self {
        Self::In {
            column: column.into(),
            values,
        }
    }

    /// Evaluate against a JSON row
    #[must_use]
    pub fn matches(&self, row: &Value) -> bool {
        match self {
            Filter::Eq { column, value } => row.get(column) == Some(value),
            Filter::In { column, values } => row.get(column).is_some_and(|v| values.contains(v)),
            Filter::Gte { column, value } => row
                .get(column)
                .and_then(|v| compare(v, value))
                .is_some_and(|o| o != Ordering::Less),
            Filter::Lte { column, value } => row
                .get(column)
                .and_then(|v| compare(v, value))
                .is_some_and(|o| o != Ordering::Greater),
            Filter::Or(any) => any.iter().any(|f| f.matches(row)),
        }
    }

    /// Column this filter constrains, for plain filters
    fn column(&self) -> Option<&str> {
        match self {
            Filter::Eq { column, .. }
            | Filter::In { column, .. }
            | Filter::Gte { column, .. }
            | Filter::Lte { column, .. } => Some(column),
            Filter::Or(_) => None,
        }
    }

    fn touches(&self, column: &str) -> bool {
        match self {
            Filter::Or(any) => any.iter().any(|f| f.touches(column)),
            other => other.column() == Some(column),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Eq { column, value } => write!(f, "{column}=eq.{value}"),
            Filter::In { column, values } => {
                let list: Vec<String> = values.iter().map(Value::to_string).collect();
                write!(f, "{column}=in.({})", list.join(","))
            }
            Filter::Gte { column, value } => write!(f, "{column}=gte.{value}"),
            Filter::Lte { column, value } => write!(f, "{column}=lte.{value}"),
            Filter::Or(any) => {
                let parts: Vec<String> = any.iter().map(ToString::to_string).collect();
                write!(f, "or=({})", parts.join(","))
            }
        }
    }
}

// Numbers compare numerically, strings lexically (RFC 3339 timestamps sort correctly).
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Sort order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Order {
    Asc(String),
    Desc(String),
}

/// Unscoped description of a domain read
///
/// Carries no account constraint and is rejected if it tries to add one;
/// the account filter belongs to the builder alone.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainQuery {
    table: Table,
    filters: Vec<Filter>,
    order: Option<Order>,
    limit: Option<usize>,
}

impl DomainQuery {
    #[must_use]
    pub fn new(table: Table) -> Self {
        Self {
            table,
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    /// Query over the table of row type `T`
    #[must_use]
    pub fn of<T: AccountScoped>() -> Self {
        Self::new(T::TABLE)
    }

    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    #[must_use]
    pub fn eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::eq(column, value))
    }

    #[must_use]
    pub fn or(self, any: Vec<Filter>) -> Self {
        self.filter(Filter::Or(any))
    }

    #[must_use]
    pub fn order_desc(mut self, column: &str) -> Self {
        self.order = Some(Order::Desc(column.to_string()));
        self
    }

    #[must_use]
    pub fn order_asc(mut self, column: &str) -> Self {
        self.order = Some(Order::Asc(column.to_string()));
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[inline]
    #[must_use]
    pub fn table(&self) -> Table {
        self.table
    }

    #[must_use]
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    fn check(&self) -> Result<(), QueryError> {
        if self.filters.iter().any(|f| f.touches(ACCOUNT_COLUMN)) {
            return Err(QueryError::AuthorizationDenied(format!(
                "{} filters are injected by the scoped query builder",
                ACCOUNT_COLUMN
            )));
        }
        Ok(())
    }
}

/// Query with the effective account filter applied
///
/// Only [`ScopedQueryBuilder::with_scope`] creates these.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedQuery {
    base: DomainQuery,
    account: Option<AccountId>,
    generation: u64,
}

impl ScopedQuery {
    #[inline]
    #[must_use]
    pub fn table(&self) -> Table {
        self.base.table
    }

    /// Injected account constraint; `None` only for the superAdmin global view
    #[inline]
    #[must_use]
    pub fn account(&self) -> Option<AccountId> {
        self.account
    }

    /// Every filter to send, account filter included
    #[must_use]
    pub fn filters(&self) -> Vec<Filter> {
        let mut filters = self.base.filters.clone();
        if let Some(account) = self.account {
            filters.push(Filter::eq(ACCOUNT_COLUMN, account.to_string()));
        }
        filters
    }

    #[must_use]
    pub fn order(&self) -> Option<&Order> {
        self.base.order.as_ref()
    }

    #[must_use]
    pub fn limit(&self) -> Option<usize> {
        self.base.limit
    }

    /// Scope generation the query was built under
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether a JSON row satisfies every filter
    #[must_use]
    pub fn matches(&self, row: &Value) -> bool {
        self.filters().iter().all(|f| f.matches(row))
    }

    /// Apply order and limit to already-filtered rows
    pub fn arrange(&self, rows: &mut Vec<Value>) {
        if let Some(order) = self.order() {
            let (column, desc) = match order {
                Order::Asc(c) => (c.as_str(), false),
                Order::Desc(c) => (c.as_str(), true),
            };
            rows.sort_by(|a, b| {
                let ord = match (a.get(column), b.get(column)) {
                    (Some(x), Some(y)) => compare(x, y).unwrap_or(Ordering::Equal),
                    _ => Ordering::Equal,
                };
                if desc {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }
        if let Some(limit) = self.limit() {
            rows.truncate(limit);
        }
    }
}

impl fmt::Display for ScopedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let filters: Vec<String> = self.filters().iter().map(ToString::to_string).collect();
        write!(f, "{}?{}", self.table(), filters.join("&"))?;
        match self.order() {
            Some(Order::Asc(c)) => write!(f, "&order={c}.asc")?,
            Some(Order::Desc(c)) => write!(f, "&order={c}.desc")?,
            None => {}
        }
        if let Some(limit) = self.limit() {
            write!(f, "&limit={limit}")?;
        }
        Ok(())
    }
}

/// Result of applying a scope to a base query
#[derive(Debug, Clone, PartialEq)]
pub enum ScopeOutcome {
    /// Send this query
    Query(ScopedQuery),
    /// Nothing in scope; do not contact the store
    Empty,
}

/// Row storage contract
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Rows matching `query`, as JSON objects
    async fn select(&self, query: &ScopedQuery) -> Result<Vec<Value>, QueryError>;
}

/// Applies the current effective scope to every domain read
pub struct ScopedQueryBuilder {
    rows: Arc<dyn RowStore>,
    scope: Arc<ScopeStore>,
    retry: RetryPolicy,
}

impl fmt::Debug for ScopedQueryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedQueryBuilder")
            .field("scope", &self.scope)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl ScopedQueryBuilder {
    #[must_use]
    pub fn new(rows: Arc<dyn RowStore>, scope: Arc<ScopeStore>, retry: RetryPolicy) -> Self {
        Self { rows, scope, retry }
    }

    /// Shared scope store reads are bound to
    #[must_use]
    pub fn scope_store(&self) -> &Arc<ScopeStore> {
        &self.scope
    }

    /// Apply `resolution` to `base`
    ///
    /// The only code path where an unscoped query can exist is
    /// `EffectiveScope::AllAccounts`, which the resolver grants to superAdmin
    /// alone.
    pub fn with_scope(
        base: DomainQuery,
        resolution: &Resolution,
        generation: u64,
    ) -> Result<ScopeOutcome, QueryError> {
        base.check()?;
        let outcome = match resolution.effective() {
            EffectiveScope::Account(id) => ScopeOutcome::Query(ScopedQuery {
                base,
                account: Some(id),
                generation,
            }),
            EffectiveScope::AllAccounts if resolution.role().can_view_all_accounts() => {
                ScopeOutcome::Query(ScopedQuery {
                    base,
                    account: None,
                    generation,
                })
            }
            EffectiveScope::AllAccounts => {
                return Err(QueryError::AuthorizationDenied(format!(
                    "role {} may not query all accounts",
                    resolution.role()
                )))
            }
            EffectiveScope::NoAccounts => ScopeOutcome::Empty,
        };
        Ok(outcome)
    }

    /// Fetch rows of `T` under the current scope
    ///
    /// If the scope changes while the store call is in flight the call is
    /// dropped and [`QueryError::Superseded`] is returned.
    pub async fn fetch<T: AccountScoped>(
        &self,
        base: DomainQuery,
    ) -> Result<Scoped<Vec<T>>, QueryError> {
        if base.table() != T::TABLE {
            return Err(QueryError::Decode(format!(
                "query targets {} but rows decode as {}",
                base.table(),
                T::TABLE
            )));
        }

        let mut changes = self.scope.subscribe();
        let snapshot: ScopeSnapshot = changes.borrow_and_update().clone();
        let generation = snapshot.generation();
        let scope = snapshot.effective();

        let Some(resolution) = snapshot.resolution().cloned() else {
            tracing::debug!(table = %T::TABLE, "scope not resolved yet, returning no rows");
            return Ok(Scoped::new(Vec::new(), generation, scope));
        };

        let query = match Self::with_scope(base, &resolution, generation)? {
            ScopeOutcome::Query(query) => query,
            ScopeOutcome::Empty => {
                tracing::info!(
                    target: AUDIT_TARGET,
                    table = %T::TABLE,
                    generation,
                    user = %resolution.user_id(),
                    "no accounts in scope, store not contacted"
                );
                return Ok(Scoped::new(Vec::new(), generation, scope));
            }
        };

        tracing::info!(
            target: AUDIT_TARGET,
            table = %query.table(),
            request = %query,
            scope = %scope,
            generation,
            user = %resolution.user_id(),
            "scoped query sent"
        );

        let rows = tokio::select! {
            biased;
            current = superseded(&mut changes, generation) => {
                tracing::debug!(table = %query.table(), issued = generation, current, "query cancelled by scope change");
                return Err(QueryError::Superseded { issued: generation, current });
            }
            rows = self.retry.run(T::TABLE.as_str(), || self.rows.select(&query)) => rows?,
        };

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let record: T = serde_json::from_value(row)?;
            if scope.admits(record.account_id()) {
                out.push(record);
            } else {
                tracing::error!(
                    target: AUDIT_TARGET,
                    table = %T::TABLE,
                    scope = %scope,
                    row_account = %record.account_id(),
                    "store returned row outside scope; dropped"
                );
            }
        }

        Ok(Scoped::new(out, generation, scope))
    }

    /// Most recent calls
    pub async fn recent_calls(&self, limit: usize) -> Result<Scoped<Vec<CallRecord>>, QueryError> {
        self.fetch(
            DomainQuery::of::<CallRecord>()
                .order_desc("created_at")
                .limit(limit),
        )
        .await
    }

    /// Active behaviors
    pub async fn behaviors(&self) -> Result<Scoped<Vec<BehaviorRecord>>, QueryError> {
        self.fetch(
            DomainQuery::of::<BehaviorRecord>()
                .eq("active", true)
                .order_asc("name"),
        )
        .await
    }

    /// Active prompts
    pub async fn prompts(&self) -> Result<Scoped<Vec<PromptRecord>>, QueryError> {
        self.fetch(
            DomainQuery::of::<PromptRecord>()
                .eq("active", true)
                .order_asc("name"),
        )
        .await
    }

    /// Most recent feedback rows
    pub async fn recent_feedback(
        &self,
        limit: usize,
    ) -> Result<Scoped<Vec<FeedbackRecord>>, QueryError> {
        self.fetch(
            DomainQuery::of::<FeedbackRecord>()
                .order_desc("created_at")
                .limit(limit),
        )
        .await
    }

    /// Feedback rows of one call
    pub async fn feedback_for_call(
        &self,
        call_id: CallId,
    ) -> Result<Scoped<Vec<FeedbackRecord>>, QueryError> {
        self.fetch(
            DomainQuery::of::<FeedbackRecord>()
                .eq("call_id", call_id.to_string())
                .order_asc("behavior_name"),
        )
        .await
    }

    /// One call by id
    pub async fn call(&self, call_id: CallId) -> Result<Scoped<CallRecord>, QueryError> {
        let found = self
            .fetch::<CallRecord>(
                DomainQuery::of::<CallRecord>()
                    .eq("id", call_id.to_string())
                    .limit(1),
            )
            .await?;
        let (generation, scope) = (found.generation(), found.scope());
        found
            .into_inner()
            .into_iter()
            .next()
            .map(|call| Scoped::new(call, generation, scope))
            .ok_or_else(|| QueryError::NotFound(format!("calls/{call_id}")))
    }
}

async fn superseded(changes: &mut watch::Receiver<ScopeSnapshot>, issued: u64) -> u64 {
    loop {
        if changes.changed().await.is_err() {
            // Store dropped; nothing can supersede this query any more.
            return futures::future::pending().await;
        }
        let current = changes.borrow_and_update().generation();
        if current != issued {
            return current;
        }
    }
}
