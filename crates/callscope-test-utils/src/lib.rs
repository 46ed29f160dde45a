//! Testing utilities for the Callscope workspace
//!
//! In-memory stores, fake providers, fixtures and a wired-up scoped access
//! stack.

#![allow(missing_docs)]

pub mod auth;
pub mod chat;
pub mod stores;

pub use auth::{FakeAuthProvider, RecordingNotifier, TokioClock};
pub use chat::ScriptedChatModel;
pub use stores::{MemoryAccountStore, MemoryRowStore};

use callscope_access::{
    AccountDirectory, AccountScope, MemoryHintStore, RetryPolicy, ScopeStore, ScopedQueryBuilder,
};
use callscope_core::{
    Account, AccountId, CallId, CallRecord, DirectoryConfig, FeedbackRecord, SystemClock,
};
use chrono::{TimeZone, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Install a test-friendly tracing subscriber (idempotent)
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Accounts with fixed creation times, in the given order
pub fn accounts(names: &[&str]) -> Vec<Account> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let created = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
                + chrono::Duration::days(i as i64);
            Account::new(*name, created)
        })
        .collect()
}

/// Call row; `minute` orders calls by creation time
pub fn call(account_id: AccountId, agent: &str, minute: u32, summary: &str) -> CallRecord {
    CallRecord {
        id: CallId::new(),
        account_id,
        agent_name: agent.to_string(),
        created_at: Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
            + chrono::Duration::minutes(i64::from(minute)),
        duration_secs: 180 + minute * 7,
        score: Some(60.0 + minute as f32),
        summary: Some(summary.to_string()),
    }
}

pub fn feedback(
    account_id: AccountId,
    call_id: CallId,
    behavior: &str,
    passed: bool,
    comment: Option<&str>,
) -> FeedbackRecord {
    FeedbackRecord {
        id: Uuid::new_v4(),
        account_id,
        call_id,
        behavior_name: behavior.to_string(),
        passed,
        comment: comment.map(str::to_string),
        created_at: Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap(),
    }
}

/// Scoped access stack over in-memory stores
pub struct ScopedStack {
    pub accounts: Arc<MemoryAccountStore>,
    pub rows: Arc<MemoryRowStore>,
    pub hints: Arc<MemoryHintStore>,
    pub directory: Arc<AccountDirectory>,
    pub store: Arc<ScopeStore>,
    pub scope: AccountScope,
    pub queries: Arc<ScopedQueryBuilder>,
}

impl ScopedStack {
    /// Stack without retries
    pub fn new(accounts: Vec<Account>) -> Self {
        Self::with_retry(accounts, RetryPolicy::none())
    }

    pub fn with_retry(accounts: Vec<Account>, retry: RetryPolicy) -> Self {
        let account_store = Arc::new(MemoryAccountStore::with_accounts(accounts));
        let rows = Arc::new(MemoryRowStore::new());
        let hints = Arc::new(MemoryHintStore::new());
        let directory = Arc::new(AccountDirectory::new(
            account_store.clone(),
            Arc::new(SystemClock),
            &DirectoryConfig::default(),
            retry.clone(),
        ));
        let store = Arc::new(ScopeStore::new());
        let scope = AccountScope::new(directory.clone(), hints.clone(), store.clone());
        let queries = Arc::new(ScopedQueryBuilder::new(rows.clone(), store.clone(), retry));
        Self {
            accounts: account_store,
            rows,
            hints,
            directory,
            store,
            scope,
            queries,
        }
    }
}
