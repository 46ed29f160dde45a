//! End-to-end scope resolution and scoped reads over in-memory stores

use async_trait::async_trait;
use callscope_access::{
    AccountScope, DirectoryError, DomainQuery, EffectiveScope, MemoryHintStore, RetryPolicy,
    ScopeHintStore, ScopeOutcome, ScopedQueryBuilder, SelectorState,
};
use callscope_core::{
    Account, AccountStatus, CallRecord, QueryError, Role, ScopeError, SelectedScope, Table, User,
    UserId,
};
use callscope_test_utils::{accounts, call, feedback, init_test_tracing, ScopedStack};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn seed_calls(stack: &ScopedStack, accounts: &[Account]) {
    for (i, account) in accounts.iter().enumerate() {
        for n in 0..3u32 {
            stack
                .rows
                .insert(&call(account.id, &format!("agent-{i}"), n + 10 * i as u32, "routine call"));
        }
    }
}

#[tokio::test]
async fn super_admin_sees_all_accounts_without_filter() {
    init_test_tracing();
    let all = accounts(&["X", "Y", "Z"]);
    let stack = ScopedStack::new(all.clone());
    seed_calls(&stack, &all);
    let root = User::new(Role::SuperAdmin, "root");

    let res = stack.scope.select(&root, SelectedScope::All).await.unwrap();
    assert_eq!(res.effective(), EffectiveScope::AllAccounts);

    let calls = stack.queries.recent_calls(50).await.unwrap();
    assert_eq!(calls.value().len(), 9);

    let sent = stack.rows.queries();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].account(), None);
}

#[tokio::test]
async fn agent_hint_all_is_downgraded_and_filtered() {
    let all = accounts(&["X", "Y"]);
    let (x, y) = (all[0].clone(), all[1].clone());
    let stack = ScopedStack::new(all.clone());
    seed_calls(&stack, &all);

    let agent = User::new(Role::Agent, "agent");
    stack.accounts.assign(agent.id, x.id);
    stack.accounts.assign(agent.id, y.id);
    stack.hints.save_hint(agent.id, SelectedScope::All).await.unwrap();

    let res = stack.scope.load(&agent).await.unwrap();
    assert_eq!(res.effective(), EffectiveScope::Account(x.id));
    assert_eq!(res.downgrade(), Some(ScopeError::IllegalAllRequest));

    let calls = stack.queries.recent_calls(50).await.unwrap();
    assert!(calls.value().iter().all(|c| c.account_id == x.id));
    assert_eq!(calls.value().len(), 3);
    assert_eq!(stack.rows.queries()[0].account(), Some(x.id));

    // the corrected scope, not the request, is remembered
    assert_eq!(
        stack.hints.load_hint(agent.id).await.unwrap(),
        Some(SelectedScope::Account(x.id))
    );
}

#[tokio::test]
async fn single_account_user_is_pinned_with_informational_selector() {
    let all = accounts(&["X", "Y"]);
    let stack = ScopedStack::new(all.clone());
    let sup = User::new(Role::Supervisor, "sup");
    stack.accounts.assign(sup.id, all[1].id);

    let res = stack.scope.select(&sup, SelectedScope::Account(all[0].id)).await.unwrap();
    assert_eq!(res.effective(), EffectiveScope::Account(all[1].id));

    let view = stack.scope.selector(&sup).unwrap();
    assert_eq!(view.state, SelectorState::Pinned);
    assert!(!view.enabled);
    assert_eq!(view.options.len(), 1);
}

#[tokio::test]
async fn revoked_account_hint_falls_back_to_assigned_account() {
    let all = accounts(&["X", "Y", "Z"]);
    let (x, y, z) = (all[0].clone(), all[1].clone(), all[2].clone());
    let stack = ScopedStack::new(all.clone());
    seed_calls(&stack, &all);

    let qa = User::new(Role::QualityAnalyst, "qa");
    for id in [x.id, y.id, z.id] {
        stack.accounts.assign(qa.id, id);
    }
    stack.scope.select(&qa, SelectedScope::Account(y.id)).await.unwrap();

    // Y revoked between sessions
    stack.accounts.revoke(qa.id, y.id);
    stack.directory.invalidate_all();

    let res = stack.scope.load(&qa).await.unwrap();
    assert_eq!(res.effective(), EffectiveScope::Account(x.id));
    assert_eq!(res.downgrade(), Some(ScopeError::UnassignedAccountRequest));

    let calls = stack.queries.recent_calls(50).await.unwrap();
    assert!(calls.value().iter().all(|c| c.account_id == x.id));
    assert!(!stack.rows.queries().iter().any(|q| q.account() == Some(y.id)));
}

#[tokio::test]
async fn no_accounts_never_reaches_the_store() {
    let all = accounts(&["X"]);
    let stack = ScopedStack::new(all.clone());
    seed_calls(&stack, &all);
    let agent = User::new(Role::Agent, "lonely");

    let res = stack.scope.load(&agent).await.unwrap();
    assert_eq!(res.effective(), EffectiveScope::NoAccounts);

    assert!(stack.queries.recent_calls(10).await.unwrap().value().is_empty());
    assert!(stack.queries.behaviors().await.unwrap().value().is_empty());
    assert!(stack.queries.prompts().await.unwrap().value().is_empty());
    assert!(stack.queries.recent_feedback(10).await.unwrap().value().is_empty());
    assert_eq!(stack.rows.select_calls(), 0);

    let view = stack.scope.selector(&agent).unwrap();
    assert_eq!(view.state, SelectorState::NoAccounts);
}

#[tokio::test]
async fn unresolved_scope_reads_nothing() {
    let stack = ScopedStack::new(accounts(&["X"]));
    let calls = stack.queries.recent_calls(10).await.unwrap();
    assert!(calls.value().is_empty());
    assert_eq!(calls.scope(), EffectiveScope::NoAccounts);
    assert_eq!(stack.rows.select_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn scope_change_supersedes_in_flight_query() {
    let all = accounts(&["X", "Y"]);
    let (x, y) = (all[0].clone(), all[1].clone());
    let stack = ScopedStack::new(all.clone());
    seed_calls(&stack, &all);
    let admin = User::new(Role::Admin, "admin");
    stack.accounts.assign(admin.id, x.id);
    stack.accounts.assign(admin.id, y.id);

    stack.scope.select(&admin, SelectedScope::Account(x.id)).await.unwrap();
    stack.rows.set_delay(Duration::from_secs(2));

    let queries = stack.queries.clone();
    let in_flight = tokio::spawn(async move { queries.recent_calls(50).await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(stack.rows.select_calls(), 1);

    stack.scope.select(&admin, SelectedScope::Account(y.id)).await.unwrap();

    let result = in_flight.await.unwrap();
    assert!(matches!(result, Err(QueryError::Superseded { .. })));
}

#[tokio::test(start_paused = true)]
async fn stale_results_are_not_accepted() {
    let all = accounts(&["X", "Y"]);
    let (x, y) = (all[0].clone(), all[1].clone());
    let stack = ScopedStack::new(all.clone());
    seed_calls(&stack, &all);
    let admin = User::new(Role::Admin, "admin");
    stack.accounts.assign(admin.id, x.id);
    stack.accounts.assign(admin.id, y.id);

    stack.scope.select(&admin, SelectedScope::Account(x.id)).await.unwrap();
    let for_x = stack.queries.recent_calls(50).await.unwrap();

    stack.scope.select(&admin, SelectedScope::Account(y.id)).await.unwrap();
    let for_y = stack.queries.recent_calls(50).await.unwrap();

    assert_eq!(stack.store.accept(for_x), None);
    let rows = stack.store.accept(for_y).unwrap();
    assert!(rows.iter().all(|c| c.account_id == y.id));
}

#[tokio::test]
async fn rows_from_other_accounts_are_dropped() {
    let all = accounts(&["X", "Y"]);
    let stack = ScopedStack::new(all.clone());
    seed_calls(&stack, &all);
    let agent = User::new(Role::Agent, "agent");
    stack.accounts.assign(agent.id, all[0].id);
    stack.scope.load(&agent).await.unwrap();

    stack.rows.set_leaky(true);
    let calls = stack.queries.recent_calls(50).await.unwrap();

    assert_eq!(calls.value().len(), 3);
    assert!(calls.value().iter().all(|c| c.account_id == all[0].id));
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried() {
    let all = accounts(&["X"]);
    let retry = RetryPolicy {
        jitter: 0.0,
        ..RetryPolicy::default()
    };
    let stack = ScopedStack::with_retry(all.clone(), retry);
    seed_calls(&stack, &all);
    let agent = User::new(Role::Agent, "agent");
    stack.accounts.assign(agent.id, all[0].id);
    stack.scope.load(&agent).await.unwrap();

    stack
        .rows
        .fail_next(2, QueryError::NetworkTransient("connection reset".into()));
    let calls = stack.queries.recent_calls(50).await.unwrap();
    assert_eq!(calls.value().len(), 3);
    assert_eq!(stack.rows.select_calls(), 3);

    stack
        .rows
        .fail_next(1, QueryError::AuthorizationDenied("policy".into()));
    let err = stack.queries.recent_calls(50).await.unwrap_err();
    assert!(matches!(err, QueryError::AuthorizationDenied(_)));
    assert_eq!(stack.rows.select_calls(), 4);
}

#[tokio::test]
async fn feedback_for_call_and_single_call_lookup() {
    let all = accounts(&["X", "Y"]);
    let stack = ScopedStack::new(all.clone());
    let own = call(all[0].id, "ana", 1, "refund request");
    let foreign = call(all[1].id, "ben", 2, "billing dispute");
    stack.rows.insert(&own);
    stack.rows.insert(&foreign);
    stack.rows.insert(&feedback(all[0].id, own.id, "Greeting", true, None));
    stack
        .rows
        .insert(&feedback(all[0].id, own.id, "Empathy", false, Some("interrupted twice")));

    let agent = User::new(Role::Agent, "agent");
    stack.accounts.assign(agent.id, all[0].id);
    stack.scope.load(&agent).await.unwrap();

    let found = stack.queries.call(own.id).await.unwrap();
    assert_eq!(found.value(), &own);

    let items = stack.queries.feedback_for_call(own.id).await.unwrap();
    let names: Vec<_> = items.value().iter().map(|f| f.behavior_name.as_str()).collect();
    assert_eq!(names, vec!["Empathy", "Greeting"]);

    // another account's call is invisible, not forbidden
    assert!(matches!(
        stack.queries.call(foreign.id).await,
        Err(QueryError::NotFound(_))
    ));
}

#[tokio::test]
async fn mismatched_row_type_is_rejected_before_sending() {
    let all = accounts(&["X"]);
    let stack = ScopedStack::new(all.clone());
    let agent = User::new(Role::Agent, "agent");
    stack.accounts.assign(agent.id, all[0].id);
    stack.scope.load(&agent).await.unwrap();

    let err = stack
        .queries
        .fetch::<CallRecord>(DomainQuery::new(Table::Prompts))
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::Decode(_)));
    assert_eq!(stack.rows.select_calls(), 0);
}

#[tokio::test]
async fn directory_mutations_flow_into_scope() {
    let stack = ScopedStack::new(Vec::new());
    let root = User::new(Role::SuperAdmin, "root");
    let agent = User::new(Role::Agent, "agent");

    let acme = stack.directory.create_account(&root, "Acme").await.unwrap();
    assert_eq!(stack.scope.load(&agent).await.unwrap().effective(), EffectiveScope::NoAccounts);

    stack.directory.assign_user(&root, agent.id, acme.id).await.unwrap();
    stack.directory.assign_user(&root, agent.id, acme.id).await.unwrap();
    assert_eq!(stack.accounts.assignments_of(agent.id), vec![acme.id]);

    let res = stack.scope.load(&agent).await.unwrap();
    assert_eq!(res.effective(), EffectiveScope::Account(acme.id));

    stack
        .directory
        .set_account_status(&root, acme.id, AccountStatus::Inactive)
        .await
        .unwrap();
    let listed = stack.directory.list_all_accounts().await.unwrap();
    assert_eq!(listed[0].status, AccountStatus::Inactive);

    stack.directory.unassign_user(&root, agent.id, acme.id).await.unwrap();
    stack.directory.unassign_user(&root, agent.id, acme.id).await.unwrap();
    assert_eq!(stack.scope.load(&agent).await.unwrap().effective(), EffectiveScope::NoAccounts);
}

#[tokio::test]
async fn super_admin_picks_from_every_account_regardless_of_assignments() {
    let all = accounts(&["X", "Y", "Z"]);
    let (x, z) = (all[0].clone(), all[2].clone());
    let stack = ScopedStack::new(all.clone());
    seed_calls(&stack, &all);
    let root = User::new(Role::SuperAdmin, "root");
    stack.accounts.assign(root.id, x.id);

    let res = stack.scope.load(&root).await.unwrap();
    assert_eq!(res.effective(), EffectiveScope::AllAccounts);
    assert_eq!(res.accounts().len(), 3);

    let view = stack.scope.selector(&root).unwrap();
    assert_eq!(view.state, SelectorState::Selectable);
    assert_eq!(view.options.len(), 4);

    let res = stack.scope.select(&root, SelectedScope::Account(z.id)).await.unwrap();
    assert_eq!(res.effective(), EffectiveScope::Account(z.id));
    assert_eq!(res.downgrade(), None);
}

/// Hint store whose first save stalls
#[derive(Default)]
struct StallingHints {
    inner: MemoryHintStore,
    saves: AtomicUsize,
}

#[async_trait]
impl ScopeHintStore for StallingHints {
    async fn load_hint(&self, user_id: UserId) -> Result<Option<SelectedScope>, QueryError> {
        self.inner.load_hint(user_id).await
    }

    async fn save_hint(&self, user_id: UserId, scope: SelectedScope) -> Result<(), QueryError> {
        if self.saves.fetch_add(1, Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        self.inner.save_hint(user_id, scope).await
    }

    async fn clear_hint(&self, user_id: UserId) -> Result<(), QueryError> {
        self.inner.clear_hint(user_id).await
    }
}

#[tokio::test(start_paused = true)]
async fn last_requested_scope_wins_over_slow_earlier_selection() {
    let all = accounts(&["X", "Y", "Z"]);
    let (x, y, z) = (all[0].clone(), all[1].clone(), all[2].clone());
    let stack = ScopedStack::new(all.clone());
    seed_calls(&stack, &all);
    let admin = User::new(Role::Admin, "admin");
    for account in &all {
        stack.accounts.assign(admin.id, account.id);
    }
    let hints = Arc::new(StallingHints::default());
    let scope = Arc::new(AccountScope::new(
        stack.directory.clone(),
        hints.clone(),
        stack.store.clone(),
    ));

    let spawn_select = |requested: SelectedScope| {
        let (scope, admin) = (scope.clone(), admin.clone());
        tokio::spawn(async move { scope.select(&admin, requested).await })
    };
    let to_y = spawn_select(SelectedScope::Account(y.id));
    tokio::time::sleep(Duration::from_millis(10)).await;
    let to_x = spawn_select(SelectedScope::Account(x.id));
    tokio::time::sleep(Duration::from_millis(10)).await;

    let to_z = scope.select(&admin, SelectedScope::Account(z.id)).await.unwrap();

    assert_eq!(to_z.effective(), EffectiveScope::Account(z.id));
    assert!(to_y.await.unwrap().is_ok());
    assert_eq!(to_x.await.unwrap().unwrap_err(), DirectoryError::Superseded);
    assert_eq!(stack.store.current().effective(), EffectiveScope::Account(z.id));
    assert_eq!(
        hints.load_hint(admin.id).await.unwrap(),
        Some(SelectedScope::Account(z.id))
    );

    let calls = stack.queries.recent_calls(50).await.unwrap();
    assert!(calls.value().iter().all(|c| c.account_id == z.id));
}

fn role_strategy() -> impl Strategy<Value = Role> {
    prop_oneof![
        Just(Role::SuperAdmin),
        Just(Role::Admin),
        Just(Role::QualityAnalyst),
        Just(Role::Supervisor),
        Just(Role::Agent),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_every_sent_query_carries_the_effective_filter(
        role in role_strategy(),
        assigned_mask in 0u8..16,
        request in proptest::option::of(0usize..5),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let all = accounts(&["A", "B", "C", "D"]);
            let stack = ScopedStack::new(all.clone());
            seed_calls(&stack, &all);
            let user = User::new(role, "u");
            for (i, account) in all.iter().enumerate() {
                if assigned_mask & (1 << i) != 0 {
                    stack.accounts.assign(user.id, account.id);
                }
            }
            let requested = request.map(|i| match all.get(i) {
                Some(a) => SelectedScope::Account(a.id),
                None => SelectedScope::All,
            });

            let res = match requested {
                Some(scope) => stack.scope.select(&user, scope).await.unwrap(),
                None => stack.scope.load(&user).await.unwrap(),
            };
            let calls = stack.queries.recent_calls(100).await.unwrap();
            let sent = stack.rows.queries();

            match res.effective() {
                EffectiveScope::Account(id) => {
                    prop_assert_eq!(sent.len(), 1);
                    prop_assert_eq!(sent[0].account(), Some(id));
                    prop_assert!(calls.value().iter().all(|c| c.account_id == id));
                }
                EffectiveScope::AllAccounts => {
                    prop_assert_eq!(role, Role::SuperAdmin);
                    prop_assert_eq!(sent[0].account(), None);
                }
                EffectiveScope::NoAccounts => prop_assert!(sent.is_empty()),
            }

            // the builder agrees with the store on what it would send
            let direct = ScopedQueryBuilder::with_scope(
                DomainQuery::new(Table::Calls),
                &res,
                stack.store.generation(),
            )
            .unwrap();
            match (direct, res.effective()) {
                (ScopeOutcome::Empty, EffectiveScope::NoAccounts) => {}
                (ScopeOutcome::Query(q), scope) => prop_assert_eq!(q.account(), scope.account()),
                (ScopeOutcome::Empty, other) => prop_assert!(false, "unexpected empty for {}", other),
            }
            Ok(())
        })?;
    }
}
