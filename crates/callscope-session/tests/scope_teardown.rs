//! Account scope follows the session through sign-out, expiry and re-sign-in

use callscope_access::{DirectoryError, EffectiveScope};
use callscope_core::{Account, Role, SelectedScope, User};
use callscope_session::{Credentials, ExpiryNotifier, MemoryLocalAuthStore, SessionStore};
use callscope_test_utils::{
    accounts, call, init_test_tracing, FakeAuthProvider, RecordingNotifier, ScopedStack, TokioClock,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

const ROOT_EMAIL: &str = "root@callscope.io";
const AGENT_EMAIL: &str = "agent@acme.com";
const PASSWORD: &str = "hunter22";

struct Rig {
    stack: ScopedStack,
    provider: Arc<FakeAuthProvider>,
    session: Arc<SessionStore>,
    root: User,
    agent: User,
    acme: Account,
}

fn rig() -> Rig {
    init_test_tracing();
    let all = accounts(&["Acme", "Globex"]);
    let acme = all[0].clone();
    let stack = ScopedStack::new(all.clone());
    for (i, account) in all.iter().enumerate() {
        stack.rows.insert(&call(account.id, "ana", i as u32, "routine call"));
    }

    let root = User::new(Role::SuperAdmin, "root");
    let agent = User::new(Role::Agent, "agent");
    stack.accounts.assign(agent.id, acme.id);

    let clock = Arc::new(TokioClock::new());
    let provider = Arc::new(
        FakeAuthProvider::new(clock.clone())
            .with_user(ROOT_EMAIL, PASSWORD, root.clone())
            .with_user(AGENT_EMAIL, PASSWORD, agent.clone()),
    );
    let session = Arc::new(
        SessionStore::new(
            provider.clone(),
            Arc::new(MemoryLocalAuthStore::new()),
            clock,
            Arc::new(ExpiryNotifier::new(Arc::new(RecordingNotifier::new()))),
        )
        .with_scope(stack.store.clone()),
    );
    Rig {
        stack,
        provider,
        session,
        root,
        agent,
        acme,
    }
}

async fn sign_in_with_all_accounts(rig: &Rig) {
    rig.session
        .sign_in(&Credentials::new(ROOT_EMAIL, PASSWORD).unwrap())
        .await
        .unwrap();
    rig.stack
        .scope
        .select(&rig.root, SelectedScope::All)
        .await
        .unwrap();
    let rows = rig.stack.queries.recent_calls(10).await.unwrap();
    assert_eq!(rows.value().len(), 2);
}

#[tokio::test]
async fn nothing_is_attached_before_sign_in() {
    let rig = rig();

    let err = rig
        .stack
        .scope
        .select(&rig.root, SelectedScope::All)
        .await
        .unwrap_err();

    assert_eq!(err, DirectoryError::SignedOut);
    assert_eq!(rig.stack.store.current().principal(), None);
}

#[tokio::test]
async fn sign_out_leaves_no_scope_to_read() {
    let rig = rig();
    sign_in_with_all_accounts(&rig).await;

    rig.session.sign_out().await;

    let before = rig.stack.rows.select_calls();
    let rows = rig.stack.queries.recent_calls(10).await.unwrap();
    assert!(rows.value().is_empty());
    assert_eq!(rows.scope(), EffectiveScope::NoAccounts);
    assert_eq!(rig.stack.rows.select_calls(), before);
    assert_eq!(rig.stack.store.current().principal(), None);
    assert!(rig.stack.scope.selector(&rig.root).is_none());

    // a selection arriving after sign-out cannot revive the scope
    let err = rig
        .stack
        .scope
        .select(&rig.root, SelectedScope::All)
        .await
        .unwrap_err();
    assert_eq!(err, DirectoryError::SignedOut);
    assert!(rig.stack.queries.recent_calls(10).await.unwrap().value().is_empty());
}

#[tokio::test]
async fn lost_session_drops_the_scope() {
    let rig = rig();
    sign_in_with_all_accounts(&rig).await;

    assert!(rig.session.session_lost("provider signed-out event"));

    let before = rig.stack.rows.select_calls();
    assert!(rig.stack.queries.recent_calls(10).await.unwrap().value().is_empty());
    assert_eq!(rig.stack.rows.select_calls(), before);
    assert_eq!(rig.stack.store.current().effective(), EffectiveScope::NoAccounts);
}

#[tokio::test]
async fn next_user_never_reads_through_previous_scope() {
    let rig = rig();
    sign_in_with_all_accounts(&rig).await;
    rig.session.sign_out().await;

    rig.session
        .sign_in(&Credentials::new(AGENT_EMAIL, PASSWORD).unwrap())
        .await
        .unwrap();

    let before = rig.stack.rows.select_calls();
    assert!(rig.stack.queries.recent_calls(10).await.unwrap().value().is_empty());
    assert_eq!(rig.stack.rows.select_calls(), before);
    assert_eq!(rig.stack.store.current().principal(), Some(rig.agent.id));

    // the previous user's selection is refused outright
    let err = rig
        .stack
        .scope
        .select(&rig.root, SelectedScope::All)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        DirectoryError::PrincipalMismatch {
            principal: rig.agent.id,
            requested: rig.root.id,
        }
    );

    rig.stack.scope.load(&rig.agent).await.unwrap();
    let rows = rig.stack.queries.recent_calls(10).await.unwrap();
    assert_eq!(rows.scope(), EffectiveScope::Account(rig.acme.id));
    assert!(rows.value().iter().all(|c| c.account_id == rig.acme.id));
}

#[tokio::test(start_paused = true)]
async fn sign_in_starts_from_a_clean_scope() {
    let rig = rig();
    sign_in_with_all_accounts(&rig).await;
    rig.provider.set_delay(Duration::from_millis(200));

    let session = rig.session.clone();
    let signing_in = tokio::spawn(async move {
        session
            .sign_in(&Credentials::new(AGENT_EMAIL, PASSWORD).unwrap())
            .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(rig.stack.store.current().effective(), EffectiveScope::NoAccounts);
    assert!(rig.stack.queries.recent_calls(10).await.unwrap().value().is_empty());

    signing_in.await.unwrap().unwrap();
    assert_eq!(rig.stack.store.current().principal(), Some(rig.agent.id));
}
