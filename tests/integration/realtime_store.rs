//! Integration tests for the per-user store against the local emulator.
//!
//! Covers password sign-in errors, CRUD scoped to the signed-in user, the
//! live subscription, token renewal after expiry, and that nothing under
//! `users/` is requested while signed out or with a malformed key.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use tarefas::identity::firebase::FirebaseIdentity;
use tarefas::identity::{AuthError, IdentityProvider};
use tarefas::store::http::DatabaseClient;
use tarefas::store::realtime::RealtimeStore;
use tarefas::store::{StoreError, TaskStore};
use tarefas_emulator::server::{EmulatorState, start_server_with_state};
use tarefas_proto::path::USERS_NODE;
use tarefas_proto::task::{Task, TaskKey, TaskPatch, TaskSnapshot};
use tokio::sync::mpsc;
use url::Url;

struct Harness {
    state: Arc<EmulatorState>,
    addr: std::net::SocketAddr,
}

impl Harness {
    async fn start() -> Self {
        Self::start_with(EmulatorState::new()).await
    }

    async fn start_with(state: EmulatorState) -> Self {
        let state = Arc::new(state);
        let (addr, _handle) = start_server_with_state("127.0.0.1:0", Arc::clone(&state))
            .await
            .expect("failed to start emulator");
        Self { state, addr }
    }

    fn identity(&self) -> FirebaseIdentity {
        let endpoint =
            Url::parse(&format!("http://{}/identitytoolkit.googleapis.com", self.addr)).unwrap();
        FirebaseIdentity::new(endpoint, "demo")
    }

    fn store(&self, identity: &FirebaseIdentity) -> RealtimeStore {
        let base = Url::parse(&format!("http://{}/", self.addr)).unwrap();
        RealtimeStore::new(DatabaseClient::new(base), identity.session_watch())
    }

    /// A store that renews expired tokens through `identity`.
    fn renewing_store(&self, identity: &FirebaseIdentity) -> RealtimeStore {
        self.store(identity).with_refresher(identity.refresher())
    }

    fn count_method(&self, method: &str) -> usize {
        self.state
            .database
            .requests()
            .iter()
            .filter(|r| r.method == method)
            .count()
    }

    fn user_requests(&self) -> usize {
        self.state
            .database
            .requests()
            .iter()
            .filter(|r| r.path.segments().first().map(String::as_str) == Some(USERS_NODE))
            .count()
    }
}

async fn next_snapshot(
    rx: &mut mpsc::UnboundedReceiver<Result<TaskSnapshot, StoreError>>,
) -> TaskSnapshot {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("snapshot timed out")
        .expect("subscription closed")
        .expect("subscription failed")
}

// =============================================================================
// Sign-in
// =============================================================================

#[tokio::test]
async fn sign_up_then_sign_in() {
    let harness = Harness::start().await;
    let identity = harness.identity();

    let created = identity.sign_up("ana@example.com", "secret1").await.unwrap();
    assert_eq!(identity.current_uid(), Some(created.uid.clone()));

    identity.sign_out().await;
    assert!(identity.current_session().is_none());

    let session = identity.sign_in("ana@example.com", "secret1").await.unwrap();
    assert_eq!(session.uid, created.uid);
    assert_eq!(session.email.as_deref(), Some("ana@example.com"));
}

#[tokio::test]
async fn sign_in_errors_are_typed() {
    let harness = Harness::start().await;
    let identity = harness.identity();
    identity.sign_up("ana@example.com", "secret1").await.unwrap();
    identity.sign_out().await;

    let err = identity.sign_up("ana@example.com", "secret1").await.unwrap_err();
    assert!(matches!(err, AuthError::EmailExists));

    let err = identity.sign_in("ana@example.com", "wrong-pw").await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));

    let err = identity.sign_in("nobody@example.com", "secret1").await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));

    let err = identity.sign_up("bia@example.com", "123").await.unwrap_err();
    assert!(matches!(err, AuthError::WeakPassword(_)));

    assert!(identity.current_session().is_none());
}

// =============================================================================
// CRUD
// =============================================================================

#[tokio::test]
async fn create_then_read_back() {
    let harness = Harness::start().await;
    let identity = harness.identity();
    identity.sign_up("ana@example.com", "secret1").await.unwrap();
    let store = harness.store(&identity);

    let key = store
        .create_task(&Task::new("Comprar pão", "Padaria"))
        .await
        .unwrap();

    let snapshot = store.get_tasks().await.unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.get(&key), Some(&Task::new("Comprar pão", "Padaria")));
}

#[tokio::test]
async fn partial_update_keeps_other_fields() {
    let harness = Harness::start().await;
    let identity = harness.identity();
    identity.sign_up("ana@example.com", "secret1").await.unwrap();
    let store = harness.store(&identity);

    let key = store.create_task(&Task::new("a", "keep me")).await.unwrap();
    store
        .update_task(&key, &TaskPatch::titulo("b"))
        .await
        .unwrap();

    let snapshot = store.get_tasks().await.unwrap();
    assert_eq!(snapshot.get(&key), Some(&Task::new("b", "keep me")));
}

#[tokio::test]
async fn delete_removes_task() {
    let harness = Harness::start().await;
    let identity = harness.identity();
    identity.sign_up("ana@example.com", "secret1").await.unwrap();
    let store = harness.store(&identity);

    let keep = store.create_task(&Task::new("keep", "")).await.unwrap();
    let gone = store.create_task(&Task::new("gone", "")).await.unwrap();
    store.delete_task(&gone).await.unwrap();

    let snapshot = store.get_tasks().await.unwrap();
    assert!(snapshot.contains(&keep));
    assert!(!snapshot.contains(&gone));
}

#[tokio::test]
async fn deleting_twice_succeeds() {
    let harness = Harness::start().await;
    let identity = harness.identity();
    identity.sign_up("ana@example.com", "secret1").await.unwrap();
    let store = harness.store(&identity);

    let keep = store.create_task(&Task::new("keep", "")).await.unwrap();
    let gone = store.create_task(&Task::new("gone", "")).await.unwrap();
    store.delete_task(&gone).await.unwrap();
    store.delete_task(&gone).await.unwrap();

    let snapshot = store.get_tasks().await.unwrap();
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot.contains(&keep));
}

#[tokio::test]
async fn malformed_keys_never_reach_the_store() {
    let harness = Harness::start().await;
    let identity = harness.identity();
    identity.sign_up("ana@example.com", "secret1").await.unwrap();
    let store = harness.store(&identity);
    let keep = store.create_task(&Task::new("keep me", "")).await.unwrap();

    assert!(matches!(
        store.delete_task(&TaskKey::new("")).await,
        Err(StoreError::InvalidKey(_))
    ));
    assert!(matches!(
        store
            .update_task(&TaskKey::new(""), &TaskPatch::titulo("x"))
            .await,
        Err(StoreError::InvalidKey(_))
    ));
    assert!(matches!(
        store.delete_task(&TaskKey::new("../other")).await,
        Err(StoreError::InvalidKey(_))
    ));

    assert_eq!(harness.count_method("DELETE"), 0);
    assert_eq!(harness.count_method("PATCH"), 0);
    let snapshot = store.get_tasks().await.unwrap();
    assert_eq!(snapshot.get(&keep), Some(&Task::new("keep me", "")));
}

#[tokio::test]
async fn signed_out_calls_never_reach_user_paths() {
    let harness = Harness::start().await;
    let identity = harness.identity();
    let store = harness.store(&identity);

    assert!(matches!(
        store.get_tasks().await,
        Err(StoreError::Unauthenticated)
    ));
    assert!(matches!(
        store.create_task(&Task::new("x", "")).await,
        Err(StoreError::Unauthenticated)
    ));
    assert!(matches!(
        store.subscribe_to_tasks(|_| {}),
        Err(StoreError::Unauthenticated)
    ));

    assert_eq!(harness.user_requests(), 0);
}

#[tokio::test]
async fn users_cannot_see_each_other() {
    let harness = Harness::start().await;

    let ana = harness.identity();
    ana.sign_up("ana@example.com", "secret1").await.unwrap();
    let ana_store = harness.store(&ana);
    ana_store.create_task(&Task::new("private", "")).await.unwrap();

    let bia = harness.identity();
    bia.sign_up("bia@example.com", "secret2").await.unwrap();
    let bia_store = harness.store(&bia);

    assert!(bia_store.get_tasks().await.unwrap().is_empty());
    assert_eq!(ana_store.get_tasks().await.unwrap().len(), 1);
}

// =============================================================================
// Live subscription
// =============================================================================

#[tokio::test]
async fn subscription_delivers_initial_and_pushed_changes() {
    let harness = Harness::start().await;
    let identity = harness.identity();
    identity.sign_up("ana@example.com", "secret1").await.unwrap();
    let store = harness.store(&identity);

    let first = store.create_task(&Task::new("first", "")).await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscription = store
        .subscribe_to_tasks(move |result| {
            let _ = tx.send(result);
        })
        .unwrap();

    let initial = next_snapshot(&mut rx).await;
    assert_eq!(initial.len(), 1);
    assert!(initial.contains(&first));

    let second = store.create_task(&Task::new("second", "")).await.unwrap();
    let mut latest = next_snapshot(&mut rx).await;
    while !latest.contains(&second) {
        latest = next_snapshot(&mut rx).await;
    }
    assert_eq!(latest.len(), 2);

    store.delete_task(&first).await.unwrap();
    let mut latest = next_snapshot(&mut rx).await;
    while latest.contains(&first) {
        latest = next_snapshot(&mut rx).await;
    }
    assert_eq!(latest.len(), 1);

    subscription.close();
}

#[tokio::test]
async fn subscription_ignores_other_users_writes() {
    let harness = Harness::start().await;

    let ana = harness.identity();
    ana.sign_up("ana@example.com", "secret1").await.unwrap();
    let ana_store = harness.store(&ana);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _subscription = ana_store
        .subscribe_to_tasks(move |result| {
            let _ = tx.send(result);
        })
        .unwrap();
    assert!(next_snapshot(&mut rx).await.is_empty());

    let bia = harness.identity();
    bia.sign_up("bia@example.com", "secret2").await.unwrap();
    harness
        .store(&bia)
        .create_task(&Task::new("bia's", ""))
        .await
        .unwrap();

    let nothing = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(nothing.is_err(), "unexpected snapshot: {nothing:?}");
}

// =============================================================================
// Token expiry
// =============================================================================

#[tokio::test]
async fn expired_token_fails_without_a_refresher() {
    let harness =
        Harness::start_with(EmulatorState::with_token_ttl(Duration::from_millis(200))).await;
    let identity = harness.identity();
    identity.sign_up("ana@example.com", "secret1").await.unwrap();
    let store = harness.store(&identity);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(matches!(
        store.get_tasks().await,
        Err(StoreError::Http { status: 401, .. })
    ));
}

#[tokio::test]
async fn expired_token_is_renewed_for_writes_and_stream() {
    let harness =
        Harness::start_with(EmulatorState::with_token_ttl(Duration::from_millis(300))).await;
    let identity = harness.identity();
    let original = identity.sign_up("ana@example.com", "secret1").await.unwrap();
    let store = harness.renewing_store(&identity);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _subscription = store
        .subscribe_to_tasks(move |result| {
            let _ = tx.send(result);
        })
        .unwrap();
    assert!(next_snapshot(&mut rx).await.is_empty());

    // Outlive the first token: the stream is revoked and reopened, and the
    // write below is refused once before being retried.
    tokio::time::sleep(Duration::from_millis(500)).await;
    let key = store.create_task(&Task::new("after expiry", "")).await.unwrap();

    let mut latest = next_snapshot(&mut rx).await;
    while !latest.contains(&key) {
        latest = next_snapshot(&mut rx).await;
    }

    let session = identity.current_session().expect("still signed in");
    assert_eq!(session.uid, original.uid);
    assert_ne!(session.id_token, original.id_token);
    assert_eq!(session.refresh_token, original.refresh_token);
}

#[tokio::test]
async fn revoked_refresh_token_signs_out() {
    let harness =
        Harness::start_with(EmulatorState::with_token_ttl(Duration::from_millis(200))).await;
    let identity = harness.identity();
    let session = identity.sign_up("ana@example.com", "secret1").await.unwrap();
    let store = harness.renewing_store(&identity);
    harness.state.accounts.revoke_refresh_tokens(&session.uid).await;

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(matches!(
        store.get_tasks().await,
        Err(StoreError::Credential(AuthError::SessionExpired))
    ));
    assert!(identity.current_session().is_none());
}
