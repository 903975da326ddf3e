//! End-to-end page flows against the local emulator: sign in, create from
//! the create page, watch the list page update live, edit, delete, and sign
//! out. Also token expiry under a live list and the anonymous fallback.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use crossterm::event::KeyCode;
use tarefas::identity::IdentityProvider;
use tarefas::identity::firebase::FirebaseIdentity;
use tarefas::store::http::DatabaseClient;
use tarefas::store::realtime::RealtimeStore;
use tarefas::store::rest::RestStore;
use tarefas::store::{AnyStore, TaskStore};
use tarefas::view::controller::{TaskListController, ViewEvent};
use tarefas::view::list::Placeholder;
use tarefas::view::page::Page;
use tarefas::view::status::{StatusKind, StatusTimings};
use tarefas_emulator::server::{EmulatorState, start_server_with_state};
use tarefas_proto::path::USERS_NODE;
use tarefas_proto::task::Task;
use tokio::sync::mpsc;
use url::Url;

async fn start_emulator() -> (std::net::SocketAddr, Arc<EmulatorState>) {
    start_emulator_with(EmulatorState::new()).await
}

async fn start_emulator_with(state: EmulatorState) -> (std::net::SocketAddr, Arc<EmulatorState>) {
    let state = Arc::new(state);
    let (addr, _handle) = start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .expect("failed to start emulator");
    (addr, state)
}

fn realtime(addr: std::net::SocketAddr) -> (FirebaseIdentity, Arc<AnyStore>) {
    let endpoint = Url::parse(&format!("http://{addr}/identitytoolkit.googleapis.com")).unwrap();
    let identity = FirebaseIdentity::new(endpoint, "demo");
    let base = Url::parse(&format!("http://{addr}/")).unwrap();
    let store = RealtimeStore::new(DatabaseClient::new(base), identity.session_watch());
    (identity, Arc::new(AnyStore::Realtime(store)))
}

/// Like [`realtime`], with the store renewing expired tokens.
fn renewing(addr: std::net::SocketAddr) -> (FirebaseIdentity, Arc<AnyStore>) {
    let endpoint = Url::parse(&format!("http://{addr}/identitytoolkit.googleapis.com")).unwrap();
    let identity = FirebaseIdentity::new(endpoint, "demo");
    let base = Url::parse(&format!("http://{addr}/")).unwrap();
    let store = RealtimeStore::new(DatabaseClient::new(base), identity.session_watch())
        .with_refresher(identity.refresher());
    (identity, Arc::new(AnyStore::Realtime(store)))
}

/// Feeds events into `controller` until `done` holds.
async fn wait_until<F>(
    controller: &mut TaskListController<AnyStore>,
    rx: &mut mpsc::UnboundedReceiver<ViewEvent>,
    mut done: F,
) where
    F: FnMut(&TaskListController<AnyStore>) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !done(controller) {
        let event = tokio::time::timeout_at(deadline, rx.recv())
            .await
            .expect("condition not reached in time")
            .expect("event channel closed");
        controller.handle_event(event);
    }
}

fn titles(controller: &TaskListController<AnyStore>) -> Vec<String> {
    controller
        .page()
        .list
        .as_ref()
        .unwrap()
        .rows()
        .iter()
        .map(|row| row.titulo.clone())
        .collect()
}

fn placeholder(controller: &TaskListController<AnyStore>) -> Option<Placeholder> {
    controller.page().list.as_ref().unwrap().placeholder()
}

// =============================================================================
// Signed-in flow
// =============================================================================

#[tokio::test]
async fn sign_in_create_edit_delete_sign_out() {
    let (addr, state) = start_emulator().await;
    let (identity, store) = realtime(addr);
    let timings = StatusTimings::default();

    let (mut list, mut list_rx) = TaskListController::new(Arc::clone(&store), Page::list(timings));
    list.start(&identity);
    assert!(list.needs_sign_in());
    assert_eq!(placeholder(&list), Some(Placeholder::SignIn));

    identity.sign_up("ana@example.com", "secret1").await.unwrap();
    wait_until(&mut list, &mut list_rx, |c| {
        c.last_snapshot().is_some() && c.is_subscribed()
    })
    .await;
    assert!(!list.needs_sign_in());
    assert_eq!(placeholder(&list), Some(Placeholder::NoTasks));
    assert_eq!(
        list.page().nav.as_ref().unwrap().user_label(),
        Some("ana")
    );

    // Create from the create page.
    let (mut create, mut create_rx) =
        TaskListController::new(Arc::clone(&store), Page::create(timings));
    create.start(&identity);
    {
        let form = create.page_mut().create_form.as_mut().unwrap();
        form.titulo.set("Comprar pão");
        form.descricao.set("Padaria");
    }
    create.submit_create();
    wait_until(&mut create, &mut create_rx, |c| {
        c.page()
            .status
            .as_ref()
            .and_then(|s| s.current())
            .is_some_and(|m| m.kind == StatusKind::Success)
    })
    .await;
    let form = create.page().create_form.as_ref().unwrap();
    assert!(form.titulo.value().is_empty());
    assert!(form.descricao.value().is_empty());
    assert!(!create.is_subscribed());

    // The list page sees it through its subscription.
    wait_until(&mut list, &mut list_rx, |c| titles(c) == ["Comprar pão"]).await;

    // Edit in place.
    let key = list.page().list.as_ref().unwrap().rows()[0].id.clone();
    assert!(list.begin_edit(&key));
    for c in " integral".chars() {
        assert!(list.handle_page_key(KeyCode::Char(c)));
    }
    assert!(list.handle_page_key(KeyCode::Enter));
    wait_until(&mut list, &mut list_rx, |c| {
        titles(c) == ["Comprar pão integral"] && !c.guard().is_editing()
    })
    .await;
    let snapshot = list.store().get_tasks().await.unwrap();
    assert_eq!(
        snapshot.get(&key),
        Some(&Task::new("Comprar pão integral", "Padaria"))
    );

    // Delete with confirmation.
    list.request_delete(&key);
    assert_eq!(list.pending_delete(), Some(&key));
    assert!(list.handle_page_key(KeyCode::Char('y')));
    wait_until(&mut list, &mut list_rx, |c| titles(c).is_empty()).await;
    assert_eq!(placeholder(&list), Some(Placeholder::NoTasks));

    // Sign out clears the rows and closes the subscription.
    identity.sign_out().await;
    wait_until(&mut list, &mut list_rx, |c| c.needs_sign_in()).await;
    assert!(!list.is_subscribed());
    assert!(list.last_snapshot().is_none());
    assert_eq!(placeholder(&list), Some(Placeholder::SignIn));

    // Every request under users/ carried the owner's credential.
    for record in state.database.requests() {
        if record.path.segments().first().map(String::as_str) == Some(USERS_NODE) {
            assert_eq!(record.auth, record.path.owner());
        }
    }
}

#[tokio::test]
async fn switching_users_replaces_the_list() {
    let (addr, _state) = start_emulator().await;
    let (identity, store) = realtime(addr);

    identity.sign_up("ana@example.com", "secret1").await.unwrap();
    store.create_task(&Task::new("ana's", "")).await.unwrap();
    identity.sign_out().await;
    identity.sign_up("bia@example.com", "secret2").await.unwrap();
    store.create_task(&Task::new("bia's", "")).await.unwrap();
    identity.sign_out().await;

    let (mut list, mut rx) =
        TaskListController::new(Arc::clone(&store), Page::list(StatusTimings::default()));
    list.start(&identity);

    identity.sign_in("ana@example.com", "secret1").await.unwrap();
    wait_until(&mut list, &mut rx, |c| titles(c) == ["ana's"]).await;

    identity.sign_in("bia@example.com", "secret2").await.unwrap();
    wait_until(&mut list, &mut rx, |c| titles(c) == ["bia's"]).await;
}

// =============================================================================
// Token expiry
// =============================================================================

#[tokio::test]
async fn expired_token_keeps_the_list_live() {
    let (addr, _state) =
        start_emulator_with(EmulatorState::with_token_ttl(Duration::from_millis(300))).await;
    let (identity, store) = renewing(addr);
    identity.sign_up("ana@example.com", "secret1").await.unwrap();
    store.create_task(&Task::new("a", "")).await.unwrap();

    let (mut list, mut rx) =
        TaskListController::new(Arc::clone(&store), Page::list(StatusTimings::default()));
    list.start(&identity);
    wait_until(&mut list, &mut rx, |c| titles(c) == ["a"]).await;

    tokio::time::sleep(Duration::from_millis(700)).await;
    store.create_task(&Task::new("b", "")).await.unwrap();
    wait_until(&mut list, &mut rx, |c| titles(c) == ["a", "b"]).await;

    assert!(!list.needs_sign_in());
    assert!(list.is_subscribed());
    let status = list.page().status.as_ref().and_then(|s| s.current());
    assert!(
        status.is_none_or(|m| m.kind != StatusKind::Error),
        "unexpected status: {status:?}"
    );
}

#[tokio::test]
async fn revoked_session_returns_to_sign_in() {
    let (addr, state) =
        start_emulator_with(EmulatorState::with_token_ttl(Duration::from_millis(200))).await;
    let (identity, store) = renewing(addr);
    let session = identity.sign_up("ana@example.com", "secret1").await.unwrap();

    let (mut list, mut rx) =
        TaskListController::new(Arc::clone(&store), Page::list(StatusTimings::default()));
    list.start(&identity);
    wait_until(&mut list, &mut rx, |c| {
        c.last_snapshot().is_some() && c.is_subscribed()
    })
    .await;

    state.accounts.revoke_refresh_tokens(&session.uid).await;
    wait_until(&mut list, &mut rx, |c| c.needs_sign_in()).await;

    assert!(identity.current_session().is_none());
    assert!(!list.is_subscribed());
    assert_eq!(placeholder(&list), Some(Placeholder::SignIn));
}

// =============================================================================
// Anonymous fallback
// =============================================================================

#[tokio::test]
async fn fallback_list_loads_without_sign_in() {
    let (addr, state) = start_emulator().await;
    let base = Url::parse(&format!("http://{addr}/")).unwrap();
    let store = Arc::new(AnyStore::Rest(RestStore::new(DatabaseClient::new(base))));
    store.create_task(&Task::new("global", "")).await.unwrap();

    let (mut list, mut rx) =
        TaskListController::new(Arc::clone(&store), Page::list(StatusTimings::default()));
    list.start_anonymous();
    assert!(!list.needs_sign_in());
    wait_until(&mut list, &mut rx, |c| titles(c) == ["global"]).await;

    // Writes trigger a refetch instead of a stream update.
    let key = list.page().list.as_ref().unwrap().rows()[0].id.clone();
    list.request_delete(&key);
    list.confirm_delete();
    wait_until(&mut list, &mut rx, |c| titles(c).is_empty()).await;

    assert!(state.database.requests().iter().all(|r| r.auth.is_none()));
}
