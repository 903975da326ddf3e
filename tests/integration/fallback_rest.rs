//! Integration tests for the unauthenticated fallback store.
//!
//! The fallback talks to the global `tarefas` collection with no `auth`
//! parameter and has no live updates.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use tarefas::store::http::DatabaseClient;
use tarefas::store::rest::RestStore;
use tarefas::store::{AccessMode, StoreError, TaskStore};
use tarefas_emulator::server::{EmulatorState, start_server_with_state};
use tarefas_proto::path::DataPath;
use tarefas_proto::task::{Task, TaskKey, TaskPatch};
use url::Url;

async fn start() -> (RestStore, Arc<EmulatorState>) {
    let state = Arc::new(EmulatorState::new());
    let (addr, _handle) = start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .expect("failed to start emulator");
    let base = Url::parse(&format!("http://{addr}/")).unwrap();
    (RestStore::new(DatabaseClient::new(base)), state)
}

#[tokio::test]
async fn create_posts_legacy_body() {
    let (store, state) = start().await;

    let key = store
        .create_task(&Task::new("Comprar pão", "Padaria"))
        .await
        .unwrap();

    let stored = state.database.get(&DataPath::legacy_task(&key)).await;
    assert_eq!(stored["titulo"], "Comprar pão");
    assert_eq!(stored["descricao"], "Padaria");
    let id = stored["id"].as_str().expect("id stamped");
    chrono::DateTime::parse_from_rfc3339(id).expect("id is an RFC 3339 timestamp");

    let requests = state.database.requests();
    let post = requests.iter().find(|r| r.method == "POST").unwrap();
    assert_eq!(post.path, DataPath::legacy_tasks());
    assert_eq!(post.auth, None);
}

#[tokio::test]
async fn get_returns_keyed_rows() {
    let (store, _state) = start().await;

    let a = store.create_task(&Task::new("a", "")).await.unwrap();
    let b = store.create_task(&Task::new("b", "")).await.unwrap();

    let snapshot = store.get_tasks().await.unwrap();
    let keys: Vec<_> = snapshot.keys().cloned().collect();
    assert_eq!(keys, vec![a.clone(), b]);
    assert_eq!(snapshot.get(&a).unwrap().titulo, "a");
}

#[tokio::test]
async fn update_and_delete() {
    let (store, _state) = start().await;

    let key = store.create_task(&Task::new("a", "keep")).await.unwrap();
    store
        .update_task(&key, &TaskPatch::titulo("b"))
        .await
        .unwrap();
    assert_eq!(
        store.get_tasks().await.unwrap().get(&key),
        Some(&Task::new("b", "keep"))
    );

    store.delete_task(&key).await.unwrap();
    assert!(store.get_tasks().await.unwrap().is_empty());
}

#[tokio::test]
async fn deleting_twice_succeeds() {
    let (store, _state) = start().await;

    let keep = store.create_task(&Task::new("keep", "")).await.unwrap();
    let gone = store.create_task(&Task::new("gone", "")).await.unwrap();
    store.delete_task(&gone).await.unwrap();
    store.delete_task(&gone).await.unwrap();

    let snapshot = store.get_tasks().await.unwrap();
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot.contains(&keep));
}

#[tokio::test]
async fn empty_key_cannot_wipe_the_collection() {
    let (store, state) = start().await;
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
        store.delete_task(&TaskKey::new("a/b")).await,
        Err(StoreError::InvalidKey(_))
    ));

    assert!(
        state
            .database
            .requests()
            .iter()
            .all(|r| r.method != "DELETE" && r.method != "PATCH")
    );
    let snapshot = store.get_tasks().await.unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.get(&keep), Some(&Task::new("keep me", "")));
}

#[tokio::test]
async fn empty_collection_is_empty_snapshot() {
    let (store, _state) = start().await;
    assert!(store.get_tasks().await.unwrap().is_empty());
}

#[tokio::test]
async fn fallback_refetches_instead_of_streaming() {
    let (store, _state) = start().await;
    assert_eq!(store.access_mode(), AccessMode::Refetch);
    assert!(matches!(
        store.subscribe_to_tasks(|_| {}),
        Err(StoreError::LiveUnavailable)
    ));
}

#[tokio::test]
async fn unreachable_store_is_network_error() {
    let store = RestStore::new(DatabaseClient::new(
        Url::parse("http://127.0.0.1:9/").unwrap(),
    ));
    assert!(matches!(
        store.get_tasks().await,
        Err(StoreError::Network(_))
    ));
}
