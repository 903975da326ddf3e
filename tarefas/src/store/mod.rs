//! Task store adapter.
//!
//! Defines the [`TaskStore`] trait that every backing store satisfies.
//! Concrete stores:
//! - [`realtime::RealtimeStore`]: per-user collection with live updates
//! - [`rest::RestStore`]: unauthenticated global collection, re-fetch only
//! - [`memory::MemoryStore`]: in-process collections for the offline demo
//!   and tests
//!
//! Per-user stores check the session before doing anything else. Without
//! one they fail with [`StoreError::Unauthenticated`] and no request is
//! issued. Keys are checked the same way: a key that does not name exactly
//! one task fails with [`StoreError::InvalidKey`] before any request.

pub mod http;
pub mod memory;
pub mod realtime;
pub mod rest;

use std::fmt;
use std::future::Future;

use tarefas_proto::task::{KeyError, Task, TaskKey, TaskPatch, TaskSnapshot};

use crate::identity::AuthError;
use crate::subscription::Subscription;

/// How a store keeps the list current after writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Writes show up through the live subscription.
    Live,
    /// The caller re-fetches after each successful write.
    Refetch,
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Refetch => write!(f, "refetch"),
        }
    }
}

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A per-user operation was attempted with nobody signed in.
    #[error("not signed in")]
    Unauthenticated,

    /// The store answered with a non-success status.
    #[error("store rejected request ({status}): {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Message from the store's error body.
        message: String,
    },

    /// The store could not be reached.
    #[error("store unreachable: {0}")]
    Network(#[from] reqwest::Error),

    /// The store answered with data that could not be decoded.
    #[error("malformed store response: {0}")]
    Decode(String),

    /// A live subscription was ended by the store.
    #[error("subscription ended: {0}")]
    Cancelled(String),

    /// This store has no live subscriptions.
    #[error("live updates are not available for this store")]
    LiveUnavailable,

    /// The configured store URL cannot address data paths.
    #[error("invalid store URL: {0}")]
    InvalidUrl(String),

    /// The key would address something other than a single task.
    #[error("invalid task key: {0}")]
    InvalidKey(#[from] KeyError),

    /// The store ended a live stream because its token expired.
    #[error("credential revoked")]
    CredentialRevoked,

    /// The session's token could not be renewed.
    #[error("credential rejected: {0}")]
    Credential(#[from] AuthError),
}

impl StoreError {
    /// Whether a fresh token might make the same request succeed.
    #[must_use]
    pub const fn needs_new_token(&self) -> bool {
        matches!(self, Self::CredentialRevoked | Self::Http { status: 401, .. })
    }
}

/// CRUD and live reads over one task collection.
pub trait TaskStore: Send + Sync {
    /// Whether the list follows writes by itself.
    fn access_mode(&self) -> AccessMode;

    /// Reads the whole collection once. Absent collections are empty.
    fn get_tasks(&self) -> impl Future<Output = Result<TaskSnapshot, StoreError>> + Send;

    /// Starts delivering snapshots to `listener`.
    ///
    /// The first snapshot arrives as soon as the store answers, then one
    /// after every change. An error is delivered once as `Err` and ends
    /// the subscription. Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// [`StoreError::Unauthenticated`] when nobody is signed in and
    /// [`StoreError::LiveUnavailable`] for re-fetch stores.
    fn subscribe_to_tasks<F>(&self, listener: F) -> Result<Subscription, StoreError>
    where
        F: FnMut(Result<TaskSnapshot, StoreError>) + Send + 'static;

    /// Adds a task under a store-generated key and returns that key.
    fn create_task(&self, task: &Task) -> impl Future<Output = Result<TaskKey, StoreError>> + Send;

    /// Merges the fields present in `patch` into the task at `key`.
    ///
    /// Fails with [`StoreError::InvalidKey`] before any request when `key`
    /// does not name exactly one task.
    fn update_task(
        &self,
        key: &TaskKey,
        patch: &TaskPatch,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Removes the task at `key`. Removing a missing key succeeds; an
    /// invalid key fails like in [`TaskStore::update_task`].
    fn delete_task(&self, key: &TaskKey) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// The store chosen at startup.
#[derive(Debug)]
pub enum AnyStore {
    Realtime(realtime::RealtimeStore),
    Rest(rest::RestStore),
    Memory(memory::MemoryStore),
}

impl TaskStore for AnyStore {
    fn access_mode(&self) -> AccessMode {
        match self {
            Self::Realtime(store) => store.access_mode(),
            Self::Rest(store) => store.access_mode(),
            Self::Memory(store) => store.access_mode(),
        }
    }

    async fn get_tasks(&self) -> Result<TaskSnapshot, StoreError> {
        match self {
            Self::Realtime(store) => store.get_tasks().await,
            Self::Rest(store) => store.get_tasks().await,
            Self::Memory(store) => store.get_tasks().await,
        }
    }

    fn subscribe_to_tasks<F>(&self, listener: F) -> Result<Subscription, StoreError>
    where
        F: FnMut(Result<TaskSnapshot, StoreError>) + Send + 'static,
    {
        match self {
            Self::Realtime(store) => store.subscribe_to_tasks(listener),
            Self::Rest(store) => store.subscribe_to_tasks(listener),
            Self::Memory(store) => store.subscribe_to_tasks(listener),
        }
    }

    async fn create_task(&self, task: &Task) -> Result<TaskKey, StoreError> {
        match self {
            Self::Realtime(store) => store.create_task(task).await,
            Self::Rest(store) => store.create_task(task).await,
            Self::Memory(store) => store.create_task(task).await,
        }
    }

    async fn update_task(&self, key: &TaskKey, patch: &TaskPatch) -> Result<(), StoreError> {
        match self {
            Self::Realtime(store) => store.update_task(key, patch).await,
            Self::Rest(store) => store.update_task(key, patch).await,
            Self::Memory(store) => store.update_task(key, patch).await,
        }
    }

    async fn delete_task(&self, key: &TaskKey) -> Result<(), StoreError> {
        match self {
            Self::Realtime(store) => store.delete_task(key).await,
            Self::Rest(store) => store.delete_task(key).await,
            Self::Memory(store) => store.delete_task(key).await,
        }
    }
}
