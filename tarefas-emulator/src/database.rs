//! In-memory JSON document tree with change notification.
//!
//! The [`Database`] holds the whole tree behind a single lock. Every write
//! is published on a broadcast channel while the write lock is still held,
//! so a listener that subscribed under the read lock sees each change
//! exactly once and in order.

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tarefas_proto::path::DataPath;
use tarefas_proto::push_id::PushIdGenerator;
use tarefas_proto::session::Uid;
use tarefas_proto::task::TaskKey;
use tarefas_proto::tree;
use tokio::sync::{RwLock, broadcast};

/// Capacity of the change channel before slow listeners lag.
const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// How a change was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// The value at `path` was replaced (null = deleted).
    Put,
    /// Each child of `data` was set under `path`.
    Patch,
}

/// A committed write.
#[derive(Debug, Clone)]
pub struct Change {
    /// How the write was applied.
    pub kind: ChangeKind,
    /// Absolute path written.
    pub path: DataPath,
    /// Written value (`Put`) or object of children (`Patch`).
    pub data: Value,
}

/// One data request as received, before access checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRecord {
    /// HTTP method.
    pub method: String,
    /// Requested path.
    pub path: DataPath,
    /// Uid resolved from the `auth` parameter, if any.
    pub auth: Option<Uid>,
}

/// The emulated document tree.
pub struct Database {
    root: RwLock<Value>,
    changes: broadcast::Sender<Change>,
    keys: Mutex<PushIdGenerator>,
    requests: Mutex<Vec<RequestRecord>>,
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Database {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            root: RwLock::new(Value::Null),
            changes,
            keys: Mutex::new(PushIdGenerator::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Reads the value at `path`; `Null` when absent.
    pub async fn get(&self, path: &DataPath) -> Value {
        let root = self.root.read().await;
        tree::get_at(&root, path).cloned().unwrap_or(Value::Null)
    }

    /// Reads the value at `path` and subscribes to later changes atomically.
    pub async fn watch(&self, path: &DataPath) -> (Value, broadcast::Receiver<Change>) {
        let root = self.root.read().await;
        let value = tree::get_at(&root, path).cloned().unwrap_or(Value::Null);
        (value, self.changes.subscribe())
    }

    /// Replaces the value at `path`. Writing `Null` deletes it.
    pub async fn put(&self, path: &DataPath, value: Value) {
        let mut root = self.root.write().await;
        tree::set_at(&mut root, path, value.clone());
        self.publish(ChangeKind::Put, path, value);
    }

    /// Stores `value` under a freshly generated child key of `path`.
    pub async fn push(&self, path: &DataPath, value: Value) -> TaskKey {
        let key = self.keys.lock().next_key();
        self.put(&path.clone().child(key.as_str()), value).await;
        key
    }

    /// Sets each child of `children` under `path`, leaving other children.
    pub async fn patch(&self, path: &DataPath, children: Map<String, Value>) {
        let mut root = self.root.write().await;
        tree::merge_at(&mut root, path, &children);
        self.publish(ChangeKind::Patch, path, Value::Object(children));
    }

    /// Deletes the node at `path`. Deleting an absent node succeeds.
    pub async fn delete(&self, path: &DataPath) {
        self.put(path, Value::Null).await;
    }

    /// Appends to the request log.
    pub fn record(&self, method: &str, path: &DataPath, auth: Option<Uid>) {
        self.requests.lock().push(RequestRecord {
            method: method.to_string(),
            path: path.clone(),
            auth,
        });
    }

    /// Every data request received so far, oldest first.
    #[must_use]
    pub fn requests(&self) -> Vec<RequestRecord> {
        self.requests.lock().clone()
    }

    fn publish(&self, kind: ChangeKind, path: &DataPath, data: Value) {
        // No listeners is fine.
        let _ = self.changes.send(Change {
            kind,
            path: path.clone(),
            data,
        });
    }
}
