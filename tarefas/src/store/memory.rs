//! In-process task store.
//!
//! Keeps one collection per user in memory and broadcasts changes to
//! subscribers. Used by the offline demo and by tests that need a store
//! without a server. Operations are logged (after the session check) so
//! tests can assert that unauthenticated calls never reached the store.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tarefas_proto::push_id::PushIdGenerator;
use tarefas_proto::session::Uid;
use tarefas_proto::task::{Task, TaskKey, TaskPatch, TaskSnapshot};
use tokio::sync::broadcast;

use super::{AccessMode, StoreError, TaskStore};
use crate::identity::SessionWatch;
use crate::subscription::Subscription;

const CHANGE_CAPACITY: usize = 64;

/// One operation that passed the session check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRequest {
    /// `get`, `create`, `update`, `delete` or `subscribe`.
    pub op: &'static str,
    /// Whose collection was touched.
    pub uid: Uid,
}

#[derive(Debug)]
struct Shared {
    collections: Mutex<HashMap<Uid, TaskSnapshot>>,
    keys: Mutex<PushIdGenerator>,
    changes: broadcast::Sender<Uid>,
    requests: Mutex<Vec<MemoryRequest>>,
    failing: AtomicBool,
}

/// Task store held in memory, scoped to the signed-in user.
///
/// Clones share the same collections.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
    session: SessionWatch,
    mode: AccessMode,
}

impl MemoryStore {
    /// A live store following `session`.
    #[must_use]
    pub fn new(session: SessionWatch) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                collections: Mutex::new(HashMap::new()),
                keys: Mutex::new(PushIdGenerator::new()),
                changes,
                requests: Mutex::new(Vec::new()),
                failing: AtomicBool::new(false),
            }),
            session,
            mode: AccessMode::Live,
        }
    }

    /// A store without live updates, like the fallback REST store.
    #[must_use]
    pub fn refetch_only(session: SessionWatch) -> Self {
        Self {
            mode: AccessMode::Refetch,
            ..Self::new(session)
        }
    }

    /// Adds a task to `uid`'s collection directly. Returns its key.
    pub fn seed(&self, uid: &Uid, task: Task) -> TaskKey {
        let key = self.shared.keys.lock().next_key();
        self.shared
            .collections
            .lock()
            .entry(uid.clone())
            .or_default()
            .insert(key.clone(), task);
        self.publish(uid);
        key
    }

    /// The collection of `uid`, bypassing the session.
    #[must_use]
    pub fn snapshot_of(&self, uid: &Uid) -> TaskSnapshot {
        self.shared
            .collections
            .lock()
            .get(uid)
            .cloned()
            .unwrap_or_default()
    }

    /// Makes every later operation fail with a server error, or recover.
    pub fn set_failing(&self, failing: bool) {
        self.shared.failing.store(failing, Ordering::SeqCst);
    }

    /// Operations that got past the session check, oldest first.
    #[must_use]
    pub fn requests(&self) -> Vec<MemoryRequest> {
        self.shared.requests.lock().clone()
    }

    fn begin(&self, op: &'static str) -> Result<Uid, StoreError> {
        let uid = self.session.uid().ok_or(StoreError::Unauthenticated)?;
        self.shared.requests.lock().push(MemoryRequest {
            op,
            uid: uid.clone(),
        });
        if self.shared.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Http {
                status: 503,
                message: "store unavailable".to_string(),
            });
        }
        Ok(uid)
    }

    fn publish(&self, uid: &Uid) {
        // No subscribers is fine.
        let _ = self.shared.changes.send(uid.clone());
    }
}

impl TaskStore for MemoryStore {
    fn access_mode(&self) -> AccessMode {
        self.mode
    }

    async fn get_tasks(&self) -> Result<TaskSnapshot, StoreError> {
        let uid = self.begin("get")?;
        Ok(self.snapshot_of(&uid))
    }

    fn subscribe_to_tasks<F>(&self, mut listener: F) -> Result<Subscription, StoreError>
    where
        F: FnMut(Result<TaskSnapshot, StoreError>) + Send + 'static,
    {
        if self.mode == AccessMode::Refetch {
            return Err(StoreError::LiveUnavailable);
        }
        let uid = self.begin("subscribe")?;
        let mut changes = self.shared.changes.subscribe();
        let store = self.clone();

        Ok(Subscription::new(tokio::spawn(async move {
            listener(Ok(store.snapshot_of(&uid)));
            loop {
                match changes.recv().await {
                    Ok(changed) if changed == uid => listener(Ok(store.snapshot_of(&uid))),
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::debug!(missed, "subscriber lagged, resending snapshot");
                        listener(Ok(store.snapshot_of(&uid)));
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })))
    }

    async fn create_task(&self, task: &Task) -> Result<TaskKey, StoreError> {
        let uid = self.begin("create")?;
        let key = self.seed(&uid, task.clone());
        tracing::debug!(%uid, %key, "task created");
        Ok(key)
    }

    async fn update_task(&self, key: &TaskKey, patch: &TaskPatch) -> Result<(), StoreError> {
        key.validate()?;
        let uid = self.begin("update")?;
        if patch.is_empty() {
            return Ok(());
        }
        {
            let mut collections = self.shared.collections.lock();
            let tasks = collections.entry(uid.clone()).or_default();
            if !tasks.patch(key, patch) {
                let mut task = Task::default();
                task.apply(patch);
                tasks.insert(key.clone(), task);
            }
        }
        self.publish(&uid);
        Ok(())
    }

    async fn delete_task(&self, key: &TaskKey) -> Result<(), StoreError> {
        key.validate()?;
        let uid = self.begin("delete")?;
        let removed = self
            .shared
            .collections
            .lock()
            .get_mut(&uid)
            .and_then(|tasks| tasks.remove(key))
            .is_some();
        if removed {
            self.publish(&uid);
        }
        Ok(())
    }
}
