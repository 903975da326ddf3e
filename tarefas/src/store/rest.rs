//! Unauthenticated fallback store.
//!
//! Used when no store credentials are configured. All tasks share the
//! global `tarefas` collection, there is no session, and there are no
//! live updates: callers re-fetch after each write.

use chrono::{SecondsFormat, Utc};
use tarefas_proto::path::DataPath;
use tarefas_proto::task::{LegacyTaskBody, Task, TaskKey, TaskPatch, TaskSnapshot};

use super::http::DatabaseClient;
use super::{AccessMode, StoreError, TaskStore};
use crate::subscription::Subscription;

/// Task store over the global REST collection.
#[derive(Debug, Clone)]
pub struct RestStore {
    client: DatabaseClient,
}

impl RestStore {
    #[must_use]
    pub const fn new(client: DatabaseClient) -> Self {
        Self { client }
    }
}

/// Creation timestamp stored in the legacy `id` field.
fn created_at() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl TaskStore for RestStore {
    fn access_mode(&self) -> AccessMode {
        AccessMode::Refetch
    }

    async fn get_tasks(&self) -> Result<TaskSnapshot, StoreError> {
        let value = self.client.get(&DataPath::legacy_tasks(), None).await?;
        Ok(TaskSnapshot::from_value(&value))
    }

    fn subscribe_to_tasks<F>(&self, _listener: F) -> Result<Subscription, StoreError>
    where
        F: FnMut(Result<TaskSnapshot, StoreError>) + Send + 'static,
    {
        Err(StoreError::LiveUnavailable)
    }

    async fn create_task(&self, task: &Task) -> Result<TaskKey, StoreError> {
        let body = LegacyTaskBody::new(created_at(), task);
        let reply = self
            .client
            .post(&DataPath::legacy_tasks(), None, &body)
            .await?;
        tracing::debug!(key = %reply.name, "task created");
        Ok(reply.name)
    }

    async fn update_task(&self, key: &TaskKey, patch: &TaskPatch) -> Result<(), StoreError> {
        key.validate()?;
        self.client
            .patch(&DataPath::legacy_task(key), None, patch)
            .await
    }

    async fn delete_task(&self, key: &TaskKey) -> Result<(), StoreError> {
        key.validate()?;
        self.client.delete(&DataPath::legacy_task(key), None).await
    }
}
