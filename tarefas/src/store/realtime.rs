//! Per-user task collection with live updates.
//!
//! Tasks live under `users/{uid}/tasks`. Reads and writes go over REST
//! with the signed-in user's id token; subscriptions hold a streaming
//! `GET` open and mirror its events into a [`TaskTree`].
//!
//! With a [`TokenRefresher`] an expired token is renewed once per request,
//! and a subscription whose stream is revoked reopens itself with the new
//! token. Without one, expiry surfaces as an error.

use std::future::Future;

use futures_util::StreamExt;
use tarefas_proto::path::DataPath;
use tarefas_proto::session::Uid;
use tarefas_proto::stream::{EventDecoder, StreamEvent};
use tarefas_proto::task::{Task, TaskKey, TaskPatch, TaskSnapshot};
use tarefas_proto::tree::TaskTree;

use super::http::DatabaseClient;
use super::{AccessMode, StoreError, TaskStore};
use crate::identity::SessionWatch;
use crate::identity::firebase::TokenRefresher;
use crate::subscription::Subscription;

/// Task store scoped to the signed-in user.
#[derive(Debug, Clone)]
pub struct RealtimeStore {
    client: DatabaseClient,
    session: SessionWatch,
    refresher: Option<TokenRefresher>,
}

impl RealtimeStore {
    #[must_use]
    pub const fn new(client: DatabaseClient, session: SessionWatch) -> Self {
        Self {
            client,
            session,
            refresher: None,
        }
    }

    /// Renews expired tokens through `refresher`.
    #[must_use]
    pub fn with_refresher(mut self, refresher: TokenRefresher) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// The signed-in user and their token, or `Unauthenticated`.
    fn scope(&self) -> Result<(Uid, String), StoreError> {
        self.session
            .current()
            .map(|session| (session.uid, session.id_token))
            .ok_or(StoreError::Unauthenticated)
    }

    /// Runs `call` with the current token, retrying once with a renewed
    /// token if the store refuses the first.
    async fn authorized<T, F, Fut>(&self, call: F) -> Result<T, StoreError>
    where
        F: Fn(Uid, String) -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let (uid, token) = self.scope()?;
        match call(uid.clone(), token).await {
            Err(e) if e.needs_new_token() => {
                let Some(refresher) = &self.refresher else {
                    return Err(e);
                };
                tracing::info!(%uid, "store refused token, refreshing");
                let session = refresher.refresh(&uid).await?;
                call(uid, session.id_token).await
            }
            result => result,
        }
    }
}

impl TaskStore for RealtimeStore {
    fn access_mode(&self) -> AccessMode {
        AccessMode::Live
    }

    async fn get_tasks(&self) -> Result<TaskSnapshot, StoreError> {
        let value = self
            .authorized(|uid, token| async move {
                self.client
                    .get(&DataPath::user_tasks(&uid), Some(&token))
                    .await
            })
            .await?;
        Ok(TaskSnapshot::from_value(&value))
    }

    fn subscribe_to_tasks<F>(&self, mut listener: F) -> Result<Subscription, StoreError>
    where
        F: FnMut(Result<TaskSnapshot, StoreError>) + Send + 'static,
    {
        let (uid, mut token) = self.scope()?;
        let client = self.client.clone();
        let refresher = self.refresher.clone();
        let path = DataPath::user_tasks(&uid);
        tracing::info!(%uid, "subscribing to tasks");

        Ok(Subscription::new(tokio::spawn(async move {
            // Renewing only after a stream that delivered something keeps a
            // token the store refuses outright from looping.
            let mut renewed = false;
            loop {
                let mut delivered = false;
                let outcome = {
                    let mut forward = |snapshot: Result<TaskSnapshot, StoreError>| {
                        delivered = true;
                        listener(snapshot);
                    };
                    follow(&client, &path, &token, &mut forward).await
                };
                let Err(error) = outcome else {
                    return;
                };
                if error.needs_new_token()
                    && (delivered || !renewed)
                    && let Some(refresher) = &refresher
                {
                    match refresher.refresh(&uid).await {
                        Ok(session) => {
                            tracing::info!(%uid, "resuming task subscription with a new token");
                            token = session.id_token;
                            renewed = true;
                            continue;
                        }
                        Err(e) => {
                            tracing::warn!(%uid, error = %e, "token refresh failed, subscription ended");
                            listener(Err(e.into()));
                            return;
                        }
                    }
                }
                tracing::warn!(path = %path, error = %error, "task subscription ended");
                listener(Err(error));
                return;
            }
        })))
    }

    async fn create_task(&self, task: &Task) -> Result<TaskKey, StoreError> {
        let reply = self
            .authorized(|uid, token| async move {
                self.client
                    .post(&DataPath::user_tasks(&uid), Some(&token), task)
                    .await
            })
            .await?;
        tracing::debug!(key = %reply.name, "task created");
        Ok(reply.name)
    }

    async fn update_task(&self, key: &TaskKey, patch: &TaskPatch) -> Result<(), StoreError> {
        key.validate()?;
        self.authorized(|uid, token| async move {
            self.client
                .patch(&DataPath::user_task(&uid, key), Some(&token), patch)
                .await
        })
        .await
    }

    async fn delete_task(&self, key: &TaskKey) -> Result<(), StoreError> {
        key.validate()?;
        self.authorized(|uid, token| async move {
            self.client
                .delete(&DataPath::user_task(&uid, key), Some(&token))
                .await
        })
        .await
    }
}

/// Pumps one event stream into `listener` until the store ends it.
///
/// Only returns on failure; a stream that closes is reported as cancelled.
async fn follow<F>(
    client: &DatabaseClient,
    path: &DataPath,
    token: &str,
    listener: &mut F,
) -> Result<(), StoreError>
where
    F: FnMut(Result<TaskSnapshot, StoreError>) + Send,
{
    let response = client.open_stream(path, Some(token)).await?;
    let mut body = response.bytes_stream();
    let mut decoder = EventDecoder::new();
    let mut tree = TaskTree::new();

    while let Some(chunk) = body.next().await {
        for event in decoder.push(&chunk?) {
            let event = event.map_err(|e| StoreError::Decode(e.to_string()))?;
            match event {
                StreamEvent::Cancel(reason) => {
                    return Err(StoreError::Cancelled(
                        reason.unwrap_or_else(|| "cancelled by store".to_string()),
                    ));
                }
                StreamEvent::AuthRevoked => return Err(StoreError::CredentialRevoked),
                event => {
                    if tree.apply(&event) {
                        listener(Ok(tree.snapshot()));
                    }
                }
            }
        }
    }
    Err(StoreError::Cancelled("stream closed".to_string()))
}
