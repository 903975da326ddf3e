//! One-time startup choice of identity provider and task store.
//!
//! | mode         | identity           | store          |
//! |--------------|--------------------|----------------|
//! | configured   | `FirebaseIdentity` | `RealtimeStore`|
//! | unconfigured | none               | `RestStore`    |
//! | offline      | `LocalIdentity`    | `MemoryStore`  |

use std::sync::Arc;

use tarefas_proto::task::Task;

use crate::config::{ClientConfig, ConfigError, StoreMode};
use crate::identity::firebase::FirebaseIdentity;
use crate::identity::local::LocalIdentity;
use crate::identity::{AnyIdentity, IdentityProvider};
use crate::store::http::DatabaseClient;
use crate::store::memory::MemoryStore;
use crate::store::realtime::RealtimeStore;
use crate::store::rest::RestStore;
use crate::store::AnyStore;

/// Email of the account seeded in offline mode.
pub const DEMO_EMAIL: &str = "demo@tarefas.local";

/// Password of the account seeded in offline mode.
pub const DEMO_PASSWORD: &str = "tarefas";

/// Errors that can occur while selecting the backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The configured endpoints are unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// The identity provider (if any) and task store the app talks to.
#[derive(Debug, Clone)]
pub struct Backend {
    identity: Option<Arc<AnyIdentity>>,
    store: Arc<AnyStore>,
}

impl Backend {
    /// Picks the backend described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Config`] if an endpoint URL does not parse.
    pub fn from_config(config: &ClientConfig) -> Result<Self, BackendError> {
        if config.offline {
            return Ok(Self::offline_demo());
        }
        Ok(Self::from_mode(config.store_mode()?))
    }

    #[must_use]
    pub fn from_mode(mode: StoreMode) -> Self {
        let http = reqwest::Client::new();
        match mode {
            StoreMode::Configured(credentials) => {
                tracing::info!(database = %credentials.database_url, "using per-user store");
                let mut identity = FirebaseIdentity::with_client(
                    http.clone(),
                    credentials.auth_endpoint,
                    credentials.api_key,
                );
                if let Some(token_endpoint) = credentials.token_endpoint {
                    identity = identity.with_token_endpoint(token_endpoint);
                }
                let store = RealtimeStore::new(
                    DatabaseClient::with_client(http, credentials.database_url),
                    identity.session_watch(),
                )
                .with_refresher(identity.refresher());
                Self {
                    identity: Some(Arc::new(AnyIdentity::Firebase(identity))),
                    store: Arc::new(AnyStore::Realtime(store)),
                }
            }
            StoreMode::Unconfigured(fallback) => {
                tracing::info!(url = %fallback.base_url, "no credentials, using fallback store");
                Self {
                    identity: None,
                    store: Arc::new(AnyStore::Rest(RestStore::new(DatabaseClient::with_client(
                        http,
                        fallback.base_url,
                    )))),
                }
            }
        }
    }

    /// In-process backend with one demo account and a few tasks.
    #[must_use]
    pub fn offline_demo() -> Self {
        tracing::info!("using offline demo store");
        let identity = LocalIdentity::new();
        let uid = identity.with_account(DEMO_EMAIL, DEMO_PASSWORD, Some("Demo"));
        let store = MemoryStore::new(identity.session_watch());
        for (titulo, descricao) in [
            ("Comprar pão", "Padaria da esquina"),
            ("Revisar PR", "Comentários no módulo de sync"),
            ("Pagar contas", ""),
        ] {
            store.seed(&uid, Task::new(titulo, descricao));
        }
        Self {
            identity: Some(Arc::new(AnyIdentity::Local(identity))),
            store: Arc::new(AnyStore::Memory(store)),
        }
    }

    /// `None` when running against the unauthenticated fallback store.
    #[must_use]
    pub const fn identity(&self) -> Option<&Arc<AnyIdentity>> {
        self.identity.as_ref()
    }

    #[must_use]
    pub const fn store(&self) -> &Arc<AnyStore> {
        &self.store
    }

    /// Short label for the status bar.
    #[must_use]
    pub fn describe(&self) -> &'static str {
        match self.store.as_ref() {
            AnyStore::Realtime(_) => "realtime",
            AnyStore::Rest(_) => "fallback REST",
            AnyStore::Memory(_) => "offline",
        }
    }
}
