//! In-process identity provider.
//!
//! Accounts live in memory and are validated with the same rules and
//! error variants as the hosted provider, so the offline demo and tests
//! exercise the same paths as a real deployment.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tarefas_proto::session::{Uid, UserSession};

use super::{AuthError, IdentityProvider, SessionCell, SessionWatch};
use crate::subscription::Subscription;

/// Shortest password accepted at sign-up.
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone)]
struct LocalAccount {
    uid: Uid,
    password: String,
    display_name: Option<String>,
}

/// Identity provider backed by an in-memory account table.
#[derive(Debug, Default)]
pub struct LocalIdentity {
    accounts: Mutex<HashMap<String, LocalAccount>>,
    next_id: AtomicU64,
    session: SessionCell,
}

impl LocalIdentity {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an account up front. Returns its uid.
    pub fn with_account(&self, email: &str, password: &str, display_name: Option<&str>) -> Uid {
        let uid = self.next_uid();
        self.accounts.lock().insert(
            email.to_lowercase(),
            LocalAccount {
                uid: uid.clone(),
                password: password.to_string(),
                display_name: display_name.map(String::from),
            },
        );
        uid
    }

    fn next_uid(&self) -> Uid {
        Uid::new(format!("local-{}", self.next_id.fetch_add(1, Ordering::Relaxed)))
    }

    fn open_session(&self, email: &str, account: &LocalAccount) -> UserSession {
        let serial = self.next_id.fetch_add(1, Ordering::Relaxed);
        let session = UserSession {
            uid: account.uid.clone(),
            email: Some(email.to_string()),
            display_name: account.display_name.clone(),
            photo_url: None,
            id_token: format!("local-token-{serial}"),
            refresh_token: None,
        };
        tracing::info!(uid = %session.uid, "signed in");
        self.session.set(Some(session.clone()));
        session
    }
}

fn validate_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(AuthError::InvalidEmail),
    }
}

impl IdentityProvider for LocalIdentity {
    async fn sign_in(&self, email: &str, password: &str) -> Result<UserSession, AuthError> {
        let email = validate_email(email)?;
        if password.is_empty() {
            return Err(AuthError::MissingPassword);
        }
        let account = self
            .accounts
            .lock()
            .get(&email)
            .filter(|account| account.password == password)
            .cloned();
        let Some(account) = account else {
            tracing::warn!("local sign-in rejected");
            return Err(AuthError::InvalidCredentials);
        };
        Ok(self.open_session(&email, &account))
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<UserSession, AuthError> {
        let email = validate_email(email)?;
        if password.is_empty() {
            return Err(AuthError::MissingPassword);
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword(format!(
                "Password should be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        let account = {
            let mut accounts = self.accounts.lock();
            if accounts.contains_key(&email) {
                return Err(AuthError::EmailExists);
            }
            let account = LocalAccount {
                uid: self.next_uid(),
                password: password.to_string(),
                display_name: None,
            };
            accounts.insert(email.clone(), account.clone());
            account
        };
        Ok(self.open_session(&email, &account))
    }

    async fn sign_out(&self) {
        self.session.set(None);
    }

    fn on_auth_state_changed<F>(&self, listener: F) -> Subscription
    where
        F: FnMut(Option<UserSession>) + Send + 'static,
    {
        self.session.listen(listener)
    }

    fn current_session(&self) -> Option<UserSession> {
        self.session.current()
    }

    fn session_watch(&self) -> SessionWatch {
        self.session.watch()
    }
}
