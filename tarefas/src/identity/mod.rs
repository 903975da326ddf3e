//! Identity provider adapter.
//!
//! Defines the [`IdentityProvider`] trait the rest of the client uses to
//! sign users in and out and to follow the current session. Concrete
//! providers:
//! - [`firebase::FirebaseIdentity`]: hosted email/password endpoints
//! - [`local::LocalIdentity`]: in-process account table for the offline
//!   demo and tests
//!
//! Both keep the session in a [`SessionCell`], so listeners and stores
//! observe changes the same way.

pub mod firebase;
pub mod local;

use std::future::Future;
use std::sync::Arc;

use tarefas_proto::session::{Uid, UserSession};
use tokio::sync::watch;

use crate::subscription::Subscription;

/// Errors returned by sign-in and sign-up.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Unknown email or wrong password.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// Sign-up with an email that already has an account.
    #[error("an account with this email already exists")]
    EmailExists,

    /// The email address is malformed.
    #[error("invalid email address")]
    InvalidEmail,

    /// The password does not meet the provider's policy.
    #[error("weak password: {0}")]
    WeakPassword(String),

    /// No password was given.
    #[error("a password is required")]
    MissingPassword,

    /// The provider rejected the request with another code.
    #[error("sign-in rejected: {0}")]
    Rejected(String),

    /// The provider could not be reached.
    #[error("identity service unreachable: {0}")]
    Network(#[from] reqwest::Error),

    /// The provider answered with something that is not a session.
    #[error("malformed identity response: {0}")]
    Malformed(String),

    /// The session can no longer be renewed; the user must sign in again.
    #[error("session expired, sign in again")]
    SessionExpired,

    /// Another user signed in (or out) while a request was in flight.
    #[error("the signed-in user changed")]
    SessionChanged,
}

impl AuthError {
    /// Maps a provider error code such as `EMAIL_EXISTS`.
    ///
    /// Codes may carry a detail after ` : `, as in
    /// `WEAK_PASSWORD : Password should be at least 6 characters`.
    #[must_use]
    pub fn from_code(raw: &str) -> Self {
        let (code, detail) = raw
            .split_once(" : ")
            .map_or((raw.trim(), None), |(c, d)| (c.trim(), Some(d.trim())));
        match code {
            "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" => {
                Self::InvalidCredentials
            }
            "EMAIL_EXISTS" => Self::EmailExists,
            "INVALID_EMAIL" => Self::InvalidEmail,
            "MISSING_PASSWORD" => Self::MissingPassword,
            "TOKEN_EXPIRED" | "INVALID_REFRESH_TOKEN" | "MISSING_REFRESH_TOKEN"
            | "USER_NOT_FOUND" | "USER_DISABLED" => Self::SessionExpired,
            "WEAK_PASSWORD" => Self::WeakPassword(
                detail
                    .unwrap_or("Password should be at least 6 characters")
                    .to_string(),
            ),
            _ => Self::Rejected(raw.to_string()),
        }
    }
}

/// Sign-in and session tracking.
pub trait IdentityProvider: Send + Sync {
    /// Signs in with email and password and makes that user current.
    fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<UserSession, AuthError>> + Send;

    /// Creates an account and signs it in.
    fn sign_up(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<UserSession, AuthError>> + Send;

    /// Clears the current session. Safe to call when signed out.
    fn sign_out(&self) -> impl Future<Output = ()> + Send;

    /// Registers `listener` for session changes.
    ///
    /// The listener runs once right away with the current session, then
    /// on every change until the returned token is closed or dropped.
    /// Changes in quick succession may be coalesced into the latest one.
    fn on_auth_state_changed<F>(&self, listener: F) -> Subscription
    where
        F: FnMut(Option<UserSession>) + Send + 'static;

    /// The signed-in session, if any.
    fn current_session(&self) -> Option<UserSession>;

    /// Uid of the signed-in user, if any.
    fn current_uid(&self) -> Option<Uid> {
        self.current_session().map(|session| session.uid)
    }

    /// A read handle stores use to scope requests to the current user.
    fn session_watch(&self) -> SessionWatch;
}

// ---------------------------------------------------------------------------
// Shared session state
// ---------------------------------------------------------------------------

/// The current session, shared between a provider and its observers.
#[derive(Debug, Clone)]
pub struct SessionCell {
    tx: Arc<watch::Sender<Option<UserSession>>>,
}

impl Default for SessionCell {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionCell {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tx: Arc::new(watch::Sender::new(None)),
        }
    }

    /// Replaces the session and wakes every listener.
    pub fn set(&self, session: Option<UserSession>) {
        self.tx.send_replace(session);
    }

    #[must_use]
    pub fn current(&self) -> Option<UserSession> {
        self.tx.borrow().clone()
    }

    /// Replaces the session only while `uid` is still the signed-in user.
    ///
    /// Returns whether the session was replaced. Listeners are woken only
    /// when it was.
    pub fn replace_for(&self, uid: &Uid, session: Option<UserSession>) -> bool {
        self.tx.send_if_modified(|current| {
            if current.as_ref().is_some_and(|c| &c.uid == uid) {
                *current = session;
                true
            } else {
                false
            }
        })
    }

    #[must_use]
    pub fn watch(&self) -> SessionWatch {
        SessionWatch(self.tx.subscribe())
    }

    /// Calls `listener` now and after every later change.
    ///
    /// Must be called inside a tokio runtime.
    pub fn listen<F>(&self, mut listener: F) -> Subscription
    where
        F: FnMut(Option<UserSession>) + Send + 'static,
    {
        let mut rx = self.tx.subscribe();
        let initial = rx.borrow_and_update().clone();
        listener(initial);
        Subscription::new(tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let session = rx.borrow_and_update().clone();
                listener(session);
            }
        }))
    }
}

/// Read-only view of a [`SessionCell`].
#[derive(Debug, Clone)]
pub struct SessionWatch(watch::Receiver<Option<UserSession>>);

impl SessionWatch {
    /// A watch that is permanently signed out.
    #[must_use]
    pub fn signed_out() -> Self {
        SessionCell::new().watch()
    }

    #[must_use]
    pub fn current(&self) -> Option<UserSession> {
        self.0.borrow().clone()
    }

    #[must_use]
    pub fn uid(&self) -> Option<Uid> {
        self.0.borrow().as_ref().map(|session| session.uid.clone())
    }
}

// ---------------------------------------------------------------------------
// Startup-selected provider
// ---------------------------------------------------------------------------

/// The provider chosen at startup.
#[derive(Debug)]
pub enum AnyIdentity {
    Firebase(firebase::FirebaseIdentity),
    Local(local::LocalIdentity),
}

impl IdentityProvider for AnyIdentity {
    async fn sign_in(&self, email: &str, password: &str) -> Result<UserSession, AuthError> {
        match self {
            Self::Firebase(identity) => identity.sign_in(email, password).await,
            Self::Local(identity) => identity.sign_in(email, password).await,
        }
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<UserSession, AuthError> {
        match self {
            Self::Firebase(identity) => identity.sign_up(email, password).await,
            Self::Local(identity) => identity.sign_up(email, password).await,
        }
    }

    async fn sign_out(&self) {
        match self {
            Self::Firebase(identity) => identity.sign_out().await,
            Self::Local(identity) => identity.sign_out().await,
        }
    }

    fn on_auth_state_changed<F>(&self, listener: F) -> Subscription
    where
        F: FnMut(Option<UserSession>) + Send + 'static,
    {
        match self {
            Self::Firebase(identity) => identity.on_auth_state_changed(listener),
            Self::Local(identity) => identity.on_auth_state_changed(listener),
        }
    }

    fn current_session(&self) -> Option<UserSession> {
        match self {
            Self::Firebase(identity) => identity.current_session(),
            Self::Local(identity) => identity.current_session(),
        }
    }

    fn session_watch(&self) -> SessionWatch {
        match self {
            Self::Firebase(identity) => identity.session_watch(),
            Self::Local(identity) => identity.session_watch(),
        }
    }
}
