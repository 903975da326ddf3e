//! Email/password identity over the hosted REST endpoints.
//!
//! Sign-in posts to `{endpoint}/v1/accounts:signInWithPassword?key=…`,
//! sign-up to `{endpoint}/v1/accounts:signUp?key=…`. Failures come back as
//! `{"error": {"code": 400, "message": "EMAIL_EXISTS"}}`.
//!
//! Id tokens expire. [`TokenRefresher`] trades the session's refresh token
//! for a new one at `{token_endpoint}/v1/token?key=…`; when that fails for
//! good the session is cleared.

use serde::{Deserialize, Serialize};
use tarefas_proto::session::{Uid, UserSession};
use url::Url;

use super::{AuthError, IdentityProvider, SessionCell, SessionWatch};
use crate::subscription::Subscription;

const SIGN_IN: &str = "accounts:signInWithPassword";
const SIGN_UP: &str = "accounts:signUp";
const REFRESH_GRANT: &str = "refresh_token";

const AUTH_HOST: &str = "identitytoolkit.googleapis.com";
const TOKEN_HOST: &str = "securetoken.googleapis.com";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordReply {
    id_token: String,
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl PasswordReply {
    fn into_session(self) -> UserSession {
        UserSession {
            uid: Uid::new(self.local_id),
            email: self.email.filter(|e| !e.is_empty()),
            display_name: self.display_name.filter(|n| !n.is_empty()),
            photo_url: self.photo_url.filter(|p| !p.is_empty()),
            id_token: self.id_token,
            refresh_token: self.refresh_token,
        }
    }
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    grant_type: &'a str,
    refresh_token: &'a str,
}

/// The token endpoint answers in snake case.
#[derive(Deserialize)]
struct RefreshReply {
    id_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    user_id: String,
}

#[derive(Deserialize)]
struct ErrorReply {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Reads an error reply, falling back to the HTTP status.
fn error_from(status: reqwest::StatusCode, body: &[u8]) -> AuthError {
    serde_json::from_slice::<ErrorReply>(body).map_or_else(
        |_| AuthError::Rejected(status.to_string()),
        |reply| AuthError::from_code(&reply.error.message),
    )
}

/// Token service root that pairs with an identity endpoint.
///
/// The hosted services sit on sibling hosts; an emulator serves both under
/// one host with the service name as the first path segment. Anything else
/// is assumed to serve both from the same root.
#[must_use]
pub fn token_endpoint_for(auth_endpoint: &Url) -> Url {
    let mut url = auth_endpoint.clone();
    if url.host_str() == Some(AUTH_HOST) {
        return match url.set_host(Some(TOKEN_HOST)) {
            Ok(()) => url,
            Err(_) => auth_endpoint.clone(),
        };
    }
    let path = url.path().replace(AUTH_HOST, TOKEN_HOST);
    url.set_path(&path);
    url
}

/// Identity provider backed by the hosted password endpoints.
#[derive(Debug)]
pub struct FirebaseIdentity {
    http: reqwest::Client,
    endpoint: Url,
    token_endpoint: Url,
    api_key: String,
    session: SessionCell,
}

impl FirebaseIdentity {
    #[must_use]
    pub fn new(endpoint: Url, api_key: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint, api_key)
    }

    /// Shares an existing HTTP client.
    #[must_use]
    pub fn with_client(http: reqwest::Client, endpoint: Url, api_key: impl Into<String>) -> Self {
        Self {
            http,
            token_endpoint: token_endpoint_for(&endpoint),
            endpoint,
            api_key: api_key.into(),
            session: SessionCell::new(),
        }
    }

    /// Overrides the token service root derived from the identity endpoint.
    #[must_use]
    pub fn with_token_endpoint(mut self, token_endpoint: Url) -> Self {
        self.token_endpoint = token_endpoint;
        self
    }

    /// A handle that renews this provider's session.
    #[must_use]
    pub fn refresher(&self) -> TokenRefresher {
        TokenRefresher {
            http: self.http.clone(),
            endpoint: self.token_endpoint.clone(),
            api_key: self.api_key.clone(),
            session: self.session.clone(),
        }
    }

    fn action_url(&self, action: &str) -> Result<Url, AuthError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| AuthError::Malformed(format!("{} cannot be a base URL", self.endpoint)))?
            .pop_if_empty()
            .extend(["v1", action]);
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }

    async fn password_call(
        &self,
        action: &str,
        email: &str,
        password: &str,
    ) -> Result<UserSession, AuthError> {
        let url = self.action_url(action)?;
        tracing::debug!(%action, "identity request");

        let response = self
            .http
            .post(url)
            .json(&PasswordRequest {
                email,
                password,
                return_secure_token: true,
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            let error = error_from(status, &body);
            tracing::warn!(%action, %status, error = %error, "identity request failed");
            return Err(error);
        }

        let reply: PasswordReply =
            serde_json::from_slice(&body).map_err(|e| AuthError::Malformed(e.to_string()))?;
        let session = reply.into_session();
        tracing::info!(uid = %session.uid, "signed in");
        self.session.set(Some(session.clone()));
        Ok(session)
    }
}

/// Renews the id token of a [`FirebaseIdentity`] session.
#[derive(Debug, Clone)]
pub struct TokenRefresher {
    http: reqwest::Client,
    endpoint: Url,
    api_key: String,
    session: SessionCell,
}

impl TokenRefresher {
    fn token_url(&self) -> Result<Url, AuthError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| AuthError::Malformed(format!("{} cannot be a base URL", self.endpoint)))?
            .pop_if_empty()
            .extend(["v1", "token"]);
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }

    /// Swaps a fresh id token into `uid`'s session and returns it.
    ///
    /// Setting the session wakes auth listeners. A missing refresh token,
    /// or one the service refuses with a client error, signs the user out;
    /// network and server failures leave the session alone.
    ///
    /// # Errors
    ///
    /// [`AuthError::SessionChanged`] if `uid` is no longer signed in,
    /// [`AuthError::SessionExpired`] (or the mapped provider code) when
    /// the session was cleared, and network or decode errors otherwise.
    pub async fn refresh(&self, uid: &Uid) -> Result<UserSession, AuthError> {
        let Some(current) = self.session.current().filter(|s| &s.uid == uid) else {
            return Err(AuthError::SessionChanged);
        };
        let Some(refresh_token) = current.refresh_token.clone() else {
            tracing::warn!(%uid, "id token expired with no refresh token, signing out");
            self.session.replace_for(uid, None);
            return Err(AuthError::SessionExpired);
        };

        let url = self.token_url()?;
        tracing::debug!(%uid, "refreshing id token");
        let response = self
            .http
            .post(url)
            .json(&RefreshRequest {
                grant_type: REFRESH_GRANT,
                refresh_token: &refresh_token,
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            let error = error_from(status, &body);
            if status.is_client_error() {
                tracing::warn!(%uid, %status, error = %error, "token refresh rejected, signing out");
                self.session.replace_for(uid, None);
            } else {
                tracing::warn!(%uid, %status, error = %error, "token refresh failed");
            }
            return Err(error);
        }

        let reply: RefreshReply =
            serde_json::from_slice(&body).map_err(|e| AuthError::Malformed(e.to_string()))?;
        if reply.user_id != uid.as_str() {
            return Err(AuthError::Malformed(format!(
                "token issued for {} instead of {uid}",
                reply.user_id
            )));
        }
        let session = UserSession {
            id_token: reply.id_token,
            refresh_token: reply.refresh_token.or(Some(refresh_token)),
            ..current
        };
        if !self.session.replace_for(uid, Some(session.clone())) {
            return Err(AuthError::SessionChanged);
        }
        tracing::info!(%uid, "id token refreshed");
        Ok(session)
    }
}

impl IdentityProvider for FirebaseIdentity {
    async fn sign_in(&self, email: &str, password: &str) -> Result<UserSession, AuthError> {
        self.password_call(SIGN_IN, email, password).await
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<UserSession, AuthError> {
        self.password_call(SIGN_UP, email, password).await
    }

    async fn sign_out(&self) {
        if self.session.current().is_some() {
            tracing::info!("signed out");
        }
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
