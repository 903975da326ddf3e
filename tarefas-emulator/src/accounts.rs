//! Email/password accounts and issued tokens.
//!
//! Mirrors the password and token-refresh endpoints of the hosted identity
//! service closely enough for the client adapter: the same request and
//! reply field names and the same error codes. Id tokens expire after the
//! registry's token lifetime; refresh tokens never do.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tarefas_proto::session::Uid;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Minimum password length accepted by `signUp`.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Lifetime of an id token unless configured otherwise.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3600);

/// The only grant the token endpoint accepts.
pub const REFRESH_GRANT: &str = "refresh_token";

/// Reasons a sign-up or sign-in is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountError {
    /// `signUp` with an email already registered.
    #[error("EMAIL_EXISTS")]
    EmailExists,
    /// `signInWithPassword` with an unknown email.
    #[error("EMAIL_NOT_FOUND")]
    EmailNotFound,
    /// `signInWithPassword` with the wrong password.
    #[error("INVALID_PASSWORD")]
    InvalidPassword,
    /// Email missing or malformed.
    #[error("INVALID_EMAIL")]
    InvalidEmail,
    /// Password missing.
    #[error("MISSING_PASSWORD")]
    MissingPassword,
    /// Password shorter than [`MIN_PASSWORD_LEN`].
    #[error("WEAK_PASSWORD : Password should be at least 6 characters")]
    WeakPassword,
    /// Token request without a refresh token.
    #[error("MISSING_REFRESH_TOKEN")]
    MissingRefreshToken,
    /// Token request with an unknown refresh token.
    #[error("INVALID_REFRESH_TOKEN")]
    InvalidRefreshToken,
    /// Token request with a grant other than `refresh_token`.
    #[error("INVALID_GRANT_TYPE")]
    InvalidGrantType,
}

/// Body of both password endpoints.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordRequest {
    /// Account email.
    #[serde(default)]
    pub email: String,
    /// Account password.
    #[serde(default)]
    pub password: String,
    /// Accepted for compatibility; tokens are always returned.
    #[serde(default)]
    pub return_secure_token: bool,
}

/// Successful reply of both password endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInReply {
    /// Bearer token for data requests.
    pub id_token: String,
    /// The account's uid.
    pub local_id: String,
    /// The account's email.
    pub email: String,
    /// Profile name; empty when unset.
    #[serde(default)]
    pub display_name: String,
    /// Long-lived token exchanged for new id tokens.
    pub refresh_token: String,
    /// Token lifetime in seconds, as a string.
    pub expires_in: String,
}

/// Body of the token endpoint.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RefreshRequest {
    /// Must be `refresh_token`.
    #[serde(default)]
    pub grant_type: String,
    /// Token from a previous sign-in.
    #[serde(default)]
    pub refresh_token: String,
}

/// Successful reply of the token endpoint (snake case, unlike the
/// password endpoints).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RefreshReply {
    /// New bearer token for data requests.
    pub id_token: String,
    /// The same refresh token.
    pub refresh_token: String,
    /// Token lifetime in seconds, as a string.
    pub expires_in: String,
    /// The account's uid.
    pub user_id: String,
    /// Always `Bearer`.
    pub token_type: String,
}

#[derive(Debug, Clone)]
struct Account {
    uid: Uid,
    password: String,
    display_name: String,
}

#[derive(Debug, Clone)]
struct IssuedToken {
    uid: Uid,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct Accounts {
    by_email: HashMap<String, Account>,
    tokens: HashMap<String, IssuedToken>,
    refresh_tokens: HashMap<String, Uid>,
}

/// Registered accounts and the tokens issued to them.
#[derive(Debug)]
pub struct AccountRegistry {
    inner: RwLock<Accounts>,
    token_ttl: Duration,
}

impl Default for AccountRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountRegistry {
    /// Creates an empty registry issuing hour-long id tokens.
    #[must_use]
    pub fn new() -> Self {
        Self::with_token_ttl(DEFAULT_TOKEN_TTL)
    }

    /// Creates an empty registry whose id tokens expire after `token_ttl`.
    #[must_use]
    pub fn with_token_ttl(token_ttl: Duration) -> Self {
        Self {
            inner: RwLock::new(Accounts::default()),
            token_ttl,
        }
    }

    /// Registers a new account and signs it in.
    ///
    /// # Errors
    ///
    /// Returns [`AccountError`] for malformed input or a taken email.
    pub async fn sign_up(&self, request: &PasswordRequest) -> Result<SignInReply, AccountError> {
        let email = normalize_email(&request.email)?;
        if request.password.is_empty() {
            return Err(AccountError::MissingPassword);
        }
        if request.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AccountError::WeakPassword);
        }

        let mut accounts = self.inner.write().await;
        if accounts.by_email.contains_key(&email) {
            return Err(AccountError::EmailExists);
        }
        let account = Account {
            uid: Uid::new(uuid::Uuid::now_v7().simple().to_string()),
            password: request.password.clone(),
            display_name: String::new(),
        };
        accounts.by_email.insert(email.clone(), account.clone());
        let reply = self.issue(&mut accounts, &email, &account);
        drop(accounts);
        tracing::info!(uid = %reply.local_id, "account created");
        Ok(reply)
    }

    /// Checks credentials and issues a fresh token.
    ///
    /// # Errors
    ///
    /// Returns [`AccountError`] for malformed input, unknown email or
    /// wrong password.
    pub async fn sign_in(&self, request: &PasswordRequest) -> Result<SignInReply, AccountError> {
        let email = normalize_email(&request.email)?;
        if request.password.is_empty() {
            return Err(AccountError::MissingPassword);
        }

        let mut accounts = self.inner.write().await;
        let account = accounts
            .by_email
            .get(&email)
            .cloned()
            .ok_or(AccountError::EmailNotFound)?;
        if account.password != request.password {
            return Err(AccountError::InvalidPassword);
        }
        Ok(self.issue(&mut accounts, &email, &account))
    }

    /// Exchanges a refresh token for a new id token.
    ///
    /// # Errors
    ///
    /// Returns [`AccountError`] for a wrong grant type or an unknown
    /// refresh token.
    pub async fn refresh(&self, request: &RefreshRequest) -> Result<RefreshReply, AccountError> {
        if request.grant_type != REFRESH_GRANT {
            return Err(AccountError::InvalidGrantType);
        }
        if request.refresh_token.is_empty() {
            return Err(AccountError::MissingRefreshToken);
        }
        let mut accounts = self.inner.write().await;
        let uid = accounts
            .refresh_tokens
            .get(&request.refresh_token)
            .cloned()
            .ok_or(AccountError::InvalidRefreshToken)?;
        let id_token = self.issue_id_token(&mut accounts, &uid);
        drop(accounts);
        tracing::debug!(%uid, "id token refreshed");
        Ok(RefreshReply {
            id_token,
            refresh_token: request.refresh_token.clone(),
            expires_in: self.token_ttl.as_secs().to_string(),
            user_id: uid.to_string(),
            token_type: "Bearer".to_string(),
        })
    }

    /// Sets the profile name shown to the client on its next sign-in.
    pub async fn set_display_name(&self, email: &str, display_name: &str) -> bool {
        let mut accounts = self.inner.write().await;
        accounts
            .by_email
            .get_mut(&email.trim().to_lowercase())
            .is_some_and(|account| {
                display_name.clone_into(&mut account.display_name);
                true
            })
    }

    /// Invalidates every refresh token of `uid`. Id tokens already issued
    /// stay valid until they expire. Returns how many were revoked.
    pub async fn revoke_refresh_tokens(&self, uid: &Uid) -> usize {
        let mut accounts = self.inner.write().await;
        let before = accounts.refresh_tokens.len();
        accounts.refresh_tokens.retain(|_, owner| owner != uid);
        let revoked = before - accounts.refresh_tokens.len();
        drop(accounts);
        tracing::info!(%uid, revoked, "refresh tokens revoked");
        revoked
    }

    /// Resolves an unexpired bearer token to its account's uid.
    pub async fn uid_for_token(&self, token: &str) -> Option<Uid> {
        self.inner
            .read()
            .await
            .tokens
            .get(token)
            .filter(|issued| issued.expires_at > Instant::now())
            .map(|issued| issued.uid.clone())
    }

    /// When an issued token stops being accepted.
    pub async fn token_expiry(&self, token: &str) -> Option<Instant> {
        self.inner
            .read()
            .await
            .tokens
            .get(token)
            .map(|issued| issued.expires_at)
    }

    fn issue(&self, accounts: &mut Accounts, email: &str, account: &Account) -> SignInReply {
        let id_token = self.issue_id_token(accounts, &account.uid);
        let refresh_token = format!("emu-refresh-{}", uuid::Uuid::now_v7().simple());
        accounts
            .refresh_tokens
            .insert(refresh_token.clone(), account.uid.clone());
        SignInReply {
            id_token,
            local_id: account.uid.to_string(),
            email: email.to_string(),
            display_name: account.display_name.clone(),
            refresh_token,
            expires_in: self.token_ttl.as_secs().to_string(),
        }
    }

    fn issue_id_token(&self, accounts: &mut Accounts, uid: &Uid) -> String {
        let id_token = format!("emu-{}", uuid::Uuid::now_v7().simple());
        accounts.tokens.insert(
            id_token.clone(),
            IssuedToken {
                uid: uid.clone(),
                expires_at: Instant::now() + self.token_ttl,
            },
        );
        id_token
    }
}

fn normalize_email(email: &str) -> Result<String, AccountError> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain))
            if !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.contains(char::is_whitespace) =>
        {
            Ok(email)
        }
        _ => Err(AccountError::InvalidEmail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(email: &str, password: &str) -> PasswordRequest {
        PasswordRequest {
            email: email.to_string(),
            password: password.to_string(),
            return_secure_token: true,
        }
    }

    #[tokio::test]
    async fn sign_up_then_sign_in_same_uid() {
        let registry = AccountRegistry::new();
        let created = registry
            .sign_up(&request("ana@example.com", "segredo1"))
            .await
            .unwrap();
        let signed_in = registry
            .sign_in(&request("ANA@example.com", "segredo1"))
            .await
            .unwrap();
        assert_eq!(created.local_id, signed_in.local_id);
        assert_ne!(created.id_token, signed_in.id_token);
        assert_eq!(
            registry.uid_for_token(&signed_in.id_token).await,
            Some(Uid::new(created.local_id))
        );
    }

    #[tokio::test]
    async fn duplicate_email_rejected() {
        let registry = AccountRegistry::new();
        registry
            .sign_up(&request("a@b.c", "123456"))
            .await
            .unwrap();
        assert_eq!(
            registry.sign_up(&request("a@b.c", "654321")).await,
            Err(AccountError::EmailExists)
        );
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email() {
        let registry = AccountRegistry::new();
        registry
            .sign_up(&request("a@b.c", "123456"))
            .await
            .unwrap();
        assert_eq!(
            registry.sign_in(&request("a@b.c", "nope!!")).await,
            Err(AccountError::InvalidPassword)
        );
        assert_eq!(
            registry.sign_in(&request("x@b.c", "123456")).await,
            Err(AccountError::EmailNotFound)
        );
    }

    #[tokio::test]
    async fn malformed_input_rejected() {
        let registry = AccountRegistry::new();
        assert_eq!(
            registry.sign_up(&request("not-an-email", "123456")).await,
            Err(AccountError::InvalidEmail)
        );
        assert_eq!(
            registry.sign_up(&request("a@b.c", "")).await,
            Err(AccountError::MissingPassword)
        );
        assert_eq!(
            registry.sign_up(&request("a@b.c", "123")).await,
            Err(AccountError::WeakPassword)
        );
    }

    #[tokio::test]
    async fn unknown_token_has_no_uid() {
        let registry = AccountRegistry::new();
        assert_eq!(registry.uid_for_token("forged").await, None);
    }

    #[tokio::test]
    async fn expired_token_has_no_uid() {
        let registry = AccountRegistry::with_token_ttl(Duration::from_millis(20));
        let reply = registry
            .sign_up(&request("ana@example.com", "segredo1"))
            .await
            .unwrap();
        assert!(registry.uid_for_token(&reply.id_token).await.is_some());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(registry.uid_for_token(&reply.id_token).await, None);
        assert!(registry.token_expiry(&reply.id_token).await.is_some());
    }

    #[tokio::test]
    async fn refresh_issues_new_token_for_same_uid() {
        let registry = AccountRegistry::with_token_ttl(Duration::from_millis(20));
        let reply = registry
            .sign_up(&request("ana@example.com", "segredo1"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        let refreshed = registry
            .refresh(&RefreshRequest {
                grant_type: REFRESH_GRANT.to_string(),
                refresh_token: reply.refresh_token.clone(),
            })
            .await
            .unwrap();
        assert_ne!(refreshed.id_token, reply.id_token);
        assert_eq!(refreshed.user_id, reply.local_id);
        assert_eq!(
            registry.uid_for_token(&refreshed.id_token).await,
            Some(Uid::new(reply.local_id))
        );
    }

    #[tokio::test]
    async fn revoked_refresh_token_is_rejected() {
        let registry = AccountRegistry::new();
        let signed_up = registry
            .sign_up(&request("ana@example.com", "secret1"))
            .await
            .unwrap();
        let uid = Uid::new(signed_up.local_id.clone());

        assert_eq!(registry.revoke_refresh_tokens(&uid).await, 1);
        let err = registry
            .refresh(&RefreshRequest {
                grant_type: REFRESH_GRANT.to_string(),
                refresh_token: signed_up.refresh_token,
            })
            .await
            .unwrap_err();
        assert_eq!(err, AccountError::InvalidRefreshToken);
        // The id token in hand still works until it lapses.
        assert_eq!(registry.uid_for_token(&signed_up.id_token).await, Some(uid));
    }

    #[tokio::test]
    async fn refresh_rejects_bad_requests() {
        let registry = AccountRegistry::new();
        let bad_grant = RefreshRequest {
            grant_type: "password".to_string(),
            refresh_token: "x".to_string(),
        };
        assert_eq!(
            registry.refresh(&bad_grant).await,
            Err(AccountError::InvalidGrantType)
        );
        let unknown = RefreshRequest {
            grant_type: REFRESH_GRANT.to_string(),
            refresh_token: "forged".to_string(),
        };
        assert_eq!(
            registry.refresh(&unknown).await,
            Err(AccountError::InvalidRefreshToken)
        );
    }

    #[tokio::test]
    async fn display_name_is_returned_on_sign_in() {
        let registry = AccountRegistry::new();
        registry
            .sign_up(&request("ana@example.com", "segredo1"))
            .await
            .unwrap();
        assert!(registry.set_display_name("ana@example.com", "Ana").await);
        let reply = registry
            .sign_in(&request("ana@example.com", "segredo1"))
            .await
            .unwrap();
        assert_eq!(reply.display_name, "Ana");
    }
}
