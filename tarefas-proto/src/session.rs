//! Authenticated user sessions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque user identifier issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(String);

impl Uid {
    /// Wraps an identifier.
    pub fn new(uid: impl Into<String>) -> Self {
        Self(uid.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The signed-in user and the credentials that scope store requests.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    /// Owner of the visible task collection.
    pub uid: Uid,
    /// Email used to sign in.
    pub email: Option<String>,
    /// Profile display name.
    pub display_name: Option<String>,
    /// Profile photo URL.
    pub photo_url: Option<String>,
    /// Bearer token passed to the store as `?auth=`.
    pub id_token: String,
    /// Long-lived refresh token, when the provider issues one.
    pub refresh_token: Option<String>,
}

impl UserSession {
    /// Label shown in the navigation header.
    ///
    /// Display name when set, otherwise the local part of the email,
    /// otherwise the uid.
    #[must_use]
    pub fn display_label(&self) -> String {
        if let Some(name) = self.display_name.as_deref().filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        if let Some(local) = self
            .email
            .as_deref()
            .and_then(|email| email.split('@').next())
            .filter(|local| !local.is_empty())
        {
            return local.to_string();
        }
        self.uid.to_string()
    }
}

// Tokens stay out of logs.
impl fmt::Debug for UserSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserSession")
            .field("uid", &self.uid)
            .field("email", &self.email)
            .field("display_name", &self.display_name)
            .field("photo_url", &self.photo_url)
            .finish_non_exhaustive()
    }
}
