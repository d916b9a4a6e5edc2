//! User model for storage and API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// External identity/storage provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Github,
    Dropbox,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Github => "github",
            Provider::Dropbox => "dropbox",
        }
    }

    /// Auth-method tag recorded on the user when this provider is used.
    pub fn auth_method(&self) -> AuthMethod {
        match self {
            Provider::Google => AuthMethod::Google,
            Provider::Github => AuthMethod::Github,
            Provider::Dropbox => AuthMethod::Dropbox,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a user is allowed to sign in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(ts_rs::TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    Local,
    Google,
    Github,
    Dropbox,
}

/// Canonical user identity stored in the `users` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Local user id (UUID, also used as document ID)
    pub id: String,
    pub name: String,
    /// Normalized (trimmed, lowercase) e-mail; the cross-provider merge key
    pub email: String,
    #[serde(default)]
    pub google_id: Option<String>,
    #[serde(default)]
    pub github_id: Option<String>,
    #[serde(default)]
    pub dropbox_id: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    /// bcrypt hash for local accounts; never returned by the API
    #[serde(default)]
    pub password_hash: Option<String>,
    pub auth_methods: Vec<AuthMethod>,
    pub is_active: bool,
    pub last_login: DateTime<Utc>,
    /// Owned project ids
    #[serde(default)]
    pub projects: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn provider_id(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::Google => self.google_id.as_deref(),
            Provider::Github => self.github_id.as_deref(),
            Provider::Dropbox => self.dropbox_id.as_deref(),
        }
    }

    pub(crate) fn provider_id_mut(&mut self, provider: Provider) -> &mut Option<String> {
        match provider {
            Provider::Google => &mut self.google_id,
            Provider::Github => &mut self.github_id,
            Provider::Dropbox => &mut self.dropbox_id,
        }
    }

    pub fn has_auth_method(&self, method: AuthMethod) -> bool {
        self.auth_methods.contains(&method)
    }
}

/// User as returned by the API. Carries no password material.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(ts_rs::TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub google_id: Option<String>,
    pub github_id: Option<String>,
    pub dropbox_id: Option<String>,
    pub picture: Option<String>,
    pub auth_methods: Vec<AuthMethod>,
    pub is_active: bool,
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub last_login: DateTime<Utc>,
    pub projects: Vec<String>,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            google_id: user.google_id,
            github_id: user.github_id,
            dropbox_id: user.dropbox_id,
            picture: user.picture,
            auth_methods: user.auth_methods,
            is_active: user.is_active,
            last_login: user.last_login,
            projects: user.projects,
        }
    }
}

/// Normalize an e-mail address for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
