// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-user provider credentials (the token store record).

use super::Provider;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Credentials for one provider account bound to a user.
///
/// Tokens are stored encrypted and are never returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderLink {
    /// Provider-scoped account id (unique across all connections)
    pub account_id: String,
    #[serde(default)]
    pub access_token_encrypted: Option<String>,
    #[serde(default)]
    pub refresh_token_encrypted: Option<String>,
    #[serde(default)]
    pub token_expiry: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Token store record, one per user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserConnection {
    pub user_id: String,
    #[serde(default)]
    pub google: Option<ProviderLink>,
    #[serde(default)]
    pub github: Option<ProviderLink>,
    #[serde(default)]
    pub dropbox: Option<ProviderLink>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fresh credentials to merge into a connection.
#[derive(Debug, Clone)]
pub struct ProviderLinkUpdate {
    pub provider: Provider,
    pub account_id: String,
    pub access_token_encrypted: String,
    /// `None` keeps the previously stored refresh token.
    pub refresh_token_encrypted: Option<String>,
    /// `None` for tokens that do not expire.
    pub token_expiry: Option<DateTime<Utc>>,
    /// `None` keeps the previously stored scopes.
    pub scopes: Option<Vec<String>>,
}

/// Which providers a user has connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub google: bool,
    pub github: bool,
    pub dropbox: bool,
}

impl UserConnection {
    pub fn new(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            google: None,
            github: None,
            dropbox: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn link(&self, provider: Provider) -> Option<&ProviderLink> {
        match provider {
            Provider::Google => self.google.as_ref(),
            Provider::Github => self.github.as_ref(),
            Provider::Dropbox => self.dropbox.as_ref(),
        }
    }

    fn link_slot(&mut self, provider: Provider) -> &mut Option<ProviderLink> {
        match provider {
            Provider::Google => &mut self.google,
            Provider::Github => &mut self.github,
            Provider::Dropbox => &mut self.dropbox,
        }
    }

    /// Merge fresh credentials for one provider.
    ///
    /// The caller is responsible for checking that `update.account_id` is not
    /// bound to another user; this only touches this record.
    pub fn apply(&mut self, update: ProviderLinkUpdate, now: DateTime<Utc>) {
        let slot = self.link_slot(update.provider);
        let previous = slot.take();

        let refresh_token_encrypted = update.refresh_token_encrypted.or_else(|| {
            previous
                .as_ref()
                .filter(|p| p.account_id == update.account_id)
                .and_then(|p| p.refresh_token_encrypted.clone())
        });
        let scopes = update.scopes.unwrap_or_else(|| {
            previous
                .as_ref()
                .filter(|p| p.account_id == update.account_id)
                .map(|p| p.scopes.clone())
                .unwrap_or_default()
        });

        *slot = Some(ProviderLink {
            account_id: update.account_id,
            access_token_encrypted: Some(update.access_token_encrypted),
            refresh_token_encrypted,
            token_expiry: update.token_expiry,
            scopes,
        });
        self.updated_at = now;
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            google: self.google.is_some(),
            github: self.github.is_some(),
            dropbox: self.dropbox.is_some(),
        }
    }
}
