// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Token store access and refresh-before-use.
//!
//! Tokens are encrypted with KMS before they reach the store and decrypted
//! only when a provider call needs them. There is no in-process cache: every
//! call reads the stored expiry, so concurrent requests rely on the store's
//! atomic connection upsert.

use crate::db::Db;
use crate::error::AppError;
use crate::models::{Provider, ProviderLink, ProviderLinkUpdate, UserConnection};
use crate::services::http::{ProviderError, ProviderClients, TokenGrant};
use crate::services::kms::token_aad;
use crate::services::KmsService;
use chrono::Utc;
use reqwest::StatusCode;

/// Reads, refreshes and persists provider tokens.
#[derive(Clone)]
pub struct TokenManager {
    db: Db,
    kms: KmsService,
    providers: ProviderClients,
}

impl TokenManager {
    pub fn new(db: Db, kms: KmsService, providers: ProviderClients) -> Self {
        Self { db, kms, providers }
    }

    /// Encrypt and store a fresh grant for `provider_account_id`.
    ///
    /// Fails with `AccountAlreadyLinked` if that account belongs to another
    /// user.
    pub async fn store_grant(
        &self,
        user_id: &str,
        provider: Provider,
        provider_account_id: &str,
        grant: &TokenGrant,
    ) -> Result<UserConnection, AppError> {
        let update = self
            .encrypt_grant(user_id, provider, provider_account_id, grant)
            .await?;
        self.db.upsert_connection(user_id, update).await
    }

    /// Whether a refreshable grant is stored for this exact provider account.
    pub async fn has_refreshable_grant(
        &self,
        user_id: &str,
        provider: Provider,
        provider_account_id: &str,
    ) -> Result<bool, AppError> {
        let conn = self.db.get_connection(user_id).await?;
        Ok(conn.as_ref().and_then(|c| c.link(provider)).is_some_and(|link| {
            link.account_id == provider_account_id && link.refresh_token_encrypted.is_some()
        }))
    }

    /// Return a usable access token, refreshing it first if it has expired.
    ///
    /// A rejected refresh is not retried; the caller gets
    /// `ReauthorizationRequired` and must prompt the user to reconnect.
    pub async fn get_valid_access_token(
        &self,
        user_id: &str,
        provider: Provider,
    ) -> Result<String, AppError> {
        let link = self
            .db
            .get_connection(user_id)
            .await?
            .and_then(|conn| conn.link(provider).cloned())
            .ok_or_else(|| AppError::NotFound(format!("{} connection for user", provider)))?;

        let aad = token_aad(user_id, provider);
        let expired = match link.token_expiry {
            Some(expiry) => expiry < Utc::now(),
            // GitHub OAuth app tokens carry no lifetime.
            None => provider != Provider::Github,
        };

        if !expired {
            let encrypted = link
                .access_token_encrypted
                .as_deref()
                .ok_or(AppError::ReauthorizationRequired { provider })?;
            return self.kms.decrypt(encrypted, &aad).await;
        }

        tracing::info!(user_id, %provider, "Access token expired, refreshing");
        self.refresh(user_id, provider, &link).await
    }

    async fn refresh(
        &self,
        user_id: &str,
        provider: Provider,
        link: &ProviderLink,
    ) -> Result<String, AppError> {
        let Some(refresh_encrypted) = link.refresh_token_encrypted.as_deref() else {
            tracing::warn!(user_id, %provider, "No refresh token stored");
            return Err(AppError::ReauthorizationRequired { provider });
        };
        let refresh_token = self
            .kms
            .decrypt(refresh_encrypted, &token_aad(user_id, provider))
            .await?;

        let result = match provider {
            Provider::Google => self.providers.google.refresh(&refresh_token).await,
            Provider::Dropbox => self.providers.dropbox.refresh(&refresh_token).await,
            Provider::Github => return Err(AppError::ReauthorizationRequired { provider }),
        };

        let grant = result.map_err(|e| refresh_failed(e, user_id, provider))?;
        self.store_grant(user_id, provider, &link.account_id, &grant)
            .await?;

        tracing::info!(user_id, %provider, "Access token refreshed");
        Ok(grant.access_token)
    }

    async fn encrypt_grant(
        &self,
        user_id: &str,
        provider: Provider,
        provider_account_id: &str,
        grant: &TokenGrant,
    ) -> Result<ProviderLinkUpdate, AppError> {
        let aad = token_aad(user_id, provider);
        let access_token_encrypted = self.kms.encrypt(&grant.access_token, &aad).await?;
        let refresh_token_encrypted = match &grant.refresh_token {
            Some(token) => Some(self.kms.encrypt(token, &aad).await?),
            None => None,
        };

        Ok(ProviderLinkUpdate {
            provider,
            account_id: provider_account_id.to_string(),
            access_token_encrypted,
            refresh_token_encrypted,
            token_expiry: match (provider, grant.expires_in) {
                (Provider::Github, None) => None,
                _ => Some(grant.expiry(Utc::now())),
            },
            scopes: grant.scopes.clone(),
        })
    }
}

/// Map a failed refresh call. Rejections mean the refresh token is dead;
/// anything else is a provider outage.
fn refresh_failed(err: ProviderError, user_id: &str, provider: Provider) -> AppError {
    tracing::warn!(user_id, %provider, error = %err, "Token refresh failed");
    match err.status() {
        Some(StatusCode::BAD_REQUEST) | Some(StatusCode::UNAUTHORIZED) => {
            AppError::ReauthorizationRequired { provider }
        }
        _ => match err {
            ProviderError::MissingField(_) => AppError::ReauthorizationRequired { provider },
            other => other.api_failed(provider),
        },
    }
}
