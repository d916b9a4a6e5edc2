// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity resolution across sign-in providers.
//!
//! E-mail is the only cross-provider merge key. A sign-in for a known
//! e-mail enriches the existing user without overwriting anything already
//! set; a provider account already bound to another user is refused.

use crate::config::Config;
use crate::db::Db;
use crate::error::AppError;
use crate::models::{normalize_email, AuthMethod, Provider, User};
use crate::services::google_oidc::{GoogleIdTokenVerifier, OidcError};
use crate::services::http::{ProviderClients, TokenGrant};
use crate::services::TokenManager;
use chrono::{DateTime, Utc};
use std::sync::Arc;

const MIN_PASSWORD_LEN: usize = 8;

/// Identity asserted by a provider after verification or code exchange.
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    pub provider: Provider,
    /// Provider-scoped account id
    pub subject: String,
    /// Normalized e-mail
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
}

/// Build a user for a first sign-in.
pub fn new_user(profile: &ProviderProfile, now: DateTime<Utc>) -> User {
    let mut user = User {
        id: uuid::Uuid::new_v4().to_string(),
        name: profile.name.clone(),
        email: profile.email.clone(),
        google_id: None,
        github_id: None,
        dropbox_id: None,
        picture: profile.picture.clone(),
        password_hash: None,
        auth_methods: vec![profile.provider.auth_method()],
        is_active: true,
        last_login: now,
        projects: Vec::new(),
        created_at: now,
        updated_at: now,
    };
    *user.provider_id_mut(profile.provider) = Some(profile.subject.clone());
    user
}

/// Record a provider on a user: the provider id is set only if unset and
/// the auth method is appended only if absent.
pub fn attach_provider(mut user: User, provider: Provider, subject: &str, now: DateTime<Utc>) -> User {
    let slot = user.provider_id_mut(provider);
    if slot.is_none() {
        *slot = Some(subject.to_string());
    }
    let method = provider.auth_method();
    if !user.has_auth_method(method) {
        user.auth_methods.push(method);
    }
    user.updated_at = now;
    user
}

/// Enrich an existing user from a sign-in. Never overwrites e-mail, name,
/// a set provider id, or a set picture.
pub fn reconcile(existing: User, profile: &ProviderProfile, now: DateTime<Utc>) -> User {
    let mut user = attach_provider(existing, profile.provider, &profile.subject, now);
    if user.picture.is_none() {
        user.picture = profile.picture.clone();
    }
    user.last_login = now;
    user
}

/// Maps provider assertions and local credentials to a canonical user.
#[derive(Clone)]
pub struct IdentityResolver {
    db: Db,
    tokens: TokenManager,
    providers: ProviderClients,
    verifier: Arc<GoogleIdTokenVerifier>,
    google_redirect_uri: String,
    bcrypt_cost: u32,
}

impl IdentityResolver {
    pub fn new(
        db: Db,
        tokens: TokenManager,
        providers: ProviderClients,
        verifier: Arc<GoogleIdTokenVerifier>,
        config: &Config,
    ) -> Self {
        Self {
            db,
            tokens,
            providers,
            verifier,
            google_redirect_uri: config.google_redirect_uri(),
            bcrypt_cost: config.bcrypt_cost,
        }
    }

    // ─── Provider Sign-In ────────────────────────────────────────

    /// Sign in with a Google ID token credential.
    ///
    /// The credential itself is stored as the Google access token, valid
    /// until the token's own expiry.
    pub async fn sign_in_with_google_credential(&self, credential: &str) -> Result<User, AppError> {
        let identity = self.verifier.verify(credential).await.map_err(|e| match e {
            OidcError::Invalid(reason) => AppError::InvalidCredential(reason),
            OidcError::Transient(reason) => AppError::ProviderExchangeFailed {
                provider: Provider::Google,
                reason,
            },
        })?;

        let email = identity
            .email
            .as_deref()
            .map(normalize_email)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| AppError::InvalidCredential("credential has no email".to_string()))?;

        let now = Utc::now();
        let profile = ProviderProfile {
            provider: Provider::Google,
            subject: identity.subject.clone(),
            name: identity.name.clone().unwrap_or_else(|| email.clone()),
            email,
            picture: identity.picture.clone(),
        };
        let grant = TokenGrant {
            access_token: credential.trim().to_string(),
            refresh_token: None,
            expires_in: Some((identity.expires_at - now).num_seconds().max(0)),
            scopes: None,
        };

        self.resolve(profile, grant).await
    }

    /// Sign in with a GitHub authorization code.
    pub async fn sign_in_with_github_code(&self, code: &str) -> Result<User, AppError> {
        let (profile, grant) = self.github_profile(code).await?;
        self.resolve(profile, grant).await
    }

    /// Find or create the user for `profile`, then store its tokens.
    async fn resolve(&self, profile: ProviderProfile, grant: TokenGrant) -> Result<User, AppError> {
        let provider = profile.provider;
        let existing = self.db.find_user_by_email(&profile.email).await?;

        // Refuse before any write so a conflicting user is left untouched.
        if let Some(owner) = self.db.find_account_owner(provider, &profile.subject).await? {
            if existing.as_ref().map(|u| u.id.as_str()) != Some(owner.as_str()) {
                tracing::warn!(%provider, owner = %owner, "Provider account bound to another user");
                return Err(AppError::AccountAlreadyLinked { provider });
            }
        }

        let now = Utc::now();
        let user = match existing {
            Some(user) => {
                let user = reconcile(user, &profile, now);
                self.db.save_user(&user).await?;
                user
            }
            None => {
                let user = new_user(&profile, now);
                match self.db.create_user(&user).await {
                    Ok(()) => {
                        tracing::info!(user_id = %user.id, %provider, "Created user");
                        user
                    }
                    // Lost a race with a concurrent first sign-in.
                    Err(AppError::Conflict(_)) => {
                        let winner = self
                            .db
                            .find_user_by_email(&profile.email)
                            .await?
                            .ok_or_else(|| AppError::Database("user vanished after conflict".to_string()))?;
                        let user = reconcile(winner, &profile, now);
                        self.db.save_user(&user).await?;
                        user
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        // An ID-token credential must not displace a grant from the OAuth
        // connect flow.
        let keep_stored = grant.refresh_token.is_none()
            && self
                .tokens
                .has_refreshable_grant(&user.id, provider, &profile.subject)
                .await?;
        if keep_stored {
            tracing::debug!(user_id = %user.id, %provider, "Keeping stored refreshable grant");
        } else {
            self.tokens
                .store_grant(&user.id, provider, &profile.subject, &grant)
                .await?;
        }

        tracing::info!(user_id = %user.id, %provider, "User signed in");
        Ok(user)
    }

    async fn github_profile(&self, code: &str) -> Result<(ProviderProfile, TokenGrant), AppError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(AppError::InvalidCredential("missing GitHub code".to_string()));
        }

        let github = &self.providers.github;
        let grant = github
            .exchange_code(code)
            .await
            .map_err(|e| e.exchange_failed(Provider::Github))?;
        let gh_user = github
            .get_user(&grant.access_token)
            .await
            .map_err(|e| e.exchange_failed(Provider::Github))?;

        let email = match gh_user.email.filter(|e| !e.trim().is_empty()) {
            Some(email) => Some(email),
            None => github
                .get_primary_email(&grant.access_token)
                .await
                .map_err(|e| e.exchange_failed(Provider::Github))?,
        };
        let email = email
            .map(|e| normalize_email(&e))
            .ok_or_else(|| AppError::InvalidCredential("GitHub account has no primary email".to_string()))?;

        let profile = ProviderProfile {
            provider: Provider::Github,
            subject: gh_user.id.to_string(),
            email,
            name: gh_user.name.filter(|n| !n.is_empty()).unwrap_or(gh_user.login),
            picture: gh_user.avatar_url,
        };
        Ok((profile, grant))
    }

    // ─── Connecting Providers To A Known User ────────────────────

    /// Complete the Google connect flow for `user_id`.
    pub async fn connect_google(&self, user_id: &str, code: &str) -> Result<User, AppError> {
        let google = &self.providers.google;
        let grant = google
            .exchange_code(code, &self.google_redirect_uri)
            .await
            .map_err(|e| e.exchange_failed(Provider::Google))?;
        let info = google
            .userinfo(&grant.access_token)
            .await
            .map_err(|e| e.exchange_failed(Provider::Google))?;

        self.link(user_id, Provider::Google, &info.sub, &grant).await
    }

    /// Connect GitHub to `user_id` with an authorization code.
    pub async fn connect_github(&self, user_id: &str, code: &str) -> Result<User, AppError> {
        let (profile, grant) = self.github_profile(code).await?;
        self.link(user_id, Provider::Github, &profile.subject, &grant)
            .await
    }

    /// Connect Dropbox to `user_id` with tokens obtained by the frontend.
    pub async fn connect_dropbox(&self, user_id: &str, grant: TokenGrant) -> Result<User, AppError> {
        if grant.access_token.trim().is_empty() {
            return Err(AppError::InvalidCredential("missing Dropbox access token".to_string()));
        }
        let account = self
            .providers
            .dropbox
            .get_current_account(&grant.access_token)
            .await
            .map_err(|e| e.exchange_failed(Provider::Dropbox))?;

        self.link(user_id, Provider::Dropbox, &account.account_id, &grant)
            .await
    }

    async fn link(
        &self,
        user_id: &str,
        provider: Provider,
        subject: &str,
        grant: &TokenGrant,
    ) -> Result<User, AppError> {
        let user = self
            .db
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))?;

        // The store refuses accounts bound elsewhere before writing anything.
        self.tokens.store_grant(user_id, provider, subject, grant).await?;

        let user = attach_provider(user, provider, subject, Utc::now());
        self.db.save_user(&user).await?;

        tracing::info!(user_id, %provider, "Provider connected");
        Ok(user)
    }

    // ─── Local Accounts ──────────────────────────────────────────

    pub async fn register_local(&self, name: &str, email: &str, password: &str) -> Result<User, AppError> {
        let name = name.trim();
        let email = normalize_email(email);
        if name.is_empty() {
            return Err(AppError::BadRequest("name is required".to_string()));
        }
        if !email.contains('@') {
            return Err(AppError::BadRequest("a valid email is required".to_string()));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(AppError::BadRequest(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        if self.db.find_user_by_email(&email).await?.is_some() {
            return Err(AppError::Conflict(format!("User with email {} already exists", email)));
        }

        let password = password.to_string();
        let cost = self.bcrypt_cost;
        let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("hash task failed: {}", e)))?
            .map_err(|e| AppError::Internal(anyhow::anyhow!("bcrypt failed: {}", e)))?;

        let now = Utc::now();
        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            email,
            google_id: None,
            github_id: None,
            dropbox_id: None,
            picture: None,
            password_hash: Some(hash),
            auth_methods: vec![AuthMethod::Local],
            is_active: true,
            last_login: now,
            projects: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.db.create_user(&user).await?;

        tracing::info!(user_id = %user.id, "Registered local user");
        Ok(user)
    }

    pub async fn login_local(&self, email: &str, password: &str) -> Result<User, AppError> {
        let invalid = || AppError::InvalidCredential("invalid email or password".to_string());

        let mut user = self
            .db
            .find_user_by_email(&normalize_email(email))
            .await?
            .ok_or_else(invalid)?;
        let hash = user.password_hash.clone().ok_or_else(invalid)?;

        let password = password.to_string();
        let valid = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("verify task failed: {}", e)))?
            .unwrap_or(false);
        if !valid {
            return Err(invalid());
        }

        user.last_login = Utc::now();
        self.db.save_user(&user).await?;
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(provider: Provider, subject: &str, picture: Option<&str>) -> ProviderProfile {
        ProviderProfile {
            provider,
            subject: subject.to_string(),
            email: "alice@example.com".to_string(),
            name: "Alice".to_string(),
            picture: picture.map(String::from),
        }
    }

    #[test]
    fn new_user_carries_single_auth_method() {
        let user = new_user(&profile(Provider::Google, "g1", None), Utc::now());
        assert_eq!(user.auth_methods, vec![AuthMethod::Google]);
        assert_eq!(user.google_id.as_deref(), Some("g1"));
        assert!(user.github_id.is_none());
    }

    #[test]
    fn reconcile_appends_provider() {
        let user = new_user(&profile(Provider::Google, "g1", None), Utc::now());
        let user = reconcile(user, &profile(Provider::Github, "42", None), Utc::now());
        assert_eq!(user.auth_methods, vec![AuthMethod::Google, AuthMethod::Github]);
        assert_eq!(user.provider_id(Provider::Github), Some("42"));
        assert_eq!(user.provider_id(Provider::Google), Some("g1"));
    }

    #[test]
    fn reconcile_never_clobbers() {
        let user = new_user(&profile(Provider::Google, "g1", Some("old.png")), Utc::now());
        let mut incoming = profile(Provider::Google, "g2", Some("new.png"));
        incoming.name = "Someone Else".to_string();

        let user = reconcile(user, &incoming, Utc::now());
        assert_eq!(user.picture.as_deref(), Some("old.png"));
        assert_eq!(user.google_id.as_deref(), Some("g1"));
        assert_eq!(user.name, "Alice");
        assert_eq!(user.auth_methods, vec![AuthMethod::Google]);
    }

    #[test]
    fn reconcile_backfills_missing_picture() {
        let user = new_user(&profile(Provider::Google, "g1", None), Utc::now());
        let user = reconcile(user, &profile(Provider::Github, "42", Some("gh.png")), Utc::now());
        assert_eq!(user.picture.as_deref(), Some("gh.png"));
    }
}
