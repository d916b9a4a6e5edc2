// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared outbound HTTP plumbing for provider clients.
//!
//! Every call has a bounded timeout. Transport failures, 429 and 5xx
//! responses are retried once after a fixed backoff.

use crate::config::Config;
use crate::error::AppError;
use crate::models::Provider;
use crate::services::{DropboxClient, GithubClient, GoogleClient};
use chrono::{DateTime, Utc};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

const USER_AGENT: &str = concat!("collab-sync/", env!("CARGO_PKG_VERSION"));

/// Failure of a single provider call.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("invalid response body: {0}")]
    Decode(String),

    #[error("response missing field: {0}")]
    MissingField(&'static str),
}

impl ProviderError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ProviderError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Translate a failure during token exchange or sign-in profile fetch.
    pub fn exchange_failed(self, provider: Provider) -> AppError {
        AppError::ProviderExchangeFailed {
            provider,
            reason: self.to_string(),
        }
    }

    /// Translate a failure during a data call made with a stored token.
    pub fn api_failed(self, provider: Provider) -> AppError {
        match self.status() {
            Some(StatusCode::UNAUTHORIZED) => AppError::ReauthorizationRequired { provider },
            _ => AppError::ProviderApi {
                provider,
                reason: self.to_string(),
            },
        }
    }
}

/// reqwest client with the timeout and retry policy applied.
#[derive(Clone)]
pub struct ProviderHttp {
    client: reqwest::Client,
    retry_backoff: Duration,
}

impl ProviderHttp {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.provider_timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            retry_backoff: config.provider_retry_backoff,
        })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Send a request, retrying once on a transient failure.
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, ProviderError> {
        let retry = request.try_clone();

        match Self::attempt(request).await {
            Err(e) if is_transient(&e) => {
                let Some(retry) = retry else {
                    return Err(e);
                };
                tracing::warn!(error = %e, "Transient provider failure, retrying once");
                tokio::time::sleep(self.retry_backoff).await;
                Self::attempt(retry).await
            }
            other => other,
        }
    }

    /// Send and decode a JSON response body.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ProviderError> {
        let response = self.send(request).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ProviderError::Decode(e.to_string()))
    }

    async fn attempt(request: RequestBuilder) -> Result<Response, ProviderError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!("Provider rate limit hit (429)");
        }

        let body = response.text().await.unwrap_or_default();
        Err(ProviderError::Status { status, body })
    }
}

/// Tokens returned by an authorization-code exchange or a refresh.
#[derive(Debug, Clone, Default)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Lifetime in seconds as reported by the provider
    pub expires_in: Option<i64>,
    pub scopes: Option<Vec<String>>,
}

/// Lifetime assumed when a provider does not report one.
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

impl TokenGrant {
    pub fn expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + chrono::Duration::seconds(self.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS))
    }
}

/// Raw OAuth token endpoint response shared by all three providers.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    scope: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl TokenResponse {
    /// Validate and convert. GitHub reports failures with a 200 and an
    /// `error` field, so that is checked before the token.
    pub(crate) fn into_grant(self) -> Result<TokenGrant, ProviderError> {
        if let Some(error) = self.error {
            return Err(ProviderError::Status {
                status: StatusCode::BAD_REQUEST,
                body: self.error_description.unwrap_or(error),
            });
        }
        let access_token = self
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or(ProviderError::MissingField("access_token"))?;
        Ok(TokenGrant {
            access_token,
            refresh_token: self.refresh_token.filter(|t| !t.is_empty()),
            expires_in: self.expires_in,
            scopes: self.scope.map(|s| {
                s.split([' ', ','])
                    .filter(|p| !p.is_empty())
                    .map(String::from)
                    .collect()
            }),
        })
    }
}

/// The three provider API clients, sharing one HTTP client.
#[derive(Clone)]
pub struct ProviderClients {
    pub google: GoogleClient,
    pub github: GithubClient,
    pub dropbox: DropboxClient,
}

impl ProviderClients {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http = ProviderHttp::new(config)?;
        Ok(Self {
            google: GoogleClient::new(http.clone(), config),
            github: GithubClient::new(http.clone(), config),
            dropbox: DropboxClient::new(http, config),
        })
    }
}

fn is_transient(err: &ProviderError) -> bool {
    match err {
        ProviderError::Transport(e) => e.is_timeout() || e.is_connect(),
        ProviderError::Status { status, .. } => {
            *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
        }
        _ => false,
    }
}
