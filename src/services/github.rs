// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! GitHub OAuth and REST client.

use crate::config::{Config, ProviderCredentials, ProviderEndpoints};
use crate::services::http::{ProviderError, ProviderHttp, TokenGrant, TokenResponse};
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::Value;

const GITHUB_JSON: &str = "application/vnd.github+json";

/// Authenticated user profile.
#[derive(Debug, Clone, Deserialize)]
pub struct GithubUser {
    pub id: u64,
    pub login: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubEmail {
    pub email: String,
    #[serde(default)]
    pub primary: bool,
}

#[derive(Clone)]
pub struct GithubClient {
    http: ProviderHttp,
    endpoints: ProviderEndpoints,
    credentials: ProviderCredentials,
}

impl GithubClient {
    pub fn new(http: ProviderHttp, config: &Config) -> Self {
        Self {
            http,
            endpoints: config.endpoints.clone(),
            credentials: config.github.clone(),
        }
    }

    /// Exchange an authorization code for an access token.
    ///
    /// GitHub OAuth app tokens carry no expiry and no refresh token.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenGrant, ProviderError> {
        let request = self
            .http
            .client()
            .post(format!("{}/access_token", self.endpoints.github_oauth))
            .header(ACCEPT, "application/json")
            .json(&serde_json::json!({
                "client_id": self.credentials.client_id,
                "client_secret": self.credentials.client_secret,
                "code": code,
            }));
        let response: TokenResponse = self.http.send_json(request).await?;
        response.into_grant()
    }

    pub async fn get_user(&self, access_token: &str) -> Result<GithubUser, ProviderError> {
        self.get_json(&format!("{}/user", self.endpoints.github_api), access_token, &[])
            .await
    }

    /// Primary e-mail, for accounts whose profile e-mail is private.
    pub async fn get_primary_email(
        &self,
        access_token: &str,
    ) -> Result<Option<String>, ProviderError> {
        let emails: Vec<GithubEmail> = self
            .get_json(
                &format!("{}/user/emails", self.endpoints.github_api),
                access_token,
                &[],
            )
            .await?;
        Ok(emails.into_iter().find(|e| e.primary).map(|e| e.email))
    }

    pub async fn list_commits(
        &self,
        access_token: &str,
        owner: &str,
        repo: &str,
    ) -> Result<Value, ProviderError> {
        let url = format!(
            "{}/repos/{}/{}/commits",
            self.endpoints.github_api,
            urlencoding::encode(owner),
            urlencoding::encode(repo)
        );
        self.get_json(&url, access_token, &[]).await
    }

    pub async fn list_pulls(
        &self,
        access_token: &str,
        owner: &str,
        repo: &str,
    ) -> Result<Value, ProviderError> {
        let url = format!(
            "{}/repos/{}/{}/pulls",
            self.endpoints.github_api,
            urlencoding::encode(owner),
            urlencoding::encode(repo)
        );
        self.get_json(&url, access_token, &[("state", "all")]).await
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        access_token: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ProviderError> {
        let request = self
            .http
            .client()
            .get(url)
            .query(query)
            .header(ACCEPT, GITHUB_JSON)
            .bearer_auth(access_token);
        self.http.send_json(request).await
    }
}
