// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google OAuth, userinfo, Docs and Drive Activity client.

use crate::config::{Config, ProviderCredentials, ProviderEndpoints};
use crate::services::http::{ProviderError, ProviderHttp, TokenGrant, TokenResponse};
use serde::Deserialize;
use serde_json::Value;

/// Scopes requested by the connect flow.
pub const CONNECT_SCOPES: &[&str] = &[
    "openid",
    "email",
    "profile",
    "https://www.googleapis.com/auth/documents.readonly",
    "https://www.googleapis.com/auth/drive.activity.readonly",
];

/// Profile returned by the userinfo endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleUserInfo {
    pub sub: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
}

#[derive(Clone)]
pub struct GoogleClient {
    http: ProviderHttp,
    endpoints: ProviderEndpoints,
    credentials: ProviderCredentials,
}

impl GoogleClient {
    pub fn new(http: ProviderHttp, config: &Config) -> Self {
        Self {
            http,
            endpoints: config.endpoints.clone(),
            credentials: config.google.clone(),
        }
    }

    /// Consent page URL for the connect flow.
    pub fn authorization_url(&self, redirect_uri: &str, state: &str) -> String {
        let scope = CONNECT_SCOPES.join(" ");
        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("scope", scope.as_str()),
            ("access_type", "offline"),
            ("prompt", "consent"),
            ("state", state),
        ];
        match reqwest::Url::parse_with_params(&self.endpoints.google_auth, &params) {
            Ok(url) => url.to_string(),
            Err(_) => self.endpoints.google_auth.clone(),
        }
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenGrant, ProviderError> {
        let request = self
            .http
            .client()
            .post(format!("{}/token", self.endpoints.google_oauth))
            .form(&[
                ("code", code),
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("redirect_uri", redirect_uri),
                ("grant_type", "authorization_code"),
            ]);
        let response: TokenResponse = self.http.send_json(request).await?;
        response.into_grant()
    }

    /// Refresh an expired access token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, ProviderError> {
        let request = self
            .http
            .client()
            .post(format!("{}/token", self.endpoints.google_oauth))
            .form(&[
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ]);
        let response: TokenResponse = self.http.send_json(request).await?;
        response.into_grant()
    }

    pub async fn userinfo(&self, access_token: &str) -> Result<GoogleUserInfo, ProviderError> {
        let request = self
            .http
            .client()
            .get(&self.endpoints.google_userinfo)
            .bearer_auth(access_token);
        self.http.send_json(request).await
    }

    /// Fetch a document with suggestions rendered inline.
    pub async fn get_document(
        &self,
        access_token: &str,
        doc_id: &str,
    ) -> Result<Value, ProviderError> {
        let request = self
            .http
            .client()
            .get(format!(
                "{}/v1/documents/{}",
                self.endpoints.google_docs,
                urlencoding::encode(doc_id)
            ))
            .query(&[("suggestionsViewMode", "SUGGESTIONS_INLINE")])
            .bearer_auth(access_token);
        self.http.send_json(request).await
    }

    /// Query recent Drive activity for a document.
    pub async fn query_activity(
        &self,
        access_token: &str,
        doc_id: &str,
    ) -> Result<Value, ProviderError> {
        let request = self
            .http
            .client()
            .post(format!(
                "{}/v2/activity:query",
                self.endpoints.google_drive_activity
            ))
            .bearer_auth(access_token)
            .json(&serde_json::json!({
                "ancestorName": format!("items/{}", doc_id),
                "pageSize": 10,
            }));
        self.http.send_json(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorization_url_requests_offline_access() {
        let config = Config::test_default("http://mock");
        let http = ProviderHttp::new(&config).unwrap();
        let client = GoogleClient::new(http, &config);

        let url = client.authorization_url("http://localhost:8080/cb", "abc");
        let parsed = reqwest::Url::parse(&url).unwrap();
        let params: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();

        assert_eq!(params["access_type"], "offline");
        assert_eq!(params["state"], "abc");
        assert_eq!(params["client_id"], "google_client_id");
        assert!(params["scope"].contains("documents.readonly"));
    }
}
