// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Dropbox account, file metadata and Paper client.

use crate::config::{Config, ProviderCredentials, ProviderEndpoints};
use crate::services::http::{ProviderError, ProviderHttp, TokenGrant, TokenResponse};
use chrono::{DateTime, Utc};
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct DropboxName {
    pub display_name: String,
}

/// Result of `users/get_current_account`.
#[derive(Debug, Clone, Deserialize)]
pub struct DropboxAccount {
    pub account_id: String,
    pub email: Option<String>,
    pub name: DropboxName,
    pub profile_photo_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SharingInfo {
    pub modified_by: Option<String>,
}

/// Subset of `files/get_metadata`.
#[derive(Debug, Clone, Deserialize)]
pub struct FileMetadata {
    pub name: Option<String>,
    pub server_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sharing_info: Option<SharingInfo>,
}

/// Subset of `paper/docs/get_metadata`.
#[derive(Debug, Clone, Deserialize)]
pub struct PaperMetadata {
    pub title: String,
    pub last_updated_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaperAuthor {
    pub display_name: String,
}

/// A Paper comment or suggestion.
#[derive(Debug, Clone, Deserialize)]
pub struct PaperItem {
    pub id: String,
    pub author: PaperAuthor,
    #[serde(default)]
    pub message: String,
    pub created_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct CommentList {
    #[serde(default)]
    comments: Vec<PaperItem>,
}

#[derive(Debug, Deserialize)]
struct SuggestionList {
    #[serde(default)]
    suggestions: Vec<PaperItem>,
}

#[derive(Serialize)]
struct DocRequest<'a> {
    doc_id: &'a str,
}

#[derive(Clone)]
pub struct DropboxClient {
    http: ProviderHttp,
    endpoints: ProviderEndpoints,
    credentials: ProviderCredentials,
}

impl DropboxClient {
    pub fn new(http: ProviderHttp, config: &Config) -> Self {
        Self {
            http,
            endpoints: config.endpoints.clone(),
            credentials: config.dropbox.clone(),
        }
    }

    /// Refresh an expired access token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, ProviderError> {
        let request = self
            .http
            .client()
            .post(format!("{}/token", self.endpoints.dropbox_oauth))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
            ]);
        let response: TokenResponse = self.http.send_json(request).await?;
        response.into_grant()
    }

    pub async fn get_current_account(
        &self,
        access_token: &str,
    ) -> Result<DropboxAccount, ProviderError> {
        let request = self
            .http
            .client()
            .post(format!(
                "{}/2/users/get_current_account",
                self.endpoints.dropbox_api
            ))
            .bearer_auth(access_token)
            .header(CONTENT_TYPE, "application/json")
            .body("null");
        self.http.send_json(request).await
    }

    pub async fn get_metadata(
        &self,
        access_token: &str,
        path: &str,
    ) -> Result<FileMetadata, ProviderError> {
        self.rpc(
            "files/get_metadata",
            access_token,
            &serde_json::json!({ "path": path, "include_media_info": true }),
        )
        .await
    }

    pub async fn paper_metadata(
        &self,
        access_token: &str,
        doc_id: &str,
    ) -> Result<PaperMetadata, ProviderError> {
        self.rpc("paper/docs/get_metadata", access_token, &DocRequest { doc_id })
            .await
    }

    pub async fn paper_comments(
        &self,
        access_token: &str,
        doc_id: &str,
    ) -> Result<Vec<PaperItem>, ProviderError> {
        let list: CommentList = self
            .rpc("paper/docs/comments/list", access_token, &DocRequest { doc_id })
            .await?;
        Ok(list.comments)
    }

    pub async fn paper_suggestions(
        &self,
        access_token: &str,
        doc_id: &str,
    ) -> Result<Vec<PaperItem>, ProviderError> {
        let list: SuggestionList = self
            .rpc(
                "paper/docs/suggestions/list",
                access_token,
                &DocRequest { doc_id },
            )
            .await?;
        Ok(list.suggestions)
    }

    /// POST a JSON argument to an RPC-style endpoint.
    async fn rpc<B: Serialize + ?Sized, T: for<'de> Deserialize<'de>>(
        &self,
        route: &str,
        access_token: &str,
        body: &B,
    ) -> Result<T, ProviderError> {
        let request = self
            .http
            .client()
            .post(format!("{}/2/{}", self.endpoints.dropbox_api, route))
            .bearer_auth(access_token)
            .json(body);
        self.http.send_json(request).await
    }
}
