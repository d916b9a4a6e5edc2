// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Dropbox routes: connection, tracked files, Paper docs and webhooks.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::middleware::AuthUser;
use crate::models::{Change, FileLink, TrackedFile};
use crate::routes::UserEnvelope;
use crate::services::{TokenGrant, WebhookEntry};
use crate::AppState;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_HEADER: &str = "x-dropbox-signature";

/// Session-protected Dropbox routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/dropbox/connect", post(connect))
        .route("/dropbox/files", get(list_files).post(link_file))
        .route("/dropbox/files/{file_id}/changes", get(file_changes))
        .route("/dropbox/files/{file_id}/changes/read", post(mark_read))
        .route("/dropbox/paper", post(link_paper))
        .route("/dropbox/paper/{paper_doc_id}/changes", get(paper_changes))
}

/// Webhook routes, authenticated by the Dropbox signature instead of a session.
pub fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/dropbox/webhook", get(webhook_challenge).post(file_webhook))
        .route("/dropbox/paper/webhook", get(webhook_challenge).post(paper_webhook))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperLinkRequest {
    project_id: String,
    paper_url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadRequest {
    change_ids: Vec<String>,
}

#[derive(Serialize)]
pub struct ChangesResponse {
    pub changes: Vec<Change>,
}

#[derive(Serialize)]
pub struct FileResponse {
    pub status: &'static str,
    pub file: TrackedFile,
}

#[derive(Serialize)]
pub struct FilesResponse {
    pub files: Vec<TrackedFile>,
}

#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Deserialize)]
struct ChallengeParams {
    challenge: String,
}

/// Webhook body: `{ "list_folder": { "entries": [...] } }`.
#[derive(Deserialize)]
struct WebhookBody {
    #[serde(default)]
    list_folder: ListFolder,
}

#[derive(Deserialize, Default)]
struct ListFolder {
    #[serde(default)]
    entries: Vec<WebhookEntry>,
}

async fn connect(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<ConnectRequest>,
) -> Result<Json<UserEnvelope>> {
    let grant = TokenGrant {
        access_token: body.access_token,
        refresh_token: body.refresh_token,
        expires_in: body.expires_in,
        scopes: None,
    };
    let user = state.identity.connect_dropbox(&auth.user_id, grant).await?;
    Ok(Json(UserEnvelope::new(user)))
}

async fn list_files(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<FilesResponse>> {
    let files = state.reconciler.list_files(&auth.user_id).await?;
    Ok(Json(FilesResponse { files }))
}

async fn link_file(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Json(link): Json<FileLink>,
) -> Result<Json<FileResponse>> {
    let file = state.reconciler.link_file(&auth.user_id, link).await?;
    Ok(Json(FileResponse {
        status: "success",
        file,
    }))
}

async fn file_changes(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(file_id): Path<String>,
) -> Result<Json<ChangesResponse>> {
    let changes = state
        .reconciler
        .unread_changes(&auth.user_id, &file_id)
        .await?;
    Ok(Json(ChangesResponse { changes }))
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(file_id): Path<String>,
    Json(body): Json<MarkReadRequest>,
) -> Result<Json<SuccessResponse>> {
    state
        .reconciler
        .mark_read(&auth.user_id, &file_id, &body.change_ids)
        .await?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn link_paper(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<PaperLinkRequest>,
) -> Result<Json<FileResponse>> {
    let file = state
        .reconciler
        .link_paper_doc(&auth.user_id, &body.project_id, &body.paper_url)
        .await?;
    Ok(Json(FileResponse {
        status: "success",
        file,
    }))
}

async fn paper_changes(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(paper_doc_id): Path<String>,
) -> Result<Json<ChangesResponse>> {
    let changes = state
        .reconciler
        .pull_paper_changes(&auth.user_id, &paper_doc_id)
        .await?;
    Ok(Json(ChangesResponse { changes }))
}

/// Endpoint verification: echo the challenge as plain text.
async fn webhook_challenge(Query(params): Query<ChallengeParams>) -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "text/plain"),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        ],
        params.challenge,
    )
}

async fn file_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SuccessResponse>> {
    let entries = verified_entries(&state, &headers, &body)?;
    tracing::info!(entries = entries.len(), "Dropbox webhook received");
    state.reconciler.process_file_webhook(&entries).await;
    Ok(Json(SuccessResponse { success: true }))
}

async fn paper_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SuccessResponse>> {
    let entries = verified_entries(&state, &headers, &body)?;
    tracing::info!(entries = entries.len(), "Dropbox Paper webhook received");
    state.reconciler.process_paper_webhook(&entries).await;
    Ok(Json(SuccessResponse { success: true }))
}

/// Check the signature, then parse the entry list.
fn verified_entries(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<Vec<WebhookEntry>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default();
    if !signature_matches(body, signature, state.config.dropbox.client_secret.as_bytes()) {
        tracing::warn!("Dropbox webhook signature mismatch");
        return Err(AppError::Forbidden);
    }

    let parsed: WebhookBody = serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("malformed webhook body: {}", e)))?;
    Ok(parsed.list_folder.entries)
}

/// Constant-time check of a hex HMAC-SHA256 signature over `body`.
pub fn signature_matches(body: &[u8], signature_hex: &str, secret: &[u8]) -> bool {
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}
