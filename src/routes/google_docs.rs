// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google Docs change pull.

use axum::{
    extract::{Query, State},
    routing::get,
    Extension, Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::middleware::AuthUser;
use crate::services::DocChanges;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/googledoc/doc-changes", get(doc_changes))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocChangesParams {
    #[serde(default)]
    doc_url: Option<String>,
}

async fn doc_changes(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Query(params): Query<DocChangesParams>,
) -> Result<Json<DocChanges>> {
    let doc_url = params
        .doc_url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("docUrl is required".to_string()))?;

    let changes = state
        .reconciler
        .google_doc_changes(&auth.user_id, &doc_url)
        .await?;
    Ok(Json(changes))
}
