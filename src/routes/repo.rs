// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! GitHub repository activity, fetched with the session user's GitHub token.

use axum::{
    extract::{Path, State},
    routing::get,
    Extension, Json, Router,
};
use serde_json::Value;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::middleware::AuthUser;
use crate::models::Provider;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/repo/{owner}/{repo}/commits", get(commits))
        .route("/repo/{owner}/{repo}/pulls", get(pulls))
}

fn valid_segment(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

async fn github_token(state: &AppState, user_id: &str, owner: &str, repo: &str) -> Result<String> {
    if !valid_segment(owner) || !valid_segment(repo) {
        return Err(AppError::ReferenceInvalid(format!("{}/{}", owner, repo)));
    }
    state
        .tokens
        .get_valid_access_token(user_id, Provider::Github)
        .await
}

async fn commits(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path((owner, repo)): Path<(String, String)>,
) -> Result<Json<Value>> {
    let token = github_token(&state, &auth.user_id, &owner, &repo).await?;
    let commits = state
        .providers
        .github
        .list_commits(&token, &owner, &repo)
        .await
        .map_err(|e| e.api_failed(Provider::Github))?;
    Ok(Json(commits))
}

async fn pulls(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path((owner, repo)): Path<(String, String)>,
) -> Result<Json<Value>> {
    let token = github_token(&state, &auth.user_id, &owner, &repo).await?;
    let pulls = state
        .providers
        .github
        .list_pulls(&token, &owner, &repo)
        .await
        .map_err(|e| e.api_failed(Provider::Github))?;
    Ok(Json(pulls))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_segments() {
        assert!(valid_segment("rust-lang"));
        assert!(valid_segment("serde_json.rs"));
        assert!(!valid_segment(""));
        assert!(!valid_segment("a/b"));
        assert!(!valid_segment("a b"));
    }
}
