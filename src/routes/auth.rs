// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sign-in routes: Google credential, GitHub code, local password.

use axum::{extract::State, routing::post, Json, Router};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::middleware::auth::{create_jwt, removal_cookie, session_cookie};
use crate::models::{PublicUser, User};
use crate::routes::UserData;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/google", post(google_sign_in))
        .route("/auth/github", post(github_sign_in))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
}

/// Session issued on successful sign-in.
#[derive(Serialize)]
pub struct SessionResponse {
    pub status: &'static str,
    pub token: String,
    pub data: UserData,
}

/// Missing fields deserialize as empty and are rejected by the handler.
#[derive(Deserialize)]
pub struct GoogleSignIn {
    #[serde(default, alias = "token")]
    credential: String,
}

#[derive(Deserialize)]
pub struct GithubSignIn {
    #[serde(default)]
    code: String,
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    name: String,
    email: String,
    password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    email: String,
    password: String,
}

/// Issue the session token and cookie for `user`.
fn start_session(
    state: &AppState,
    jar: CookieJar,
    user: User,
) -> Result<(CookieJar, Json<SessionResponse>)> {
    let token = create_jwt(
        &user.id,
        &state.config.jwt_signing_key,
        state.config.jwt_ttl_secs,
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT creation failed: {}", e)))?;

    tracing::info!(user_id = %user.id, "Session issued");

    let jar = jar.add(session_cookie(token.clone(), &state.config));
    Ok((
        jar,
        Json(SessionResponse {
            status: "success",
            token,
            data: UserData {
                user: PublicUser::from(user),
            },
        }),
    ))
}

async fn google_sign_in(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(body): Json<GoogleSignIn>,
) -> Result<(CookieJar, Json<SessionResponse>)> {
    if body.credential.trim().is_empty() {
        return Err(AppError::InvalidCredential("missing Google credential".to_string()));
    }
    let user = state
        .identity
        .sign_in_with_google_credential(&body.credential)
        .await?;
    start_session(&state, jar, user)
}

async fn github_sign_in(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(body): Json<GithubSignIn>,
) -> Result<(CookieJar, Json<SessionResponse>)> {
    if body.code.trim().is_empty() {
        return Err(AppError::InvalidCredential("missing GitHub code".to_string()));
    }
    let user = state.identity.sign_in_with_github_code(&body.code).await?;
    start_session(&state, jar, user)
}

async fn register(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(body): Json<RegisterRequest>,
) -> Result<(CookieJar, Json<SessionResponse>)> {
    let user = state
        .identity
        .register_local(&body.name, &body.email, &body.password)
        .await?;
    start_session(&state, jar, user)
}

async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> Result<(CookieJar, Json<SessionResponse>)> {
    let user = state.identity.login_local(&body.email, &body.password).await?;
    start_session(&state, jar, user)
}

async fn logout(jar: CookieJar) -> (CookieJar, Json<serde_json::Value>) {
    (
        jar.remove(removal_cookie()),
        Json(serde_json::json!({ "status": "success" })),
    )
}
