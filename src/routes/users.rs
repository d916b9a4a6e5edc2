// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User routes: profile, connection status and provider connect flows.

use axum::{
    extract::{Path, Query, State},
    response::Redirect,
    routing::{get, post},
    Extension, Json, Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::middleware::AuthUser;
use crate::models::ConnectionStatus;
use crate::routes::{parse_user_id, UserEnvelope};
use crate::AppState;

type HmacSha256 = Hmac<Sha256>;

/// Connect-flow state older than this is refused.
const STATE_MAX_AGE_SECS: i64 = 15 * 60;

/// Session-protected user routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users/me", get(me))
        .route("/users/{user_id}/connections", get(connections))
        .route(
            "/users/{user_id}/connect/google",
            get(connect_google_start).post(connect_google_code),
        )
        .route("/users/{user_id}/connect/github", post(connect_github))
}

/// Routes reached by provider redirects (no session).
pub fn public_routes() -> Router<Arc<AppState>> {
    Router::new().route("/users/oauth2callback", get(oauth2_callback))
}

#[derive(Serialize)]
pub struct ConnectionsResponse {
    pub connections: ConnectionStatus,
}

#[derive(Deserialize)]
pub struct CodeBody {
    code: String,
}

#[derive(Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

async fn me(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<UserEnvelope>> {
    let user = state
        .db
        .get_user(&auth.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User".to_string()))?;
    Ok(Json(UserEnvelope::new(user)))
}

async fn connections(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(user_id): Path<String>,
) -> Result<Json<ConnectionsResponse>> {
    let user_id = parse_user_id(&user_id)?;
    auth.ensure_is(&user_id)?;

    let connections = state
        .db
        .get_connection(&user_id)
        .await?
        .map(|c| c.status())
        .unwrap_or_default();
    Ok(Json(ConnectionsResponse { connections }))
}

/// Redirect to Google's consent page; the callback finishes the connect.
async fn connect_google_start(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(user_id): Path<String>,
) -> Result<Redirect> {
    let user_id = parse_user_id(&user_id)?;
    auth.ensure_is(&user_id)?;

    let oauth_state = sign_state(&user_id, Utc::now().timestamp(), &state.config.oauth_state_key)?;
    let url = state
        .providers
        .google
        .authorization_url(&state.config.google_redirect_uri(), &oauth_state);

    tracing::info!(user_id = %user_id, "Starting Google connect flow");
    Ok(Redirect::temporary(&url))
}

/// Connect Google with an authorization code supplied directly.
async fn connect_google_code(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(user_id): Path<String>,
    Json(body): Json<CodeBody>,
) -> Result<Json<UserEnvelope>> {
    let user_id = parse_user_id(&user_id)?;
    auth.ensure_is(&user_id)?;
    let user = state.identity.connect_google(&user_id, &body.code).await?;
    Ok(Json(UserEnvelope::new(user)))
}

async fn connect_github(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(user_id): Path<String>,
    Json(body): Json<CodeBody>,
) -> Result<Json<UserEnvelope>> {
    let user_id = parse_user_id(&user_id)?;
    auth.ensure_is(&user_id)?;
    if body.code.trim().is_empty() {
        return Err(AppError::InvalidCredential("missing GitHub code".to_string()));
    }
    let user = state.identity.connect_github(&user_id, &body.code).await?;
    Ok(Json(UserEnvelope::new(user)))
}

/// Google redirect target. Always answers with a redirect to the frontend.
async fn oauth2_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Redirect {
    let settings = format!("{}/settings", state.config.frontend_url.trim_end_matches('/'));
    let fail = |reason: &str| {
        Redirect::temporary(&format!("{}?error={}", settings, urlencoding::encode(reason)))
    };

    if let Some(error) = params.error {
        tracing::warn!(error = %error, "Google connect denied");
        return fail(&error);
    }
    let Some(user_id) = params.state.as_deref().and_then(|s| {
        verify_state(s, &state.config.oauth_state_key, Utc::now().timestamp())
    }) else {
        tracing::warn!("Invalid or expired connect state");
        return fail("invalid_state");
    };
    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        return fail("missing_code");
    };

    match state.identity.connect_google(&user_id, &code).await {
        Ok(_) => Redirect::temporary(&format!("{}?google_connected=true", settings)),
        Err(e) => {
            tracing::warn!(user_id = %user_id, error = %e, "Google connect failed");
            fail(e.code())
        }
    }
}

/// Sign `user_id|timestamp_hex` and encode it for the `state` parameter.
fn sign_state(user_id: &str, issued_at: i64, secret: &[u8]) -> Result<String> {
    let payload = format!("{}|{:x}", user_id, issued_at);
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(payload.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());
    Ok(URL_SAFE_NO_PAD.encode(format!("{}|{}", payload, signature)))
}

/// Verify the signature and age of a connect `state`, returning the user id.
fn verify_state(state: &str, secret: &[u8], now: i64) -> Option<String> {
    let decoded = String::from_utf8(URL_SAFE_NO_PAD.decode(state).ok()?).ok()?;
    let mut parts = decoded.splitn(3, '|');
    let (user_id, issued_hex, signature_hex) = (parts.next()?, parts.next()?, parts.next()?);

    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(format!("{}|{}", user_id, issued_hex).as_bytes());
    if mac.verify_slice(&hex::decode(signature_hex).ok()?).is_err() {
        tracing::error!("Connect state signature mismatch");
        return None;
    }

    let issued_at = i64::from_str_radix(issued_hex, 16).ok()?;
    let age = now - issued_at;
    if !(0..=STATE_MAX_AGE_SECS).contains(&age) {
        return None;
    }
    Some(user_id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"secret_key";

    #[test]
    fn state_round_trip() {
        let state = sign_state("user-1", 1_000, SECRET).unwrap();
        assert_eq!(verify_state(&state, SECRET, 1_060), Some("user-1".to_string()));
    }

    #[test]
    fn state_rejects_wrong_secret() {
        let state = sign_state("user-1", 1_000, SECRET).unwrap();
        assert_eq!(verify_state(&state, b"wrong_key", 1_000), None);
    }

    #[test]
    fn state_rejects_tampered_user() {
        let state = sign_state("user-1", 1_000, SECRET).unwrap();
        let decoded = String::from_utf8(URL_SAFE_NO_PAD.decode(&state).unwrap()).unwrap();
        let forged = URL_SAFE_NO_PAD.encode(decoded.replacen("user-1", "user-2", 1));
        assert_eq!(verify_state(&forged, SECRET, 1_000), None);
    }

    #[test]
    fn state_expires() {
        let state = sign_state("user-1", 1_000, SECRET).unwrap();
        assert_eq!(verify_state(&state, SECRET, 1_000 + STATE_MAX_AGE_SECS + 1), None);
    }

    #[test]
    fn state_rejects_malformed() {
        let encoded = URL_SAFE_NO_PAD.encode("invalid|format");
        assert_eq!(verify_state(&encoded, SECRET, 0), None);
        assert_eq!(verify_state("%%%", SECRET, 0), None);
    }
}
