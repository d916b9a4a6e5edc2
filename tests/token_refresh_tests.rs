// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Refresh-before-use behaviour of the token manager.

use chrono::Utc;
use collab_sync::error::AppError;
use collab_sync::models::Provider;
use collab_sync::services::TokenGrant;
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, ResponseTemplate};

mod common;
use common::TestApp;

fn grant(access: &str, refresh: Option<&str>, expires_in: i64) -> TokenGrant {
    TokenGrant {
        access_token: access.to_string(),
        refresh_token: refresh.map(String::from),
        expires_in: Some(expires_in),
        scopes: None,
    }
}

async fn seed_dropbox(app: &TestApp, expires_in: i64) -> String {
    let user = app.seed_user("tokens@example.com").await;
    app.state
        .tokens
        .store_grant(
            &user.id,
            Provider::Dropbox,
            "dbid:AAA",
            &grant("old-access", Some("refresh-1"), expires_in),
        )
        .await
        .unwrap();
    user.id
}

#[tokio::test]
async fn expired_token_is_refreshed_exactly_once() {
    let app = TestApp::new().await;
    let user_id = seed_dropbox(&app, -60).await;
    let before = app
        .state
        .db
        .get_connection(&user_id)
        .await
        .unwrap()
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/dropbox/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "new-access",
            "token_type": "bearer",
            "expires_in": 14400
        })))
        .expect(1)
        .mount(&app.server)
        .await;

    let token = app
        .state
        .tokens
        .get_valid_access_token(&user_id, Provider::Dropbox)
        .await
        .unwrap();
    assert_eq!(token, "new-access");

    // Fresh now; no second refresh
    let token = app
        .state
        .tokens
        .get_valid_access_token(&user_id, Provider::Dropbox)
        .await
        .unwrap();
    assert_eq!(token, "new-access");

    let after = app
        .state
        .db
        .get_connection(&user_id)
        .await
        .unwrap()
        .unwrap();
    let link = after.dropbox.as_ref().unwrap();
    assert!(link.token_expiry.unwrap() > Utc::now() + chrono::Duration::hours(3));
    // Provider omitted a refresh token; the previous one is kept
    assert_eq!(
        link.refresh_token_encrypted,
        before.dropbox.as_ref().unwrap().refresh_token_encrypted
    );
}

#[tokio::test]
async fn unexpired_token_makes_no_refresh_call() {
    let app = TestApp::new().await;
    let user_id = seed_dropbox(&app, 3600).await;

    Mock::given(method("POST"))
        .and(path("/dropbox/oauth/token"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&app.server)
        .await;

    let token = app
        .state
        .tokens
        .get_valid_access_token(&user_id, Provider::Dropbox)
        .await
        .unwrap();
    assert_eq!(token, "old-access");
}

#[tokio::test]
async fn rejected_refresh_requires_reauthorization() {
    let app = TestApp::new().await;
    let user_id = seed_dropbox(&app, -60).await;

    Mock::given(method("POST"))
        .and(path("/dropbox/oauth/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant"
        })))
        .expect(1)
        .mount(&app.server)
        .await;

    let err = app
        .state
        .tokens
        .get_valid_access_token(&user_id, Provider::Dropbox)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::ReauthorizationRequired {
            provider: Provider::Dropbox
        }
    ));
}

#[tokio::test]
async fn provider_outage_is_retried_once_then_surfaced() {
    let app = TestApp::new().await;
    let user_id = seed_dropbox(&app, -60).await;

    Mock::given(method("POST"))
        .and(path("/dropbox/oauth/token"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&app.server)
        .await;

    let err = app
        .state
        .tokens
        .get_valid_access_token(&user_id, Provider::Dropbox)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ProviderApi { .. }), "{err:?}");
}

#[tokio::test]
async fn expired_github_token_requires_reauthorization() {
    let app = TestApp::new().await;
    let user = app.seed_user("gh@example.com").await;
    app.state
        .tokens
        .store_grant(&user.id, Provider::Github, "42", &grant("gh", Some("r"), -1))
        .await
        .unwrap();

    let err = app
        .state
        .tokens
        .get_valid_access_token(&user.id, Provider::Github)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ReauthorizationRequired { .. }));
}

#[tokio::test]
async fn github_token_without_lifetime_never_expires() {
    let app = TestApp::new().await;
    let user = app.seed_user("gh-forever@example.com").await;
    let no_lifetime = TokenGrant {
        access_token: "gho_live".to_string(),
        refresh_token: None,
        expires_in: None,
        scopes: None,
    };
    app.state
        .tokens
        .store_grant(&user.id, Provider::Github, "77", &no_lifetime)
        .await
        .unwrap();

    let conn = app.state.db.get_connection(&user.id).await.unwrap().unwrap();
    assert!(conn.github.unwrap().token_expiry.is_none());

    let token = app
        .state
        .tokens
        .get_valid_access_token(&user.id, Provider::Github)
        .await
        .unwrap();
    assert_eq!(token, "gho_live");
}

#[tokio::test]
async fn missing_connection_is_not_found() {
    let app = TestApp::new().await;
    let user = app.seed_user("none@example.com").await;
    let err = app
        .state
        .tokens
        .get_valid_access_token(&user.id, Provider::Google)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}
