// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use chrono::Utc;
use collab_sync::config::Config;
use collab_sync::db::{Db, FirestoreDb, MemoryDb};
use collab_sync::middleware::auth::create_jwt;
use collab_sync::models::{AuthMethod, User};
use collab_sync::routes::create_router;
use collab_sync::services::{GoogleIdTokenVerifier, KmsService};
use collab_sync::AppState;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use wiremock::matchers::{header as header_matcher, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const GOOGLE_TEST_KID: &str = "test-kid";
pub const GOOGLE_TEST_SECRET: &[u8] = b"google-test-secret";

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Connect to the Firestore emulator.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Offline app: memory store, mock KMS, static-key Google verifier, and
/// every provider pointed at one mock server.
#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub server: MockServer,
}

#[allow(dead_code)]
impl TestApp {
    pub async fn new() -> Self {
        let db: Db = Arc::new(MemoryDb::new());
        Self::with_db(db).await
    }

    pub async fn with_db(db: Db) -> Self {
        let server = MockServer::start().await;
        let config = Config::test_default(&server.uri());
        let verifier = GoogleIdTokenVerifier::new_with_static_key(
            &config,
            GOOGLE_TEST_KID,
            Algorithm::HS256,
            DecodingKey::from_secret(GOOGLE_TEST_SECRET),
        )
        .expect("static verifier");

        let state = Arc::new(
            AppState::new(config, db, KmsService::new_mock(), Arc::new(verifier))
                .expect("app state"),
        );
        Self {
            router: create_router(state.clone()),
            state,
            server,
        }
    }

    /// Send a request and return the status and JSON body (Null if empty).
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    /// Session token for `user_id`.
    pub fn session_for(&self, user_id: &str) -> String {
        create_jwt(user_id, &self.state.config.jwt_signing_key, 3600).unwrap()
    }

    /// Insert a local user directly into the store.
    pub async fn seed_user(&self, email: &str) -> User {
        let now = Utc::now();
        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            name: email.split('@').next().unwrap_or(email).to_string(),
            email: email.to_string(),
            google_id: None,
            github_id: None,
            dropbox_id: None,
            picture: None,
            password_hash: None,
            auth_methods: vec![AuthMethod::Local],
            is_active: true,
            last_login: now,
            projects: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.state.db.create_user(&user).await.unwrap();
        user
    }

    /// Mock a successful GitHub code exchange and profile lookup.
    pub async fn mock_github_login(&self, code: &str, github_id: u64, email: &str) {
        Mock::given(method("POST"))
            .and(path("/github/oauth/access_token"))
            .and(wiremock::matchers::body_string_contains(code))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": format!("gh-token-{}", github_id),
                "token_type": "bearer",
                "scope": "read:user,user:email"
            })))
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/github/api/user"))
            .and(header_matcher(
                "authorization",
                format!("Bearer gh-token-{}", github_id).as_str(),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": github_id,
                "login": "octo",
                "name": "Octo Cat",
                "email": email,
                "avatar_url": "https://avatars.example/octo.png"
            })))
            .mount(&self.server)
            .await;
    }
}

/// Mint a Google ID token accepted by the static-key verifier.
#[allow(dead_code)]
pub fn google_credential(subject: &str, email: &str, picture: Option<&str>) -> String {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(GOOGLE_TEST_KID.to_string());
    let claims = serde_json::json!({
        "iss": "https://accounts.google.com",
        "aud": "google_client_id",
        "sub": subject,
        "email": email,
        "email_verified": true,
        "name": "Alice",
        "picture": picture,
        "exp": Utc::now().timestamp() + 3600,
    });
    jsonwebtoken::encode(&header, &claims, &EncodingKey::from_secret(GOOGLE_TEST_SECRET)).unwrap()
}

/// JSON request, with an optional bearer session.
#[allow(dead_code)]
pub fn json_request(method: Method, uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Bodiless GET, with an optional bearer session.
#[allow(dead_code)]
pub fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}
