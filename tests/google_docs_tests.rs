// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google Docs change pull through the API.

use collab_sync::models::Provider;
use collab_sync::services::TokenGrant;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

mod common;
use common::{get_request, TestApp};

const DOC_URL: &str = "https%3A%2F%2Fdocs.google.com%2Fdocument%2Fd%2Fdoc-42%2Fedit";

async fn google_user(app: &TestApp) -> String {
    let user = app.seed_user("docs@example.com").await;
    app.state
        .tokens
        .store_grant(
            &user.id,
            Provider::Google,
            "g-docs",
            &TokenGrant {
                access_token: "ya29.docs".to_string(),
                refresh_token: Some("1//refresh".to_string()),
                expires_in: Some(3600),
                scopes: None,
            },
        )
        .await
        .unwrap();
    user.id
}

async fn mock_document(app: &TestApp) {
    Mock::given(method("GET"))
        .and(path("/google/docs/v1/documents/doc-42"))
        .and(query_param("suggestionsViewMode", "SUGGESTIONS_INLINE"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "title": "Design Doc",
            "revisionId": "rev-7",
            "body": { "content": [
                { "paragraph": { "elements": [
                    { "textRun": { "content": "new words", "suggestedInsertionIds": ["s1"] } }
                ]}}
            ]}
        })))
        .mount(&app.server)
        .await;
}

#[tokio::test]
async fn returns_suggestions_and_latest_activity() {
    let app = TestApp::new().await;
    let user_id = google_user(&app).await;
    mock_document(&app).await;
    Mock::given(method("POST"))
        .and(path("/google/driveactivity/v2/activity:query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "activities": [{
                "primaryActionDetail": { "rename": {} },
                "actors": [{ "user": { "unknownUser": {} } }],
                "targets": [{ "driveItem": { "title": "Design Doc" } }],
                "timestamp": "2024-01-01T00:00:00Z"
            }]
        })))
        .mount(&app.server)
        .await;

    let (status, body) = app
        .send(get_request(
            &format!("/api/v1/googledoc/doc-changes?docUrl={DOC_URL}"),
            Some(&app.session_for(&user_id)),
        ))
        .await;
    assert_eq!(status, axum::http::StatusCode::OK, "{body}");
    assert_eq!(body["title"], "Design Doc");
    assert_eq!(body["currentRevisionId"], "rev-7");

    let changes = body["changes"].as_array().unwrap();
    assert_eq!(changes.len(), 2);
    assert_eq!(changes[0]["type"], "suggestion");
    assert_eq!(changes[0]["text"], "new words");
    assert_eq!(changes[1]["type"], "activity");
    assert_eq!(changes[1]["action"], "Document Renamed");
    assert_eq!(changes[1]["actor"], "Anonymous User");
    assert_eq!(changes[1]["localTime"], "01/01/2024, 05:30:00");
}

#[tokio::test]
async fn activity_failure_is_omitted() {
    let app = TestApp::new().await;
    let user_id = google_user(&app).await;
    mock_document(&app).await;
    Mock::given(method("POST"))
        .and(path("/google/driveactivity/v2/activity:query"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&app.server)
        .await;

    let (status, body) = app
        .send(get_request(
            &format!("/api/v1/googledoc/doc-changes?docUrl={DOC_URL}"),
            Some(&app.session_for(&user_id)),
        ))
        .await;
    assert_eq!(status, axum::http::StatusCode::OK, "{body}");
    assert_eq!(body["changes"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn document_failure_is_a_provider_error() {
    let app = TestApp::new().await;
    let user_id = google_user(&app).await;
    Mock::given(method("GET"))
        .and(path("/google/docs/v1/documents/doc-42"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&app.server)
        .await;

    let (status, body) = app
        .send(get_request(
            &format!("/api/v1/googledoc/doc-changes?docUrl={DOC_URL}"),
            Some(&app.session_for(&user_id)),
        ))
        .await;
    assert_eq!(status, axum::http::StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "provider_error");
}

#[tokio::test]
async fn malformed_doc_url_is_reference_invalid() {
    let app = TestApp::new().await;
    let user_id = google_user(&app).await;
    let (status, body) = app
        .send(get_request(
            "/api/v1/googledoc/doc-changes?docUrl=https%3A%2F%2Fexample.com%2Fnothing",
            Some(&app.session_for(&user_id)),
        ))
        .await;
    assert_eq!(status, axum::http::StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "reference_invalid");
}
