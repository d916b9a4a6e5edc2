// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! File linking, unread changes and mark-read through the API.

use axum::http::{Method, StatusCode};
use chrono::Utc;
use collab_sync::models::{ChangeKind, NewChange, Provider};
use collab_sync::services::TokenGrant;
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, ResponseTemplate};

mod common;
use common::{get_request, json_request, TestApp};

fn modification(n: usize) -> NewChange {
    NewChange {
        kind: ChangeKind::Modification,
        author: "dbid:EDITOR".to_string(),
        content: format!("edit {n}"),
        timestamp: Utc::now(),
        native_id: None,
    }
}

fn ids(body: &Value) -> Vec<String> {
    body["changes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["id"].as_str().unwrap().to_string())
        .collect()
}

async fn connect_dropbox(app: &TestApp, user_id: &str) {
    app.state
        .tokens
        .store_grant(
            user_id,
            Provider::Dropbox,
            "dbid:PAPER",
            &TokenGrant {
                access_token: "dbx-access".to_string(),
                refresh_token: None,
                expires_in: Some(3600),
                scopes: None,
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn link_list_and_mark_read() {
    let app = TestApp::new().await;
    let user = app.seed_user("files@example.com").await;
    let token = app.session_for(&user.id);

    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/api/v1/dropbox/files",
            json!({
                "fileId": "id:abc",
                "name": "Budget.xlsx",
                "path": "/Team/Budget.xlsx",
                "webUrl": "https://www.dropbox.com/home/Team?preview=Budget.xlsx",
                "projectId": "project-7"
            }),
            Some(&token),
        ))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["file"]["ownerId"], user.id.as_str());
    assert_eq!(body["file"]["isPaperDoc"], false);

    app.state
        .db
        .apply_changes("id:abc", (0..3).map(modification).collect(), None, Utc::now())
        .await
        .unwrap();

    let uri = "/api/v1/dropbox/files/id:abc/changes";
    let (status, body) = app.send(get_request(uri, Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    let all = ids(&body);
    assert_eq!(all.len(), 3);

    let read = json!({ "changeIds": [all[0], all[1]] });
    for _ in 0..2 {
        let (status, body) = app
            .send(json_request(
                Method::POST,
                "/api/v1/dropbox/files/id:abc/changes/read",
                read.clone(),
                Some(&token),
            ))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "success": true }));
    }

    let (_, body) = app.send(get_request(uri, Some(&token))).await;
    assert_eq!(ids(&body), vec![all[2].clone()]);

    let (status, body) = app
        .send(get_request("/api/v1/dropbox/files", Some(&token)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["files"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn other_users_files_are_not_visible() {
    let app = TestApp::new().await;
    let owner = app.seed_user("owner@example.com").await;
    let other = app.seed_user("other@example.com").await;
    app.state
        .db
        .upsert_file(collab_sync::models::FileLink {
            file_id: "private".to_string(),
            name: "Private".to_string(),
            path: "/Private".to_string(),
            web_url: None,
            project_id: "p".to_string(),
            owner_id: owner.id.clone(),
            is_paper_doc: false,
            paper_doc_id: None,
        })
        .await
        .unwrap();

    let (status, body) = app
        .send(get_request(
            "/api/v1/dropbox/files/private/changes",
            Some(&app.session_for(&other.id)),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn relinking_another_users_file_is_forbidden() {
    let app = TestApp::new().await;
    let owner = app.seed_user("first@example.com").await;
    let intruder = app.seed_user("second@example.com").await;
    let owner_token = app.session_for(&owner.id);
    let intruder_token = app.session_for(&intruder.id);

    let link = json!({
        "fileId": "id:abc",
        "name": "Plan.docx",
        "path": "/Plan.docx",
        "projectId": "project-1"
    });
    let (status, _) = app
        .send(json_request(
            Method::POST,
            "/api/v1/dropbox/files",
            link.clone(),
            Some(&owner_token),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    app.state
        .db
        .apply_changes("id:abc", vec![modification(1)], None, Utc::now())
        .await
        .unwrap();

    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/api/v1/dropbox/files",
            link,
            Some(&intruder_token),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let uri = "/api/v1/dropbox/files/id:abc/changes";
    let (status, _) = app.send(get_request(uri, Some(&intruder_token))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.send(get_request(uri, Some(&owner_token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&body).len(), 1);

    let file = app.state.db.get_file("id:abc").await.unwrap().unwrap();
    assert_eq!(file.owner_id, owner.id);
    assert_eq!(file.project_id, "project-1");
}

#[tokio::test]
async fn link_requires_fields_and_session() {
    let app = TestApp::new().await;
    let user = app.seed_user("fields@example.com").await;

    let (status, _) = app
        .send(json_request(Method::POST, "/api/v1/dropbox/files", json!({}), None))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/api/v1/dropbox/files",
            json!({ "fileId": " ", "name": "n", "path": "/n", "projectId": "p" }),
            Some(&app.session_for(&user.id)),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn paper_doc_link_and_pull() {
    let app = TestApp::new().await;
    let user = app.seed_user("paper@example.com").await;
    connect_dropbox(&app, &user.id).await;
    let token = app.session_for(&user.id);

    Mock::given(method("POST"))
        .and(path("/dropbox/api/2/paper/docs/get_metadata"))
        .and(body_partial_json(json!({ "doc_id": "Plan--AbC123" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "doc_id": "Plan--AbC123",
            "title": "Launch Plan",
            "last_updated_time": "2024-06-01T12:00:00Z"
        })))
        .mount(&app.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/dropbox/api/2/paper/docs/comments/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "comments": [{
                "id": "c-9",
                "author": { "display_name": "Gail" },
                "message": "Ship it",
                "created_time": "2024-06-02T12:00:00Z"
            }]
        })))
        .mount(&app.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/dropbox/api/2/paper/docs/suggestions/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "suggestions": [] })))
        .mount(&app.server)
        .await;

    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/api/v1/dropbox/paper",
            json!({
                "projectId": "project-1",
                "paperUrl": "https://paper.dropbox.com/doc/Plan--AbC123"
            }),
            Some(&token),
        ))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["file"]["name"], "Launch Plan");
    assert_eq!(body["file"]["isPaperDoc"], true);
    assert_eq!(body["file"]["paperDocId"], "Plan--AbC123");

    for _ in 0..2 {
        let (status, body) = app
            .send(get_request(
                "/api/v1/dropbox/paper/Plan--AbC123/changes",
                Some(&token),
            ))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        let changes = body["changes"].as_array().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0]["type"], "paper_comment");
        assert_eq!(changes[0]["paperCommentId"], "c-9");
    }
}

#[tokio::test]
async fn paper_pull_without_connection_is_not_found() {
    let app = TestApp::new().await;
    let user = app.seed_user("noconn@example.com").await;
    let (status, _) = app
        .send(json_request(
            Method::POST,
            "/api/v1/dropbox/paper",
            json!({ "projectId": "p", "paperUrl": "https://paper.dropbox.com/doc/X--1" }),
            Some(&app.session_for(&user.id)),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
