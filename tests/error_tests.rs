// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::http::StatusCode;
use axum::response::IntoResponse;
use collab_sync::error::AppError;
use collab_sync::models::Provider;
use serde_json::Value;

async fn body_of(err: AppError) -> (StatusCode, Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_taxonomy_status_codes() {
    let cases = [
        (AppError::InvalidCredential("x".into()), StatusCode::BAD_REQUEST, "invalid_credential"),
        (
            AppError::ProviderExchangeFailed { provider: Provider::Github, reason: "x".into() },
            StatusCode::UNAUTHORIZED,
            "provider_exchange_failed",
        ),
        (
            AppError::AccountAlreadyLinked { provider: Provider::Google },
            StatusCode::BAD_REQUEST,
            "account_already_linked",
        ),
        (
            AppError::ReauthorizationRequired { provider: Provider::Dropbox },
            StatusCode::UNAUTHORIZED,
            "reauthorization_required",
        ),
        (AppError::NotFound("x".into()), StatusCode::NOT_FOUND, "not_found"),
        (AppError::ReferenceInvalid("x".into()), StatusCode::BAD_REQUEST, "reference_invalid"),
        (AppError::Conflict("x".into()), StatusCode::CONFLICT, "conflict"),
    ];

    for (err, status, code) in cases {
        let (got_status, body) = body_of(err).await;
        assert_eq!(got_status, status, "{code}");
        assert_eq!(body["error"], code);
    }
}

#[tokio::test]
async fn test_internal_errors_leak_no_detail() {
    let (status, body) = body_of(AppError::Database("connection string secret".into())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.get("details").is_none());

    let (status, body) = body_of(AppError::Internal(anyhow::anyhow!("stack"))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "internal_error");
    assert!(body.get("details").is_none());
}

#[tokio::test]
async fn test_provider_reason_is_not_echoed() {
    let (status, body) = body_of(AppError::ProviderApi {
        provider: Provider::Dropbox,
        reason: "token sl.ABC rejected".into(),
    })
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(!body["details"].as_str().unwrap().contains("sl.ABC"));
}
