// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use crate::models::Provider;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Malformed or missing inbound provider assertion.
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    /// Provider token exchange or profile call failed.
    #[error("{provider} exchange failed: {reason}")]
    ProviderExchangeFailed { provider: Provider, reason: String },

    /// The provider account is already bound to a different user.
    #[error("{provider} account is already linked to another user")]
    AccountAlreadyLinked { provider: Provider },

    /// Stored refresh token was rejected; the user must reconnect.
    #[error("{provider} connection must be re-authorized")]
    ReauthorizationRequired { provider: Provider },

    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Malformed id shape.
    #[error("Invalid reference: {0}")]
    ReferenceInvalid(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Provider data call (not token exchange) failed.
    #[error("{provider} API error: {reason}")]
    ProviderApi { provider: Provider, reason: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable machine-readable code used in the response body.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidCredential(_) => "invalid_credential",
            AppError::ProviderExchangeFailed { .. } => "provider_exchange_failed",
            AppError::AccountAlreadyLinked { .. } => "account_already_linked",
            AppError::ReauthorizationRequired { .. } => "reauthorization_required",
            AppError::NotFound(_) => "not_found",
            AppError::ReferenceInvalid(_) => "reference_invalid",
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden => "forbidden",
            AppError::BadRequest(_) => "bad_request",
            AppError::Conflict(_) => "conflict",
            AppError::ProviderApi { .. } => "provider_error",
            AppError::Database(_) => "database_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidCredential(_)
            | AppError::AccountAlreadyLinked { .. }
            | AppError::ReferenceInvalid(_)
            | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::ProviderExchangeFailed { .. }
            | AppError::ReauthorizationRequired { .. }
            | AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ProviderApi { .. } => StatusCode::BAD_GATEWAY,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let details = match &self {
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                None
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                None
            }
            AppError::ProviderExchangeFailed { provider, reason } => {
                tracing::warn!(%provider, reason = %reason, "Provider exchange failed");
                Some(format!("{} authentication failed", provider))
            }
            AppError::ProviderApi { provider, reason } => {
                tracing::warn!(%provider, reason = %reason, "Provider API error");
                Some(format!("{} request failed", provider))
            }
            AppError::Unauthorized | AppError::Forbidden => None,
            other => Some(other.to_string()),
        };

        let body = ErrorResponse {
            error: self.code().to_string(),
            details,
        };

        (self.status(), Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
