// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Collab-Sync API Server
//!
//! Unified sign-in across Google, GitHub and local accounts, with provider
//! token management and change tracking for Dropbox, Paper and Google Docs.

use collab_sync::{
    config::{Config, StoreBackend},
    db::{Db, FirestoreDb, MemoryDb},
    services::{GoogleIdTokenVerifier, KmsService},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Structured JSON logging for GCP
    init_logging()?;

    let config = Config::from_env()?;
    tracing::info!(port = config.port, backend = ?config.store_backend, "Starting Collab-Sync API");

    let db: Db = match config.store_backend {
        StoreBackend::Firestore => Arc::new(FirestoreDb::new(&config.gcp_project_id).await?),
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on restart");
            Arc::new(MemoryDb::new())
        }
    };

    let kms = build_kms(&config).await?;
    tracing::info!("KMS service initialized");

    let verifier = Arc::new(GoogleIdTokenVerifier::new(&config)?);

    let port = config.port;
    let state = Arc::new(AppState::new(config, db, kms, verifier)?);
    let app = collab_sync::routes::create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Debug builds with the memory store run against the mock cipher.
#[cfg(debug_assertions)]
async fn build_kms(config: &Config) -> Result<KmsService, collab_sync::error::AppError> {
    if config.store_backend == StoreBackend::Memory {
        tracing::warn!("Using mock KMS");
        return Ok(KmsService::new_mock());
    }
    KmsService::new(&config.gcp_project_id, &config.gcp_region, "provider-tokens").await
}

#[cfg(not(debug_assertions))]
async fn build_kms(config: &Config) -> Result<KmsService, collab_sync::error::AppError> {
    KmsService::new(&config.gcp_project_id, &config.gcp_region, "provider-tokens").await
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() -> Result<(), tracing_subscriber::filter::ParseError> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("collab_sync=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
