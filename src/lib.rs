// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Collab-Sync: unified identity, provider tokens and change tracking
//!
//! This crate provides the backend API that signs users in through Google,
//! GitHub or a local password, keeps their provider connections fresh, and
//! reconciles change activity from Dropbox, Paper and Google Docs.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::Db;
use services::{
    ChangeReconciler, GoogleIdTokenVerifier, IdentityResolver, KmsService, ProviderClients,
    TokenManager,
};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: Db,
    pub providers: ProviderClients,
    pub tokens: TokenManager,
    pub identity: IdentityResolver,
    pub reconciler: ChangeReconciler,
}

impl AppState {
    /// Wire every service from its explicit dependencies.
    pub fn new(
        config: Config,
        db: Db,
        kms: KmsService,
        verifier: Arc<GoogleIdTokenVerifier>,
    ) -> anyhow::Result<Self> {
        let providers = ProviderClients::new(&config)?;
        let tokens = TokenManager::new(db.clone(), kms, providers.clone());
        let identity = IdentityResolver::new(
            db.clone(),
            tokens.clone(),
            providers.clone(),
            verifier,
            &config,
        );
        let reconciler = ChangeReconciler::new(
            db.clone(),
            tokens.clone(),
            providers.clone(),
            config.display_utc_offset_minutes,
        );

        Ok(Self {
            config,
            db,
            providers,
            tokens,
            identity,
            reconciler,
        })
    }
}
