// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - provider clients and business logic.

pub mod dropbox;
pub mod github;
pub mod google;
pub mod google_docs;
pub mod google_oidc;
pub mod http;
pub mod identity;
pub mod kms;
pub mod reconcile;
pub mod tokens;

pub use dropbox::DropboxClient;
pub use github::GithubClient;
pub use google::GoogleClient;
pub use google_docs::{DocChange, DocChanges};
pub use google_oidc::{GoogleIdTokenVerifier, GoogleIdentity, OidcError};
pub use http::{ProviderClients, ProviderError, ProviderHttp, TokenGrant};
pub use identity::{IdentityResolver, ProviderProfile};
pub use kms::KmsService;
pub use reconcile::{BatchReport, ChangeReconciler, WebhookEntry};
pub use tokens::TokenManager;
