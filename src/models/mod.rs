// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod connection;
pub mod tracked_file;
pub mod user;

pub use connection::{ConnectionStatus, ProviderLink, ProviderLinkUpdate, UserConnection};
pub use tracked_file::{Change, ChangeKind, FileLink, NewChange, TrackedFile};
pub use user::{normalize_email, AuthMethod, Provider, PublicUser, User};
