// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process document store for local development and tests.

use crate::db::{merge_into, relink_owned, DocumentStore};
use crate::error::AppError;
use crate::models::{
    FileLink, NewChange, Provider, ProviderLinkUpdate, TrackedFile, User, UserConnection,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Store backed by concurrent maps. Each write holds the key's shard lock
/// for the whole read-modify-write.
#[derive(Default)]
pub struct MemoryDb {
    users: DashMap<String, User>,
    emails: DashMap<String, String>,
    connections: DashMap<String, UserConnection>,
    accounts: DashMap<(Provider, String), String>,
    files: DashMap<String, TrackedFile>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDb {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        Ok(self.users.get(user_id).map(|u| u.clone()))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let Some(user_id) = self.emails.get(email).map(|id| id.clone()) else {
            return Ok(None);
        };
        Ok(self.users.get(&user_id).map(|u| u.clone()))
    }

    async fn create_user(&self, user: &User) -> Result<(), AppError> {
        match self.emails.entry(user.email.clone()) {
            Entry::Occupied(_) => {
                return Err(AppError::Conflict(format!(
                    "User with email {} already exists",
                    user.email
                )))
            }
            Entry::Vacant(e) => {
                e.insert(user.id.clone());
            }
        }
        self.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn save_user(&self, user: &User) -> Result<(), AppError> {
        self.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn get_connection(&self, user_id: &str) -> Result<Option<UserConnection>, AppError> {
        Ok(self.connections.get(user_id).map(|c| c.clone()))
    }

    async fn find_account_owner(
        &self,
        provider: Provider,
        account_id: &str,
    ) -> Result<Option<String>, AppError> {
        Ok(self
            .accounts
            .get(&(provider, account_id.to_string()))
            .map(|owner| owner.clone()))
    }

    async fn upsert_connection(
        &self,
        user_id: &str,
        update: ProviderLinkUpdate,
    ) -> Result<UserConnection, AppError> {
        let provider = update.provider;

        match self.accounts.entry((provider, update.account_id.clone())) {
            Entry::Occupied(e) if e.get() != user_id => {
                return Err(AppError::AccountAlreadyLinked { provider });
            }
            Entry::Occupied(_) => {}
            Entry::Vacant(e) => {
                e.insert(user_id.to_string());
            }
        }

        let now = Utc::now();
        let mut conn = self
            .connections
            .entry(user_id.to_string())
            .or_insert_with(|| UserConnection::new(user_id, now));

        let released = conn
            .link(provider)
            .map(|l| l.account_id.clone())
            .filter(|old| *old != update.account_id);
        conn.apply(update, now);
        let result = conn.clone();
        drop(conn);

        if let Some(old) = released {
            self.accounts
                .remove_if(&(provider, old), |_, owner| owner == user_id);
        }

        Ok(result)
    }

    async fn get_file(&self, file_id: &str) -> Result<Option<TrackedFile>, AppError> {
        Ok(self.files.get(file_id).map(|f| f.clone()))
    }

    async fn list_files(&self, owner_id: &str) -> Result<Vec<TrackedFile>, AppError> {
        let mut files: Vec<TrackedFile> = self
            .files
            .iter()
            .filter(|f| f.owner_id == owner_id)
            .map(|f| f.clone())
            .collect();
        files.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(files)
    }

    async fn upsert_file(&self, link: FileLink) -> Result<TrackedFile, AppError> {
        let now = Utc::now();
        let file = match self.files.entry(link.file_id.clone()) {
            Entry::Occupied(mut e) => {
                relink_owned(e.get_mut(), link, now)?;
                e.get().clone()
            }
            Entry::Vacant(e) => e.insert(TrackedFile::from_link(link, now)).clone(),
        };
        Ok(file)
    }

    async fn apply_changes(
        &self,
        file_id: &str,
        changes: Vec<NewChange>,
        last_modified: Option<DateTime<Utc>>,
        checked_at: DateTime<Utc>,
    ) -> Result<usize, AppError> {
        let mut file = self
            .files
            .get_mut(file_id)
            .ok_or_else(|| AppError::NotFound(format!("File {}", file_id)))?;
        Ok(merge_into(&mut file, changes, last_modified, checked_at))
    }

    async fn mark_changes_read(
        &self,
        file_id: &str,
        change_ids: &[String],
    ) -> Result<TrackedFile, AppError> {
        let mut file = self
            .files
            .get_mut(file_id)
            .ok_or_else(|| AppError::NotFound(format!("File {}", file_id)))?;
        file.mark_read(change_ids);
        file.updated_at = Utc::now();
        Ok(file.clone())
    }
}
