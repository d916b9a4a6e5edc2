// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users (profile storage, unique by email via claim documents)
//! - Connections (encrypted OAuth tokens, unique provider accounts)
//! - Tracked files (embedded change log)

use crate::db::{account_claim_id, collections, merge_into, relink_owned, DocumentStore};
use crate::error::AppError;
use crate::models::{
    FileLink, NewChange, Provider, ProviderLinkUpdate, TrackedFile, User, UserConnection,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use firestore::errors::FirestoreError;
use firestore::FirestoreConsistencySelector;
use serde::{Deserialize, Serialize};

/// Claim document reserving a unique value for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Claim {
    user_id: String,
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    async fn get_doc<T>(&self, collection: &str, id: &str) -> Result<Option<T>, AppError>
    where
        T: for<'de> Deserialize<'de> + Send,
    {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collection)
            .obj()
            .one(id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create a claim document. Returns the current owner if it already exists.
    async fn claim(
        &self,
        collection: &str,
        id: &str,
        user_id: &str,
    ) -> Result<Option<String>, AppError> {
        let claim = Claim {
            user_id: user_id.to_string(),
        };
        let result: Result<Claim, FirestoreError> = self
            .get_client()?
            .fluent()
            .insert()
            .into(collection)
            .document_id(id)
            .object(&claim)
            .execute()
            .await;

        match result {
            Ok(_) => Ok(None),
            Err(FirestoreError::DataConflictError(_)) => {
                let existing: Option<Claim> = self.get_doc(collection, id).await?;
                Ok(existing.map(|c| c.user_id))
            }
            Err(e) => Err(AppError::Database(e.to_string())),
        }
    }

    async fn release_claim(&self, collection: &str, id: &str) -> Result<(), AppError> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collection)
            .document_id(id)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Undo a claim made by a write that then failed.
    async fn release_after_failure(&self, collection: &str, id: &str) {
        if let Err(e) = self.release_claim(collection, id).await {
            tracing::error!(collection, id, error = %e, "Failed to release orphaned claim");
        }
    }

    /// Merge an update into the connection record inside a transaction.
    ///
    /// Returns the new record and the previously linked account id if it
    /// was replaced.
    async fn commit_connection(
        &self,
        user_id: &str,
        update: ProviderLinkUpdate,
    ) -> Result<(UserConnection, Option<String>), AppError> {
        let client = self.get_client()?;
        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        let existing: Option<UserConnection> = client
            .clone_with_consistency_selector(FirestoreConsistencySelector::Transaction(
                transaction.transaction_id().clone(),
            ))
            .fluent()
            .select()
            .by_id_in(collections::USER_CONNECTIONS)
            .obj()
            .one(user_id)
            .await
            .map_err(|e| {
                AppError::Database(format!("Failed to read connection in transaction: {}", e))
            })?;

        let now = Utc::now();
        let mut conn = existing.unwrap_or_else(|| UserConnection::new(user_id, now));
        let released = conn
            .link(update.provider)
            .map(|l| l.account_id.clone())
            .filter(|old| *old != update.account_id);
        conn.apply(update, now);

        client
            .fluent()
            .update()
            .in_col(collections::USER_CONNECTIONS)
            .document_id(user_id)
            .object(&conn)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add connection to transaction: {}", e))
            })?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;

        Ok((conn, released))
    }

    /// Read-modify-write a tracked file inside a transaction.
    async fn update_file<R, F>(&self, file_id: &str, mutate: F) -> Result<R, AppError>
    where
        F: FnOnce(&mut TrackedFile) -> R,
    {
        let client = self.get_client()?;
        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        let file: Option<TrackedFile> = client
            .clone_with_consistency_selector(FirestoreConsistencySelector::Transaction(
                transaction.transaction_id().clone(),
            ))
            .fluent()
            .select()
            .by_id_in(collections::TRACKED_FILES)
            .obj()
            .one(file_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to read file in transaction: {}", e)))?;

        let Some(mut file) = file else {
            let _ = transaction.rollback().await;
            return Err(AppError::NotFound(format!("File {}", file_id)));
        };

        let result = mutate(&mut file);

        client
            .fluent()
            .update()
            .in_col(collections::TRACKED_FILES)
            .document_id(urlencoding::encode(file_id))
            .object(&file)
            .add_to_transaction(&mut transaction)
            .map_err(|e| AppError::Database(format!("Failed to add file to transaction: {}", e)))?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;

        Ok(result)
    }
}

#[async_trait]
impl DocumentStore for FirestoreDb {
    // ─── User Operations ─────────────────────────────────────────

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        self.get_doc(collections::USERS, user_id).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let claim: Option<Claim> = self
            .get_doc(collections::USER_EMAILS, &urlencoding::encode(email))
            .await?;
        match claim {
            Some(claim) => self.get_user(&claim.user_id).await,
            None => Ok(None),
        }
    }

    async fn create_user(&self, user: &User) -> Result<(), AppError> {
        let email_id = urlencoding::encode(&user.email).into_owned();
        let claimed = match self
            .claim(collections::USER_EMAILS, &email_id, &user.id)
            .await?
        {
            Some(owner) if owner != user.id => {
                return Err(AppError::Conflict(format!(
                    "User with email {} already exists",
                    user.email
                )));
            }
            Some(_) => false,
            None => true,
        };

        if let Err(e) = self.save_user(user).await {
            if claimed {
                self.release_after_failure(collections::USER_EMAILS, &email_id)
                    .await;
            }
            return Err(e);
        }
        Ok(())
    }

    async fn save_user(&self, user: &User) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(&user.id)
            .object(user)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Connection Operations ───────────────────────────────────

    async fn get_connection(&self, user_id: &str) -> Result<Option<UserConnection>, AppError> {
        self.get_doc(collections::USER_CONNECTIONS, user_id).await
    }

    async fn find_account_owner(
        &self,
        provider: Provider,
        account_id: &str,
    ) -> Result<Option<String>, AppError> {
        let claim: Option<Claim> = self
            .get_doc(
                collections::PROVIDER_ACCOUNTS,
                &account_claim_id(provider, account_id),
            )
            .await?;
        Ok(claim.map(|c| c.user_id))
    }

    async fn upsert_connection(
        &self,
        user_id: &str,
        update: ProviderLinkUpdate,
    ) -> Result<UserConnection, AppError> {
        let provider = update.provider;
        let claim_id = account_claim_id(provider, &update.account_id);

        let claimed = match self
            .claim(collections::PROVIDER_ACCOUNTS, &claim_id, user_id)
            .await?
        {
            Some(owner) if owner != user_id => {
                return Err(AppError::AccountAlreadyLinked { provider });
            }
            Some(_) => false,
            None => true,
        };

        let (conn, released) = match self.commit_connection(user_id, update).await {
            Ok(result) => result,
            Err(e) => {
                if claimed {
                    self.release_after_failure(collections::PROVIDER_ACCOUNTS, &claim_id)
                        .await;
                }
                return Err(e);
            }
        };

        if let Some(old) = released {
            let old_id = account_claim_id(provider, &old);
            let owner: Option<Claim> = self.get_doc(collections::PROVIDER_ACCOUNTS, &old_id).await?;
            if owner.is_some_and(|c| c.user_id == user_id) {
                self.release_claim(collections::PROVIDER_ACCOUNTS, &old_id)
                    .await?;
            }
        }

        tracing::debug!(user_id, %provider, "Connection updated");
        Ok(conn)
    }

    // ─── Tracked File Operations ─────────────────────────────────

    async fn get_file(&self, file_id: &str) -> Result<Option<TrackedFile>, AppError> {
        self.get_doc(collections::TRACKED_FILES, &urlencoding::encode(file_id))
            .await
    }

    async fn list_files(&self, owner_id: &str) -> Result<Vec<TrackedFile>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::TRACKED_FILES)
            .filter(|q| q.for_all([q.field("ownerId").eq(owner_id)]))
            .order_by([("createdAt", firestore::FirestoreQueryDirection::Ascending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn upsert_file(&self, link: FileLink) -> Result<TrackedFile, AppError> {
        let file_id = link.file_id.clone();
        let now = Utc::now();

        let client = self.get_client()?;
        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        let existing: Option<TrackedFile> = client
            .clone_with_consistency_selector(FirestoreConsistencySelector::Transaction(
                transaction.transaction_id().clone(),
            ))
            .fluent()
            .select()
            .by_id_in(collections::TRACKED_FILES)
            .obj()
            .one(urlencoding::encode(&file_id))
            .await
            .map_err(|e| AppError::Database(format!("Failed to read file in transaction: {}", e)))?;

        let file = match existing {
            Some(mut file) => {
                if let Err(e) = relink_owned(&mut file, link, now) {
                    let _ = transaction.rollback().await;
                    return Err(e);
                }
                file
            }
            None => TrackedFile::from_link(link, now),
        };

        client
            .fluent()
            .update()
            .in_col(collections::TRACKED_FILES)
            .document_id(urlencoding::encode(&file_id))
            .object(&file)
            .add_to_transaction(&mut transaction)
            .map_err(|e| AppError::Database(format!("Failed to add file to transaction: {}", e)))?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;

        Ok(file)
    }

    async fn apply_changes(
        &self,
        file_id: &str,
        changes: Vec<NewChange>,
        last_modified: Option<DateTime<Utc>>,
        checked_at: DateTime<Utc>,
    ) -> Result<usize, AppError> {
        self.update_file(file_id, |file| {
            merge_into(file, changes, last_modified, checked_at)
        })
        .await
    }

    async fn mark_changes_read(
        &self,
        file_id: &str,
        change_ids: &[String],
    ) -> Result<TrackedFile, AppError> {
        self.update_file(file_id, |file| {
            file.mark_read(change_ids);
            file.updated_at = Utc::now();
            file.clone()
        })
        .await
    }
}
