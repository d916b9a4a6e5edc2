//! Database layer.
//!
//! [`DocumentStore`] is the seam between the services and the document
//! store. [`FirestoreDb`] backs production; [`MemoryDb`] backs local
//! development and tests.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryDb;

use crate::error::AppError;
use crate::models::{
    FileLink, NewChange, Provider, ProviderLinkUpdate, TrackedFile, User, UserConnection,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    /// Email claim documents (keyed by normalized email)
    pub const USER_EMAILS: &str = "user_emails";
    /// Token store records (keyed by user id)
    pub const USER_CONNECTIONS: &str = "user_connections";
    /// Provider account claim documents (keyed by `{provider}:{account_id}`)
    pub const PROVIDER_ACCOUNTS: &str = "provider_accounts";
    /// Tracked Dropbox files and Paper docs (keyed by file id)
    pub const TRACKED_FILES: &str = "tracked_files";
}

/// Shared handle to the configured store.
pub type Db = Arc<dyn DocumentStore>;

/// Persistence operations needed by the services.
///
/// Connection and file writes are read-modify-write cycles that each
/// implementation must perform atomically per key.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError>;

    /// Look up a user by normalized email.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    /// Insert a new user. Fails with `Conflict` if the email is taken.
    async fn create_user(&self, user: &User) -> Result<(), AppError>;

    /// Overwrite an existing user record.
    async fn save_user(&self, user: &User) -> Result<(), AppError>;

    async fn get_connection(&self, user_id: &str) -> Result<Option<UserConnection>, AppError>;

    /// User id a provider account is bound to, if any.
    async fn find_account_owner(
        &self,
        provider: Provider,
        account_id: &str,
    ) -> Result<Option<String>, AppError>;

    /// Bind the account to `user_id` and merge fresh credentials.
    ///
    /// Fails with `AccountAlreadyLinked` if the account is bound to another
    /// user; nothing is written in that case.
    async fn upsert_connection(
        &self,
        user_id: &str,
        update: ProviderLinkUpdate,
    ) -> Result<UserConnection, AppError>;

    async fn get_file(&self, file_id: &str) -> Result<Option<TrackedFile>, AppError>;

    async fn list_files(&self, owner_id: &str) -> Result<Vec<TrackedFile>, AppError>;

    /// Create or re-link a tracked file, keeping its change log.
    ///
    /// Fails with `Forbidden` if the file is tracked by another user; the
    /// record is left untouched in that case.
    async fn upsert_file(&self, link: FileLink) -> Result<TrackedFile, AppError>;

    /// Merge changes into a file and stamp `lastModified`/`lastChecked`.
    ///
    /// Returns the number of changes appended; `NotFound` if the file does
    /// not exist.
    async fn apply_changes(
        &self,
        file_id: &str,
        changes: Vec<NewChange>,
        last_modified: Option<DateTime<Utc>>,
        checked_at: DateTime<Utc>,
    ) -> Result<usize, AppError>;

    /// Flag changes read and return the updated file.
    async fn mark_changes_read(
        &self,
        file_id: &str,
        change_ids: &[String],
    ) -> Result<TrackedFile, AppError>;
}

/// Document id of a provider account claim.
pub fn account_claim_id(provider: Provider, account_id: &str) -> String {
    format!("{}:{}", provider, urlencoding::encode(account_id))
}

/// Re-link an existing file on behalf of its owner.
pub(crate) fn relink_owned(
    file: &mut TrackedFile,
    link: FileLink,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    if file.owner_id != link.owner_id {
        tracing::warn!(
            file_id = %file.file_id,
            owner = %file.owner_id,
            caller = %link.owner_id,
            "Refusing to re-link a file tracked by another user"
        );
        return Err(AppError::Forbidden);
    }
    file.relink(link, now);
    Ok(())
}

/// Apply a merge to a file record in memory.
pub(crate) fn merge_into(
    file: &mut TrackedFile,
    changes: Vec<NewChange>,
    last_modified: Option<DateTime<Utc>>,
    checked_at: DateTime<Utc>,
) -> usize {
    let added = file.merge_changes(changes);
    if last_modified.is_some() {
        file.last_modified = last_modified;
    }
    file.last_checked = Some(checked_at);
    file.updated_at = checked_at;
    added
}
