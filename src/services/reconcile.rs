// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Change reconciliation for tracked Dropbox files, Paper docs and Google Docs.
//!
//! Webhook batches are processed sequentially, one entry at a time. A failed
//! entry is logged and counted but never aborts the rest of the batch.

use crate::db::Db;
use crate::error::AppError;
use crate::models::{Change, ChangeKind, FileLink, NewChange, Provider, TrackedFile};
use crate::services::dropbox::PaperItem;
use crate::services::google_docs::{self, DocChanges};
use crate::services::http::ProviderClients;
use crate::services::TokenManager;
use crate::time_utils::format_utc_rfc3339;
use chrono::Utc;
use serde::{Deserialize, Serialize};

const PAPER_EXTENSION: &str = ".paper";

/// One changed entry from a Dropbox `list_folder` notification.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEntry {
    pub id: String,
    #[serde(default)]
    pub path_display: String,
}

/// Per-batch tally, logged once the batch completes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub changes_added: usize,
}

/// Result of reconciling a single entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    Updated { added: usize },
    Skipped(&'static str),
}

#[derive(Clone)]
pub struct ChangeReconciler {
    db: Db,
    tokens: TokenManager,
    providers: ProviderClients,
    display_offset_minutes: i32,
}

impl ChangeReconciler {
    pub fn new(
        db: Db,
        tokens: TokenManager,
        providers: ProviderClients,
        display_offset_minutes: i32,
    ) -> Self {
        Self {
            db,
            tokens,
            providers,
            display_offset_minutes,
        }
    }

    // ─── Webhook Batches ─────────────────────────────────────────

    /// Reconcile every entry of a Dropbox file notification.
    pub async fn process_file_webhook(&self, entries: &[WebhookEntry]) -> BatchReport {
        let mut report = BatchReport::default();
        for entry in entries {
            let result = self
                .reconcile_dropbox_file(&entry.id, &entry.path_display)
                .await;
            tally(&mut report, &entry.id, result);
        }
        tracing::info!(?report, "Dropbox file webhook processed");
        report
    }

    /// Reconcile every `.paper` entry of a Dropbox notification.
    pub async fn process_paper_webhook(&self, entries: &[WebhookEntry]) -> BatchReport {
        let mut report = BatchReport::default();
        for entry in entries {
            if !entry.path_display.ends_with(PAPER_EXTENSION) {
                report.skipped += 1;
                continue;
            }
            let result = self.reconcile_paper_doc(&entry.id).await;
            tally(&mut report, &entry.id, result);
        }
        tracing::info!(?report, "Dropbox Paper webhook processed");
        report
    }

    // ─── Single Entries ──────────────────────────────────────────

    /// Append a modification change from the file's current metadata.
    ///
    /// There is no dedup key for modifications, so every pass appends.
    pub async fn reconcile_dropbox_file(
        &self,
        file_id: &str,
        path: &str,
    ) -> Result<EntryOutcome, AppError> {
        let Some(file) = self.db.get_file(file_id).await? else {
            return Ok(EntryOutcome::Skipped("file not tracked"));
        };
        let Some(owner) = self.db.get_user(&file.owner_id).await? else {
            return Ok(EntryOutcome::Skipped("owner not found"));
        };

        let token = self
            .tokens
            .get_valid_access_token(&owner.id, Provider::Dropbox)
            .await?;
        let path = if path.is_empty() { &file.path } else { path };
        let metadata = self
            .providers
            .dropbox
            .get_metadata(&token, path)
            .await
            .map_err(|e| e.api_failed(Provider::Dropbox))?;

        let now = Utc::now();
        let modified_at = metadata.server_modified;
        let change = NewChange {
            kind: ChangeKind::Modification,
            author: metadata
                .sharing_info
                .and_then(|s| s.modified_by)
                .unwrap_or_else(|| "unknown".to_string()),
            content: match modified_at {
                Some(t) => format!("File modified at {}", format_utc_rfc3339(t)),
                None => "File modified".to_string(),
            },
            timestamp: modified_at.unwrap_or(now),
            native_id: None,
        };

        let added = self
            .db
            .apply_changes(&file.file_id, vec![change], modified_at, now)
            .await?;
        Ok(EntryOutcome::Updated { added })
    }

    /// Merge a Paper doc's comments and suggestions, skipping known ids.
    pub async fn reconcile_paper_doc(&self, paper_doc_id: &str) -> Result<EntryOutcome, AppError> {
        let Some(file) = self.db.get_file(paper_doc_id).await? else {
            return Ok(EntryOutcome::Skipped("paper doc not tracked"));
        };
        let Some(owner) = self.db.get_user(&file.owner_id).await? else {
            return Ok(EntryOutcome::Skipped("owner not found"));
        };

        let added = self.merge_paper_changes(&owner.id, &file).await?;
        Ok(EntryOutcome::Updated { added })
    }

    async fn merge_paper_changes(&self, user_id: &str, file: &TrackedFile) -> Result<usize, AppError> {
        let doc_id = file.paper_doc_id.as_deref().unwrap_or(&file.file_id);
        let token = self
            .tokens
            .get_valid_access_token(user_id, Provider::Dropbox)
            .await?;

        let dropbox = &self.providers.dropbox;
        let (comments, suggestions) = tokio::try_join!(
            dropbox.paper_comments(&token, doc_id),
            dropbox.paper_suggestions(&token, doc_id),
        )
        .map_err(|e| e.api_failed(Provider::Dropbox))?;

        let last_activity = comments
            .iter()
            .chain(suggestions.iter())
            .map(|item| item.created_time)
            .max();

        let mut changes = Vec::with_capacity(comments.len() + suggestions.len());
        changes.extend(paper_changes(comments, ChangeKind::PaperComment));
        changes.extend(paper_changes(suggestions, ChangeKind::PaperSuggestion));

        let added = self
            .db
            .apply_changes(&file.file_id, changes, last_activity, Utc::now())
            .await?;
        tracing::debug!(user_id, doc_id, added, "Paper changes merged");
        Ok(added)
    }

    // ─── User-Facing Operations ──────────────────────────────────

    /// Link a Dropbox file to a project for the session user.
    pub async fn link_file(&self, user_id: &str, mut link: FileLink) -> Result<TrackedFile, AppError> {
        for (field, value) in [
            ("fileId", &link.file_id),
            ("name", &link.name),
            ("path", &link.path),
            ("projectId", &link.project_id),
        ] {
            if value.trim().is_empty() {
                return Err(AppError::BadRequest(format!("{} is required", field)));
            }
        }
        link.owner_id = user_id.to_string();
        let file = self.db.upsert_file(link).await?;
        tracing::info!(user_id, file_id = %file.file_id, "File linked");
        Ok(file)
    }

    /// Link a Paper doc by URL, using its Dropbox metadata for the name.
    pub async fn link_paper_doc(
        &self,
        user_id: &str,
        project_id: &str,
        paper_url: &str,
    ) -> Result<TrackedFile, AppError> {
        if project_id.trim().is_empty() {
            return Err(AppError::BadRequest("projectId is required".to_string()));
        }
        let doc_id = paper_doc_id_from_url(paper_url)
            .ok_or_else(|| AppError::ReferenceInvalid(format!("Paper URL {}", paper_url)))?
            .to_string();

        let token = self
            .tokens
            .get_valid_access_token(user_id, Provider::Dropbox)
            .await?;
        let metadata = self
            .providers
            .dropbox
            .paper_metadata(&token, &doc_id)
            .await
            .map_err(|e| e.api_failed(Provider::Dropbox))?;

        let mut file = self
            .db
            .upsert_file(FileLink {
                file_id: doc_id.clone(),
                name: metadata.title,
                path: paper_url.to_string(),
                web_url: Some(paper_url.to_string()),
                project_id: project_id.to_string(),
                owner_id: user_id.to_string(),
                is_paper_doc: true,
                paper_doc_id: Some(doc_id.clone()),
            })
            .await?;

        if let Some(updated) = metadata.last_updated_time {
            let now = Utc::now();
            self.db
                .apply_changes(&doc_id, Vec::new(), Some(updated), now)
                .await?;
            file.last_modified = Some(updated);
            file.last_checked = Some(now);
        }

        tracing::info!(user_id, paper_doc_id = %doc_id, "Paper doc linked");
        Ok(file)
    }

    /// Pull a Paper doc's changes now and return the unread ones.
    pub async fn pull_paper_changes(
        &self,
        user_id: &str,
        paper_doc_id: &str,
    ) -> Result<Vec<Change>, AppError> {
        let file = self.owned_file(user_id, paper_doc_id).await?;
        if !file.is_paper_doc {
            return Err(AppError::NotFound(format!("Paper document {}", paper_doc_id)));
        }
        self.merge_paper_changes(user_id, &file).await?;
        Ok(self.owned_file(user_id, paper_doc_id).await?.unread_changes())
    }

    pub async fn unread_changes(&self, user_id: &str, file_id: &str) -> Result<Vec<Change>, AppError> {
        Ok(self.owned_file(user_id, file_id).await?.unread_changes())
    }

    /// Mark changes read. Unknown ids and already-read changes are ignored.
    pub async fn mark_read(
        &self,
        user_id: &str,
        file_id: &str,
        change_ids: &[String],
    ) -> Result<TrackedFile, AppError> {
        self.owned_file(user_id, file_id).await?;
        self.db.mark_changes_read(file_id, change_ids).await
    }

    pub async fn list_files(&self, user_id: &str) -> Result<Vec<TrackedFile>, AppError> {
        self.db.list_files(user_id).await
    }

    /// Pull suggestions and the latest activity for a Google Doc.
    ///
    /// An activity query failure is logged and the activity omitted.
    pub async fn google_doc_changes(&self, user_id: &str, doc_url: &str) -> Result<DocChanges, AppError> {
        let doc_id = google_docs::extract_doc_id(doc_url)
            .ok_or_else(|| AppError::ReferenceInvalid("Invalid Google Doc URL".to_string()))?;

        let token = self
            .tokens
            .get_valid_access_token(user_id, Provider::Google)
            .await?;

        let google = &self.providers.google;
        let document = google
            .get_document(&token, doc_id)
            .await
            .map_err(|e| e.api_failed(Provider::Google))?;

        let revision_id = document
            .get("revisionId")
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown")
            .to_string();
        let title = document
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or("Untitled")
            .to_string();

        let mut changes = google_docs::collect_suggestions(&document, &revision_id);

        match google.query_activity(&token, doc_id).await {
            Ok(response) => changes.extend(google_docs::latest_activity(
                &response,
                &revision_id,
                self.display_offset_minutes,
            )),
            Err(e) => tracing::warn!(user_id, doc_id, error = %e, "Drive activity query failed"),
        }

        Ok(DocChanges {
            title,
            current_revision_id: revision_id,
            changes,
        })
    }

    async fn owned_file(&self, user_id: &str, file_id: &str) -> Result<TrackedFile, AppError> {
        self.db
            .get_file(file_id)
            .await?
            .filter(|f| f.owner_id == user_id)
            .ok_or_else(|| AppError::NotFound(format!("File {}", file_id)))
    }
}

fn tally(report: &mut BatchReport, entry_id: &str, result: Result<EntryOutcome, AppError>) {
    match result {
        Ok(EntryOutcome::Updated { added }) => {
            report.processed += 1;
            report.changes_added += added;
        }
        Ok(EntryOutcome::Skipped(reason)) => {
            tracing::debug!(entry_id, reason, "Webhook entry skipped");
            report.skipped += 1;
        }
        Err(e) => {
            tracing::warn!(entry_id, error = %e, "Webhook entry failed");
            report.failed += 1;
        }
    }
}

fn paper_changes(items: Vec<PaperItem>, kind: ChangeKind) -> impl Iterator<Item = NewChange> {
    items.into_iter().map(move |item| NewChange {
        kind,
        author: item.author.display_name,
        content: item.message,
        timestamp: item.created_time,
        native_id: Some(item.id),
    })
}

/// Paper doc id: the last path segment of the doc URL.
pub fn paper_doc_id_from_url(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty() && !id.contains(':'))
}
