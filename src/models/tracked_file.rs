// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Tracked provider files and their embedded change log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Kind of a change log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Comment,
    Suggestion,
    Modification,
    PaperComment,
    PaperSuggestion,
}

/// A single entry in a file's change log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    /// Local change id, used by mark-read
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub author: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paper_comment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paper_suggestion_id: Option<String>,
}

impl Change {
    /// Provider-native id used for dedup, if this kind carries one.
    pub fn native_id(&self) -> Option<&str> {
        match self.kind {
            ChangeKind::PaperComment => self.paper_comment_id.as_deref(),
            ChangeKind::PaperSuggestion => self.paper_suggestion_id.as_deref(),
            _ => None,
        }
    }
}

/// Change data fetched from a provider, before it is merged.
#[derive(Debug, Clone, PartialEq)]
pub struct NewChange {
    pub kind: ChangeKind,
    pub author: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub native_id: Option<String>,
}

impl NewChange {
    fn into_change(self) -> Change {
        let (paper_comment_id, paper_suggestion_id) = match self.kind {
            ChangeKind::PaperComment => (self.native_id, None),
            ChangeKind::PaperSuggestion => (None, self.native_id),
            _ => (None, None),
        };
        Change {
            id: uuid::Uuid::new_v4().to_string(),
            kind: self.kind,
            author: self.author,
            content: self.content,
            timestamp: self.timestamp,
            is_read: false,
            paper_comment_id,
            paper_suggestion_id,
        }
    }
}

/// A Dropbox file or Paper doc linked to a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedFile {
    /// Provider file id (document ID)
    pub file_id: String,
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub web_url: Option<String>,
    pub owner_id: String,
    pub project_id: String,
    #[serde(default)]
    pub last_checked: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_paper_doc: bool,
    #[serde(default)]
    pub paper_doc_id: Option<String>,
    #[serde(default)]
    pub changes: Vec<Change>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to link a provider file to a project.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileLink {
    pub file_id: String,
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub web_url: Option<String>,
    pub project_id: String,
    #[serde(skip)]
    pub owner_id: String,
    #[serde(default)]
    pub is_paper_doc: bool,
    #[serde(default)]
    pub paper_doc_id: Option<String>,
}

impl TrackedFile {
    pub fn from_link(link: FileLink, now: DateTime<Utc>) -> Self {
        Self {
            file_id: link.file_id,
            name: link.name,
            path: link.path,
            web_url: link.web_url,
            owner_id: link.owner_id,
            project_id: link.project_id,
            last_checked: None,
            last_modified: None,
            is_paper_doc: link.is_paper_doc,
            paper_doc_id: link.paper_doc_id,
            changes: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Re-link an existing file; the owner, change log and timestamps are
    /// kept.
    pub fn relink(&mut self, link: FileLink, now: DateTime<Utc>) {
        self.name = link.name;
        self.path = link.path;
        self.web_url = link.web_url.or(self.web_url.take());
        self.project_id = link.project_id;
        self.is_paper_doc = link.is_paper_doc;
        self.paper_doc_id = link.paper_doc_id.or(self.paper_doc_id.take());
        self.updated_at = now;
    }

    /// Append incoming changes, skipping native ids already present.
    ///
    /// Changes without a native id are always appended. Returns the number
    /// of changes added.
    pub fn merge_changes(&mut self, incoming: Vec<NewChange>) -> usize {
        let mut seen: HashSet<(ChangeKind, String)> = self
            .changes
            .iter()
            .filter_map(|c| c.native_id().map(|id| (c.kind, id.to_string())))
            .collect();

        let before = self.changes.len();
        for change in incoming {
            if let Some(id) = &change.native_id {
                if !seen.insert((change.kind, id.clone())) {
                    continue;
                }
            }
            self.changes.push(change.into_change());
        }
        self.changes.len() - before
    }

    pub fn unread_changes(&self) -> Vec<Change> {
        self.changes.iter().filter(|c| !c.is_read).cloned().collect()
    }

    /// Flag the given changes read. Unknown ids are ignored.
    ///
    /// Returns how many changes flipped from unread to read.
    pub fn mark_read(&mut self, ids: &[String]) -> usize {
        let ids: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let mut flipped = 0;
        for change in self.changes.iter_mut() {
            if !change.is_read && ids.contains(change.id.as_str()) {
                change.is_read = true;
                flipped += 1;
            }
        }
        flipped
    }
}
