// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Change extraction from Google Docs and Drive Activity responses.

use crate::time_utils::to_display_time;
use serde::Serialize;
use serde_json::Value;

/// One change reported for a Google Doc.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DocChange {
    #[serde(rename_all = "camelCase")]
    Suggestion {
        text: String,
        suggested_by: String,
        revision_id: String,
    },
    #[serde(rename_all = "camelCase")]
    Deletion {
        text: String,
        suggested_by: String,
        revision_id: String,
    },
    #[serde(rename_all = "camelCase")]
    Activity {
        action: String,
        actor: String,
        target: String,
        utc_time: String,
        local_time: String,
        revision_id: String,
    },
}

/// Result of a Google Doc change pull.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocChanges {
    pub title: String,
    pub current_revision_id: String,
    pub changes: Vec<DocChange>,
}

/// Extract the document id from a Docs URL (`…/d/<id>/…`).
pub fn extract_doc_id(url: &str) -> Option<&str> {
    let start = url.find("/d/")? + 3;
    let rest = &url[start..];
    let end = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
        .unwrap_or(rest.len());
    (end > 0).then(|| &rest[..end])
}

/// Human-readable label for a Drive Activity action type.
pub fn describe_action(action: &str) -> String {
    match action {
        "edit" => "Document Edited",
        "create" => "Document Created",
        "delete" => "Document Deleted",
        "move" => "Document Moved",
        "rename" => "Document Renamed",
        "restore" => "Document Restored",
        "permissionChange" => "Permissions Changed",
        "comment" => "Comment Added",
        "suggestion" => "Suggestion Added",
        other => other,
    }
    .to_string()
}

/// Collect inline suggested insertions and deletions, in document order.
pub fn collect_suggestions(document: &Value, revision_id: &str) -> Vec<DocChange> {
    let mut changes = Vec::new();
    if let Some(content) = document.pointer("/body/content") {
        walk(content, revision_id, &mut changes);
    }
    changes
}

fn walk(node: &Value, revision_id: &str, out: &mut Vec<DocChange>) {
    match node {
        Value::Array(items) => {
            for item in items {
                walk(item, revision_id, out);
            }
        }
        Value::Object(map) => {
            if let Some(run) = map.get("textRun") {
                visit_text_run(run, revision_id, out);
            }
            for value in map.values() {
                walk(value, revision_id, out);
            }
        }
        _ => {}
    }
}

fn visit_text_run(run: &Value, revision_id: &str, out: &mut Vec<DocChange>) {
    let text = run
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    if has_marker(run, "suggestedInsertionIds", "suggestedInsertion") {
        out.push(DocChange::Suggestion {
            text: text.clone(),
            suggested_by: "Unknown".to_string(),
            revision_id: revision_id.to_string(),
        });
    }
    if has_marker(run, "suggestedDeletionIds", "suggestedDeletion") {
        out.push(DocChange::Deletion {
            text,
            suggested_by: "Unknown".to_string(),
            revision_id: revision_id.to_string(),
        });
    }
}

fn has_marker(run: &Value, ids_key: &str, flag_key: &str) -> bool {
    let ids = run
        .get(ids_key)
        .and_then(Value::as_array)
        .is_some_and(|ids| !ids.is_empty());
    let flag = run.get(flag_key).is_some_and(|v| !v.is_null());
    ids || flag
}

/// Describe the most recent Drive activity entry, if any.
pub fn latest_activity(
    response: &Value,
    revision_id: &str,
    display_offset_minutes: i32,
) -> Option<DocChange> {
    let activity = response.get("activities")?.as_array()?.first()?;

    let action = activity
        .get("primaryActionDetail")
        .and_then(Value::as_object)
        .and_then(|detail| detail.keys().next())
        .map(|code| describe_action(code))
        .unwrap_or_else(|| "Unknown".to_string());

    let actor = activity
        .pointer("/actors/0")
        .map(actor_name)
        .unwrap_or_else(|| "Unknown".to_string());

    let target = activity
        .pointer("/targets/0/driveItem/title")
        .and_then(Value::as_str)
        .unwrap_or("Unknown")
        .to_string();

    let utc_time = activity
        .get("timestamp")
        .or_else(|| activity.pointer("/timeRange/endTime"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Some(DocChange::Activity {
        action,
        actor,
        target,
        local_time: to_display_time(&utc_time, display_offset_minutes),
        utc_time,
        revision_id: revision_id.to_string(),
    })
}

fn actor_name(actor: &Value) -> String {
    if let Some(known) = actor.pointer("/user/knownUser") {
        return ["personName", "emailAddress"]
            .iter()
            .find_map(|k| known.get(*k).and_then(Value::as_str))
            .unwrap_or("Unknown")
            .to_string();
    }
    if actor.pointer("/user/unknownUser").is_some() {
        return "Anonymous User".to_string();
    }
    if actor.get("system").is_some() {
        return "System".to_string();
    }
    "Unknown".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_doc_id_from_url() {
        assert_eq!(
            extract_doc_id("https://docs.google.com/document/d/1AbC-d_E/edit#heading=h.1"),
            Some("1AbC-d_E")
        );
        assert_eq!(extract_doc_id("https://docs.google.com/document/"), None);
        assert_eq!(extract_doc_id("https://example.com/d/"), None);
    }

    #[test]
    fn unknown_action_passes_through() {
        assert_eq!(describe_action("permissionChange"), "Permissions Changed");
        assert_eq!(describe_action("dlpChange"), "dlpChange");
    }

    #[test]
    fn walks_nested_structure_for_suggestions() {
        let doc = json!({
            "body": { "content": [
                { "paragraph": { "elements": [
                    { "textRun": { "content": "plain" } },
                    { "textRun": { "content": "added", "suggestedInsertionIds": ["s1"] } }
                ]}},
                { "table": { "tableRows": [ { "tableCells": [ { "content": [
                    { "paragraph": { "elements": [
                        { "textRun": { "content": "gone", "suggestedDeletionIds": ["s2"] } }
                    ]}}
                ]}]}]}}
            ]}
        });

        let changes = collect_suggestions(&doc, "rev9");
        assert_eq!(
            changes,
            vec![
                DocChange::Suggestion {
                    text: "added".to_string(),
                    suggested_by: "Unknown".to_string(),
                    revision_id: "rev9".to_string(),
                },
                DocChange::Deletion {
                    text: "gone".to_string(),
                    suggested_by: "Unknown".to_string(),
                    revision_id: "rev9".to_string(),
                },
            ]
        );
    }

    #[test]
    fn latest_activity_maps_first_entry() {
        let response = json!({ "activities": [
            {
                "primaryActionDetail": { "edit": {} },
                "actors": [ { "user": { "knownUser": { "personName": "people/123" } } } ],
                "targets": [ { "driveItem": { "title": "Roadmap" } } ],
                "timestamp": "2024-03-05T20:00:00Z"
            },
            { "primaryActionDetail": { "comment": {} } }
        ]});

        let change = latest_activity(&response, "rev1", 330).unwrap();
        assert_eq!(
            change,
            DocChange::Activity {
                action: "Document Edited".to_string(),
                actor: "people/123".to_string(),
                target: "Roadmap".to_string(),
                utc_time: "2024-03-05T20:00:00Z".to_string(),
                local_time: "06/03/2024, 01:30:00".to_string(),
                revision_id: "rev1".to_string(),
            }
        );
    }

    #[test]
    fn anonymous_and_system_actors() {
        assert_eq!(actor_name(&json!({"user": {"unknownUser": {}}})), "Anonymous User");
        assert_eq!(actor_name(&json!({"system": {}})), "System");
        assert_eq!(actor_name(&json!({})), "Unknown");
    }

    #[test]
    fn no_activities_yields_none() {
        assert!(latest_activity(&json!({}), "r", 0).is_none());
        assert!(latest_activity(&json!({"activities": []}), "r", 0).is_none());
    }

    #[test]
    fn serializes_with_type_tag() {
        let value = serde_json::to_value(DocChange::Deletion {
            text: "x".to_string(),
            suggested_by: "Unknown".to_string(),
            revision_id: "r".to_string(),
        })
        .unwrap();
        assert_eq!(value["type"], "deletion");
        assert_eq!(value["suggestedBy"], "Unknown");
    }
}
