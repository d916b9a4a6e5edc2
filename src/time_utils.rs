// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting.

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Render an RFC3339 timestamp as `dd/mm/yyyy, HH:MM:SS` at a fixed offset.
///
/// Unparseable input is returned unchanged.
pub fn to_display_time(timestamp: &str, offset_minutes: i32) -> String {
    let Some(offset) = FixedOffset::east_opt(offset_minutes * 60) else {
        return timestamp.to_string();
    };
    match DateTime::parse_from_rfc3339(timestamp) {
        Ok(t) => t
            .with_timezone(&offset)
            .format("%d/%m/%Y, %H:%M:%S")
            .to_string(),
        Err(_) => timestamp.to_string(),
    }
}
