//! Remote data gateway seam.
//!
//! The engine talks to the hosted backend only through [`ReactionGateway`].
//! Row payloads coming back from the backend are duck-typed JSON with
//! optional nested profile fields; [`map_reaction_row`] is the single
//! boundary where partial rows are tolerated, so everything past it works
//! with fully populated entries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::store::{FALLBACK_DISPLAY_NAME, ReactionEntry};

/// Authoritative result of a toggle call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleResponse {
    pub success: bool,
    pub liked_by_me: bool,
    pub count: u64,
}

/// Request/response interface to the hosted relational backend.
#[async_trait]
pub trait ReactionGateway: Send + Sync {
    /// Toggles the actor's reaction on a subject and returns the
    /// authoritative post-toggle state.
    async fn toggle_reaction(&self, subject_id: &str, actor_id: &str) -> Result<ToggleResponse>;

    /// Total reaction count for a subject.
    async fn reaction_count(&self, subject_id: &str) -> Result<u64>;

    /// Whether the given actor currently has an active reaction.
    async fn my_reaction_status(&self, subject_id: &str, actor_id: &str) -> Result<bool>;

    /// All reaction rows for a subject.
    async fn list_reactions(&self, subject_id: &str) -> Result<Vec<ReactionEntry>>;
}

/// Maps one backend row into a fully populated entry. Rows missing any of
/// the required identifiers are dropped (logged at debug level); a missing
/// nested profile falls back to the placeholder display name and a missing
/// timestamp falls back to the epoch.
#[must_use]
pub fn map_reaction_row(row: &Value) -> Option<ReactionEntry> {
    let id = required_string(row, "id")?;
    let subject_id = required_string(row, "subject_id")?;
    let actor_id = required_string(row, "actor_id")?;

    let created_at = row
        .get("created_at")
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map_or_else(|| DateTime::<Utc>::UNIX_EPOCH, |ts| ts.with_timezone(&Utc));

    let actor_display_name = row
        .pointer("/profiles/display_name")
        .or_else(|| row.get("actor_display_name"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(FALLBACK_DISPLAY_NAME)
        .to_string();

    Some(ReactionEntry {
        id,
        subject_id,
        actor_id,
        created_at,
        actor_display_name,
    })
}

/// Maps a list of backend rows, dropping the unusable ones.
#[must_use]
pub fn map_reaction_rows(rows: &[Value]) -> Vec<ReactionEntry> {
    rows.iter()
        .filter_map(|row| {
            let mapped = map_reaction_row(row);
            if mapped.is_none() {
                debug!("dropping reaction row missing required fields: {row}");
            }
            mapped
        })
        .collect()
}

fn required_string(row: &Value, field: &str) -> Option<String> {
    row.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
