//! Wire-frame decoding for the change-notification stream.
//!
//! The backend pushes row changes as JSON objects tagged with the change
//! kind and carrying the affected row. Deletes only carry the old row's
//! key columns. Heartbeats and unknown frame kinds decode to `None` so the
//! read loop can skip them without treating them as failures.

use reaction_sync::{ChangeEvent, ChangeOp, map_reaction_row};
use serde_json::Value;

use crate::error::{BridgeError, Result};

/// Decodes one text frame. `Ok(None)` means the frame is valid but carries
/// no row change (heartbeat, subscription ack, unknown kind).
pub fn decode_change_frame(text: &str) -> Result<Option<ChangeEvent>> {
    let value: Value = serde_json::from_str(text)?;
    let frame = value
        .as_object()
        .ok_or_else(|| BridgeError::Decode("expected a JSON object frame".to_string()))?;

    let kind = frame
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| BridgeError::Decode("missing frame type".to_string()))?;

    let op = match kind {
        "INSERT" => ChangeOp::Insert,
        "UPDATE" => ChangeOp::Update,
        "DELETE" => ChangeOp::Delete,
        _ => return Ok(None),
    };

    if op == ChangeOp::Delete {
        let old_record = frame
            .get("old_record")
            .and_then(Value::as_object)
            .ok_or_else(|| BridgeError::Decode("DELETE frame missing old_record".to_string()))?;
        let entry_id = required_string(old_record, "id")?;
        let subject_id = required_string(old_record, "subject_id")?;
        return Ok(Some(ChangeEvent {
            op,
            subject_id,
            entry_id,
            entry: None,
        }));
    }

    let record = frame
        .get("record")
        .ok_or_else(|| BridgeError::Decode(format!("{kind} frame missing record")))?;
    let entry = map_reaction_row(record)
        .ok_or_else(|| BridgeError::Decode(format!("{kind} record missing required fields")))?;
    Ok(Some(ChangeEvent {
        op,
        subject_id: entry.subject_id.clone(),
        entry_id: entry.id.clone(),
        entry: Some(entry),
    }))
}

fn required_string(record: &serde_json::Map<String, Value>, field: &str) -> Result<String> {
    record
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| BridgeError::Decode(format!("old_record missing {field}")))
}
