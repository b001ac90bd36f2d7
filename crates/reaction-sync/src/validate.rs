//! Subject-id validation guard.
//!
//! Every public engine operation validates its subject id here before any
//! network call or store mutation happens. Only the canonical hyphenated
//! UUID form (8-4-4-4-12 hex groups) is accepted; `uuid`'s parser alone is
//! not enough because it also admits simple, braced, and urn forms.

use uuid::Uuid;

const CANONICAL_LEN: usize = 36;
const HYPHEN_POSITIONS: [usize; 4] = [8, 13, 18, 23];

/// Returns true iff `value` is a canonical hyphenated UUID.
#[must_use]
pub fn is_valid_subject_id(value: &str) -> bool {
    if value.len() != CANONICAL_LEN {
        return false;
    }
    for (index, byte) in value.bytes().enumerate() {
        let expect_hyphen = HYPHEN_POSITIONS.contains(&index);
        if expect_hyphen != (byte == b'-') {
            return false;
        }
        if !expect_hyphen && !byte.is_ascii_hexdigit() {
            return false;
        }
    }
    Uuid::try_parse(value).is_ok()
}

/// Human-readable diagnostic for an invalid subject id. Logging only, never
/// used for control flow.
#[must_use]
pub fn explain_invalid(value: &str) -> String {
    if value.is_empty() {
        return "subject id is empty".to_string();
    }
    if value.len() != CANONICAL_LEN {
        return format!(
            "subject id has length {}, expected {CANONICAL_LEN}",
            value.len()
        );
    }
    for position in HYPHEN_POSITIONS {
        if value.as_bytes().get(position) != Some(&b'-') {
            return format!("subject id missing hyphen at position {position}");
        }
    }
    if let Some((index, _)) = value
        .bytes()
        .enumerate()
        .find(|(index, byte)| !HYPHEN_POSITIONS.contains(index) && !byte.is_ascii_hexdigit())
    {
        return format!("subject id has non-hex character at position {index}");
    }
    match Uuid::try_parse(value) {
        Ok(_) => "subject id is valid".to_string(),
        Err(error) => format!("subject id failed uuid parse: {error}"),
    }
}
