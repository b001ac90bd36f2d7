//! Typed change events delivered by the push bridge.

use crate::store::ReactionEntry;

/// Row-change operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

impl ChangeOp {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// One reaction-row change on a subject. Inserts and updates carry the full
/// row; deletes may carry only the row id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub op: ChangeOp,
    pub subject_id: String,
    pub entry_id: String,
    pub entry: Option<ReactionEntry>,
}
