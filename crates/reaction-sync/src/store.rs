//! In-memory reaction state, keyed by subject id.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Display name used when the backend row carries no profile data.
pub const FALLBACK_DISPLAY_NAME: &str = "A community member";

/// One actor's reaction record on a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionEntry {
    pub id: String,
    pub subject_id: String,
    pub actor_id: String,
    pub created_at: DateTime<Utc>,
    pub actor_display_name: String,
}

/// Locally known reaction state for one subject.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReactionState {
    pub is_open: bool,
    pub entries: Vec<ReactionEntry>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub liked_by_me: bool,
    pub count: u64,
}

/// Shallow-merge patch against one subject's state. `None` fields are left
/// untouched; `error` is doubly optional so a patch can clear it.
#[derive(Debug, Clone, Default)]
pub struct StatePatch {
    pub is_open: Option<bool>,
    pub entries: Option<Vec<ReactionEntry>>,
    pub is_loading: Option<bool>,
    pub error: Option<Option<String>>,
    pub liked_by_me: Option<bool>,
    pub count: Option<u64>,
}

/// Map from subject id to reaction state. Entries are created lazily on
/// first access and never evicted for the life of the process. The engine
/// is the only writer; readers get defaults for unknown subjects and no
/// store operation can fail.
#[derive(Debug, Default)]
pub struct ReactionStore {
    states: HashMap<String, ReactionState>,
}

impl ReactionStore {
    #[must_use]
    pub fn liked_by_me(&self, subject_id: &str) -> bool {
        self.states
            .get(subject_id)
            .is_some_and(|state| state.liked_by_me)
    }

    #[must_use]
    pub fn count(&self, subject_id: &str) -> u64 {
        self.states
            .get(subject_id)
            .map_or(0, |state| state.count)
    }

    #[must_use]
    pub fn is_open(&self, subject_id: &str) -> bool {
        self.states
            .get(subject_id)
            .is_some_and(|state| state.is_open)
    }

    /// Full state for a subject, defaulted when the subject is unknown.
    #[must_use]
    pub fn snapshot(&self, subject_id: &str) -> ReactionState {
        self.states.get(subject_id).cloned().unwrap_or_default()
    }

    /// Subjects whose detail panel is currently open, sorted for stable
    /// iteration. The polling fallback refreshes exactly this set.
    #[must_use]
    pub fn open_subjects(&self) -> Vec<String> {
        let mut subjects = self
            .states
            .iter()
            .filter(|(_, state)| state.is_open)
            .map(|(subject_id, _)| subject_id.clone())
            .collect::<Vec<_>>();
        subjects.sort();
        subjects
    }

    /// The single mutation point. Applies a shallow merge against the
    /// existing entry, or against a default entry for a new subject, in one
    /// synchronous step.
    pub(crate) fn patch(&mut self, subject_id: &str, patch: StatePatch) {
        let state = self.states.entry(subject_id.to_string()).or_default();
        if let Some(is_open) = patch.is_open {
            state.is_open = is_open;
        }
        if let Some(entries) = patch.entries {
            state.entries = entries;
        }
        if let Some(is_loading) = patch.is_loading {
            state.is_loading = is_loading;
        }
        if let Some(error) = patch.error {
            state.error = error;
        }
        if let Some(liked_by_me) = patch.liked_by_me {
            state.liked_by_me = liked_by_me;
        }
        if let Some(count) = patch.count {
            state.count = count;
        }
    }
}
