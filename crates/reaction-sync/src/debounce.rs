//! Per-subject toggle damping.
//!
//! Concurrent toggles on one subject are not serialized by the engine; the
//! last authoritative response wins. UI callers damp rapid repeat clicks
//! with this guard. It is a usability control, not a correctness one.

use std::collections::HashMap;
use std::time::{Duration, Instant};

pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(400);

/// Tracks the last accepted toggle per subject and rejects attempts that
/// arrive inside the configured minimum interval.
#[derive(Debug)]
pub struct ToggleDebounce {
    min_interval: Duration,
    last_accepted: HashMap<String, Instant>,
}

impl Default for ToggleDebounce {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INTERVAL)
    }
}

impl ToggleDebounce {
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_accepted: HashMap::new(),
        }
    }

    /// Returns true when the attempt should go through, recording it as the
    /// subject's latest accepted toggle.
    pub fn should_accept(&mut self, subject_id: &str, now: Instant) -> bool {
        match self.last_accepted.get(subject_id) {
            Some(last) if now.saturating_duration_since(*last) < self.min_interval => false,
            _ => {
                self.last_accepted.insert(subject_id.to_string(), now);
                true
            }
        }
    }
}
