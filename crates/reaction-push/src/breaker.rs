//! Stream circuit breaker.
//!
//! Counts consecutive stream failures; at the threshold the breaker opens
//! and the bridge stops attempting the stream for a cooldown window. Once
//! the cooldown elapses exactly one probe attempt is allowed; a probe
//! failure re-arms the cooldown and a success closes the breaker.

use std::time::{Duration, Instant};

/// Breaker tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 2,
            cooldown: Duration::from_secs(30),
        }
    }
}

/// Consecutive-failure circuit breaker. Callers pass `now` so the breaker
/// stays deterministic under test clocks.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            consecutive_failures: 0,
            opened_at: None,
        }
    }

    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.opened_at.is_some()
    }

    /// Records a stream failure, opening the breaker at the threshold.
    pub fn record_failure(&mut self, now: Instant) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.consecutive_failures >= self.config.failure_threshold.max(1) {
            self.opened_at = Some(now);
        }
    }

    /// Records a successful stream attach, closing the breaker and
    /// resetting the failure count.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.opened_at = None;
    }

    /// Whether a stream attempt may run now. While open, the first call
    /// after the cooldown elapses is granted as the single probe and
    /// re-arms the cooldown; further calls wait for the next window.
    pub fn allow_attempt(&mut self, now: Instant) -> bool {
        match self.opened_at {
            None => true,
            Some(opened_at) => {
                if now.saturating_duration_since(opened_at) >= self.config.cooldown {
                    self.opened_at = Some(now);
                    true
                } else {
                    false
                }
            }
        }
    }
}
