//! Push-bridge supervision.
//!
//! Drives the `Disconnected -> Connecting -> Streaming` lifecycle over any
//! [`StreamTransport`], forwarding accepted events into the engine. Stream
//! failures feed the circuit breaker; while the breaker is open the bridge
//! degrades to polling the open subjects until the cooldown grants a probe
//! reconnect.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use reaction_sync::ReactionEngine;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::breaker::{BreakerConfig, CircuitBreaker};
use crate::transport::StreamTransport;

/// Bridge lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BridgeState {
    #[default]
    Disconnected,
    Connecting,
    Streaming,
    DegradedPolling,
}

impl BridgeState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::DegradedPolling => "degraded_polling",
        }
    }
}

/// Bridge tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub breaker: BreakerConfig,
    /// Interval between open-subject refreshes while degraded.
    pub poll_interval: Duration,
    /// Delay before re-attaching after a failure that has not yet opened
    /// the breaker.
    pub reconnect_delay: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            breaker: BreakerConfig::default(),
            poll_interval: Duration::from_secs(5),
            reconnect_delay: Duration::from_millis(250),
        }
    }
}

/// Point-in-time bridge health, for status surfaces. `DegradedPolling` is
/// reported here rather than as a per-operation error.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BridgeHealth {
    pub state: BridgeState,
    pub connect_attempts: u32,
    pub consecutive_failures: u32,
    pub breaker_open: bool,
    pub last_error: Option<String>,
}

/// Supervises one change stream on behalf of one engine.
pub struct PushBridge {
    engine: ReactionEngine,
    transport: Arc<dyn StreamTransport>,
    config: BridgeConfig,
    breaker: Mutex<CircuitBreaker>,
    health: Mutex<BridgeHealth>,
}

impl PushBridge {
    pub fn new(
        engine: ReactionEngine,
        transport: Arc<dyn StreamTransport>,
        config: BridgeConfig,
    ) -> Self {
        let breaker = CircuitBreaker::new(config.breaker);
        Self {
            engine,
            transport,
            config,
            breaker: Mutex::new(breaker),
            health: Mutex::new(BridgeHealth::default()),
        }
    }

    /// Current bridge health snapshot.
    #[must_use]
    pub fn status(&self) -> BridgeHealth {
        self.lock_health().clone()
    }

    /// Runs the bridge until the owning task is dropped or aborted.
    pub async fn run(&self) {
        loop {
            let attempt_allowed = self.lock_breaker().allow_attempt(Instant::now());
            if attempt_allowed {
                self.attach_and_stream().await;
                if !self.lock_breaker().is_open() {
                    sleep(self.config.reconnect_delay).await;
                }
            } else {
                self.set_state(BridgeState::DegradedPolling);
                self.poll_open_subjects().await;
                sleep(self.config.poll_interval).await;
            }
        }
    }

    /// Refreshes every open subject once, skipping no-op patches. Returns
    /// how many subjects actually changed.
    pub async fn poll_open_subjects(&self) -> usize {
        let mut patched = 0;
        for subject_id in self.engine.open_subjects() {
            match self.engine.poll_refresh(&subject_id).await {
                Ok(true) => patched += 1,
                Ok(false) => {}
                Err(error) => debug!("poll refresh failed for {subject_id}: {error}"),
            }
        }
        patched
    }

    async fn attach_and_stream(&self) {
        self.set_state(BridgeState::Connecting);
        {
            let mut health = self.lock_health();
            health.connect_attempts = health.connect_attempts.saturating_add(1);
        }

        let mut stream = match self.transport.connect().await {
            Ok(stream) => stream,
            Err(error) => {
                self.note_failure(&error.to_string());
                return;
            }
        };

        self.lock_breaker().record_success();
        {
            let mut health = self.lock_health();
            health.state = BridgeState::Streaming;
            health.consecutive_failures = 0;
            health.breaker_open = false;
            health.last_error = None;
        }
        info!("change stream attached");

        loop {
            match stream.next_event().await {
                Some(Ok(event)) => self.engine.merge_change(event).await,
                Some(Err(error)) => {
                    self.note_failure(&error.to_string());
                    return;
                }
                None => {
                    self.note_failure("stream closed");
                    return;
                }
            }
        }
    }

    fn note_failure(&self, error: &str) {
        let (consecutive_failures, breaker_open) = {
            let mut breaker = self.lock_breaker();
            breaker.record_failure(Instant::now());
            (breaker.consecutive_failures(), breaker.is_open())
        };
        warn!(
            "change stream failure ({consecutive_failures} consecutive, breaker_open={breaker_open}): {error}"
        );
        let mut health = self.lock_health();
        health.state = BridgeState::Disconnected;
        health.consecutive_failures = consecutive_failures;
        health.breaker_open = breaker_open;
        health.last_error = Some(error.to_string());
    }

    fn set_state(&self, state: BridgeState) {
        self.lock_health().state = state;
    }

    fn lock_breaker(&self) -> MutexGuard<'_, CircuitBreaker> {
        self.breaker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_health(&self) -> MutexGuard<'_, BridgeHealth> {
        self.health
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
