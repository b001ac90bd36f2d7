//! Change-notification delivery for the reaction engine.
//!
//! This crate keeps the engine fed without the engine knowing how events
//! arrive:
//! - a WebSocket stream transport forwarding decoded row changes
//! - a circuit breaker that stops hammering a failing stream
//! - a polling fallback that refreshes open subjects while degraded

pub mod breaker;
pub mod bridge;
pub mod error;
pub mod transport;
pub mod wire;

pub use breaker::{BreakerConfig, CircuitBreaker};
pub use bridge::{BridgeConfig, BridgeHealth, BridgeState, PushBridge};
pub use error::{BridgeError, Result};
pub use transport::{ChangeStream, StreamTransport, WebSocketConfig, WebSocketTransport};
pub use wire::decode_change_frame;
