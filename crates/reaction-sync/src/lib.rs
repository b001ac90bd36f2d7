//! Client-side reaction state synchronization.
//!
//! This crate keeps a local, in-memory view of per-subject reaction state
//! (liked-by-me flag, total count, detail list) consistent with a hosted
//! relational backend:
//! - optimistic toggle with authoritative overwrite and rollback
//! - lazy detail loading with a cache-if-present open policy
//! - merge of asynchronously pushed row changes
//!
//! Delivery of pushed changes (WebSocket stream with a polling fallback)
//! lives in the companion `reaction-push` crate.

pub mod config;
pub mod debounce;
pub mod engine;
pub mod error;
pub mod events;
pub mod gateway;
pub mod http;
pub mod store;
pub mod validate;

pub use config::GatewayConfig;
pub use debounce::ToggleDebounce;
pub use engine::{ReactionEngine, ReactionEngineConfig, ToggleOutcome};
pub use error::{ReactionError, Result};
pub use events::{ChangeEvent, ChangeOp};
pub use gateway::{ReactionGateway, ToggleResponse, map_reaction_row, map_reaction_rows};
pub use http::HttpReactionGateway;
pub use store::{FALLBACK_DISPLAY_NAME, ReactionEntry, ReactionState, ReactionStore, StatePatch};
pub use validate::{explain_invalid, is_valid_subject_id};
