//! Core error types.

use thiserror::Error;

/// Reaction-layer error type.
#[derive(Debug, Error)]
pub enum ReactionError {
    #[error("invalid subject id: {0}")]
    InvalidSubjectId(String),

    #[error("operation requires an authenticated actor")]
    Unauthenticated,

    #[error("remote call failed: {0}")]
    Remote(String),

    #[error("remote call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("invalid gateway base url: {0}")]
    InvalidBaseUrl(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Reaction-layer result type.
pub type Result<T> = std::result::Result<T, ReactionError>;
