//! Bridge error types.

use thiserror::Error;

/// Push-bridge error type.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("invalid stream URL: {0}")]
    InvalidUrl(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("connect timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("malformed change frame: {0}")]
    Decode(String),

    #[error("stream closed")]
    Closed,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

/// Push-bridge result type.
pub type Result<T> = std::result::Result<T, BridgeError>;
