//! Stream transport seam and the WebSocket implementation.
//!
//! The bridge supervises any [`StreamTransport`]; the production transport
//! holds a WebSocket open, sends one subscribe frame for the reaction
//! topic, and forwards decoded change events from a background read loop.
//! Malformed frames are logged and dropped; transport-level read errors
//! end the stream so the supervisor can react.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reaction_sync::ChangeEvent;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};
use url::Url;

use crate::error::{BridgeError, Result};
use crate::wire::decode_change_frame;

/// An attached change stream. `None` means the stream ended cleanly.
#[async_trait]
pub trait ChangeStream: Send {
    async fn next_event(&mut self) -> Option<Result<ChangeEvent>>;
}

/// Something the bridge can attach a change stream through.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn ChangeStream>>;
}

/// WebSocket transport configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebSocketConfig {
    pub connect_timeout: Duration,
    /// Topic named in the subscribe frame, e.g. `"reactions"`.
    pub topic: String,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            topic: "reactions".to_string(),
        }
    }
}

/// WebSocket-backed [`StreamTransport`].
pub struct WebSocketTransport {
    url: Url,
    config: WebSocketConfig,
}

impl WebSocketTransport {
    pub fn new(url: &str, config: WebSocketConfig) -> Result<Self> {
        let parsed_url = Url::parse(url)?;
        if parsed_url.scheme() != "ws" && parsed_url.scheme() != "wss" {
            return Err(BridgeError::InvalidUrl(format!(
                "URL must use ws:// or wss:// scheme, got: {}",
                parsed_url.scheme()
            )));
        }
        Ok(Self {
            url: parsed_url,
            config,
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        self.url.as_str()
    }
}

#[async_trait]
impl StreamTransport for WebSocketTransport {
    async fn connect(&self) -> Result<Box<dyn ChangeStream>> {
        let (stream, _response) = timeout(
            self.config.connect_timeout,
            connect_async(self.url.as_str()),
        )
        .await
        .map_err(|_| BridgeError::Timeout(self.config.connect_timeout))?
        .map_err(|error| BridgeError::WebSocket(error.to_string()))?;

        let (mut writer, mut reader) = stream.split();
        let subscribe = serde_json::to_string(&json!({
            "action": "subscribe",
            "topic": self.config.topic,
        }))?;
        writer
            .send(Message::Text(subscribe.into()))
            .await
            .map_err(|error| BridgeError::WebSocket(error.to_string()))?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let stream_url = self.url.to_string();
        let task = tokio::spawn(async move {
            while let Some(frame) = reader.next().await {
                match frame {
                    Ok(Message::Text(text)) => match decode_change_frame(text.as_str()) {
                        Ok(Some(event)) => {
                            if event_tx.send(Ok(event)).is_err() {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(error) => {
                            warn!("dropping malformed frame from {}: {}", stream_url, error);
                        }
                    },
                    Ok(Message::Ping(payload)) => {
                        debug!("received ping from {} ({} bytes)", stream_url, payload.len());
                    }
                    Ok(Message::Pong(_) | Message::Binary(_) | Message::Frame(_)) => {}
                    Ok(Message::Close(_)) => break,
                    Err(error) => {
                        warn!("websocket read error on {}: {}", stream_url, error);
                        let _ = event_tx.send(Err(BridgeError::WebSocket(error.to_string())));
                        break;
                    }
                }
            }
        });

        Ok(Box::new(WebSocketChangeStream {
            events: event_rx,
            read_task: task,
        }))
    }
}

struct WebSocketChangeStream {
    events: mpsc::UnboundedReceiver<Result<ChangeEvent>>,
    read_task: tokio::task::JoinHandle<()>,
}

#[async_trait]
impl ChangeStream for WebSocketChangeStream {
    async fn next_event(&mut self) -> Option<Result<ChangeEvent>> {
        self.events.recv().await
    }
}

impl Drop for WebSocketChangeStream {
    fn drop(&mut self) {
        self.read_task.abort();
    }
}
