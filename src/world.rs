//! World bridge: inbound environment events and outbound chat.
//!
//! The actor does not speak any game protocol itself. A bridge process
//! translates the environment into a small JSON envelope stream over a
//! websocket: inbound `{"type":"chat","sender":…,"text":…}`, `{"type":
//! "spawn"}`, `{"type":"death","message":…}`, `{"type":"kicked","reason":…}`;
//! outbound `{"type":"say","text":…}`. A closed stream becomes a
//! `Disconnected` event, which is terminal for the actor.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldEvent {
    Chat { sender: String, text: String },
    Joined,
    Died { message: String },
    Kicked { reason: String },
    Disconnected { reason: String },
}

/// Outbound side of the environment connection.
#[async_trait]
pub trait WorldLink: Send + Sync {
    async fn say(&self, text: &str) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    sender: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

fn parse_world_event(raw: &str) -> Option<WorldEvent> {
    let envelope: Envelope = match serde_json::from_str(raw) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::debug!("Ignoring malformed world envelope: {}", e);
            return None;
        }
    };

    match envelope.kind.as_str() {
        "chat" => Some(WorldEvent::Chat {
            sender: envelope.sender?,
            text: envelope.text?,
        }),
        "spawn" => Some(WorldEvent::Joined),
        "death" => Some(WorldEvent::Died {
            message: envelope.message.unwrap_or_default(),
        }),
        "kicked" => Some(WorldEvent::Kicked {
            reason: envelope.reason.unwrap_or_default(),
        }),
        "disconnect" => Some(WorldEvent::Disconnected {
            reason: envelope.reason.unwrap_or_default(),
        }),
        other => {
            tracing::debug!("Ignoring unknown world event type '{}'", other);
            None
        }
    }
}

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Websocket world connection. Reading happens on a spawned task that feeds
/// the returned event channel; writing goes through `say`.
pub struct RemoteWorld {
    sink: Mutex<WsSink>,
}

impl RemoteWorld {
    pub async fn connect(url: &str) -> Result<(Arc<Self>, flume::Receiver<WorldEvent>)> {
        let (stream, _) = connect_async(url)
            .await
            .with_context(|| format!("Failed to connect to world bridge at {}", url))?;
        let (sink, mut read) = stream.split();
        let (tx, rx) = flume::unbounded();

        tokio::spawn(async move {
            while let Some(message) = read.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        if let Some(event) = parse_world_event(&text) {
                            let _ = tx.send(event);
                        }
                    }
                    Ok(Message::Binary(bytes)) => {
                        if let Ok(text) = String::from_utf8(bytes.to_vec()) {
                            if let Some(event) = parse_world_event(&text) {
                                let _ = tx.send(event);
                            }
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                    Err(e) => {
                        tracing::warn!("World bridge read error: {}", e);
                        break;
                    }
                }
            }
            let _ = tx.send(WorldEvent::Disconnected {
                reason: "connection closed".to_string(),
            });
        });

        Ok((Arc::new(Self { sink: Mutex::new(sink) }), rx))
    }
}

#[async_trait]
impl WorldLink for RemoteWorld {
    async fn say(&self, text: &str) -> Result<()> {
        let payload = serde_json::json!({ "type": "say", "text": text });
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(payload.to_string()))
            .await
            .context("Failed to send chat to world bridge")
    }
}
