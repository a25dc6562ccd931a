//! Wire frames for the relay's JSON WebSocket protocol.

use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};

use crate::ws::ConnectionSender;

/// Inbound message frame (client → server). Exactly one of the three
/// content fields must be populated; an empty string counts as absent.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct InboundFrame {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub audio_content: Option<String>,
    #[serde(default)]
    pub file_content: Option<String>,
}

impl InboundFrame {
    /// Number of populated content fields.
    pub fn populated_fields(&self) -> usize {
        [
            self.content.as_deref(),
            self.audio_content.as_deref(),
            self.file_content.as_deref(),
        ]
        .iter()
        .filter(|f| f.is_some_and(|s| !s.is_empty()))
        .count()
    }
}

/// Outbound chat event (server → every member of the group).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub message: Option<String>,
    pub sender: String,
    /// ISO-8601 timestamp assigned at the durable write.
    pub date_sent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
}

/// The only event type the relay currently emits.
pub const EVENT_CHAT_MESSAGE: &str = "chat_message";

impl ChatEvent {
    pub fn text(sender: &str, message: &str, date_sent: &str) -> Self {
        Self {
            event_type: EVENT_CHAT_MESSAGE.to_string(),
            message: Some(message.to_string()),
            sender: sender.to_string(),
            date_sent: date_sent.to_string(),
            audio_url: None,
            file_url: None,
        }
    }
}

/// Error frame, sent only to the originating connection. The connection
/// stays open.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorFrame {
    pub error: String,
}

/// Serialize and enqueue an event on one connection's channel.
pub fn send_event(tx: &ConnectionSender, event: &ChatEvent) {
    if let Ok(text) = serde_json::to_string(event) {
        let _ = tx.send(Message::Text(text.into()));
    }
}

/// Report a message-scoped failure to the originating connection.
pub fn send_error(tx: &ConnectionSender, error: &str) {
    let frame = ErrorFrame {
        error: error.to_string(),
    };
    if let Ok(text) = serde_json::to_string(&frame) {
        let _ = tx.send(Message::Text(text.into()));
    }
}
