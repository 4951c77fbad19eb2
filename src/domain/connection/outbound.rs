//! Server → client messages queued on a connection.

use serde::Serialize;

/// Every message type the server writes to a connected client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Connection admitted and session bound.
    Connected {
        #[serde(rename = "connectionId")]
        connection_id: String,
        timestamp: String,
    },

    /// Named event delivered through a room broadcast or unicast.
    Event {
        event: String,
        data: serde_json::Value,
    },

    /// Reply to a request frame that carried an acknowledgement id.
    Ack { ack: u64, body: serde_json::Value },

    /// Error not tied to any acknowledgement.
    Error { code: String, message: String },
}

impl OutboundMessage {
    /// Convenience constructor for event deliveries.
    pub fn event(event: impl Into<String>, data: serde_json::Value) -> Self {
        OutboundMessage::Event {
            event: event.into(),
            data,
        }
    }
}
