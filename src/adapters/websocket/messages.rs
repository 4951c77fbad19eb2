//! WebSocket wire protocol.
//!
//! Client → server, one JSON object per text frame:
//!
//! ```json
//! {"method": "get", "url": "/items", "params": {"id": 1}, "ack": 7}
//! ```
//!
//! `ack` is optional; when present the reply comes back as
//! `{"type": "ack", "ack": 7, "body": ...}`. Server → client frames are
//! [`OutboundMessage`] values tagged by `type`.

use std::sync::Arc;

use serde_json::Value;

use crate::domain::bridge::{Completion, FrameCallback, ParseError};
use crate::domain::connection::{Connection, OutboundMessage};

/// The `ack` field of a client frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckField {
    Absent,
    Id(u64),
    /// Present but not an unsigned integer.
    Invalid(String),
}

/// A decoded client frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientFrame {
    pub method: String,
    pub ack: AckField,
    /// Remaining fields (`url`, `params`, `data`, `headers`).
    pub payload: Value,
}

impl ClientFrame {
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let value: Value = serde_json::from_str(text).map_err(|_| ParseError::NotAnObject)?;
        let Value::Object(mut fields) = value else {
            return Err(ParseError::NotAnObject);
        };

        let method = match fields.remove("method") {
            Some(Value::String(method)) => method,
            Some(other) => return Err(ParseError::UnknownMethod(other.to_string())),
            None => return Err(ParseError::UnknownMethod(String::new())),
        };

        let ack = match fields.remove("ack") {
            None | Some(Value::Null) => AckField::Absent,
            Some(v) => match v.as_u64() {
                Some(id) => AckField::Id(id),
                None => AckField::Invalid(format!("ack must be an unsigned integer, got {v}")),
            },
        };

        Ok(Self {
            method,
            ack,
            payload: Value::Object(fields),
        })
    }

    /// Callback that writes the reply back on `connection`.
    pub fn callback(&self, connection: &Arc<Connection>) -> FrameCallback {
        match &self.ack {
            AckField::Absent => FrameCallback::Absent,
            AckField::Invalid(reason) => FrameCallback::Malformed(reason.clone()),
            AckField::Id(ack) => {
                let ack = *ack;
                let connection = Arc::clone(connection);
                FrameCallback::Present(Completion::new(move |body| {
                    if !connection.send(OutboundMessage::Ack { ack, body }) {
                        tracing::debug!(connection_id = %connection.id(), ack, "reply dropped");
                    }
                }))
            }
        }
    }
}

/// Serialize a server frame.
pub fn encode(message: &OutboundMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(message)
}
