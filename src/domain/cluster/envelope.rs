//! Wire envelope carried on the shared cluster channel.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::foundation::NodeId;
use crate::domain::room::{LeaveAllOptions, MembershipMutation};

pub const JOIN_EVENT: &str = "join";
pub const LEAVE_EVENT: &str = "leave";
pub const LEAVE_ALL_EVENT: &str = "leaveAll";

/// Errors decoding or interpreting a cluster message.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("Undeserializable cluster message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Invalid payload for '{event}' message: {reason}")]
    InvalidPayload { event: String, reason: String },
}

/// Event kind of a cluster message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterEventKind {
    Join,
    Leave,
    LeaveAll,
    /// Application-defined event name.
    Custom(String),
}

impl ClusterEventKind {
    pub fn parse(event: &str) -> Self {
        match event {
            JOIN_EVENT => ClusterEventKind::Join,
            LEAVE_EVENT => ClusterEventKind::Leave,
            LEAVE_ALL_EVENT => ClusterEventKind::LeaveAll,
            other => ClusterEventKind::Custom(other.to_string()),
        }
    }

    pub fn is_membership(&self) -> bool {
        !matches!(self, ClusterEventKind::Custom(_))
    }
}

/// The unit published on the shared bus.
///
/// `origin_id` is present only on suppressed sends; its absence marks an
/// unsuppressed send that every node applies, the sender included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_id: Option<NodeId>,
    pub event: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Payload shape shared by the membership event kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipPayload {
    pub source_room: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dest_rooms: Vec<String>,
    #[serde(default)]
    pub options: LeaveAllOptions,
}

impl ClusterMessage {
    /// Suppressed message stamped with the sending node's id.
    pub fn suppressed(origin: NodeId, event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            origin_id: Some(origin),
            event: event.into(),
            payload,
        }
    }

    /// Unsuppressed message without an origin id.
    pub fn unsuppressed(event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            origin_id: None,
            event: event.into(),
            payload,
        }
    }

    /// Builds the suppressed message mirroring a local membership mutation.
    pub fn from_mutation(origin: NodeId, mutation: &MembershipMutation) -> Self {
        let (event, payload) = match mutation {
            MembershipMutation::AddMembers {
                source_room,
                dest_rooms,
            } => (
                JOIN_EVENT,
                MembershipPayload {
                    source_room: source_room.clone(),
                    dest_rooms: dest_rooms.clone(),
                    options: LeaveAllOptions::default(),
                },
            ),
            MembershipMutation::RemoveMembers {
                source_room,
                dest_rooms,
            } => (
                LEAVE_EVENT,
                MembershipPayload {
                    source_room: source_room.clone(),
                    dest_rooms: dest_rooms.clone(),
                    options: LeaveAllOptions::default(),
                },
            ),
            MembershipMutation::LeaveAll {
                source_room,
                options,
            } => (
                LEAVE_ALL_EVENT,
                MembershipPayload {
                    source_room: source_room.clone(),
                    dest_rooms: Vec::new(),
                    options: *options,
                },
            ),
        };
        // A struct of strings and bools always serializes.
        let payload = serde_json::to_value(payload).unwrap_or_default();
        Self::suppressed(origin, event, payload)
    }

    pub fn kind(&self) -> ClusterEventKind {
        ClusterEventKind::parse(&self.event)
    }

    /// Interprets a membership message as a registry mutation.
    ///
    /// Returns `Ok(None)` for application-defined events.
    pub fn to_mutation(&self) -> Result<Option<MembershipMutation>, EnvelopeError> {
        let kind = self.kind();
        if !kind.is_membership() {
            return Ok(None);
        }

        let payload: MembershipPayload =
            serde_json::from_value(self.payload.clone()).map_err(|e| {
                EnvelopeError::InvalidPayload {
                    event: self.event.clone(),
                    reason: e.to_string(),
                }
            })?;

        if payload.source_room.is_empty() {
            return Err(EnvelopeError::InvalidPayload {
                event: self.event.clone(),
                reason: "sourceRoom cannot be empty".to_string(),
            });
        }

        let mutation = match kind {
            ClusterEventKind::Join => MembershipMutation::AddMembers {
                source_room: payload.source_room,
                dest_rooms: payload.dest_rooms,
            },
            ClusterEventKind::Leave => MembershipMutation::RemoveMembers {
                source_room: payload.source_room,
                dest_rooms: payload.dest_rooms,
            },
            ClusterEventKind::LeaveAll => MembershipMutation::LeaveAll {
                source_room: payload.source_room,
                options: payload.options,
            },
            ClusterEventKind::Custom(_) => return Ok(None),
        };
        Ok(Some(mutation))
    }

    pub fn encode(&self) -> Result<Vec<u8>, EnvelopeError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
