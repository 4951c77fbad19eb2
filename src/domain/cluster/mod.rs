//! Cluster module - messages exchanged between nodes over the shared bus.

mod envelope;

pub use envelope::{
    ClusterEventKind, ClusterMessage, EnvelopeError, MembershipPayload, JOIN_EVENT,
    LEAVE_ALL_EVENT, LEAVE_EVENT,
};
