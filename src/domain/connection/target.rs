//! Resolution of the various ways callers name a connection.
//!
//! Room and emit operations accept a connection, its id, a raw id string,
//! or the request that originated on it. Each form resolves to a single
//! [`ConnectionId`] here, once, instead of being inspected at every call
//! site.

use std::sync::Arc;

use crate::domain::bridge::CanonicalRequest;
use crate::domain::foundation::ConnectionId;

use super::Connection;

/// Anything that identifies a connection on this node.
pub trait ConnectionTarget {
    fn into_connection_id(self) -> ConnectionId;
}

impl ConnectionTarget for ConnectionId {
    fn into_connection_id(self) -> ConnectionId {
        self
    }
}

impl ConnectionTarget for &ConnectionId {
    fn into_connection_id(self) -> ConnectionId {
        self.clone()
    }
}

impl ConnectionTarget for &str {
    fn into_connection_id(self) -> ConnectionId {
        ConnectionId::from(self)
    }
}

impl ConnectionTarget for String {
    fn into_connection_id(self) -> ConnectionId {
        ConnectionId::from(self)
    }
}

impl ConnectionTarget for &Connection {
    fn into_connection_id(self) -> ConnectionId {
        self.id().clone()
    }
}

impl ConnectionTarget for &Arc<Connection> {
    fn into_connection_id(self) -> ConnectionId {
        self.id().clone()
    }
}

impl ConnectionTarget for &CanonicalRequest {
    fn into_connection_id(self) -> ConnectionId {
        self.connection_id.clone()
    }
}

/// Resolves a batch of targets, preserving order and dropping duplicates.
pub fn resolve_targets<I, T>(targets: I) -> Vec<ConnectionId>
where
    I: IntoIterator<Item = T>,
    T: ConnectionTarget,
{
    let mut resolved: Vec<ConnectionId> = Vec::new();
    for target in targets {
        let id = target.into_connection_id();
        if !resolved.contains(&id) {
            resolved.push(id);
        }
    }
    resolved
}
