//! Session module - identity attached to connections.
//!
//! A session is owned by the external session store. Connections refer to
//! it by id only; several connections may share one session.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::foundation::SessionId;

/// Session identity plus opaque key/value payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    id: SessionId,
    #[serde(default)]
    data: Map<String, Value>,
    /// Synthesized for a single connection and never persisted by default.
    #[serde(default)]
    anonymous: bool,
}

impl Session {
    /// Creates an empty session bound to an existing id.
    pub fn empty(id: SessionId) -> Self {
        Self {
            id,
            data: Map::new(),
            anonymous: false,
        }
    }

    /// Creates an anonymous single-use session for a connection that
    /// carried no session token.
    pub fn anonymous(id: SessionId) -> Self {
        Self {
            id,
            data: Map::new(),
            anonymous: true,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn is_anonymous(&self) -> bool {
        self.anonymous
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.data.insert(key.into(), value)
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
