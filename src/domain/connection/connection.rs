//! Connection state owned by the node that accepted it.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use tokio::sync::mpsc;

use crate::domain::foundation::{ConnectionId, SessionId, Timestamp};
use crate::domain::session::Session;

use super::{Handshake, OutboundMessage};

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    Closing,
    Closed,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ConnectionState::Open,
            1 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Open => 0,
            ConnectionState::Closing => 1,
            ConnectionState::Closed => 2,
        }
    }
}

/// Non-owning reference from a connection to its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRef {
    pub id: SessionId,
    /// True when the session was synthesized for this connection only.
    pub anonymous: bool,
}

impl From<&Session> for SessionRef {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id().clone(),
            anonymous: session.is_anonymous(),
        }
    }
}

/// A persistent client link accepted by this node.
///
/// Outbound messages go through a bounded channel drained by the
/// transport's write task; a full or closed channel drops the message and
/// bumps the drop counter instead of blocking the caller.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    handshake: Handshake,
    session: SessionRef,
    state: AtomicU8,
    tx: mpsc::Sender<OutboundMessage>,
    connected_at: Timestamp,
    dropped_messages: AtomicU64,
}

impl Connection {
    /// Create a new open connection.
    pub fn new(
        id: ConnectionId,
        handshake: Handshake,
        session: SessionRef,
        tx: mpsc::Sender<OutboundMessage>,
    ) -> Self {
        Self {
            id,
            handshake,
            session,
            state: AtomicU8::new(ConnectionState::Open.as_u8()),
            tx,
            connected_at: Timestamp::now(),
            dropped_messages: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn handshake(&self) -> &Handshake {
        &self.handshake
    }

    pub fn session(&self) -> &SessionRef {
        &self.session
    }

    pub fn connected_at(&self) -> Timestamp {
        self.connected_at
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Moves an open connection to `Closing`. Returns false if it was
    /// already closing or closed.
    pub fn begin_close(&self) -> bool {
        self.state
            .compare_exchange(
                ConnectionState::Open.as_u8(),
                ConnectionState::Closing.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Marks the connection closed.
    pub fn mark_closed(&self) {
        self.state
            .store(ConnectionState::Closed.as_u8(), Ordering::Release);
    }

    /// Queue a message for the client.
    ///
    /// Returns `false` if the connection is not open or the channel is full
    /// or closed.
    pub fn send(&self, message: OutboundMessage) -> bool {
        if !self.is_open() {
            return false;
        }
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }
}
