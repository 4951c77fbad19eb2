//! Connection module - per-node view of a persistent client link.

mod connection;
mod handshake;
mod outbound;
mod target;

pub use connection::{Connection, ConnectionState, SessionRef};
pub use handshake::{
    ClientAddr, Handshake, FORWARDED_FOR_HEADER, FORWARDED_PORT_HEADER, SDK_VERSION_PARAM,
};
pub use outbound::OutboundMessage;
pub use target::{resolve_targets, ConnectionTarget};
