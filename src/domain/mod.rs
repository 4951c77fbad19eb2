//! Domain layer - transport-independent types of the relay core.

pub mod bridge;
pub mod cluster;
pub mod connection;
pub mod foundation;
pub mod room;
pub mod session;
