//! Room Relay - request bridge, room registry and cluster bus for
//! persistent client connections.
//!
//! Clients hold a WebSocket open and send HTTP-style request frames over it.
//! Each node tracks which connections are in which rooms, and a shared
//! pub/sub channel keeps room membership and application events in step
//! across a fleet of nodes.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod telemetry;
