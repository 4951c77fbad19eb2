//! WebSocket transport for the relay.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      ws_handler (GET /ws)                            │
//! │   handshake → ConnectionAdmission → SessionBinder → upgrade         │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                     │
//!                                     ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         per connection                               │
//! │   recv task: ClientFrame → BridgeSession → RequestRouter            │
//! │   send task: outbound queue → socket (acks, events, errors)         │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                     │
//!                                     │ register / unregister
//!                                     ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                        RoomRegistry                                  │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`messages`] - Wire protocol types
//! - [`handler`] - Axum WebSocket upgrade handler and connection loop

pub mod handler;
pub mod messages;

pub use handler::{handshake_from_parts, relay_router, teardown, ws_handler, RelayState};
pub use messages::{encode, AckField, ClientFrame};
