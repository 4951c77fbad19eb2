//! Foundation module - Shared domain primitives.
//!
//! Contains identifiers, timestamps, and error types that form the
//! vocabulary of the relay core.

mod errors;
mod ids;
mod timestamp;

pub use errors::{validate_room_name, DomainError, ErrorCode, UsageError};
pub use ids::{ConnectionId, NodeId, SessionId};
pub use timestamp::Timestamp;
