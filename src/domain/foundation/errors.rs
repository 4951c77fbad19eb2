//! Error types shared across the relay core.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use thiserror::Error;

/// Programming errors in how the room or bus API is invoked.
///
/// These are raised synchronously to the caller and are meant to surface
/// during development. Production code is not expected to recover from them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error("Room name cannot be empty")]
    EmptyRoomName,

    #[error("Event name cannot be empty")]
    EmptyEventName,

    #[error("No connection with id '{0}' on this node")]
    UnknownConnection(String),
}

/// Error codes carried in client-visible error bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Inbound frame errors
    ParseError,
    UnknownMethod,

    // Connection lifecycle
    AdmissionRejected,
    SessionUnavailable,

    // Cluster
    MalformedEnvelope,

    // API misuse
    InvalidUsage,

    // Infrastructure errors
    PubSubError,
    InternalError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::ParseError => "PARSE_ERROR",
            ErrorCode::UnknownMethod => "UNKNOWN_METHOD",
            ErrorCode::AdmissionRejected => "ADMISSION_REJECTED",
            ErrorCode::SessionUnavailable => "SESSION_UNAVAILABLE",
            ErrorCode::MalformedEnvelope => "MALFORMED_ENVELOPE",
            ErrorCode::InvalidUsage => "INVALID_USAGE",
            ErrorCode::PubSubError => "PUBSUB_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        };
        write!(f, "{}", s)
    }
}

/// Standard error with code, message, and optional details.
///
/// This is the shape serialized back to clients when a frame cannot be
/// served, so it stays independent of any particular transport.
#[derive(Debug, Clone)]
pub struct DomainError {
    pub code: ErrorCode,
    pub message: String,
    pub details: HashMap<String, String>,
}

impl DomainError {
    /// Creates a new domain error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: HashMap::new(),
        }
    }

    /// Adds a detail to the error.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Renders the error as a JSON body suitable for a response envelope.
    pub fn to_body(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "error": self.code.to_string(),
            "message": self.message,
        });
        if !self.details.is_empty() {
            body["details"] = serde_json::json!(self.details);
        }
        body
    }
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl Error for DomainError {}

impl From<UsageError> for DomainError {
    fn from(err: UsageError) -> Self {
        DomainError::new(ErrorCode::InvalidUsage, err.to_string())
    }
}

/// Rejects empty room names at the API boundary.
pub fn validate_room_name(room: &str) -> Result<(), UsageError> {
    if room.is_empty() {
        return Err(UsageError::EmptyRoomName);
    }
    Ok(())
}
