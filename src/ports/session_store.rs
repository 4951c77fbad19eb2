//! SessionStore port - interface to the external session store.

use async_trait::async_trait;

use crate::domain::foundation::SessionId;
use crate::domain::session::Session;

/// Errors from session lookup or cookie parsing.
///
/// The session binder never lets these fail a connection; it substitutes
/// a fresh empty session and logs the cause.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session cookie '{0}' not present")]
    CookieMissing(String),

    #[error("Session cookie is malformed: {0}")]
    MalformedCookie(String),

    #[error("Session cookie signature does not match")]
    BadSignature,

    #[error("Session store unavailable: {0}")]
    Unavailable(String),

    #[error("Session serialization error: {0}")]
    Serialization(String),
}

/// Port for the session store.
///
/// Implementations own session lifecycle and persistence. The relay only
/// reads sessions at connect time and writes back sessions it had to
/// create.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Look up a session. `Ok(None)` means the id is unknown.
    async fn get(&self, id: &SessionId) -> Result<Option<Session>, SessionError>;

    /// Persist a session under its id.
    async fn set(&self, id: &SessionId, session: &Session) -> Result<(), SessionError>;

    /// Generate a new session id.
    fn generate_id(&self) -> SessionId;

    /// Extract the session id from a raw `Cookie` header.
    fn parse_id_from_cookie(&self, cookie_header: &str) -> Result<SessionId, SessionError>;
}
