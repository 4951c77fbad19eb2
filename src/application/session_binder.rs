//! SessionBinder - resolves the session for an admitted connection.
//!
//! Never fails: every error path ends in a usable session.

use std::sync::Arc;

use crate::domain::connection::Handshake;
use crate::domain::session::Session;
use crate::ports::{SessionError, SessionStore};

/// Where a bound session came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSource {
    /// Found in the store.
    Existing,
    /// Cookie named an unknown id; an empty session was created under it.
    Created,
    /// No session cookie; synthesized for this connection.
    Anonymous,
    /// Cookie or store failed; fresh session substituted.
    Degraded,
}

/// Session plus how it was obtained.
#[derive(Debug, Clone)]
pub struct BoundSession {
    pub session: Session,
    pub source: SessionSource,
}

pub struct SessionBinder {
    store: Arc<dyn SessionStore>,
    persist_anonymous: bool,
}

impl SessionBinder {
    pub fn new(store: Arc<dyn SessionStore>, persist_anonymous: bool) -> Self {
        Self {
            store,
            persist_anonymous,
        }
    }

    pub async fn bind(&self, handshake: &Handshake) -> BoundSession {
        let Some(cookie) = handshake.cookie() else {
            return self.anonymous().await;
        };

        let id = match self.store.parse_id_from_cookie(cookie) {
            Ok(id) => id,
            Err(SessionError::CookieMissing(_)) => return self.anonymous().await,
            Err(e) => return self.degraded(&e),
        };

        match self.store.get(&id).await {
            Ok(Some(session)) => {
                tracing::debug!(session_id = %id, "session bound");
                BoundSession {
                    session,
                    source: SessionSource::Existing,
                }
            }
            Ok(None) => {
                let session = Session::empty(id.clone());
                self.write_through(&session).await;
                tracing::debug!(session_id = %id, "session created for unknown id");
                BoundSession {
                    session,
                    source: SessionSource::Created,
                }
            }
            Err(e) => self.degraded(&e),
        }
    }

    async fn anonymous(&self) -> BoundSession {
        let session = Session::anonymous(self.store.generate_id());
        if self.persist_anonymous {
            self.write_through(&session).await;
        }
        BoundSession {
            session,
            source: SessionSource::Anonymous,
        }
    }

    fn degraded(&self, error: &SessionError) -> BoundSession {
        let session = Session::anonymous(self.store.generate_id());
        tracing::warn!(error = %error, session_id = %session.id(), "session lookup failed, using fresh session");
        BoundSession {
            session,
            source: SessionSource::Degraded,
        }
    }

    async fn write_through(&self, session: &Session) {
        if let Err(e) = self.store.set(session.id(), session).await {
            tracing::warn!(session_id = %session.id(), error = %e, "failed to persist session");
        }
    }
}
