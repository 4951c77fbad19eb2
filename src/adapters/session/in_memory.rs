//! In-memory session store.
//!
//! Suitable for single-node deployments and tests. Sessions are lost on
//! restart.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::config::SessionConfig;
use crate::domain::foundation::SessionId;
use crate::domain::session::Session;
use crate::ports::{SessionError, SessionStore};

use super::signed_cookie::{find_cookie, CookieSigner};

pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
    cookie_name: String,
    signer: CookieSigner,
}

impl InMemorySessionStore {
    pub fn new(cookie_name: impl Into<String>, signer: CookieSigner) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            cookie_name: cookie_name.into(),
            signer,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(
            config.cookie_name.clone(),
            CookieSigner::new(config.secret.clone()),
        )
    }

    /// `name=value` pair for a `Cookie` / `Set-Cookie` header.
    pub fn cookie_for(&self, id: &SessionId) -> Result<String, SessionError> {
        Ok(format!(
            "{}={}",
            self.cookie_name,
            self.signer.sign_for_header(id.as_str())?
        ))
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, id: &SessionId) -> Result<Option<Session>, SessionError> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn set(&self, id: &SessionId, session: &Session) -> Result<(), SessionError> {
        self.sessions
            .write()
            .await
            .insert(id.clone(), session.clone());
        Ok(())
    }

    fn generate_id(&self) -> SessionId {
        SessionId::generate()
    }

    fn parse_id_from_cookie(&self, cookie_header: &str) -> Result<SessionId, SessionError> {
        let signed = find_cookie(cookie_header, &self.cookie_name)?;
        let id = self.signer.unsign(&signed)?;
        if id.is_empty() {
            return Err(SessionError::MalformedCookie("empty session id".to_string()));
        }
        Ok(SessionId::new(id))
    }
}
