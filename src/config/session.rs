//! Session configuration

use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;

use super::error::ValidationError;
use super::server::Environment;

/// Session configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Name of the cookie carrying the signed session id
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// HMAC secret used to sign session cookies
    #[serde(default = "default_secret")]
    pub secret: Secret<String>,

    /// Write sessions synthesized for cookie-less connections to the store
    #[serde(default)]
    pub persist_anonymous: bool,
}

impl SessionConfig {
    /// Validate session configuration
    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        if self.cookie_name.trim().is_empty() {
            return Err(ValidationError::InvalidCookieName);
        }
        let secret = self.secret.expose_secret();
        if secret.is_empty() {
            return Err(ValidationError::MissingRequired("SESSION__SECRET"));
        }
        if *environment == Environment::Production && secret.len() < 32 {
            return Err(ValidationError::WeakSessionSecret);
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            secret: default_secret(),
            persist_anonymous: false,
        }
    }
}

fn default_cookie_name() -> String {
    "relay.sid".to_string()
}

fn default_secret() -> Secret<String> {
    Secret::new(String::new())
}
