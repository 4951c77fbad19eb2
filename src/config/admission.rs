//! Connection admission configuration

use serde::Deserialize;

use super::error::ValidationError;
use super::server::Environment;

/// Connection admission configuration
///
/// With neither an allow-list nor `allow_any_origin`, connections are
/// admitted only when they send no `Origin` header or an origin whose host
/// matches the `Host` header.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AdmissionConfig {
    /// Allowed origins (comma-separated, e.g. `https://app.example.com`)
    pub allowed_origins: Option<String>,

    /// Admit every origin. Rejected by validation in production.
    #[serde(default)]
    pub allow_any_origin: bool,
}

impl AdmissionConfig {
    /// Get allowed origins as a vector
    pub fn allowed_origins_list(&self) -> Vec<String> {
        self.allowed_origins
            .as_ref()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().trim_end_matches('/').to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Validate admission configuration
    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        if self.allow_any_origin && *environment == Environment::Production {
            return Err(ValidationError::AnyOriginInProduction);
        }
        for origin in self.allowed_origins_list() {
            if !origin.starts_with("http://") && !origin.starts_with("https://") {
                return Err(ValidationError::InvalidOrigin(origin));
            }
        }
        Ok(())
    }
}
