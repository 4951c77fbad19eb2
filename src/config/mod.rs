//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `ROOM_RELAY` prefix and nested values use double underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use room_relay::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Cluster channel: {}", config.cluster.channel);
//! ```

mod admission;
mod bridge;
mod cluster;
mod error;
mod redis;
mod server;
mod session;

pub use admission::AdmissionConfig;
pub use bridge::BridgeConfig;
pub use cluster::{ClusterConfig, DEFAULT_CLUSTER_CHANNEL};
pub use error::{ConfigError, ValidationError};
pub use redis::RedisConfig;
pub use server::{Environment, ServerConfig};
pub use session::SessionConfig;

use serde::Deserialize;

/// Root application configuration
///
/// Load using [`AppConfig::load()`] which reads from environment variables.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    /// Server configuration (host, port, environment, logging)
    #[serde(default)]
    pub server: ServerConfig,

    /// Redis configuration (cluster pub/sub)
    #[serde(default)]
    pub redis: RedisConfig,

    /// Cluster bus configuration (channel name)
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Request bridge configuration (response shape, legacy clients)
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Connection admission configuration (origin policy)
    #[serde(default)]
    pub admission: AdmissionConfig,

    /// Session configuration (cookie name, signing secret)
    #[serde(default)]
    pub session: SessionConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `ROOM_RELAY` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `ROOM_RELAY__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `ROOM_RELAY__REDIS__URL=...` -> `redis.url = ...`
    /// - `ROOM_RELAY__CLUSTER__CHANNEL=...` -> `cluster.channel = ...`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("ROOM_RELAY")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// Validation failures are the only fatal errors of the relay; callers
    /// are expected to abort startup on `Err`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.redis.validate()?;
        self.cluster.validate()?;
        self.bridge.validate()?;
        self.admission.validate(&self.server.environment)?;
        self.session.validate(&self.server.environment)?;
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
