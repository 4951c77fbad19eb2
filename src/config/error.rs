//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid Redis URL format")]
    InvalidRedisUrl,

    #[error("Invalid Redis timeout")]
    InvalidTimeout,

    #[error("Cluster channel name cannot be empty or contain whitespace")]
    InvalidChannelName,

    #[error("Invalid SDK version threshold: {0}")]
    InvalidSdkVersion(String),

    #[error("Outbound buffer size must be between 1 and 65536")]
    InvalidBufferSize,

    #[error("Invalid allowed origin: {0}")]
    InvalidOrigin(String),

    #[error("Allowing any origin is not permitted in production")]
    AnyOriginInProduction,

    #[error("Session cookie name cannot be empty")]
    InvalidCookieName,

    #[error("Session secret must be at least 32 characters in production")]
    WeakSessionSecret,
}
