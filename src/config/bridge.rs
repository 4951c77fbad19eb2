//! Request bridge configuration

use serde::Deserialize;

use crate::domain::bridge::SdkVersion;

use super::error::ValidationError;

/// Request bridge configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// Include the response headers map in response envelopes
    #[serde(default = "default_true")]
    pub include_response_headers: bool,

    /// Include the status code in response envelopes
    #[serde(default = "default_true")]
    pub include_status_code: bool,

    /// Clients announcing an SDK version below this receive bare bodies
    #[serde(default = "default_legacy_threshold")]
    pub legacy_sdk_threshold: String,

    /// Value of the `host` header when the client does not send one
    #[serde(default = "default_host_header")]
    pub default_host: String,

    /// Capacity of each connection's outbound queue
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

impl BridgeConfig {
    /// Parsed legacy threshold.
    pub fn legacy_threshold(&self) -> Result<SdkVersion, ValidationError> {
        self.legacy_sdk_threshold
            .parse()
            .map_err(ValidationError::InvalidSdkVersion)
    }

    /// Validate bridge configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.legacy_threshold()?;
        if self.outbound_buffer == 0 || self.outbound_buffer > 65_536 {
            return Err(ValidationError::InvalidBufferSize);
        }
        Ok(())
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            include_response_headers: true,
            include_status_code: true,
            legacy_sdk_threshold: default_legacy_threshold(),
            default_host: default_host_header(),
            outbound_buffer: default_outbound_buffer(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_legacy_threshold() -> String {
    "0.11.0".to_string()
}

fn default_host_header() -> String {
    "localhost".to_string()
}

fn default_outbound_buffer() -> usize {
    256
}
