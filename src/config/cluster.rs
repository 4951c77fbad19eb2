//! Cluster bus configuration

use serde::Deserialize;

use super::error::ValidationError;

/// Channel shared by every node in the fleet unless configured otherwise.
pub const DEFAULT_CLUSTER_CHANNEL: &str = "room_relay:cluster";

/// Cluster bus configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    /// Pub/sub channel name; must match across the fleet
    #[serde(default = "default_channel")]
    pub channel: String,
}

impl ClusterConfig {
    /// Validate cluster configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.channel.is_empty() || self.channel.chars().any(char::is_whitespace) {
            return Err(ValidationError::InvalidChannelName);
        }
        Ok(())
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            channel: default_channel(),
        }
    }
}

fn default_channel() -> String {
    DEFAULT_CLUSTER_CHANNEL.to_string()
}
