//! Managed state machine configuration.

use crate::error::{RsmError, RsmResult};
use serde::{Deserialize, Serialize};

/// The largest number of client sessions a session manager tracks by default.
pub const LRU_MAX_SESSION_COUNT: usize = 4096;

/// Configuration for a managed state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RsmConfig {
    /// Maximum number of concurrently tracked client sessions.
    /// The least recently used session is evicted beyond this.
    pub max_session_count: usize,
}

impl Default for RsmConfig {
    fn default() -> Self {
        Self {
            max_session_count: LRU_MAX_SESSION_COUNT,
        }
    }
}

impl RsmConfig {
    /// Create a new configuration builder.
    pub fn builder() -> RsmConfigBuilder {
        RsmConfigBuilder::default()
    }

    /// Parse and validate a configuration from JSON.
    pub fn from_json(json: &str) -> RsmResult<Self> {
        let config: RsmConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> RsmResult<()> {
        if self.max_session_count == 0 {
            return Err(RsmError::Config(
                "max_session_count must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for RsmConfig.
#[derive(Debug, Default)]
pub struct RsmConfigBuilder {
    config: RsmConfig,
}

impl RsmConfigBuilder {
    /// Set the session capacity.
    pub fn max_session_count(mut self, count: usize) -> Self {
        self.config.max_session_count = count;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> RsmResult<RsmConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
