//! Client configuration

use crate::error::{ClientError, Result};
use conduit_protocol::{default_endpoint, FramingPolicy};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Settings for one client connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Socket path (Unix) or pipe name (Windows)
    #[serde(default = "default_endpoint")]
    pub endpoint: PathBuf,
    /// How read chunks are split into messages
    #[serde(default)]
    pub framing: FramingPolicy,
    /// Payloads that may wait for the writer before sends are rejected
    #[serde(default = "default_write_queue_capacity")]
    pub write_queue_capacity: usize,
    /// Size of each socket read
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
    /// Lifecycle events retained for slow subscribers
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_write_queue_capacity() -> usize {
    64
}

fn default_read_buffer_size() -> usize {
    8 * 1024
}

fn default_event_capacity() -> usize {
    64
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            framing: FramingPolicy::default(),
            write_queue_capacity: default_write_queue_capacity(),
            read_buffer_size: default_read_buffer_size(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<PathBuf>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    pub fn with_framing(mut self, framing: FramingPolicy) -> Self {
        self.framing = framing;
        self
    }

    pub fn with_write_queue_capacity(mut self, capacity: usize) -> Self {
        self.write_queue_capacity = capacity;
        self
    }

    /// Parse a TOML document and validate it
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source).map_err(|e| ClientError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.write_queue_capacity == 0 {
            return Err(ClientError::Config(
                "write_queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.read_buffer_size == 0 {
            return Err(ClientError::Config(
                "read_buffer_size must be at least 1".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(ClientError::Config(
                "event_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
