//! Synchronization tunables.
//!
//! The engine is in-memory only; the reset thresholds and the waiter tick are
//! its only tunables. Hosts may embed a `[sync]`-style table in their own
//! TOML files and hand the text to [`SyncConfig::from_toml_str`].

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{CascadeError, Result};

/// Default reset threshold for the refresh coordinator.
pub const DEFAULT_RESET_EVENT_THRESHOLD: usize = 250;

/// Default reset threshold for a direct pairwise buffer.
pub const DEFAULT_LINK_RESET_EVENT_THRESHOLD: usize = 50;

/// Default re-check interval for blocking refresh waiters.
pub const DEFAULT_WAIT_TICK_MS: u64 = 1000;

/// Tunables for batching and refresh coordination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Queued events beyond which a batch collapses to a full reset
    pub reset_event_threshold: usize,
    /// Same threshold for pairwise buffers between two views
    pub link_reset_event_threshold: usize,
    /// Interval at which blocking waiters re-check the in-flight flag
    pub wait_tick_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            reset_event_threshold: DEFAULT_RESET_EVENT_THRESHOLD,
            link_reset_event_threshold: DEFAULT_LINK_RESET_EVENT_THRESHOLD,
            wait_tick_ms: DEFAULT_WAIT_TICK_MS,
        }
    }
}

impl SyncConfig {
    /// Parse and validate a configuration from TOML text.
    ///
    /// Missing keys fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`CascadeError::InvalidConfig`] on malformed TOML or failed validation.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`CascadeError::Internal`] when the file cannot be read and
    /// [`CascadeError::InvalidConfig`] when its contents are invalid.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CascadeError::internal(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Thresholds and the wait tick must be non-zero.
    pub fn validate(&self) -> Result<()> {
        if self.reset_event_threshold == 0 {
            return Err(CascadeError::invalid_config(
                "reset_event_threshold must be at least 1",
            ));
        }
        if self.link_reset_event_threshold == 0 {
            return Err(CascadeError::invalid_config(
                "link_reset_event_threshold must be at least 1",
            ));
        }
        if self.wait_tick_ms == 0 {
            return Err(CascadeError::invalid_config(
                "wait_tick_ms must be at least 1",
            ));
        }
        Ok(())
    }

    /// Builder-style override of the coordinator threshold.
    pub fn with_reset_event_threshold(mut self, threshold: usize) -> Self {
        self.reset_event_threshold = threshold;
        self
    }

    /// Builder-style override of the waiter tick.
    pub fn with_wait_tick(mut self, tick: Duration) -> Self {
        self.wait_tick_ms = u64::try_from(tick.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// The waiter tick as a [`Duration`].
    pub fn wait_tick(&self) -> Duration {
        Duration::from_millis(self.wait_tick_ms)
    }
}
