//! Configuration types for homelink
//!
//! This module defines the host settings (polling cadence, engine channel,
//! entry store) and the persisted [`ConfigEntry`] record.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Host configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostConfig {
    /// Polling cadence and throttling
    #[serde(default)]
    pub polling: PollingConfig,

    /// Engine settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Config entry store
    #[serde(default)]
    pub entry_store: EntryStoreConfig,
}

impl HostConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.polling.validate()?;
        self.engine.validate()?;
        self.entry_store.validate()?;
        Ok(())
    }
}

/// Polling cadence shared by every integration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Interval between scheduler ticks (in seconds)
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,

    /// Minimum interval between two remote reads of one source (in seconds)
    ///
    /// Sibling sensors refreshed inside this window reuse the cached
    /// snapshot. Integrations may raise it for their own sources.
    #[serde(default = "default_min_fetch_interval_secs")]
    pub min_fetch_interval_secs: u64,

    /// Upper bound for one remote read (in seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl PollingConfig {
    /// Validate the polling settings
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.scan_interval_secs == 0 {
            return Err(crate::Error::config("Scan interval must be > 0"));
        }
        if self.request_timeout_secs == 0 {
            return Err(crate::Error::config("Request timeout must be > 0"));
        }
        if self.request_timeout_secs > self.scan_interval_secs {
            return Err(crate::Error::config(format!(
                "Request timeout ({}s) cannot exceed the scan interval ({}s)",
                self.request_timeout_secs, self.scan_interval_secs
            )));
        }
        Ok(())
    }

    /// Scan interval as a [`Duration`]
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    /// Minimum fetch interval as a [`Duration`]
    pub fn min_fetch_interval(&self) -> Duration {
        Duration::from_secs(self.min_fetch_interval_secs)
    }

    /// Request timeout as a [`Duration`]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: default_scan_interval_secs(),
            min_fetch_interval_secs: default_min_fetch_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_scan_interval_secs() -> u64 {
    30
}

fn default_min_fetch_interval_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    10
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped with a warning log.
    ///
    /// Default: 1000 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Validate the engine settings
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_event_channel_capacity() -> usize {
    1000
}

/// Config entry store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntryStoreConfig {
    /// JSON file backed store
    File {
        /// Path to the entries file
        path: String,
    },

    /// In-memory store (not persistent)
    #[default]
    Memory,
}

impl EntryStoreConfig {
    /// Validate the store settings
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            EntryStoreConfig::File { path } if path.is_empty() => {
                Err(crate::Error::config("Entry store path cannot be empty"))
            }
            _ => Ok(()),
        }
    }
}

/// How a config entry was created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntrySource {
    /// Through the user config flow
    #[default]
    User,
    /// Imported from a legacy configuration section
    Import,
}

/// One persisted integration configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntry {
    /// Unique entry id
    pub entry_id: String,

    /// Integration domain (e.g. "asuswrt", "fitbark")
    pub domain: String,

    /// Display title
    pub title: String,

    /// Data schema version
    #[serde(default = "default_entry_version")]
    pub version: u32,

    /// How the entry was created
    #[serde(default)]
    pub source: EntrySource,

    /// Integration-specific data
    pub data: serde_json::Value,

    /// Creation time
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl ConfigEntry {
    /// Create a user entry
    pub fn new(
        entry_id: impl Into<String>,
        domain: impl Into<String>,
        title: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            entry_id: entry_id.into(),
            domain: domain.into(),
            title: title.into(),
            version: default_entry_version(),
            source: EntrySource::User,
            data,
            created_at: chrono::Utc::now(),
        }
    }

    /// Set the entry source
    pub fn with_source(mut self, source: EntrySource) -> Self {
        self.source = source;
        self
    }
}

fn default_entry_version() -> u32 {
    1
}
