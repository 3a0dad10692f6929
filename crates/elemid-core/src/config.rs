//! Registry configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{RegistryError, Result};

/// Main registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// SQLite database file (`:memory:` for a throwaway store)
    pub database_path: PathBuf,

    /// Default timeout for persistent-store operations
    pub store_timeout_ms: u64,

    /// Number of striped write locks
    pub lock_stripes: usize,

    /// Ancestor-walk guard
    pub max_hierarchy_depth: usize,

    /// Descendant enumeration guard
    pub max_descendants: usize,

    /// Hex chars of the digest kept in deterministic ids
    pub digest_hex_len: usize,

    /// Free text is truncated to this many chars before hashing
    pub text_truncate_len: usize,

    /// Collision monitor configuration
    pub monitor: MonitorSettings,

    /// Analytics configuration
    pub analytics: AnalyticsSettings,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(":memory:"),
            store_timeout_ms: 5_000,
            lock_stripes: 64,
            max_hierarchy_depth: 100,
            max_descendants: 10_000,
            digest_hex_len: 12,
            text_truncate_len: 50,
            monitor: MonitorSettings::default(),
            analytics: AnalyticsSettings::default(),
        }
    }
}

impl RegistryConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the database path
    pub fn with_database(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    /// Set the store timeout
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the number of lock stripes
    pub fn with_lock_stripes(mut self, stripes: usize) -> Self {
        self.lock_stripes = stripes;
        self
    }

    /// Set the hierarchy guards
    pub fn with_hierarchy_limits(mut self, max_depth: usize, max_descendants: usize) -> Self {
        self.max_hierarchy_depth = max_depth;
        self.max_descendants = max_descendants;
        self
    }

    /// Set the monitor interval
    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor.interval_secs = interval.as_secs().max(1);
        self
    }

    /// Store timeout as a `Duration`
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Reject values the registry cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.lock_stripes == 0 {
            return Err(RegistryError::Config("lock_stripes must be > 0".into()));
        }
        if !(8..=64).contains(&self.digest_hex_len) {
            return Err(RegistryError::Config(format!(
                "digest_hex_len must be within 8..=64, got {}",
                self.digest_hex_len
            )));
        }
        if self.max_hierarchy_depth == 0 || self.max_descendants == 0 {
            return Err(RegistryError::Config("hierarchy guards must be > 0".into()));
        }
        if self.monitor.interval_secs == 0 {
            return Err(RegistryError::Config("monitor.interval_secs must be > 0".into()));
        }
        if self.monitor.channel_capacity == 0 {
            return Err(RegistryError::Config("monitor.channel_capacity must be > 0".into()));
        }
        let retention = self.analytics.event_retention_secs;
        if retention > 0 && (retention as i64) < self.analytics.peak_window_secs {
            return Err(RegistryError::Config(format!(
                "analytics.event_retention_secs ({}) must cover peak_window_secs ({})",
                retention, self.analytics.peak_window_secs
            )));
        }
        Ok(())
    }

    /// Load configuration from a TOML or JSON file (by extension)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            _ => toml::from_str(&content)
                .map_err(|e| RegistryError::Config(format!("{}: {}", path.display(), e)))?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Save configuration as TOML
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| RegistryError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Collision monitor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Start the periodic scan with the registry
    pub enabled: bool,

    /// Seconds between scans
    pub interval_secs: u64,

    /// Buffered events per subscriber
    pub channel_capacity: usize,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
            channel_capacity: 256,
        }
    }
}

/// Analytics settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsSettings {
    /// Record accesses, executions and lifecycle events
    pub enabled: bool,

    /// Trailing window for the peak-accesses metric
    pub peak_window_secs: i64,

    /// Access events older than this are pruned by the monitor; 0 keeps them forever
    pub event_retention_secs: u64,
}

impl Default for AnalyticsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            peak_window_secs: 3600,
            event_retention_secs: 7 * 24 * 3600,
        }
    }
}
