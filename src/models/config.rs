use crate::error::PersistenceError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Application configuration from `draftsync.yaml`
///
/// Every section falls back to its defaults when omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub persistence: PersistenceConfig,

    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Tuning for the persistence engine.
///
/// Durations are stored as milliseconds so the YAML stays flat; use the
/// `Duration` accessors in code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Quiet period after the last change before an automatic save fires
    pub debounce_ms: u64,

    /// FIFO cap on queued change events
    pub max_queue_size: usize,

    /// Timeout for a single save call
    pub save_timeout_ms: u64,

    /// Automatic retries after a failed save
    pub retry_attempts: u32,

    /// Fixed delay before each retry
    pub retry_delay_ms: u64,

    /// Check the server copy before committing a save
    pub conflict_detection: bool,

    /// Arm the debounce as soon as a change is tracked
    pub enable_optimistic_updates: bool,

    /// Accumulate performance metrics
    pub performance_tracking: bool,

    /// Periodic save interval; 0 disables the background save
    pub background_save_interval_ms: u64,

    /// Push undo/redo snapshots on confirmed saves
    pub enable_version_control: bool,

    /// Depth of the undo/redo history
    pub max_snapshots: usize,

    /// Automatic saves push a snapshot every N successful saves
    pub auto_snapshot_interval: u64,

    /// Lifetime of a cached load
    pub cache_ttl_ms: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            max_queue_size: 100,
            save_timeout_ms: 10_000,
            retry_attempts: 3,
            retry_delay_ms: 1_000,
            conflict_detection: true,
            enable_optimistic_updates: true,
            performance_tracking: true,
            background_save_interval_ms: 30_000,
            enable_version_control: true,
            max_snapshots: 25,
            auto_snapshot_interval: 5,
            cache_ttl_ms: 300_000,
        }
    }
}

impl PersistenceConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn save_timeout(&self) -> Duration {
        Duration::from_millis(self.save_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    /// `None` when the background save is disabled.
    pub fn background_save_interval(&self) -> Option<Duration> {
        (self.background_save_interval_ms > 0)
            .then(|| Duration::from_millis(self.background_save_interval_ms))
    }

    /// Reject settings the engine cannot honor.
    pub fn validate(&self) -> Result<(), PersistenceError> {
        if self.max_queue_size == 0 {
            return Err(PersistenceError::InvalidConfig(
                "max_queue_size must be at least 1".into(),
            ));
        }
        if self.save_timeout_ms == 0 {
            return Err(PersistenceError::InvalidConfig(
                "save_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.enable_version_control && self.max_snapshots == 0 {
            return Err(PersistenceError::InvalidConfig(
                "max_snapshots must be at least 1 when version control is enabled".into(),
            ));
        }
        if self.auto_snapshot_interval == 0 {
            return Err(PersistenceError::InvalidConfig(
                "auto_snapshot_interval must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Where the remote draft API lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    pub request_timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            request_timeout_ms: 15_000,
        }
    }
}

impl RemoteConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: String,
    pub prefix: String,
    pub debug: bool,
    pub console: bool,
    /// Write the file log as JSON lines instead of plain text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: "logs".to_string(),
            prefix: "draftsync".to_string(),
            debug: false,
            console: true,
            json: false,
        }
    }
}
