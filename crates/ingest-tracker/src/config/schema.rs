use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const CONFIG_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub version: String,
    /// Prefix for every storage key owned by this tracker.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub api_base_url: String,
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_namespace() -> String {
    "ingestion".to_string()
}

impl TrackerConfig {
    /// Builds a config with all defaults for the given backend.
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            version: CONFIG_VERSION.to_string(),
            namespace: default_namespace(),
            api_base_url: api_base_url.into(),
            database_path: None,
            polling: PollingConfig::default(),
            retention: RetentionConfig::default(),
            upload: UploadConfig::default(),
            http: HttpConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Resolves the database location, falling back to the per-user default.
    pub fn resolved_database_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.database_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => crate::db::default_database_path().ok_or(ConfigError::NoDatabasePath),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
    /// Back off exponentially after consecutive failures instead of
    /// retrying on every cycle.
    #[serde(default)]
    pub backoff_enabled: bool,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    3_000
}

fn default_backoff_max_ms() -> u64 {
    60_000
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Retry delay cap, present only when backoff is enabled.
    pub fn backoff_max(&self) -> Option<Duration> {
        self.backoff_enabled
            .then(|| Duration::from_millis(self.backoff_max_ms))
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: default_poll_interval_ms(),
            backoff_enabled: false,
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

/// How long finished jobs and errors stay visible before they are dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_completed_grace_ms")]
    pub completed_grace_ms: u64,
    #[serde(default = "default_cancelled_grace_ms")]
    pub cancelled_grace_ms: u64,
    #[serde(default = "default_error_ttl_ms")]
    pub error_ttl_ms: u64,
}

fn default_completed_grace_ms() -> u64 {
    5_000
}

fn default_cancelled_grace_ms() -> u64 {
    3_000
}

fn default_error_ttl_ms() -> u64 {
    5_000
}

impl RetentionConfig {
    pub fn completed_grace(&self) -> Duration {
        Duration::from_millis(self.completed_grace_ms)
    }

    pub fn cancelled_grace(&self) -> Duration {
        Duration::from_millis(self.cancelled_grace_ms)
    }

    pub fn error_ttl(&self) -> Duration {
        Duration::from_millis(self.error_ttl_ms)
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            completed_grace_ms: default_completed_grace_ms(),
            cancelled_grace_ms: default_cancelled_grace_ms(),
            error_ttl_ms: default_error_ttl_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size_bytes: usize,
}

fn default_chunk_size() -> usize {
    5 * 1024 * 1024
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size_bytes: default_chunk_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl HttpConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}
