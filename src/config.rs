//! Configuration for the autocorrector.

use crate::channel::{BackoffPolicy, ChannelConfig, DEFAULT_MAX_FRAME_BYTES};
use crate::stats::STATS_FILENAME;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Main configuration, shared by every role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Corrections file to use instead of the standard locations
    pub corrections_path: Option<PathBuf>,

    /// Path for storing usage statistics
    pub data_path: PathBuf,

    /// Whether the user has paused corrections
    pub paused: bool,

    /// Log every applied correction at info level
    pub show_corrections: bool,

    /// Dialing the daemon socket
    pub reconnect: BackoffPolicy,

    /// Retrying a failed write on a live connection
    pub send_retry: BackoffPolicy,

    #[serde(with = "duration_ms")]
    pub handshake_timeout: Duration,

    /// How long the daemon waits for the client to answer a word
    #[serde(with = "duration_ms")]
    pub resolve_timeout: Duration,

    /// How often the corrections file is checked for changes
    #[serde(with = "duration_ms")]
    pub dictionary_poll_interval: Duration,

    pub max_frame_len: usize,

    /// Raw key events buffered between the reader and the segmenter
    pub event_queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("autocorrector");

        Self {
            corrections_path: None,
            data_path: data_dir,
            paused: false,
            show_corrections: false,
            reconnect: BackoffPolicy::reconnect(),
            send_retry: BackoffPolicy::send_retry(),
            handshake_timeout: Duration::from_secs(2),
            resolve_timeout: Duration::from_secs(2),
            dictionary_poll_interval: Duration::from_secs(1),
            max_frame_len: DEFAULT_MAX_FRAME_BYTES,
            event_queue_capacity: 10_000,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`; a missing file means defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(ConfigError::Parse)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("autocorrector")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)?;
        Ok(())
    }

    pub fn stats_path(&self) -> PathBuf {
        self.data_path.join(STATS_FILENAME)
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            reconnect: self.reconnect,
            send_retry: self.send_retry,
            handshake_timeout: self.handshake_timeout,
            max_frame_bytes: self.max_frame_len,
            ..ChannelConfig::default()
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(serde_json::Error),
    #[error("Serialize error: {0}")]
    Serialize(serde_json::Error),
}

/// Serde support for Duration as whole milliseconds.
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.paused);
        assert_eq!(config.reconnect.max, Duration::from_secs(5));
        assert_eq!(config.reconnect.max_attempts, None);
        assert_eq!(config.send_retry.max_attempts, Some(5));
        assert_eq!(config.max_frame_len, 64 * 1024);
        assert_eq!(config.event_queue_capacity, 10_000);
        assert!(config.stats_path().ends_with("autocorrector/stats.json"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.paused = true;
        config.resolve_timeout = Duration::from_millis(750);
        config.save_to(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["resolve_timeout"], 750);

        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "paused": true, "handshake_timeout": 500 }"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert!(config.paused);
        assert_eq!(config.handshake_timeout, Duration::from_millis(500));
        assert_eq!(config.dictionary_poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_missing_file_and_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        assert_eq!(Config::load_from(&path).unwrap(), Config::default());

        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Config::load_from(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_channel_config_follows_settings() {
        let mut config = Config::default();
        config.max_frame_len = 1024;
        config.handshake_timeout = Duration::from_millis(300);

        let channel = config.channel_config();
        assert_eq!(channel.max_frame_bytes, 1024);
        assert_eq!(channel.handshake_timeout, Duration::from_millis(300));
        assert_eq!(channel.reconnect, config.reconnect);
    }
}
