//! Configuration structures for the stable-watch tool.
//!
//! - [`WatchConfig`] - Stability detection settings (threshold, channel, filters)
//! - [`LogConfig`] - Logging settings (level, colors)
//! - [`Config`] - Root configuration combining all settings
//!
//! All configuration types implement [`Default`] and deserialize with missing
//! fields filled from those defaults, so a config file only needs to name the
//! options it changes.

use std::time::Duration;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default quiet period before a file is considered stable.
pub const DEFAULT_STABLE_THRESHOLD_MS: u64 = 500;

/// Default capacity of the stability event channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// Configuration for the stable file watcher.
///
/// # Examples
///
/// ```
/// use sw_core::WatchConfig;
/// use std::time::Duration;
///
/// let config = WatchConfig::default();
/// assert_eq!(config.stable_threshold(), Duration::from_millis(500));
/// assert!(config.extensions.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Quiet period in milliseconds.
    ///
    /// A file must go this long without a change notification before it is
    /// reported as stable.
    pub stable_threshold_ms: u64,

    /// Capacity of the stability event channel.
    pub channel_capacity: usize,

    /// File extensions to track (without the leading dot).
    ///
    /// Empty means every file is tracked.
    pub extensions: Vec<String>,

    /// Skip dot-files, such as temporary files written by upload tools.
    pub ignore_hidden: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            stable_threshold_ms: DEFAULT_STABLE_THRESHOLD_MS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            extensions: Vec::new(),
            ignore_hidden: false,
        }
    }
}

impl WatchConfig {
    /// Creates a config with the given threshold and defaults elsewhere.
    ///
    /// The threshold has millisecond resolution. Fractions round up, so any
    /// non-zero duration stays non-zero.
    #[must_use]
    pub fn with_threshold(threshold: Duration) -> Self {
        let millis = threshold.as_nanos().div_ceil(1_000_000);
        Self {
            stable_threshold_ms: u64::try_from(millis).unwrap_or(u64::MAX),
            ..Self::default()
        }
    }

    /// Returns the stability threshold as a [`Duration`].
    #[inline]
    #[must_use]
    pub const fn stable_threshold(&self) -> Duration {
        Duration::from_millis(self.stable_threshold_ms)
    }

    /// Checks that the options describe a usable watcher.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOption`] if the threshold or the channel
    /// capacity is zero, or if an extension is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stable_threshold_ms == 0 {
            return Err(ConfigError::invalid_option(
                "stable_threshold_ms",
                "must be greater than zero",
            ));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::invalid_option(
                "channel_capacity",
                "must be greater than zero",
            ));
        }
        if self.extensions.iter().any(|ext| ext.trim_start_matches('.').is_empty()) {
            return Err(ConfigError::invalid_option(
                "extensions",
                "extensions must not be empty",
            ));
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default `tracing` level directive, used when `RUST_LOG` is unset.
    pub level: String,

    /// Whether to emit ANSI colors.
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            ansi: true,
        }
    }
}

/// Root configuration for the stable-watch tool.
///
/// # Examples
///
/// ```
/// use sw_core::Config;
///
/// let config = Config::from_json(r#"{"watch": {"stable_threshold_ms": 2000}}"#).unwrap();
/// assert_eq!(config.watch.stable_threshold_ms, 2000);
/// assert_eq!(config.log.level, "info");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Watcher configuration.
    pub watch: WatchConfig,

    /// Logging configuration.
    pub log: LogConfig,
}

impl Config {
    /// Parses and validates a configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed JSON and
    /// [`ConfigError::InvalidOption`] if validation fails.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.watch.validate()?;
        Ok(config)
    }

    /// Loads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPath`] if the path is not a file, and
    /// otherwise any error from reading or [`Config::from_json`].
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::InvalidPath {
                path: path.to_owned(),
                reason: "not a regular file".to_owned(),
            });
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_config_defaults() {
        let config = WatchConfig::default();
        assert_eq!(config.stable_threshold_ms, 500);
        assert_eq!(config.channel_capacity, 100);
        assert!(config.extensions.is_empty());
        assert!(!config.ignore_hidden);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_watch_config_with_threshold() {
        let config = WatchConfig::with_threshold(Duration::from_secs(3));
        assert_eq!(config.stable_threshold_ms, 3000);
        assert_eq!(config.stable_threshold(), Duration::from_secs(3));
    }

    #[test]
    fn test_watch_config_with_threshold_rounds_fractions_up() {
        assert_eq!(WatchConfig::with_threshold(Duration::from_micros(1500)).stable_threshold_ms, 2);

        let sub_millisecond = WatchConfig::with_threshold(Duration::from_micros(500));
        assert_eq!(sub_millisecond.stable_threshold_ms, 1);
        assert!(sub_millisecond.validate().is_ok());

        assert_eq!(WatchConfig::with_threshold(Duration::ZERO).stable_threshold_ms, 0);
    }

    #[test]
    fn test_watch_config_rejects_zero_threshold() {
        let config = WatchConfig {
            stable_threshold_ms: 0,
            ..WatchConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("stable_threshold_ms"));
    }

    #[test]
    fn test_watch_config_rejects_zero_capacity() {
        let config = WatchConfig {
            channel_capacity: 0,
            ..WatchConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("channel_capacity"));
    }

    #[test]
    fn test_watch_config_rejects_empty_extension() {
        let config = WatchConfig {
            extensions: vec!["mp4".to_owned(), ".".to_owned()],
            ..WatchConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_config_deserialize_with_missing_fields() {
        let config = Config::from_json(r#"{"watch": {"extensions": ["mp4", "mkv"]}}"#).unwrap();
        assert_eq!(config.watch.extensions, vec!["mp4", "mkv"]);
        assert_eq!(config.watch.stable_threshold_ms, 500);
        assert_eq!(config.log, LogConfig::default());
    }

    #[test]
    fn test_config_from_json_validates() {
        let result = Config::from_json(r#"{"watch": {"stable_threshold_ms": 0}}"#);
        assert!(matches!(result, Err(ConfigError::InvalidOption { .. })));
    }

    #[test]
    fn test_config_from_json_parse_error() {
        let result = Config::from_json("{not json");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_config_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stable-watch.json");
        std::fs::write(&path, r#"{"log": {"level": "debug", "ansi": false}}"#).unwrap();

        let path = Utf8Path::from_path(&path).unwrap();
        let config = Config::load(path).unwrap();
        assert_eq!(config.log.level, "debug");
        assert!(!config.log.ansi);
        assert_eq!(config.watch, WatchConfig::default());
    }

    #[test]
    fn test_config_load_missing_file() {
        let result = Config::load(Utf8Path::new("/nonexistent/stable-watch.json"));
        assert!(matches!(result, Err(ConfigError::InvalidPath { .. })));
    }
}
