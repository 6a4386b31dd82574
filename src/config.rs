//! Configuration file parser for `siphon.toml`.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! A couple of settings can also come from the environment, which wins over
//! the file.
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variable overriding [`Config::fetch_interval_minutes`].
pub const ENV_FETCH_INTERVAL: &str = "FETCH_INTERVAL_MINUTES";
/// Environment variable overriding [`Config::database_path`].
pub const ENV_DATABASE_PATH: &str = "SIPHON_DATABASE_PATH";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration
// ============================================================================

/// Service configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file.
    pub database_path: String,

    /// Global scheduler cadence in minutes. Each tick fetches the feeds
    /// whose own interval has elapsed.
    pub fetch_interval_minutes: u64,

    /// Interval given to feeds added without an explicit one.
    pub default_feed_interval_minutes: u64,

    /// Per-request HTTP timeout in seconds. Covers connect and body read.
    pub request_timeout_secs: u64,

    /// Feeds fetched at once within a pass. 1 means strictly sequential.
    pub max_concurrent_fetches: usize,

    pub user_agent: String,

    /// Used when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "siphon.db".to_string(),
            fetch_interval_minutes: 60,
            default_feed_interval_minutes: 60,
            request_timeout_secs: 15,
            max_concurrent_fetches: 1,
            user_agent: concat!("siphon/", env!("CARGO_PKG_VERSION")).to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 7] = [
        "database_path",
        "fetch_interval_minutes",
        "default_feed_interval_minutes",
        "request_timeout_secs",
        "max_concurrent_fetches",
        "user_agent",
        "log_level",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing or empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Apply environment overrides read through `lookup`.
    ///
    /// A fetch interval that is not a positive integer is ignored with a
    /// warning and the current value kept.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_FETCH_INTERVAL) {
            match raw.trim().parse::<u64>() {
                Ok(minutes) if minutes > 0 => self.fetch_interval_minutes = minutes,
                _ => tracing::warn!(
                    value = %raw,
                    fallback = self.fetch_interval_minutes,
                    "Ignoring invalid {}", ENV_FETCH_INTERVAL
                ),
            }
        }

        if let Some(path) = lookup(ENV_DATABASE_PATH) {
            if !path.trim().is_empty() {
                self.database_path = path;
            }
        }
    }

    /// Reject settings the scheduler or fetcher cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch_interval_minutes == 0 {
            return Err(ConfigError::Invalid(
                "fetch_interval_minutes must be greater than 0".to_string(),
            ));
        }
        if self.default_feed_interval_minutes == 0
            || i64::try_from(self.default_feed_interval_minutes).is_err()
        {
            return Err(ConfigError::Invalid(
                "default_feed_interval_minutes must be a positive number of minutes".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.max_concurrent_fetches == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_fetches must be at least 1".to_string(),
            ));
        }
        if self.database_path.trim().is_empty() {
            return Err(ConfigError::Invalid("database_path is empty".to_string()));
        }
        Ok(())
    }

    pub fn fetch_interval(&self) -> Duration {
        Duration::from_secs(self.fetch_interval_minutes.saturating_mul(60))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn temp_config(name: &str, content: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("siphon_config_test_{}", name));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("siphon.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.database_path, "siphon.db");
        assert_eq!(config.fetch_interval_minutes, 60);
        assert_eq!(config.default_feed_interval_minutes, 60);
        assert_eq!(config.request_timeout_secs, 15);
        assert_eq!(config.max_concurrent_fetches, 1);
        assert!(config.user_agent.starts_with("siphon/"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/siphon_test_nonexistent_config.toml");
        assert_eq!(Config::load(path).unwrap(), Config::default());
    }

    #[test]
    fn test_whitespace_only_file_returns_default() {
        let path = temp_config("blank", "  \n\n  ");
        assert_eq!(Config::load(&path).unwrap(), Config::default());
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let path = temp_config(
            "partial",
            "fetch_interval_minutes = 5\nmax_concurrent_fetches = 4\n",
        );
        let config = Config::load(&path).unwrap();
        assert_eq!(config.fetch_interval_minutes, 5);
        assert_eq!(config.max_concurrent_fetches, 4);
        assert_eq!(config.request_timeout_secs, 15);
        assert_eq!(config.fetch_interval(), Duration::from_secs(300));
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let path = temp_config("unknown", "theme = \"dark\"\nlog_level = \"debug\"\n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let path = temp_config("invalid", "fetch_interval_minutes = [unclosed");
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let path = temp_config("wrong_type", "fetch_interval_minutes = \"often\"");
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_too_large_file_rejected() {
        let big = format!("# {}\n", "x".repeat(Config::MAX_FILE_SIZE as usize + 1));
        let path = temp_config("too_large", &big);
        assert!(matches!(Config::load(&path), Err(ConfigError::TooLarge(_))));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env_overrides(env(&[
            (ENV_FETCH_INTERVAL, "15"),
            (ENV_DATABASE_PATH, "/var/lib/siphon/feeds.db"),
        ]));
        assert_eq!(config.fetch_interval_minutes, 15);
        assert_eq!(config.database_path, "/var/lib/siphon/feeds.db");
    }

    #[test]
    fn test_invalid_env_interval_is_ignored() {
        for bad in ["0", "-5", "soon", ""] {
            let mut config = Config::default();
            config.apply_env_overrides(env(&[(ENV_FETCH_INTERVAL, bad)]));
            assert_eq!(config.fetch_interval_minutes, 60, "value {:?}", bad);
        }
    }

    #[test]
    fn test_validate_rejects_zeroes() {
        let cases = [
            Config {
                fetch_interval_minutes: 0,
                ..Config::default()
            },
            Config {
                default_feed_interval_minutes: 0,
                ..Config::default()
            },
            Config {
                request_timeout_secs: 0,
                ..Config::default()
            },
            Config {
                max_concurrent_fetches: 0,
                ..Config::default()
            },
            Config {
                database_path: " ".to_string(),
                ..Config::default()
            },
        ];
        for config in cases {
            assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        }
    }
}
