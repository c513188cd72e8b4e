//! Configuration file parser for ~/.config/rssbot/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! `BOT_TOKEN` and `UPDATE_INTERVAL` in the environment win over the file.
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::transport::DEFAULT_TELEGRAM_API_URL;

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

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// Every field has a default so any subset of keys can be given.
/// `Debug` masks `bot_token`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Seconds between poll cycles.
    pub poll_interval_secs: u64,

    /// SQLite database file. Relative paths resolve against the config directory.
    pub database_path: PathBuf,

    pub fetch_concurrency: usize,

    pub dispatch_concurrency: usize,

    /// Entry ids remembered per feed.
    pub seen_window: usize,

    /// Per-request timeout for feed fetches and Bot API calls.
    pub request_timeout_secs: u64,

    /// Extra fetch attempts after 429/5xx.
    pub fetch_retries: u32,

    /// How long shutdown waits for an in-flight cycle.
    pub shutdown_grace_secs: u64,

    pub telegram_api_url: String,

    /// Telegram bot token (alternative to the BOT_TOKEN env var).
    pub bot_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_secs: 300,
            database_path: PathBuf::from("rssbot.db"),
            fetch_concurrency: 10,
            dispatch_concurrency: 8,
            seen_window: 200,
            request_timeout_secs: 30,
            fetch_retries: 3,
            shutdown_grace_secs: 30,
            telegram_api_url: DEFAULT_TELEGRAM_API_URL.to_string(),
            bot_token: None,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("database_path", &self.database_path)
            .field("fetch_concurrency", &self.fetch_concurrency)
            .field("dispatch_concurrency", &self.dispatch_concurrency)
            .field("seen_window", &self.seen_window)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("fetch_retries", &self.fetch_retries)
            .field("shutdown_grace_secs", &self.shutdown_grace_secs)
            .field("telegram_api_url", &self.telegram_api_url)
            .field("bot_token", &self.bot_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

const KNOWN_KEYS: [&str; 10] = [
    "poll_interval_secs",
    "database_path",
    "fetch_concurrency",
    "dispatch_concurrency",
    "seen_window",
    "request_timeout_secs",
    "fetch_retries",
    "shutdown_grace_secs",
    "telegram_api_url",
    "bot_token",
];

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load the file at `path`, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_file(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as a warning
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
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
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            poll_interval_secs = config.poll_interval_secs,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Apply `BOT_TOKEN` and `UPDATE_INTERVAL` (seconds) from `var`.
    pub fn apply_env<F>(&mut self, var: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = var("BOT_TOKEN").filter(|t| !t.trim().is_empty()) {
            self.bot_token = Some(token.trim().to_string());
        }
        if let Some(raw) = var("UPDATE_INTERVAL") {
            self.poll_interval_secs =
                raw.trim()
                    .parse::<u64>()
                    .map_err(|e| ConfigError::Invalid {
                        key: "UPDATE_INTERVAL",
                        reason: e.to_string(),
                    })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "poll_interval_secs",
                reason: "must be at least 1".into(),
            });
        }
        if self.seen_window == 0 {
            return Err(ConfigError::Invalid {
                key: "seen_window",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn bot_token(&self) -> Option<SecretString> {
        self.bot_token.clone().map(SecretString::from)
    }

    /// `database_path` resolved against `base` when relative.
    pub fn database_path_in(&self, base: &Path) -> PathBuf {
        if self.database_path.is_absolute() {
            self.database_path.clone()
        } else {
            base.join(&self.database_path)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn write_config(name: &str, content: &str) -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join(format!("rssbot_config_test_{name}"));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.poll_interval_secs, 300);
        assert_eq!(config.seen_window, 200);
        assert_eq!(config.telegram_api_url, "https://api.telegram.org");
        assert!(config.bot_token.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/rssbot_test_nonexistent_config.toml");
        let config = Config::load_file(path).unwrap();
        assert_eq!(config.poll_interval_secs, 300);
    }

    #[test]
    fn test_whitespace_only_file_returns_default() {
        let (dir, path) = write_config("whitespace", "   \n  \n  ");
        let config = Config::load_file(&path).unwrap();
        assert_eq!(config.fetch_concurrency, 10);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let (dir, path) = write_config("partial", "poll_interval_secs = 60\n");
        let config = Config::load_file(&path).unwrap();
        assert_eq!(config.poll_interval_secs, 60);
        assert_eq!(config.dispatch_concurrency, 8);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_full_config() {
        let content = r#"
poll_interval_secs = 120
database_path = "/var/lib/rssbot/bot.db"
fetch_concurrency = 4
dispatch_concurrency = 2
seen_window = 500
request_timeout_secs = 10
fetch_retries = 1
shutdown_grace_secs = 5
telegram_api_url = "http://127.0.0.1:8081"
bot_token = "123:abc"
"#;
        let (dir, path) = write_config("full", content);
        let config = Config::load_file(&path).unwrap();

        assert_eq!(config.poll_interval(), Duration::from_secs(120));
        assert_eq!(config.database_path, PathBuf::from("/var/lib/rssbot/bot.db"));
        assert_eq!(config.fetch_concurrency, 4);
        assert_eq!(config.dispatch_concurrency, 2);
        assert_eq!(config.seen_window, 500);
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.fetch_retries, 1);
        assert_eq!(config.shutdown_grace(), Duration::from_secs(5));
        assert_eq!(config.telegram_api_url, "http://127.0.0.1:8081");
        assert_eq!(
            config.bot_token().map(|t| t.expose_secret().to_string()),
            Some("123:abc".to_string())
        );
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let (dir, path) = write_config("invalid", "this is not [valid toml");
        let err = Config::load_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let (dir, path) = write_config("unknown", "poll_interval_secs = 60\nupdate_interval = 5\n");
        let config = Config::load_file(&path).unwrap();
        assert_eq!(config.poll_interval_secs, 60);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let (dir, path) = write_config("wrongtype", "poll_interval_secs = \"soon\"\n");
        assert!(Config::load_file(&path).is_err());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_too_large_file_rejected() {
        let (dir, path) = write_config("too_large", &"a".repeat(1_048_577));
        let err = Config::load_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = Config {
            bot_token: Some("from-file".into()),
            poll_interval_secs: 600,
            ..Config::default()
        };
        config
            .apply_env(env(&[("BOT_TOKEN", "from-env"), ("UPDATE_INTERVAL", " 45 ")]))
            .unwrap();

        assert_eq!(config.bot_token.as_deref(), Some("from-env"));
        assert_eq!(config.poll_interval_secs, 45);
    }

    #[test]
    fn test_absent_env_keeps_file_values() {
        let mut config = Config {
            bot_token: Some("from-file".into()),
            ..Config::default()
        };
        config.apply_env(env(&[("BOT_TOKEN", "  ")])).unwrap();
        assert_eq!(config.bot_token.as_deref(), Some("from-file"));
        assert_eq!(config.poll_interval_secs, 300);
    }

    #[test]
    fn test_bad_update_interval_rejected() {
        let mut config = Config::default();
        let err = config
            .apply_env(env(&[("UPDATE_INTERVAL", "often")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "UPDATE_INTERVAL", .. }));
    }

    #[test]
    fn test_zero_interval_fails_validation() {
        let config = Config {
            poll_interval_secs: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_database_path_resolution() {
        let config = Config::default();
        assert_eq!(
            config.database_path_in(Path::new("/etc/rssbot")),
            PathBuf::from("/etc/rssbot/rssbot.db")
        );

        let config = Config {
            database_path: PathBuf::from("/data/bot.db"),
            ..Config::default()
        };
        assert_eq!(
            config.database_path_in(Path::new("/etc/rssbot")),
            PathBuf::from("/data/bot.db")
        );
    }

    #[test]
    fn test_debug_masks_bot_token() {
        let config = Config {
            bot_token: Some("123456:super-secret".into()),
            ..Config::default()
        };
        let debug_output = format!("{:?}", config);
        assert!(!debug_output.contains("super-secret"));
        assert!(debug_output.contains("[REDACTED]"));
    }
}
