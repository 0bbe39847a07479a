//! Configuration management for frontdesk.
//!
//! This module is the settings store: it loads configuration using figment
//! (defaults, TOML file, environment variables) and persists the full
//! configuration back to the TOML file on every explicit save.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "frontdesk";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "frontdesk.db";

/// Built-in remote URL, used whenever the configured one is blank.
///
/// Overridable at build time with `FRONTDESK_DEFAULT_REMOTE_URL`.
pub const DEFAULT_REMOTE_URL: &str = match option_env!("FRONTDESK_DEFAULT_REMOTE_URL") {
    Some(url) => url,
    None => "http://127.0.0.1:54321",
};

/// Built-in remote key, used whenever the configured one is blank.
///
/// Overridable at build time with `FRONTDESK_DEFAULT_REMOTE_KEY`. When empty,
/// remote mode cannot start and the queue stays local.
pub const DEFAULT_REMOTE_KEY: &str = match option_env!("FRONTDESK_DEFAULT_REMOTE_KEY") {
    Some(key) => key,
    None => "",
};

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `FRONTDESK_`, sections split by `__`)
/// 2. TOML config file at `~/.config/frontdesk/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Hosted database connection.
    pub remote: RemoteConfig,
    /// Text-parsing service.
    pub ai: AiConfig,
    /// Notification behaviour.
    pub notifications: NotificationConfig,
    /// Local storage.
    pub storage: StorageConfig,
}

/// Remote (hosted database) configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Use the hosted database instead of local storage.
    pub enabled: bool,
    /// Base URL of the hosted project.
    pub url: String,
    /// Public (anon) API key.
    pub key: String,
    /// Table holding the queue.
    pub table: String,
}

/// AI text-parser configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Gemini API key. Empty disables AI parsing.
    pub api_key: String,
    /// Model used for extraction.
    pub model: String,
}

/// Notification configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Raise OS-level notifications.
    pub system_enabled: bool,
    /// Play the audible cue.
    pub sound_enabled: bool,
    /// How long the in-app banner stays up, in seconds.
    pub banner_secs: u64,
    /// Seconds without input before the session counts as unfocused.
    pub idle_secs: u64,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/frontdesk/frontdesk.db`
    pub database_path: Option<PathBuf>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: DEFAULT_REMOTE_URL.to_string(),
            key: DEFAULT_REMOTE_KEY.to_string(),
            table: "patients".to_string(),
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-3-flash-preview".to_string(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            system_enabled: false,
            sound_enabled: true,
            banner_secs: 3,
            idle_secs: 30,
        }
    }
}

impl RemoteConfig {
    /// Whether these settings ask for remote mode and carry credentials.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.enabled && !self.url.trim().is_empty() && !self.key.trim().is_empty()
    }

    /// Whether switching from `other` to `self` needs a new connection.
    #[must_use]
    pub fn connection_changed(&self, other: &Self) -> bool {
        self.enabled != other.enabled
            || self.url != other.url
            || self.key != other.key
            || self.table != other.table
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// Blank connection fields are backfilled with the built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);
        debug!("Loading configuration from {}", config_file.display());

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("FRONTDESK_").split("__"));

        let mut config: Config = figment.extract()?;
        config.backfill_defaults();
        config.validate()?;
        Ok(config)
    }

    /// Write the full configuration to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let body = toml::to_string_pretty(self).map_err(|e| Error::ConfigSave {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        std::fs::write(path, body).map_err(|e| Error::ConfigSave {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Replace blank URL/key with the built-in values.
    pub fn backfill_defaults(&mut self) {
        if self.remote.url.trim().is_empty() {
            self.remote.url = DEFAULT_REMOTE_URL.to_string();
        }
        if self.remote.key.trim().is_empty() {
            self.remote.key = DEFAULT_REMOTE_KEY.to_string();
        }
    }

    /// Set one field from its dotted key, as used by `config set`.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown keys or values of the wrong type.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "remote.enabled" => self.remote.enabled = parse_bool(key, value)?,
            "remote.url" => self.remote.url = value.trim().to_string(),
            "remote.key" => self.remote.key = value.trim().to_string(),
            "remote.table" => self.remote.table = value.trim().to_string(),
            "ai.api_key" => self.ai.api_key = value.trim().to_string(),
            "ai.model" => self.ai.model = value.trim().to_string(),
            "notifications.system_enabled" => {
                self.notifications.system_enabled = parse_bool(key, value)?;
            }
            "notifications.sound_enabled" => {
                self.notifications.sound_enabled = parse_bool(key, value)?;
            }
            "notifications.banner_secs" => {
                self.notifications.banner_secs = parse_u64(key, value)?;
            }
            "notifications.idle_secs" => self.notifications.idle_secs = parse_u64(key, value)?,
            "storage.database_path" => {
                let trimmed = value.trim();
                self.storage.database_path = if trimmed.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(trimmed))
                };
            }
            other => return Err(Error::UnknownKey(other.to_string())),
        }
        Ok(())
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.notifications.banner_secs == 0 {
            return Err(Error::ConfigValidation {
                message: "banner_secs must be greater than 0".to_string(),
            });
        }

        if self.notifications.idle_secs == 0 {
            return Err(Error::ConfigValidation {
                message: "idle_secs must be greater than 0".to_string(),
            });
        }

        if self.remote.table.trim().is_empty() {
            return Err(Error::ConfigValidation {
                message: "remote.table must not be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Check that the remote URL parses.
    ///
    /// Not part of [`Config::validate`]: a bad URL at startup only means the
    /// queue runs locally. `config set` and `config validate` report it.
    ///
    /// # Errors
    ///
    /// Returns an error if `remote.url` is non-empty and not a valid URL.
    pub fn check_remote_url(&self) -> Result<()> {
        let url = self.remote.url.trim();
        if !url.is_empty() && url::Url::parse(url).is_err() {
            return Err(Error::ConfigValidation {
                message: format!("remote.url is not a valid URL: {url}"),
            });
        }
        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the banner lifetime as a Duration.
    #[must_use]
    pub fn banner_duration(&self) -> Duration {
        Duration::from_secs(self.notifications.banner_secs)
    }

    /// Get the idle timeout as a Duration.
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.notifications.idle_secs)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        other => Err(Error::ConfigValidation {
            message: format!("{key} expects true/false, got '{other}'"),
        }),
    }
}

fn parse_u64(key: &str, value: &str) -> Result<u64> {
    value.trim().parse().map_err(|_| Error::ConfigValidation {
        message: format!("{key} expects a whole number, got '{}'", value.trim()),
    })
}
