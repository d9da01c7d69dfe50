//! Configuration management for holecache.
//!
//! Configuration is stored as TOML. Every section and field has a default, so a partial
//! file (or none at all) is valid.
//!
//! ## Configuration Hierarchy
//!
//! 1. **Defaults**: compiled-in values
//! 2. **Config file**: `HOLECACHE_CONFIG`, or `config.toml` in the platform config directory
//! 3. **Environment variables**: `HOLECACHE_DATA_DIR`, `HOLECACHE_OFFLINE`, `HOLECACHE_TOKEN`
//!
//! ## Example Configuration File
//!
//! ```toml
//! [defaults]
//! content_source = "remote"
//! sort_order = "last_replied"
//! page_size = 10
//! user_id = 0
//!
//! [paths]
//! root = "/home/user/.local/share/holecache"
//!
//! [remote]
//! base_url = "https://forum.example.edu/api"
//! timeout_secs = 30
//! ```

use crate::pipeline::ContentSource;
use crate::storage::UserId;
use crate::types::SortOrder;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

/// Environment variable pointing at an explicit config file.
pub const CONFIG_ENV: &str = "HOLECACHE_CONFIG";
/// Environment variable overriding the data root.
pub const DATA_DIR_ENV: &str = "HOLECACHE_DATA_DIR";
/// Environment variable forcing the retained content source when truthy.
pub const OFFLINE_ENV: &str = "HOLECACHE_OFFLINE";
/// Environment variable supplying the remote bearer token.
pub const TOKEN_ENV: &str = "HOLECACHE_TOKEN";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listing behaviour defaults
    pub defaults: DefaultsConfig,
    /// File system paths configuration
    pub paths: PathsConfig,
    /// Remote forum API settings
    pub remote: RemoteConfig,
}

/// Listing behaviour defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// Where listings read from.
    ///
    /// `remote` reads the forum API and captures everything it reads; `retained` replays
    /// captured content without touching the network.
    pub content_source: ContentSource,

    /// Hole listing order.
    pub sort_order: SortOrder,

    /// Number of entities requested per remote page.
    pub page_size: usize,

    /// Account whose namespace retained data is filed under.
    pub user_id: UserId,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            content_source: ContentSource::Remote,
            sort_order: SortOrder::LastReplied,
            page_size: 10,
            user_id: 0,
        }
    }
}

/// File system paths configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root directory for all retained content.
    ///
    /// Default locations:
    /// - Linux: `~/.local/share/holecache`
    /// - macOS: `~/Library/Application Support/dev.holecache.holecache`
    /// - Windows: `%APPDATA%\holecache\holecache\data`
    pub root: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            root: directories::ProjectDirs::from("dev", "holecache", "holecache").map_or_else(
                || {
                    directories::BaseDirs::new().map_or_else(
                        || PathBuf::from(".holecache"),
                        |base| base.home_dir().join(".holecache"),
                    )
                },
                |dirs| dirs.data_dir().to_path_buf(),
            ),
        }
    }
}

/// Remote forum API settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// API base URL; endpoint paths are appended to it.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Opaque bearer token sent with every request, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://forum-api.example.edu/api".to_string(),
            timeout_secs: 30,
            token: None,
        }
    }
}

impl Config {
    /// Load configuration from the default location, then apply environment overrides.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined, or the file
    /// exists but cannot be read, parsed or validated.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an explicit file; a missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config: {e}")))?;
        toml::from_str(&content).map_err(|e| Error::Config(format!("Failed to parse config: {e}")))
    }

    /// Save the configuration to the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be serialized or written.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save the configuration to an explicit file, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be serialized or written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| Error::Config("Invalid config path".into()))?;
        fs::create_dir_all(parent)
            .map_err(|e| Error::Config(format!("Failed to create config directory: {e}")))?;

        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;
        fs::write(path, content).map_err(|e| Error::Config(format!("Failed to write config: {e}")))
    }

    /// Path of the config file: `HOLECACHE_CONFIG` or the platform config directory.
    ///
    /// # Errors
    ///
    /// Returns an error if no config directory can be determined.
    pub fn config_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Ok(PathBuf::from(trimmed));
            }
        }

        let project_dirs = directories::ProjectDirs::from("dev", "holecache", "holecache")
            .ok_or_else(|| Error::Config("Failed to determine project directories".into()))?;
        Ok(project_dirs.config_dir().join("config.toml"))
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(DATA_DIR_ENV) {
            let trimmed = dir.trim();
            if !trimmed.is_empty() {
                self.paths.root = PathBuf::from(trimmed);
            }
        }

        if let Some(flag) = lookup(OFFLINE_ENV) {
            if matches!(flag.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes") {
                self.defaults.content_source = ContentSource::Retained;
            }
        }

        if let Some(token) = lookup(TOKEN_ENV) {
            let trimmed = token.trim();
            if !trimmed.is_empty() {
                self.remote.token = Some(trimmed.to_string());
            }
        }
    }

    /// Check value ranges the type system cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a zero page size or timeout, or an unparsable base URL.
    pub fn validate(&self) -> Result<()> {
        if self.defaults.page_size == 0 {
            return Err(Error::Config("page_size must be at least 1".into()));
        }
        if self.remote.timeout_secs == 0 {
            return Err(Error::Config("timeout_secs must be at least 1".into()));
        }
        Url::parse(&self.remote.base_url)
            .map_err(|e| Error::Config(format!("Invalid base_url '{}': {e}", self.remote.base_url)))?;
        Ok(())
    }
}
