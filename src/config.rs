//! Configuration file handling.
//!
//! Optional TOML file at the platform config directory (e.g.
//! `~/.config/supplyscan/config.toml`). Every field has a sensible default,
//! so most installs never create one.
//!
//! # Example Configuration
//!
//! ```toml
//! github_token = "ghp_xxxx"
//! csv_ttl_hours = 6
//! advisory_ttl_hours = 12
//! cache_dir = "/var/cache/supplyscan"
//! ```

use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// GitHub token for authenticated advisory requests. The
    /// `GITHUB_TOKEN` environment variable takes precedence.
    pub github_token: Option<String>,

    /// Override for the CSV IOC feed URL.
    pub csv_feed_url: Option<String>,

    /// Override for the advisory API URL.
    pub advisory_url: Option<String>,

    /// Override for the cache directory. The `SUPPLYSCAN_CACHE_DIR`
    /// environment variable takes precedence over this.
    pub cache_dir: Option<PathBuf>,

    /// Cache TTL override for the CSV feed, in hours.
    pub csv_ttl_hours: Option<u64>,

    /// Cache TTL override for the advisory feed, in hours.
    pub advisory_ttl_hours: Option<u64>,
}

impl Config {
    /// Loads configuration from the config file, or defaults when the file
    /// does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Returns the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("supplyscan")
            .join("config.toml")
    }

    /// The advisory API token: environment first, then the config file.
    pub fn github_token(&self) -> Option<String> {
        std::env::var("GITHUB_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .or_else(|| self.github_token.clone())
    }
}
