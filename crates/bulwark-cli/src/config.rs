//! Configuration management for the CLI
//!
//! Configuration is merged from, lowest precedence first:
//! - Default values
//! - A configuration file (TOML or JSON, chosen by extension)
//! - `BULWARK_*` environment variables and `.env`
//! - Command-line arguments

use crate::error::{Error, Result};
use bulwark_core::ClientConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Resilience layer settings
    pub client: ClientConfig,

    /// Session settings
    pub session: SessionConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// Session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Lifetime assumed for a token passed with --token
    pub token_ttl_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level used when neither -v nor RUST_LOG is given
    pub level: Option<String>,

    /// Log format (compact, full, json)
    pub format: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token_ttl_ms: 15 * 60 * 1_000,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path)?;

        let config = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => toml::from_str(&content)?,
            Some("json") => serde_json::from_str(&content)?,
            _ => {
                return Err(Error::InvalidFormat {
                    path: path.to_path_buf(),
                    expected: "TOML or JSON".to_string(),
                })
            }
        };

        Ok(config)
    }

    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        for path in Self::default_config_paths() {
            if path.exists() {
                match Self::from_file(&path) {
                    Ok(config) => {
                        tracing::debug!(path = %path.display(), "Loaded configuration");
                        return Ok(config);
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable config file");
                    }
                }
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file or default locations,
    /// then apply environment overrides
    pub fn load_with_file(file: Option<&Path>) -> Result<Self> {
        let mut config = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::load()?,
        };
        config.client.merge_env()?;
        Ok(config)
    }

    /// Get default configuration file paths to check
    fn default_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from("bulwark.toml"),
            PathBuf::from(".bulwark.toml"),
            PathBuf::from("bulwark.json"),
        ];

        if let Some(config_dir) = dirs::config_dir() {
            let bulwark_dir = config_dir.join("bulwark");
            paths.push(bulwark_dir.join("config.toml"));
            paths.push(bulwark_dir.join("config.json"));
        }

        if let Some(home_dir) = dirs::home_dir() {
            paths.push(home_dir.join(".bulwark.toml"));
        }

        paths
    }

    /// Apply command-line overrides and validate the result
    pub fn with_base_url(mut self, base_url: Option<&str>) -> Result<Self> {
        if let Some(url) = base_url {
            self.client.base_url = url.to_string();
        }
        self.client
            .validate()
            .map_err(|e| Error::config(e.to_string()))?;
        Ok(self)
    }
}
