//! Client configuration
//!
//! Every knob of the resilience layer has a default; a deployment usually
//! only provides the base URL through the environment.

use serde::{Deserialize, Serialize};

use crate::batch::BatchOptions;
use crate::cache::CacheConfig;
use crate::http::transport::parse_base_url;
use crate::http::{RetryPolicy, TimeoutTable, DEFAULT_TOKEN_KEY};
use crate::{Error, Result};

pub const ENV_BASE_URL: &str = "BULWARK_BASE_URL";
pub const ENV_MAX_RETRIES: &str = "BULWARK_MAX_RETRIES";
pub const ENV_BASE_DELAY_MS: &str = "BULWARK_BASE_DELAY_MS";
pub const ENV_CACHE_TTL_MS: &str = "BULWARK_CACHE_TTL_MS";

/// Complete configuration for a [`BulwarkClient`](crate::BulwarkClient)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL every request path is joined onto
    pub base_url: String,
    pub timeouts: TimeoutTable,
    pub retry: RetryPolicy,
    pub cache: CacheConfig,
    pub batch: BatchOptions,
    /// Session storage key for the token
    pub token_storage_key: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api".to_string(),
            timeouts: TimeoutTable::default(),
            retry: RetryPolicy::default(),
            cache: CacheConfig::default(),
            batch: BatchOptions::default(),
            token_storage_key: DEFAULT_TOKEN_KEY.to_string(),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Defaults overridden by the process environment, after loading `.env`
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.merge_env()?;
        Ok(config)
    }

    /// Apply `BULWARK_*` variables from the process environment and `.env`
    pub fn merge_env(&mut self) -> Result<()> {
        dotenv::dotenv().ok();
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply `BULWARK_*` overrides from any variable source
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_BASE_URL) {
            self.base_url = url;
        }
        if let Some(raw) = lookup(ENV_MAX_RETRIES) {
            self.retry.max_retries = parse_number(ENV_MAX_RETRIES, &raw)?;
        }
        if let Some(raw) = lookup(ENV_BASE_DELAY_MS) {
            self.retry.base_delay_ms = parse_number(ENV_BASE_DELAY_MS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_CACHE_TTL_MS) {
            self.cache.ttl_ms = parse_number(ENV_CACHE_TTL_MS, &raw)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        parse_base_url(&self.base_url)?;

        self.timeouts
            .validate()
            .map_err(|message| Error::config("timeouts", message))?;

        if self.retry.backoff_factor == 0.0 {
            return Err(Error::config("retry.backoff_factor", "Backoff factor cannot be zero"));
        }
        self.retry
            .validate()
            .map_err(|message| Error::config("retry", message))?;

        if self.batch.concurrency == 0 {
            return Err(Error::config("batch.concurrency", "Batch concurrency must be at least 1"));
        }

        if self.token_storage_key.trim().is_empty() {
            return Err(Error::config("token_storage_key", "Token storage key cannot be empty"));
        }

        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::config(name, format!("{} must be a non-negative integer, got {:?}", name, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache.ttl_ms, 300_000);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.batch.concurrency, 5);
    }

    #[test]
    fn test_overrides() {
        let mut config = ClientConfig::default();
        config
            .apply_overrides(lookup(&[
                (ENV_BASE_URL, "https://admin.example.com/api"),
                (ENV_MAX_RETRIES, "5"),
                (ENV_CACHE_TTL_MS, "60000"),
            ]))
            .unwrap();

        assert_eq!(config.base_url, "https://admin.example.com/api");
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.base_delay_ms, 1_000);
        assert_eq!(config.cache.ttl_ms, 60_000);
    }

    #[test]
    fn test_bad_override_names_variable() {
        let mut config = ClientConfig::default();
        let err = config
            .apply_overrides(lookup(&[(ENV_BASE_DELAY_MS, "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_BASE_DELAY_MS));
    }

    #[test]
    fn test_validation_failures() {
        let mut config = ClientConfig::new("not a url");
        assert!(config.validate().is_err());

        config = ClientConfig::default();
        config.timeouts.read_ms = 0;
        assert!(config.validate().is_err());

        config = ClientConfig::default();
        config.retry.backoff_factor = 0.0;
        assert!(config.validate().is_err());

        config = ClientConfig::default();
        config.batch.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json() {
        let config: ClientConfig = serde_json::from_str(
            r#"{"base_url": "https://api.example.com", "retry": {"max_retries": 1}}"#,
        )
        .unwrap();
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.retry.base_delay_ms, 1_000);
        assert_eq!(config.timeouts.read_ms, 8_000);
    }
}
