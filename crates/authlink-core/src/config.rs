//! Application configuration management.
//!
//! This module handles loading and saving the client configuration,
//! which includes the identity service base URL, an optional path prefix,
//! the per-call timeout and the storage backend for the persisted token.
//!
//! Configuration is stored at `~/.config/authlink/config.json`. Values can
//! be overridden with `AUTHLINK_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::auth::StorageKind;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "authlink";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Timeout applied to every outbound call, renewal included.
const DEFAULT_TIMEOUT_MS: u64 = 10_000;

const ENV_API_URL: &str = "AUTHLINK_API_URL";
const ENV_API_PREFIX: &str = "AUTHLINK_API_PREFIX";
const ENV_TIMEOUT_MS: &str = "AUTHLINK_TIMEOUT_MS";
const ENV_STORAGE: &str = "AUTHLINK_STORAGE";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_url: String,
    pub api_prefix: String,
    pub timeout_ms: u64,
    pub storage: StorageKind,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_prefix: String::new(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            storage: StorageKind::default(),
        }
    }
}

impl Config {
    /// Load the config file (if any) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Config pointing at `api_url` with every other setting at its default.
    pub fn for_url(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ..Self::default()
        }
    }

    fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL) {
            self.api_url = url;
        }
        if let Some(prefix) = lookup(ENV_API_PREFIX) {
            self.api_prefix = prefix;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            match raw.parse() {
                Ok(ms) => self.timeout_ms = ms,
                Err(_) => warn!(value = %raw, "Ignoring invalid {}", ENV_TIMEOUT_MS),
            }
        }
        if let Some(raw) = lookup(ENV_STORAGE) {
            match raw.parse() {
                Ok(kind) => self.storage = kind,
                Err(e) => warn!(error = %e, "Ignoring invalid {}", ENV_STORAGE),
            }
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Join an endpoint path onto the base URL and optional prefix.
    pub fn build_url(&self, endpoint: &str) -> String {
        let base = self.api_url.trim_end_matches('/');
        let prefix = self.api_prefix.trim_matches('/');
        let path = endpoint.trim_start_matches('/');

        if prefix.is_empty() {
            format!("{}/{}", base, path)
        } else {
            format!("{}/{}/{}", base, prefix, path)
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}
