//! Configuration file parser for feedpulse.toml.
//!
//! The config file is optional — a missing file yields `Config::default()`.
//! All fields use `#[serde(default)]` so any subset of keys can be specified.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level application configuration.
///
/// The source of both TTL values: how long a discovered feed URL for a site
/// is trusted, and how long a fetched entry list (or failure marker) is
/// trusted before a re-fetch is allowed.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How long a discovered feed URL is trusted for a site, in days.
    pub discovery_ttl_days: u64,

    /// How long a fetched entry list or failure marker is trusted, in hours.
    pub payload_ttl_hours: u64,

    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: u64,

    /// HTTP read timeout in seconds.
    pub read_timeout_secs: u64,

    /// Upper bound on concurrent feed fetches.
    pub max_concurrent_fetches: usize,

    /// User-Agent header sent with every request. Some feed hosts reject
    /// non-browser agents outright.
    pub user_agent: String,

    /// Skip TLS certificate verification. Kept on by default so feeds behind
    /// broken certificate chains still resolve; turn off when every tracked
    /// host has a valid chain.
    pub accept_invalid_certs: bool,

    /// Where the persistent cache lives.
    pub cache_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discovery_ttl_days: 7,
            payload_ttl_hours: 24,
            connect_timeout_secs: 5,
            read_timeout_secs: 15,
            max_concurrent_fetches: 6,
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0 Safari/537.36"
                .to_string(),
            accept_invalid_certs: true,
            cache_path: PathBuf::from("_rss_cache.json"),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn discovery_ttl(&self) -> Duration {
        Duration::from_secs(self.discovery_ttl_days * 24 * 3600)
    }

    pub fn payload_ttl(&self) -> Duration {
        Duration::from_secs(self.payload_ttl_hours * 3600)
    }
}
