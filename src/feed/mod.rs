//! Feed resolution: discovery, fetching, tolerant parsing, date extraction.
//!
//! The module is organized into four submodules:
//!
//! - [`parser`] - Tolerant RSS/Atom parsing into the canonical [`Entry`] shape
//! - [`dates`] - Best-timestamp extraction from an entry's date fields
//! - [`discovery`] - Feed-URL discovery from a website's HTML or well-known paths
//! - [`fetcher`] - Cache-aware fetch with one-shot rediscovery fallback
//!
//! Discovery and fetching hang off [`FeedClient`], which owns the shared HTTP
//! client, the injected cache handle, and both TTLs. Network and parse
//! failures never escape this module as errors — they are converted into
//! in-band values so one broken feed cannot abort a batch run.

mod dates;
mod discovery;
mod fetcher;
mod parser;

pub use dates::resolve_entry_date;
pub use fetcher::{FeedRecord, FetchStatus, RetryState};
pub use parser::{parse_feed, Entry, ParsedFeed};

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::cache::CacheStore;
use crate::config::Config;

/// Shared state for all feed network operations.
pub struct FeedClient {
    http: reqwest::Client,
    cache: Arc<Mutex<CacheStore>>,
    discovery_ttl: Duration,
    payload_ttl: Duration,
}

impl FeedClient {
    pub fn new(
        http: reqwest::Client,
        cache: Arc<Mutex<CacheStore>>,
        discovery_ttl: Duration,
        payload_ttl: Duration,
    ) -> Self {
        Self {
            http,
            cache,
            discovery_ttl,
            payload_ttl,
        }
    }

    /// Builds the shared HTTP client from configuration and wires it to the
    /// given cache handle.
    pub fn from_config(config: &Config, cache: Arc<Mutex<CacheStore>>) -> reqwest::Result<Self> {
        let http = build_http_client(config)?;
        Ok(Self::new(
            http,
            cache,
            config.discovery_ttl(),
            config.payload_ttl(),
        ))
    }

    /// The injected cache handle, exposed so callers (and tests) can inspect
    /// what a run persisted.
    pub fn cache(&self) -> &Arc<Mutex<CacheStore>> {
        &self.cache
    }
}

/// One HTTP client per run: custom User-Agent, short connect / longer read
/// timeouts, redirects followed (reqwest's default), system proxies ignored.
/// Certificate verification is disabled when configured so feeds behind
/// broken chains still resolve.
pub fn build_http_client(config: &Config) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .read_timeout(Duration::from_secs(config.read_timeout_secs))
        .danger_accept_invalid_certs(config.accept_invalid_certs)
        .no_proxy()
        .build()
}

/// Errors reading a response body. Never escapes the feed module; both
/// discovery and fetch convert these into in-band failure values.
#[derive(Debug, Error)]
pub(crate) enum BodyError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("response exceeded {0} bytes")]
    TooLarge(usize),
}

/// Reads a response body with a size limit using stream-based reading, so an
/// adversarial or misconfigured host cannot exhaust memory.
pub(crate) async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, BodyError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(BodyError::TooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(BodyError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(BodyError::TooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
