//! Cache-aware feed fetching with one-shot rediscovery fallback.
//!
//! Per feed, per run, the state machine is:
//!
//! ```text
//! Start → CacheHit(done)
//! Start → Fetch → Success(done)
//!               → Failure → RediscoverOnce → NewURL → Fetch (no further rediscovery)
//!                                          → NoNewURL → FailureCached(done)
//! ```
//!
//! The "at most one rediscovery hop" invariant is carried by [`RetryState`]
//! as an explicit parameter rather than an implicit recursion guard. Every
//! failure mode is an in-band [`FetchStatus`] value; nothing here returns an
//! error to the caller.

use crate::cache::{CachePayload, FailureMarker, FailureReason, FeedPayload};
use crate::feed::{parse_feed, read_limited_bytes, Entry, FeedClient};

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Whether this fetch attempt may still fall back to rediscovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// First attempt; a failure may trigger one discovery pass.
    Fresh,
    /// Already rediscovered once; a failure is terminal.
    RetriedOnce,
}

/// Outcome of a fetch, carried in-band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    Ok,
    /// HTTP status in [400, 600).
    HttpError(u16),
    /// Body was not a usable RSS/Atom document and no entries were recovered.
    MalformedFeed,
    /// DNS, connection, TLS, or timeout failure.
    NetworkFailure,
}

impl FetchStatus {
    fn http_code(&self) -> u16 {
        match self {
            FetchStatus::HttpError(code) => *code,
            _ => 0,
        }
    }
}

/// A fetched (or cache-served) feed: the URL that actually served it, its
/// normalized entries, and how the fetch went. Transient — only the entry
/// list or a failure marker is persisted, never this record.
#[derive(Debug, Clone)]
pub struct FeedRecord {
    pub feed_url: String,
    pub entries: Vec<Entry>,
    pub status: FetchStatus,
}

enum FetchOutcome {
    Success(Vec<Entry>),
    Failure(FetchStatus),
}

impl FeedClient {
    /// Fetches and normalizes a feed, consulting the cache first.
    ///
    /// A cached failure marker counts as a hit: a known-broken feed is not
    /// re-fetched until the payload TTL expires. On a fresh failure with a
    /// site URL available, discovery runs once; a different URL restarts the
    /// fetch as [`RetryState::RetriedOnce`]. A terminal failure persists a
    /// [`FailureMarker`] under the ORIGINAL feed URL and yields an
    /// empty-entries record.
    pub async fn fetch(
        &self,
        feed_url: &str,
        site_url: Option<&str>,
        state: RetryState,
    ) -> FeedRecord {
        let mut current_url = feed_url.to_string();
        let mut state = state;

        loop {
            {
                let cache = self.cache.lock().await;
                match cache.get(&current_url, self.payload_ttl) {
                    Some(CachePayload::Feed(payload)) => {
                        tracing::debug!(feed = %current_url, "Using cached feed");
                        return FeedRecord {
                            feed_url: current_url,
                            entries: payload.entries.clone(),
                            status: FetchStatus::Ok,
                        };
                    }
                    Some(CachePayload::Failure(marker)) => {
                        tracing::debug!(
                            feed = %current_url,
                            status = marker.status,
                            "Feed has a cached failure marker, not retrying"
                        );
                        let status = match marker.status {
                            0 => FetchStatus::NetworkFailure,
                            code => FetchStatus::HttpError(code),
                        };
                        return FeedRecord {
                            feed_url: current_url,
                            entries: Vec::new(),
                            status,
                        };
                    }
                    // A discovery URL under a feed key would be anomalous;
                    // treat it (and absence) as a miss.
                    _ => {}
                }
            }

            tracing::info!(feed = %current_url, "Fetching feed");
            match self.fetch_once(&current_url).await {
                FetchOutcome::Success(entries) => {
                    self.cache.lock().await.put(
                        &current_url,
                        CachePayload::Feed(FeedPayload {
                            entries: entries.clone(),
                        }),
                    );
                    tracing::info!(feed = %current_url, entries = entries.len(), "Feed fetched");
                    return FeedRecord {
                        feed_url: current_url,
                        entries,
                        status: FetchStatus::Ok,
                    };
                }
                FetchOutcome::Failure(status) => {
                    if state == RetryState::Fresh {
                        if let Some(site) = site_url {
                            if let Some(new_url) = self.discover(site).await {
                                if new_url != current_url {
                                    tracing::info!(
                                        old = %current_url,
                                        new = %new_url,
                                        "Retrying with rediscovered feed URL"
                                    );
                                    current_url = new_url;
                                    state = RetryState::RetriedOnce;
                                    continue;
                                }
                            }
                        }
                    }

                    // Terminal failure: marker keyed by the original feed URL
                    // so the next run short-circuits on the URL it knows.
                    let reason = if status.http_code() == 404 {
                        FailureReason::NotFound
                    } else {
                        FailureReason::FetchError
                    };
                    self.cache.lock().await.put(
                        feed_url,
                        CachePayload::Failure(FailureMarker {
                            error: reason,
                            status: status.http_code(),
                            entries: Vec::new(),
                        }),
                    );
                    tracing::warn!(feed = %feed_url, status = ?status, "Feed fetch failed");
                    return FeedRecord {
                        feed_url: feed_url.to_string(),
                        entries: Vec::new(),
                        status,
                    };
                }
            }
        }
    }

    /// One network fetch and parse, no cache, no rediscovery.
    ///
    /// Success criterion: no HTTP error status, and the body is either
    /// well-formed or malformed with at least some recoverable entries.
    async fn fetch_once(&self, url: &str) -> FetchOutcome {
        let response = match self.http.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(feed = %url, error = %e, "Network error fetching feed");
                return FetchOutcome::Failure(FetchStatus::NetworkFailure);
            }
        };

        let code = response.status().as_u16();
        if (400..600).contains(&code) {
            tracing::warn!(feed = %url, status = code, "HTTP error fetching feed");
            return FetchOutcome::Failure(FetchStatus::HttpError(code));
        }

        let bytes = match read_limited_bytes(response, MAX_FEED_SIZE).await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(feed = %url, error = %e, "Error reading feed body");
                return FetchOutcome::Failure(FetchStatus::NetworkFailure);
            }
        };

        let parsed = parse_feed(&bytes);
        if parsed.malformed && parsed.entries.is_empty() {
            tracing::warn!(feed = %url, "Feed body is malformed with no recoverable entries");
            return FetchOutcome::Failure(FetchStatus::MalformedFeed);
        }
        if parsed.malformed {
            tracing::debug!(
                feed = %url,
                entries = parsed.entries.len(),
                "Feed is malformed but entries were recovered"
            );
        }

        FetchOutcome::Success(parsed.entries)
    }
}
