//! Persistent TTL cache shared by feed discovery and feed fetching.
//!
//! The cache is a flat `key -> (timestamp, payload)` map serialized as a
//! single JSON file. Every `put` overwrites the record for its key and
//! immediately rewrites the whole file; there is no append mode and no
//! versioning. Loading fails soft: a missing or corrupt cache file yields an
//! empty store rather than an error.
//!
//! The store assumes exclusive single-process ownership for the duration of
//! a run. Callers that fetch concurrently wrap it in a mutex so the
//! read-modify-write cycle around `flush` stays serialized.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::feed::Entry;

/// Why a feed fetch was recorded as failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The feed URL answered HTTP 404.
    NotFound,
    /// Any other fetch or parse failure.
    FetchError,
}

/// A cached record of a failed fetch. Its presence suppresses re-fetching a
/// known-broken feed until the payload TTL expires.
///
/// `entries` is always empty; it is kept in the wire format so a failure
/// marker deserializes into the same downstream shape as a feed payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureMarker {
    pub error: FailureReason,
    pub status: u16,
    #[serde(default)]
    pub entries: Vec<Entry>,
}

/// The normalized entry list of a successfully fetched feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedPayload {
    pub entries: Vec<Entry>,
}

/// What a cache record holds.
///
/// Untagged on purpose: a failure marker is the only object with an `error`
/// field, a feed payload is an object with just `entries`, and a discovered
/// feed URL serializes as a bare string. Variant order matters for
/// deserialization — `Failure` must be tried before `Feed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CachePayload {
    Failure(FailureMarker),
    Feed(FeedPayload),
    DiscoveredUrl(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheRecord {
    timestamp: DateTime<Utc>,
    payload: CachePayload,
}

/// The cache store. One record per key; a write always replaces the prior
/// record for that key.
pub struct CacheStore {
    path: Option<PathBuf>,
    records: HashMap<String, CacheRecord>,
}

impl CacheStore {
    /// Loads the cache from disk. A missing or corrupt file yields an empty
    /// store — the cache is an optimization, never a reason to abort a run.
    pub fn load(path: &Path) -> Self {
        let records = match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Cache file is corrupt, starting with an empty cache"
                    );
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No cache file found");
                HashMap::new()
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to read cache file, starting with an empty cache"
                );
                HashMap::new()
            }
        };

        tracing::debug!(path = %path.display(), records = records.len(), "Cache loaded");
        Self {
            path: Some(path.to_path_buf()),
            records,
        }
    }

    /// An in-memory store that is never persisted. Used by `--no-cache` runs
    /// and tests.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            records: HashMap::new(),
        }
    }

    /// Returns the payload for `key` if its record is younger than `ttl`.
    /// A stale record acts as absent but is left in place — the next `put`
    /// for the key overwrites it.
    pub fn get(&self, key: &str, ttl: Duration) -> Option<&CachePayload> {
        let record = self.records.get(key)?;
        let ttl = chrono::TimeDelta::from_std(ttl).unwrap_or(chrono::TimeDelta::MAX);
        let age = Utc::now().signed_duration_since(record.timestamp);
        if age < ttl {
            Some(&record.payload)
        } else {
            tracing::debug!(key = %key, "Cache record is stale");
            None
        }
    }

    /// Stores `payload` under `key` with the current timestamp, replacing any
    /// prior record, and rewrites the cache file. Flush failures are logged
    /// and swallowed: losing the cache must not abort the batch run.
    pub fn put(&mut self, key: &str, payload: CachePayload) {
        self.put_at(key, payload, Utc::now());
    }

    fn put_at(&mut self, key: &str, payload: CachePayload, timestamp: DateTime<Utc>) {
        self.records
            .insert(key.to_string(), CacheRecord { timestamp, payload });
        if let Err(e) = self.flush() {
            tracing::warn!(key = %key, error = %e, "Failed to persist cache");
        }
    }

    /// Serializes the entire map and writes it to the cache file via a
    /// write-to-temp-then-rename so the file is never left partially written.
    fn flush(&self) -> anyhow::Result<()> {
        use anyhow::Context;

        let Some(path) = &self.path else {
            return Ok(());
        };

        let content = serde_json::to_string(&self.records).context("Failed to serialize cache")?;
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, content)
            .with_context(|| format!("Failed to write cache to '{}'", temp_path.display()))?;
        std::fs::rename(&temp_path, path).with_context(|| {
            let _ = std::fs::remove_file(&temp_path);
            format!("Failed to replace cache file '{}'", path.display())
        })?;
        Ok(())
    }

    /// Number of records currently held, fresh or stale.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::Entry;

    const HOUR: Duration = Duration::from_secs(3600);

    fn sample_entry(title: &str) -> Entry {
        Entry {
            title: Some(title.to_string()),
            ..Entry::default()
        }
    }

    #[test]
    fn test_get_fresh_record() {
        let mut store = CacheStore::in_memory();
        store.put("site", CachePayload::DiscoveredUrl("https://a/feed".into()));

        let payload = store.get("site", HOUR).unwrap();
        assert_eq!(
            payload,
            &CachePayload::DiscoveredUrl("https://a/feed".into())
        );
    }

    #[test]
    fn test_stale_record_acts_as_absent_but_is_kept() {
        let mut store = CacheStore::in_memory();
        let old = Utc::now() - chrono::TimeDelta::hours(2);
        store.put_at(
            "site",
            CachePayload::DiscoveredUrl("https://a/feed".into()),
            old,
        );

        assert!(store.get("site", HOUR).is_none());
        // The stale record is not deleted
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_put_replaces_prior_record() {
        let mut store = CacheStore::in_memory();
        store.put("k", CachePayload::DiscoveredUrl("https://old".into()));
        store.put("k", CachePayload::DiscoveredUrl("https://new".into()));

        assert_eq!(store.len(), 1);
        assert_eq!(
            store.get("k", HOUR),
            Some(&CachePayload::DiscoveredUrl("https://new".into()))
        );
    }

    #[test]
    fn test_load_missing_file_yields_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::load(&dir.path().join("nonexistent.json"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_corrupt_file_yields_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = CacheStore::load(&path);
        assert!(store.is_empty());
    }

    #[test]
    fn test_put_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let mut store = CacheStore::load(&path);
        store.put(
            "https://a/feed",
            CachePayload::Feed(FeedPayload {
                entries: vec![sample_entry("Post")],
            }),
        );

        let reloaded = CacheStore::load(&path);
        match reloaded.get("https://a/feed", HOUR) {
            Some(CachePayload::Feed(p)) => {
                assert_eq!(p.entries.len(), 1);
                assert_eq!(p.entries[0].title.as_deref(), Some("Post"));
            }
            other => panic!("Expected feed payload, got {:?}", other),
        }
    }

    #[test]
    fn test_payload_wire_formats() {
        // Discovered URL serializes as a bare string
        let url = CachePayload::DiscoveredUrl("https://a/feed".into());
        assert_eq!(serde_json::to_string(&url).unwrap(), "\"https://a/feed\"");

        // Failure marker serializes with snake_case reason and empty entries
        let marker = CachePayload::Failure(FailureMarker {
            error: FailureReason::NotFound,
            status: 404,
            entries: Vec::new(),
        });
        let json = serde_json::to_string(&marker).unwrap();
        assert!(json.contains("\"error\":\"not_found\""));
        assert!(json.contains("\"status\":404"));
        assert!(json.contains("\"entries\":[]"));

        // And each round-trips into the right variant
        let back: CachePayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, marker);
        let back: CachePayload = serde_json::from_str("\"https://a/feed\"").unwrap();
        assert_eq!(back, url);
        let back: CachePayload = serde_json::from_str(r#"{"entries":[]}"#).unwrap();
        assert!(matches!(back, CachePayload::Feed(_)));
    }
}
