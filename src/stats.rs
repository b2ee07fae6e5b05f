//! Publication-activity classification.
//!
//! Converts a feed's normalized entry list into an [`ActivityClass`]: the
//! terminal artifact the sorter and report writer consume.

use chrono::NaiveDateTime;

use crate::feed::{resolve_entry_date, Entry, FeedClient, FetchStatus, RetryState};

/// How actively a feed publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityClass {
    /// The fetch never succeeded.
    Dead,
    /// Fetched fine, but no entry carried a resolvable date.
    NoUpdate,
    /// Exactly one resolvable date — active, but no cadence can be computed.
    SingleEntry,
    /// Mean interval between consecutive publications, in whole seconds.
    Timed(i64),
}

impl ActivityClass {
    /// Sort weight in seconds; `None` for feeds with no activity signal.
    ///
    /// `SingleEntry` maps to 1 second — "unknown frequency but alive" sorts
    /// as most active among the non-timed classes. A modeling compromise
    /// inherited from the original behavior, kept for output compatibility.
    pub fn interval_secs(&self) -> Option<i64> {
        match self {
            ActivityClass::Timed(secs) => Some(*secs),
            ActivityClass::SingleEntry => Some(1),
            ActivityClass::Dead | ActivityClass::NoUpdate => None,
        }
    }
}

/// Fetches a feed (with rediscovery fallback against `site_url`) and
/// classifies its publication activity.
pub async fn classify(client: &FeedClient, feed_url: &str, site_url: &str) -> ActivityClass {
    let record = client
        .fetch(feed_url, Some(site_url), RetryState::Fresh)
        .await;

    if record.status != FetchStatus::Ok {
        return ActivityClass::Dead;
    }

    classify_entries(&record.entries)
}

/// Classifies an entry list by its resolvable dates.
///
/// Dates are sorted descending before computing gaps, so out-of-order feed
/// entries still yield a sensible cadence; the mean gap is truncated to whole
/// seconds.
pub fn classify_entries(entries: &[Entry]) -> ActivityClass {
    let mut dates: Vec<NaiveDateTime> = entries.iter().filter_map(resolve_entry_date).collect();

    match dates.len() {
        0 => ActivityClass::NoUpdate,
        1 => ActivityClass::SingleEntry,
        n => {
            dates.sort_unstable_by(|a, b| b.cmp(a));
            let total: i64 = dates
                .windows(2)
                .map(|pair| (pair[0] - pair[1]).num_seconds())
                .sum();
            ActivityClass::Timed(total / (n as i64 - 1))
        }
    }
}
