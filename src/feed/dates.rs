//! Best-timestamp extraction from an entry's heterogeneous date fields.

use chrono::{DateTime, NaiveDateTime};

use crate::feed::Entry;

/// Resolves the single best timestamp for an entry.
///
/// Priority chain, first success wins:
/// 1. structured published timestamp,
/// 2. structured updated timestamp,
/// 3. RFC 2822 parse of the raw published string,
/// 4. RFC 2822 parse of the raw updated string.
///
/// Raw-string parse failures are swallowed — an unusable date is simply
/// absent, never an error.
pub fn resolve_entry_date(entry: &Entry) -> Option<NaiveDateTime> {
    if let Some(dt) = entry.published_struct {
        return Some(dt);
    }
    if let Some(dt) = entry.updated_struct {
        return Some(dt);
    }
    if let Some(dt) = entry.published_raw.as_deref().and_then(parse_rfc2822_naive) {
        return Some(dt);
    }
    if let Some(dt) = entry.updated_raw.as_deref().and_then(parse_rfc2822_naive) {
        return Some(dt);
    }
    None
}

/// RFC 2822 parse with the timezone offset dropped: the wall-clock value is
/// kept as a timezone-naive instant.
fn parse_rfc2822_naive(raw: &str) -> Option<NaiveDateTime> {
    DateTime::parse_from_rfc2822(raw.trim())
        .ok()
        .map(|dt| dt.naive_local())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn naive(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_structured_published_beats_raw() {
        let entry = Entry {
            published_struct: Some(naive(2024, 1, 1, 0)),
            published_raw: Some("Tue, 02 Jan 2024 00:00:00 +0000".into()),
            ..Entry::default()
        };
        assert_eq!(resolve_entry_date(&entry), Some(naive(2024, 1, 1, 0)));
    }

    #[test]
    fn test_structured_updated_beats_raw_published() {
        let entry = Entry {
            updated_struct: Some(naive(2024, 3, 1, 0)),
            published_raw: Some("Tue, 02 Jan 2024 00:00:00 +0000".into()),
            ..Entry::default()
        };
        assert_eq!(resolve_entry_date(&entry), Some(naive(2024, 3, 1, 0)));
    }

    #[test]
    fn test_raw_published_rfc2822_fallback() {
        let entry = Entry {
            published_raw: Some("Mon, 01 Jan 2024 09:00:00 +0000".into()),
            ..Entry::default()
        };
        assert_eq!(resolve_entry_date(&entry), Some(naive(2024, 1, 1, 9)));
    }

    #[test]
    fn test_offset_is_dropped_not_converted() {
        // 09:00 at +0200 stays 09:00 once the offset is stripped
        let entry = Entry {
            published_raw: Some("Mon, 01 Jan 2024 09:00:00 +0200".into()),
            ..Entry::default()
        };
        assert_eq!(resolve_entry_date(&entry), Some(naive(2024, 1, 1, 9)));
    }

    #[test]
    fn test_raw_updated_is_last_resort() {
        let entry = Entry {
            published_raw: Some("not a date".into()),
            updated_raw: Some("Mon, 01 Jan 2024 09:00:00 +0000".into()),
            ..Entry::default()
        };
        assert_eq!(resolve_entry_date(&entry), Some(naive(2024, 1, 1, 9)));
    }

    #[test]
    fn test_malformed_raw_date_resolves_to_absent() {
        let entry = Entry {
            published_raw: Some("yesterday-ish".into()),
            updated_raw: Some("also not a date".into()),
            ..Entry::default()
        };
        assert_eq!(resolve_entry_date(&entry), None);
    }

    #[test]
    fn test_entry_without_dates_resolves_to_absent() {
        assert_eq!(resolve_entry_date(&Entry::default()), None);
    }
}
