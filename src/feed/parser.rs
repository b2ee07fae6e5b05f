//! Tolerant RSS 2.0 / Atom parser.
//!
//! Built on streaming `quick-xml` rather than a strict feed library so that a
//! malformed document never raises: parsing sets a `malformed` flag and keeps
//! every entry that was fully read before the breakage. Downstream code only
//! ever sees the canonical [`Entry`] shape, never the parser's own
//! representation.

use chrono::{DateTime, NaiveDateTime};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

/// A normalized feed entry. All fields are optional; real-world feeds mix
/// entries with and without usable dates.
///
/// Raw date strings are kept alongside their parsed forms. The serialized
/// field names match the cache wire format (`published` / `published_parsed`
/// and so on), which is what gets persisted in feed payloads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default, rename = "published")]
    pub published_raw: Option<String>,
    #[serde(default, rename = "published_parsed")]
    pub published_struct: Option<NaiveDateTime>,
    #[serde(default, rename = "updated")]
    pub updated_raw: Option<String>,
    #[serde(default, rename = "updated_parsed")]
    pub updated_struct: Option<NaiveDateTime>,
}

/// Result of a tolerant parse: the entries that could be extracted plus a
/// flag saying whether the document was malformed along the way.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFeed {
    pub malformed: bool,
    pub entries: Vec<Entry>,
}

/// Which entry field the current text node belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryField {
    Title,
    Link,
    Published,
    Updated,
}

/// Parses feed bytes, accepting both RSS 2.0 (`<item>`) and Atom (`<entry>`).
///
/// Never fails: an XML error mid-document sets `malformed` and stops reading,
/// keeping the entries collected so far. A well-formed document without a
/// recognizable feed root (an HTML page, say) is also flagged malformed.
pub fn parse_feed(bytes: &[u8]) -> ParsedFeed {
    let text = String::from_utf8_lossy(bytes);
    let mut reader = Reader::from_str(&text);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut malformed = false;
    let mut saw_feed_root = false;
    let mut current: Option<Entry> = None;
    let mut field: Option<EntryField> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = e.local_name().as_ref().to_ascii_lowercase();
                match name.as_slice() {
                    b"rss" | b"feed" | b"rdf" if current.is_none() => saw_feed_root = true,
                    b"item" | b"entry" => {
                        current = Some(Entry::default());
                        field = None;
                    }
                    _ if current.is_some() => {
                        field = classify_field(&name);
                        if name == b"link" {
                            // Atom carries the link in an href attribute
                            apply_link_href(current.as_mut(), &e, &reader);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) => {
                let name = e.local_name().as_ref().to_ascii_lowercase();
                if name == b"link" && current.is_some() {
                    apply_link_href(current.as_mut(), &e, &reader);
                }
            }
            Ok(Event::Text(t)) => {
                if let (Some(entry), Some(field)) = (current.as_mut(), field) {
                    match t.unescape() {
                        Ok(text) => apply_field(entry, field, text.trim()),
                        Err(e) => {
                            tracing::debug!(error = %e, "Unresolvable entity in feed text");
                            malformed = true;
                            break;
                        }
                    }
                }
            }
            Ok(Event::CData(t)) => {
                if let (Some(entry), Some(field)) = (current.as_mut(), field) {
                    let text = String::from_utf8_lossy(&t.into_inner()).into_owned();
                    apply_field(entry, field, text.trim());
                }
            }
            Ok(Event::End(e)) => {
                let name = e.local_name().as_ref().to_ascii_lowercase();
                match name.as_slice() {
                    b"item" | b"entry" => {
                        if let Some(entry) = current.take() {
                            entries.push(entry);
                        }
                    }
                    _ => field = None,
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::debug!(error = %e, "Malformed feed XML, keeping entries parsed so far");
                malformed = true;
                break;
            }
            Ok(_) => {}
        }
        buf.clear();
    }

    if !saw_feed_root {
        malformed = true;
    }

    ParsedFeed { malformed, entries }
}

fn classify_field(name: &[u8]) -> Option<EntryField> {
    match name {
        b"title" => Some(EntryField::Title),
        b"link" => Some(EntryField::Link),
        // RSS <pubDate> and Atom <published> carry the same meaning
        b"pubdate" | b"published" => Some(EntryField::Published),
        b"updated" => Some(EntryField::Updated),
        _ => None,
    }
}

fn apply_field(entry: &mut Entry, field: EntryField, text: &str) {
    if text.is_empty() {
        return;
    }
    match field {
        EntryField::Title => set_if_absent(&mut entry.title, text),
        EntryField::Link => set_if_absent(&mut entry.link, text),
        EntryField::Published => {
            entry.published_struct = entry.published_struct.or_else(|| parse_timestamp(text));
            set_if_absent(&mut entry.published_raw, text);
        }
        EntryField::Updated => {
            entry.updated_struct = entry.updated_struct.or_else(|| parse_timestamp(text));
            set_if_absent(&mut entry.updated_raw, text);
        }
    }
}

fn set_if_absent(slot: &mut Option<String>, value: &str) {
    if slot.is_none() {
        *slot = Some(value.to_string());
    }
}

/// Pulls the `href` attribute off an Atom `<link>` element, preferring the
/// `alternate` relation. Attribute errors are skipped, not fatal.
fn apply_link_href(
    entry: Option<&mut Entry>,
    e: &quick_xml::events::BytesStart<'_>,
    reader: &Reader<&[u8]>,
) {
    let Some(entry) = entry else { return };

    let mut href = None;
    let mut rel = None;
    let decoder = reader.decoder();
    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(e) => {
                tracing::debug!(error = %e, "Skipping malformed link attribute");
                continue;
            }
        };
        let value = match attr.decode_and_unescape_value(decoder) {
            Ok(v) => v.to_string(),
            Err(_) => continue,
        };
        match attr.key.as_ref() {
            b"href" => href = Some(value),
            b"rel" => rel = Some(value),
            _ => {}
        }
    }

    let is_alternate = rel.as_deref().map_or(true, |r| r == "alternate");
    if let Some(href) = href {
        if is_alternate && entry.link.is_none() {
            entry.link = Some(href);
        }
    }
}

/// Parses structured timestamps the way feed dates appear in the wild:
/// RFC 2822 for RSS `<pubDate>`, RFC 3339 for Atom, normalized to UTC and
/// stripped of the offset.
fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .map(|dt| dt.naive_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const RSS_TWO_ITEMS: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Example Blog</title>
    <link>https://example.com</link>
    <item>
      <title>First Post</title>
      <link>https://example.com/post/1</link>
      <pubDate>Tue, 02 Jan 2024 00:00:00 +0000</pubDate>
    </item>
    <item>
      <title>Second Post</title>
      <link>https://example.com/post/2</link>
      <pubDate>Mon, 01 Jan 2024 00:00:00 +0000</pubDate>
    </item>
  </channel>
</rss>"#;

    const ATOM_ONE_ENTRY: &str = r#"<?xml version="1.0"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Example Blog</title>
  <link href="https://example.com" rel="alternate"/>
  <entry>
    <title>First Post</title>
    <link href="https://example.com/post/1"/>
    <published>2024-01-01T12:00:00Z</published>
    <updated>2024-01-02T12:00:00Z</updated>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_rss_items() {
        let parsed = parse_feed(RSS_TWO_ITEMS.as_bytes());
        assert!(!parsed.malformed);
        assert_eq!(parsed.entries.len(), 2);

        let first = &parsed.entries[0];
        assert_eq!(first.title.as_deref(), Some("First Post"));
        assert_eq!(first.link.as_deref(), Some("https://example.com/post/1"));
        assert_eq!(
            first.published_raw.as_deref(),
            Some("Tue, 02 Jan 2024 00:00:00 +0000")
        );
        assert_eq!(
            first.published_struct,
            Some(
                NaiveDate::from_ymd_opt(2024, 1, 2)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap()
            )
        );
    }

    #[test]
    fn test_parse_atom_entry() {
        let parsed = parse_feed(ATOM_ONE_ENTRY.as_bytes());
        assert!(!parsed.malformed);
        assert_eq!(parsed.entries.len(), 1);

        let entry = &parsed.entries[0];
        assert_eq!(entry.title.as_deref(), Some("First Post"));
        assert_eq!(entry.link.as_deref(), Some("https://example.com/post/1"));
        assert!(entry.published_struct.is_some());
        assert!(entry.updated_struct.is_some());
    }

    #[test]
    fn test_channel_metadata_not_mistaken_for_entry_fields() {
        // Feed-level <title>/<link> precede the first item and must not leak
        let parsed = parse_feed(RSS_TWO_ITEMS.as_bytes());
        assert_eq!(parsed.entries[0].title.as_deref(), Some("First Post"));
    }

    #[test]
    fn test_truncated_feed_keeps_earlier_entries() {
        // Second item is cut off mid-element
        let truncated = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
  <item><title>Kept</title><pubDate>Mon, 01 Jan 2024 00:00:00 +0000</pubDate></item>
  <item><title>Lost"#;

        let parsed = parse_feed(truncated.as_bytes());
        assert!(parsed.malformed);
        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.entries[0].title.as_deref(), Some("Kept"));
    }

    #[test]
    fn test_html_page_is_malformed_with_no_entries() {
        let parsed = parse_feed(b"<html><body>Just a page</body></html>");
        assert!(parsed.malformed);
        assert!(parsed.entries.is_empty());
    }

    #[test]
    fn test_empty_feed_is_well_formed() {
        let empty = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Empty</title></channel></rss>"#;
        let parsed = parse_feed(empty.as_bytes());
        assert!(!parsed.malformed);
        assert!(parsed.entries.is_empty());
    }

    #[test]
    fn test_unparseable_date_keeps_raw_string_only() {
        let rss = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
  <item><title>Post</title><pubDate>sometime last week</pubDate></item>
</channel></rss>"#;

        let parsed = parse_feed(rss.as_bytes());
        assert!(!parsed.malformed);
        let entry = &parsed.entries[0];
        assert_eq!(entry.published_raw.as_deref(), Some("sometime last week"));
        assert!(entry.published_struct.is_none());
    }

    #[test]
    fn test_atom_link_prefers_alternate_rel() {
        let atom = r#"<?xml version="1.0"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <link href="https://example.com/comments" rel="replies"/>
    <link href="https://example.com/post/1" rel="alternate"/>
    <title>Post</title>
  </entry>
</feed>"#;

        let parsed = parse_feed(atom.as_bytes());
        assert_eq!(
            parsed.entries[0].link.as_deref(),
            Some("https://example.com/post/1")
        );
    }

    #[test]
    fn test_cdata_title() {
        let rss = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
  <item><title><![CDATA[Ampersand & Friends]]></title></item>
</channel></rss>"#;

        let parsed = parse_feed(rss.as_bytes());
        assert_eq!(
            parsed.entries[0].title.as_deref(),
            Some("Ampersand & Friends")
        );
    }

    #[test]
    fn test_entry_serde_wire_format() {
        let parsed = parse_feed(RSS_TWO_ITEMS.as_bytes());
        let json = serde_json::to_string(&parsed.entries[0]).unwrap();
        // Cache wire format uses the original field names
        assert!(json.contains("\"published\""));
        assert!(json.contains("\"published_parsed\""));

        let back: Entry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, parsed.entries[0]);
    }
}
