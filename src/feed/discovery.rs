//! Feed-URL discovery from a website's homepage.
//!
//! Given a site URL, discovery first consults the cache, then fetches the
//! page and scans it for a `<link type="application/rss+xml">` (RSS first,
//! Atom second), and finally probes a short list of well-known feed paths.
//! A successful result is cached keyed by the site URL; failures are NOT
//! negatively cached — every run retries a site whose discovery failed.

use crate::cache::CachePayload;
use crate::feed::{read_limited_bytes, FeedClient};

const MAX_PAGE_SIZE: usize = 5 * 1024 * 1024; // 5MB

/// Relative paths probed, in order, when the homepage advertises no feed.
const CANDIDATE_PATHS: &[&str] = &["/feed/", "/atom.xml", "/rss.xml"];

impl FeedClient {
    /// Discovers the feed URL for a website, or `None` when the site is
    /// unreachable, errors, or advertises no feed anywhere we know to look.
    ///
    /// All network errors are absorbed here: a site that cannot be reached
    /// simply yields no feed URL.
    pub async fn discover(&self, site_url: &str) -> Option<String> {
        if let Some(CachePayload::DiscoveredUrl(url)) =
            self.cache.lock().await.get(site_url, self.discovery_ttl)
        {
            tracing::debug!(site = %site_url, feed = %url, "Using cached discovery result");
            return Some(url.clone());
        }

        tracing::info!(site = %site_url, "Discovering feed URL");
        let found = match self.discover_uncached(site_url).await {
            Some(url) => url,
            None => {
                tracing::warn!(site = %site_url, "No RSS/Atom feed found");
                return None;
            }
        };

        self.cache
            .lock()
            .await
            .put(site_url, CachePayload::DiscoveredUrl(found.clone()));
        tracing::info!(site = %site_url, feed = %found, "Discovered feed URL");
        Some(found)
    }

    async fn discover_uncached(&self, site_url: &str) -> Option<String> {
        let response = match self.http.get(site_url).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(site = %site_url, error = %e, "Error fetching website");
                return None;
            }
        };

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            tracing::warn!(site = %site_url, status = %status, "Website answered with an error");
            return None;
        }

        let bytes = match read_limited_bytes(response, MAX_PAGE_SIZE).await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(site = %site_url, error = %e, "Error reading website body");
                return None;
            }
        };
        let html = String::from_utf8_lossy(&bytes);

        match find_feed_link_in_html(&html, site_url) {
            Some(url) => Some(url),
            None => self.probe_candidate_paths(site_url).await,
        }
    }

    /// Tries the well-known feed paths against the site. A candidate is
    /// accepted only on HTTP 200 with a feed marker in the body; the URL
    /// returned is the final one after redirects, not the probed one.
    async fn probe_candidate_paths(&self, site_url: &str) -> Option<String> {
        let base = url::Url::parse(site_url).ok()?;

        for path in CANDIDATE_PATHS {
            let candidate = match base.join(path) {
                Ok(u) => u,
                Err(_) => continue,
            };

            let response = match self.http.get(candidate.clone()).send().await {
                Ok(r) => r,
                Err(e) => {
                    tracing::debug!(candidate = %candidate, error = %e, "Candidate probe failed");
                    continue;
                }
            };

            if response.status() != reqwest::StatusCode::OK {
                continue;
            }

            let final_url = response.url().to_string();
            match read_limited_bytes(response, MAX_PAGE_SIZE).await {
                Ok(body) if contains_feed_marker(&body) => {
                    tracing::info!(candidate = %candidate, url = %final_url, "Candidate feed accepted");
                    return Some(final_url);
                }
                Ok(_) => {
                    tracing::debug!(candidate = %candidate, "Candidate body has no feed marker");
                }
                Err(e) => {
                    tracing::debug!(candidate = %candidate, error = %e, "Candidate body unreadable");
                }
            }
        }

        None
    }
}

/// Scans HTML for a `<link>` tag typed as an RSS feed, falling back to Atom.
///
/// Uses simple string scanning (no HTML parser dependency). Handles attribute
/// ordering variations and resolves relative URLs against the site URL.
fn find_feed_link_in_html(html: &str, base_url: &str) -> Option<String> {
    find_link_of_type(html, base_url, "application/rss+xml")
        .or_else(|| find_link_of_type(html, base_url, "application/atom+xml"))
}

fn find_link_of_type(html: &str, base_url: &str, mime: &str) -> Option<String> {
    // ASCII-only lowering: every needle is ASCII, and full Unicode lowercasing
    // can change byte lengths, which would misalign offsets into `html`.
    let html_lower = html.to_ascii_lowercase();
    let mut search_from = 0;

    while let Some(link_start) = html_lower[search_from..].find("<link") {
        let abs_start = search_from + link_start;
        let remaining = &html_lower[abs_start..];

        let tag_end = match remaining.find('>') {
            Some(pos) => pos,
            None => break,
        };

        let tag = &remaining[..=tag_end];
        if tag.contains(mime) {
            // Extract href from the original (non-lowered) HTML to preserve URL case
            let original_tag = &html[abs_start..abs_start + tag_end + 1];
            if let Some(href) = extract_attr_value(original_tag, "href") {
                return Some(resolve_url(href, base_url));
            }
        }

        search_from = abs_start + tag_end + 1;
    }

    None
}

/// Extracts the value of an attribute from a tag string (case-preserving).
fn extract_attr_value<'a>(tag: &'a str, attr_name: &str) -> Option<&'a str> {
    // ASCII-only: offsets must stay valid for slicing `tag`
    let tag_lower = tag.to_ascii_lowercase();
    let attr_prefix = format!("{attr_name}=");

    let attr_start = tag_lower.find(&attr_prefix)?;
    let value_start = attr_start + attr_prefix.len();

    if value_start >= tag.len() {
        return None;
    }

    let rest = &tag[value_start..];
    let quote = rest.as_bytes().first()?;

    if *quote != b'"' && *quote != b'\'' {
        return None;
    }

    let quote_char = *quote as char;
    let inner = &rest[1..];
    let end = inner.find(quote_char)?;

    Some(&inner[..end])
}

/// Resolves a potentially relative URL against the site URL.
fn resolve_url(href: &str, base_url: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_owned();
    }

    if let Ok(base) = url::Url::parse(base_url) {
        if let Ok(resolved) = base.join(href) {
            return resolved.to_string();
        }
    }

    href.to_owned()
}

/// Literal markers that identify a body as an RSS or Atom document.
fn contains_feed_marker(body: &[u8]) -> bool {
    contains_subslice(body, b"<rss") || contains_subslice(body, b"<feed")
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
