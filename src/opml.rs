//! OPML subscription-list parsing and bookmark-list conversion.
//!
//! Parsing produces `(title, htmlUrl, xmlUrl)` triples grouped by category
//! outline. A malformed OPML file is the single hard-abort condition of a
//! run, so errors here propagate instead of degrading.

use anyhow::{Context, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

/// Errors that can occur during OPML parsing.
#[derive(Debug, Error)]
pub enum OpmlError {
    /// XML parsing failed — the input file is not usable OPML.
    #[error("XML parse error: {0}")]
    XmlParse(String),
}

/// A feed subscription: display title, website URL, feed URL.
#[derive(Debug, Clone, PartialEq)]
pub struct OpmlFeed {
    pub title: String,
    pub html_url: String,
    pub xml_url: String,
}

/// A category outline and the feeds nested under it.
#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    pub title: String,
    pub feeds: Vec<OpmlFeed>,
}

#[derive(Default)]
struct OutlineAttrs {
    title: Option<String>,
    html_url: Option<String>,
    xml_url: Option<String>,
}

/// Parses OPML content into categories of feed triples.
///
/// A category is an `<outline>` with a title and nested feed outlines; a
/// feed outline must carry all of `title`, `htmlUrl`, and `xmlUrl` or it is
/// skipped with a warning. Categories that end up with no feeds are dropped.
/// Feeds nested more than one category deep attach to the innermost category.
pub fn parse_opml(content: &str) -> Result<Vec<Category>, OpmlError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut categories: Vec<Category> = Vec::new();
    // One slot per open <outline>: Some(index) when it opened a category
    let mut stack: Vec<Option<usize>> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"outline" => {
                let attrs = read_outline_attrs(&e, &reader)?;
                if attrs.xml_url.is_some() {
                    attach_feed(&mut categories, &stack, attrs);
                    stack.push(None);
                } else if let Some(title) = attrs.title {
                    categories.push(Category {
                        title,
                        feeds: Vec::new(),
                    });
                    stack.push(Some(categories.len() - 1));
                } else {
                    stack.push(None);
                }
            }
            Ok(Event::Empty(e)) if e.name().as_ref() == b"outline" => {
                let attrs = read_outline_attrs(&e, &reader)?;
                if attrs.xml_url.is_some() {
                    attach_feed(&mut categories, &stack, attrs);
                }
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"outline" => {
                stack.pop();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(OpmlError::XmlParse(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    categories.retain(|c| !c.feeds.is_empty());
    Ok(categories)
}

fn attach_feed(categories: &mut [Category], stack: &[Option<usize>], attrs: OutlineAttrs) {
    let Some(category_index) = stack.iter().rev().find_map(|slot| *slot) else {
        tracing::warn!(
            xml_url = attrs.xml_url.as_deref().unwrap_or(""),
            "Skipping feed outline outside any category"
        );
        return;
    };

    match (attrs.title, attrs.html_url, attrs.xml_url) {
        (Some(title), Some(html_url), Some(xml_url)) => {
            categories[category_index].feeds.push(OpmlFeed {
                title,
                html_url,
                xml_url,
            });
        }
        (title, _, xml_url) => {
            tracing::warn!(
                title = title.as_deref().unwrap_or(""),
                xml_url = xml_url.as_deref().unwrap_or(""),
                "Skipping feed outline missing title, htmlUrl, or xmlUrl"
            );
        }
    }
}

fn read_outline_attrs(
    e: &quick_xml::events::BytesStart<'_>,
    reader: &Reader<&[u8]>,
) -> Result<OutlineAttrs, OpmlError> {
    let mut attrs = OutlineAttrs::default();
    let decoder = reader.decoder();

    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed OPML attribute");
                continue;
            }
        };
        let value = attr
            .decode_and_unescape_value(decoder)
            .map_err(|e| OpmlError::XmlParse(e.to_string()))?
            .to_string();
        match attr.key.as_ref() {
            b"xmlUrl" => attrs.xml_url = Some(value),
            b"htmlUrl" => attrs.html_url = Some(value),
            b"title" => attrs.title = Some(value),
            b"text" => {
                if attrs.title.is_none() {
                    attrs.title = Some(value)
                }
            }
            _ => {}
        }
    }

    Ok(attrs)
}

/// Converts a Gemini-style bookmark list to an OPML document.
///
/// `## Heading` lines open a category; `=> url [title]` lines add a feed
/// whose `xmlUrl` and `htmlUrl` are both the bookmark URL (discovery and
/// rediscovery sort out the real feed URL at fetch time). Lines of any other
/// shape are ignored.
pub fn gmi_to_opml(input: &str) -> Result<String> {
    use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
    use quick_xml::Writer;
    use std::io::Cursor;

    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .context("Failed to write XML declaration")?;

    let mut opml = BytesStart::new("opml");
    opml.push_attribute(("version", "1.0"));
    writer
        .write_event(Event::Start(opml))
        .context("Failed to write opml element")?;

    writer
        .write_event(Event::Start(BytesStart::new("head")))
        .context("Failed to write head element")?;
    writer
        .write_event(Event::Start(BytesStart::new("title")))
        .context("Failed to write title element")?;
    writer
        .write_event(Event::Text(BytesText::new("RSS Feeds")))
        .context("Failed to write title text")?;
    writer
        .write_event(Event::End(BytesEnd::new("title")))
        .context("Failed to write title end")?;
    writer
        .write_event(Event::End(BytesEnd::new("head")))
        .context("Failed to write head end")?;

    writer
        .write_event(Event::Start(BytesStart::new("body")))
        .context("Failed to write body element")?;

    let mut in_category = false;
    for line in input.lines() {
        let line = line.trim();

        if let Some(heading) = line.strip_prefix("##") {
            if in_category {
                writer
                    .write_event(Event::End(BytesEnd::new("outline")))
                    .context("Failed to close category outline")?;
            }
            let title = heading.trim();
            let mut outline = BytesStart::new("outline");
            outline.push_attribute(("text", title));
            outline.push_attribute(("title", title));
            writer
                .write_event(Event::Start(outline))
                .context("Failed to write category outline")?;
            in_category = true;
        } else if let Some(rest) = line.strip_prefix("=>") {
            let mut parts = rest.trim().splitn(2, char::is_whitespace);
            let Some(url) = parts.next().filter(|u| !u.is_empty()) else {
                continue;
            };
            let title = parts.next().map(str::trim).unwrap_or(url);

            let mut outline = BytesStart::new("outline");
            outline.push_attribute(("type", "rss"));
            outline.push_attribute(("text", title));
            outline.push_attribute(("title", title));
            outline.push_attribute(("xmlUrl", url));
            outline.push_attribute(("htmlUrl", url));
            writer
                .write_event(Event::Empty(outline))
                .context("Failed to write feed outline")?;
        }
    }

    if in_category {
        writer
            .write_event(Event::End(BytesEnd::new("outline")))
            .context("Failed to close category outline")?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("body")))
        .context("Failed to write body end")?;
    writer
        .write_event(Event::End(BytesEnd::new("opml")))
        .context("Failed to write opml end")?;

    let result = writer.into_inner().into_inner();
    String::from_utf8(result).context("Generated OPML contains invalid UTF-8")
}
