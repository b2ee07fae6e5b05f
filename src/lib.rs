//! feedpulse — feed resolution and publication-activity profiling.
//!
//! The pipeline: an OPML subscription list feeds `(title, htmlUrl, xmlUrl)`
//! triples into the statistics engine, which fetches each feed through a
//! TTL-cached, rediscovery-capable fetcher and classifies its publication
//! activity. The sorter and Markdown writer turn the classifications into
//! the final report.

pub mod cache;
pub mod config;
pub mod feed;
pub mod opml;
pub mod report;
pub mod stats;
