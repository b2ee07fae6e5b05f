use anyhow::{Context, Result};
use clap::Parser;
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

use feedpulse::cache::CacheStore;
use feedpulse::config::Config;
use feedpulse::feed::FeedClient;
use feedpulse::report::{self, CategoryReport, FeedReport};
use feedpulse::{opml, stats};

#[derive(Parser, Debug)]
#[command(
    name = "feedpulse",
    about = "Profiles the publication activity of an OPML subscription list"
)]
struct Args {
    /// OPML subscription list to profile
    #[arg(value_name = "OPML", required_unless_present = "convert_gmi")]
    opml: Option<PathBuf>,

    /// Where to write the Markdown report (or the OPML for --convert-gmi)
    #[arg(short, long, default_value = "output.md")]
    output: PathBuf,

    /// Configuration file
    #[arg(long, value_name = "FILE", default_value = "feedpulse.toml")]
    config: PathBuf,

    /// Cache file location (overrides the config file)
    #[arg(long, value_name = "FILE")]
    cache: Option<PathBuf>,

    /// Run without reading or writing the persistent cache
    #[arg(long)]
    no_cache: bool,

    /// Convert a Gemini-style bookmark list to OPML and exit
    #[arg(long, value_name = "FILE")]
    convert_gmi: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    if let Some(gmi_path) = &args.convert_gmi {
        let input = std::fs::read_to_string(gmi_path)
            .with_context(|| format!("Failed to read bookmark file '{}'", gmi_path.display()))?;
        let opml_content = opml::gmi_to_opml(&input)?;
        std::fs::write(&args.output, opml_content)
            .with_context(|| format!("Failed to write OPML to '{}'", args.output.display()))?;
        println!("Wrote OPML to {}", args.output.display());
        return Ok(());
    }

    let config = Config::load(&args.config).context("Failed to load configuration")?;

    // A malformed OPML file is the one condition that aborts the whole run.
    let opml_path = args
        .opml
        .as_ref()
        .context("An OPML subscription list is required")?;
    let content = std::fs::read_to_string(opml_path)
        .with_context(|| format!("Failed to read OPML file '{}'", opml_path.display()))?;
    let categories = opml::parse_opml(&content)
        .with_context(|| format!("Failed to parse OPML file '{}'", opml_path.display()))?;

    if categories.is_empty() {
        eprintln!("Warning: no categorized feeds found in OPML file");
    }

    let cache_path = args.cache.as_ref().unwrap_or(&config.cache_path);
    let cache = if args.no_cache {
        CacheStore::in_memory()
    } else {
        CacheStore::load(cache_path)
    };

    let feed_client = FeedClient::from_config(&config, Arc::new(Mutex::new(cache)))
        .context("Failed to build HTTP client")?;

    let mut report_categories = Vec::with_capacity(categories.len());
    for category in categories {
        tracing::info!(category = %category.title, feeds = category.feeds.len(), "Profiling category");

        let client = &feed_client;
        let mut feeds: Vec<FeedReport> = stream::iter(category.feeds)
            .map(|feed| async move {
                let activity = stats::classify(client, &feed.xml_url, &feed.html_url).await;
                tracing::info!(feed = %feed.xml_url, activity = ?activity, "Classified feed");
                FeedReport {
                    title: feed.title,
                    html_url: feed.html_url,
                    activity,
                }
            })
            .buffer_unordered(config.max_concurrent_fetches)
            .collect()
            .await;

        report::sort_feeds(&mut feeds);
        report_categories.push(CategoryReport {
            title: category.title,
            feeds,
        });
    }

    let markdown = report::render_markdown(&report_categories);
    std::fs::write(&args.output, markdown)
        .with_context(|| format!("Failed to write report to '{}'", args.output.display()))?;
    println!("Report written to {}", args.output.display());

    Ok(())
}
