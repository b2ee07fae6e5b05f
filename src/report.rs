//! Activity-based sorting and the Markdown report.

use chrono::Local;

use crate::stats::ActivityClass;

/// A classified feed, ready for the report.
#[derive(Debug, Clone)]
pub struct FeedReport {
    pub title: String,
    pub html_url: String,
    pub activity: ActivityClass,
}

/// A category with its classified feeds.
#[derive(Debug, Clone)]
pub struct CategoryReport {
    pub title: String,
    pub feeds: Vec<FeedReport>,
}

/// Orders feeds most-active-first: ascending mean interval for timed feeds
/// (`SingleEntry` counting as a 1-second interval), dead and never-updated
/// feeds at the end, ties broken by case-insensitive title.
pub fn sort_feeds(feeds: &mut [FeedReport]) {
    feeds.sort_by_cached_key(|feed| {
        let interval = feed.activity.interval_secs();
        (interval.is_none(), interval.unwrap_or(i64::MAX), feed.title.to_lowercase())
    });
}

/// Renders the full Markdown report: a header with the total feed count and
/// the local run date, then one section per category (sorted
/// case-insensitively) with one line per feed.
pub fn render_markdown(categories: &[CategoryReport]) -> String {
    let total: usize = categories.iter().map(|c| c.feeds.len()).sum();
    let today = Local::now().format("%d/%m/%Y");

    let mut out = format!("{total} feeds tracked as of {today}\n\n");

    let mut ordered: Vec<&CategoryReport> = categories.iter().collect();
    ordered.sort_by_cached_key(|c| c.title.to_lowercase());

    for category in ordered {
        out.push_str(&format!("### {}\n\n", category.title));
        for feed in &category.feeds {
            out.push_str(&format!(
                "- [{}]({}) {}\n",
                feed.title,
                feed.html_url,
                format_activity(feed.activity)
            ));
        }
        out.push('\n');
    }

    out
}

/// Human-readable label for an activity class. Timed intervals are rendered
/// as a publication rate at day/week/month/year/decade granularity.
pub fn format_activity(activity: ActivityClass) -> String {
    let secs = match activity {
        ActivityClass::Dead => return "dead site".to_string(),
        ActivityClass::NoUpdate => return "no updates".to_string(),
        ActivityClass::SingleEntry => return "single post in feed".to_string(),
        ActivityClass::Timed(secs) => secs,
    };

    // Entries sharing one timestamp produce a zero mean; clamp to keep the
    // rate arithmetic finite.
    let days = secs.max(1) as f64 / 86_400.0;

    if days < 1.0 {
        format!("{} times per day", (1.0 / days).round())
    } else if days < 7.0 {
        format!("{} times per week", (7.0 / days).round())
    } else if days < 30.0 {
        format!("{} times per month", (30.0 / days).round())
    } else if days < 365.0 {
        format!("{} times per year", (365.0 / days).round())
    } else {
        format!("{} times per decade", (3650.0 / days).round())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn feed(title: &str, activity: ActivityClass) -> FeedReport {
        FeedReport {
            title: title.to_string(),
            html_url: format!("https://example.com/{}", title.to_lowercase()),
            activity,
        }
    }

    #[test]
    fn test_sort_timed_ascending_inactive_last() {
        let mut feeds = vec![
            feed("Alpha", ActivityClass::Dead),
            feed("Beta", ActivityClass::Timed(100)),
            feed("Gamma", ActivityClass::NoUpdate),
            feed("Delta", ActivityClass::Timed(50)),
        ];
        sort_feeds(&mut feeds);

        let order: Vec<&str> = feeds.iter().map(|f| f.title.as_str()).collect();
        assert_eq!(order, vec!["Delta", "Beta", "Alpha", "Gamma"]);
    }

    #[test]
    fn test_single_entry_sorts_as_most_active() {
        let mut feeds = vec![
            feed("Hourly", ActivityClass::Timed(3600)),
            feed("Lonely", ActivityClass::SingleEntry),
        ];
        sort_feeds(&mut feeds);
        assert_eq!(feeds[0].title, "Lonely");
    }

    #[test]
    fn test_title_tiebreak_is_case_insensitive() {
        let mut feeds = vec![
            feed("zebra", ActivityClass::Timed(100)),
            feed("Apple", ActivityClass::Timed(100)),
            feed("mango", ActivityClass::Timed(100)),
        ];
        sort_feeds(&mut feeds);

        let order: Vec<&str> = feeds.iter().map(|f| f.title.as_str()).collect();
        assert_eq!(order, vec!["Apple", "mango", "zebra"]);
    }

    #[test]
    fn test_format_activity_labels() {
        assert_eq!(format_activity(ActivityClass::Dead), "dead site");
        assert_eq!(format_activity(ActivityClass::NoUpdate), "no updates");
        assert_eq!(
            format_activity(ActivityClass::SingleEntry),
            "single post in feed"
        );
    }

    #[test]
    fn test_format_activity_rates() {
        // Every 6 hours → 4 times per day
        assert_eq!(
            format_activity(ActivityClass::Timed(6 * 3600)),
            "4 times per day"
        );
        // Every 2 days → ~4 times per week
        assert_eq!(
            format_activity(ActivityClass::Timed(2 * 86_400)),
            "4 times per week"
        );
        // Every 10 days → 3 times per month
        assert_eq!(
            format_activity(ActivityClass::Timed(10 * 86_400)),
            "3 times per month"
        );
        // Every 90 days → 4 times per year
        assert_eq!(
            format_activity(ActivityClass::Timed(90 * 86_400)),
            "4 times per year"
        );
        // Every 2 years → 5 times per decade
        assert_eq!(
            format_activity(ActivityClass::Timed(730 * 86_400)),
            "5 times per decade"
        );
    }

    #[test]
    fn test_render_markdown_structure() {
        let categories = vec![
            CategoryReport {
                title: "tech".to_string(),
                feeds: vec![feed("Beta", ActivityClass::Timed(86_400))],
            },
            CategoryReport {
                title: "Art".to_string(),
                feeds: vec![feed("Alpha", ActivityClass::Dead)],
            },
        ];

        let md = render_markdown(&categories);
        assert!(md.starts_with("2 feeds tracked as of "));
        // Header carries the local run date, not UTC
        let today = Local::now().format("%d/%m/%Y").to_string();
        assert!(md.starts_with(&format!("2 feeds tracked as of {today}")));
        // Categories sorted case-insensitively: Art before tech
        let art = md.find("### Art").unwrap();
        let tech = md.find("### tech").unwrap();
        assert!(art < tech);
        assert!(md.contains("- [Beta](https://example.com/beta) 7 times per week\n"));
        assert!(md.contains("- [Alpha](https://example.com/alpha) dead site\n"));
    }
}
