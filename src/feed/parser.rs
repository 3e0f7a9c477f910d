use chrono::{DateTime, Utc};
use feed_rs::parser;

pub const DEFAULT_FEED_TITLE: &str = "Filtered feed";
pub const DEFAULT_FEED_DESCRIPTION: &str = "Full-content enriched feed";
pub const DEFAULT_FEED_LANGUAGE: &str = "en";

/// One entry of the upstream feed, before enrichment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedEntry {
    pub title: String,
    /// Article URL. Entries without one are rejected by the processor.
    pub link: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub categories: Vec<String>,
    pub summary: Option<String>,
}

/// Channel metadata carried over to the enriched feed, plus its entries.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFeed {
    pub title: String,
    pub link: Option<String>,
    pub description: String,
    pub language: String,
    pub entries: Vec<FeedEntry>,
}

fn non_blank(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == s.len() {
        Some(s)
    } else {
        Some(trimmed.to_string())
    }
}

/// Parse RSS 0.9x/1.0/2.0, Atom or JSON Feed bytes.
///
/// Dates that fail to parse are dropped by `feed-rs`, leaving the entry
/// with no publish date rather than failing it.
pub fn parse_feed(bytes: &[u8]) -> Result<SourceFeed, parser::ParseFeedError> {
    let feed = parser::parse(bytes)?;

    let entries = feed
        .entries
        .into_iter()
        .map(|entry| {
            let link = entry
                .links
                .into_iter()
                .map(|l| l.href)
                .find_map(non_blank);
            let published = entry.published.or(entry.updated);
            let summary = entry
                .summary
                .map(|s| s.content)
                .or_else(|| entry.content.and_then(|c| c.body))
                .and_then(non_blank);
            let title = entry
                .title
                .map(|t| t.content)
                .and_then(non_blank)
                .unwrap_or_else(|| "Untitled".to_string());
            let categories = entry
                .categories
                .into_iter()
                .filter_map(|c| non_blank(c.label.unwrap_or(c.term)))
                .collect();

            FeedEntry {
                title,
                link,
                published,
                categories,
                summary,
            }
        })
        .collect();

    Ok(SourceFeed {
        title: feed
            .title
            .map(|t| t.content)
            .and_then(non_blank)
            .unwrap_or_else(|| DEFAULT_FEED_TITLE.to_string()),
        link: feed.links.into_iter().map(|l| l.href).find_map(non_blank),
        description: feed
            .description
            .map(|d| d.content)
            .and_then(non_blank)
            .unwrap_or_else(|| DEFAULT_FEED_DESCRIPTION.to_string()),
        language: feed
            .language
            .and_then(non_blank)
            .unwrap_or_else(|| DEFAULT_FEED_LANGUAGE.to_string()),
        entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>Example News</title>
    <link>https://example.com/</link>
    <description>All the news</description>
    <language>fr</language>
    <item>
        <title>First</title>
        <link>https://example.com/1</link>
        <pubDate>Tue, 02 Jan 2024 10:00:00 +0100</pubDate>
        <category>Tech</category>
        <category>Rust</category>
        <description>Short teaser</description>
    </item>
    <item>
        <title>No link here</title>
        <description>Orphan</description>
    </item>
    <item>
        <link>https://example.com/3</link>
        <pubDate>not a date</pubDate>
    </item>
</channel></rss>"#;

    #[test]
    fn test_parse_rss_channel() {
        let feed = parse_feed(RSS.as_bytes()).unwrap();
        assert_eq!(feed.title, "Example News");
        assert_eq!(feed.description, "All the news");
        assert_eq!(feed.language, "fr");
        assert_eq!(feed.entries.len(), 3);
    }

    #[test]
    fn test_parse_rss_entry() {
        let feed = parse_feed(RSS.as_bytes()).unwrap();
        let first = &feed.entries[0];
        assert_eq!(first.title, "First");
        assert_eq!(first.link.as_deref(), Some("https://example.com/1"));
        assert_eq!(
            first.published,
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap())
        );
        assert_eq!(first.categories, vec!["Tech".to_string(), "Rust".to_string()]);
        assert_eq!(first.summary.as_deref(), Some("Short teaser"));
    }

    #[test]
    fn test_missing_link_and_bad_date() {
        let feed = parse_feed(RSS.as_bytes()).unwrap();
        assert_eq!(feed.entries[1].link, None);
        assert_eq!(feed.entries[2].title, "Untitled");
        assert_eq!(feed.entries[2].published, None);
    }

    #[test]
    fn test_channel_defaults() {
        let rss = r#"<?xml version="1.0"?><rss version="2.0"><channel><item><link>https://example.com/a</link></item></channel></rss>"#;
        let feed = parse_feed(rss.as_bytes()).unwrap();
        assert_eq!(feed.title, DEFAULT_FEED_TITLE);
        assert_eq!(feed.description, DEFAULT_FEED_DESCRIPTION);
        assert_eq!(feed.language, DEFAULT_FEED_LANGUAGE);
    }

    #[test]
    fn test_atom_entry() {
        let atom = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
    <title>Atom Example</title>
    <id>urn:example</id>
    <updated>2024-03-01T12:00:00Z</updated>
    <entry>
        <title>Atom post</title>
        <id>urn:example:1</id>
        <link href="https://example.com/atom/1"/>
        <updated>2024-03-01T12:00:00Z</updated>
        <category term="science"/>
        <summary>Teaser</summary>
    </entry>
</feed>"#;
        let feed = parse_feed(atom.as_bytes()).unwrap();
        let entry = &feed.entries[0];
        assert_eq!(entry.link.as_deref(), Some("https://example.com/atom/1"));
        assert_eq!(entry.categories, vec!["science".to_string()]);
        assert!(entry.published.is_some());
    }

    #[test]
    fn test_malformed_is_error() {
        assert!(parse_feed(b"<not valid xml").is_err());
    }
}
