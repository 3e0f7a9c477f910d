//! Upstream feed handling: download, parse, and write the enriched result.
//!
//! - [`source`] - HTTP retrieval with retry, backoff and size limits
//! - [`parser`] - RSS/Atom/JSON Feed parsing via `feed-rs`
//! - [`writer`] - RSS 2.0 serialization via `quick-xml`

mod parser;
mod source;
mod writer;

pub use parser::{
    parse_feed, FeedEntry, SourceFeed, DEFAULT_FEED_DESCRIPTION, DEFAULT_FEED_LANGUAGE,
    DEFAULT_FEED_TITLE,
};
pub use source::{FetchError, SourceFetcher};
pub use writer::{write_rss, Channel};
