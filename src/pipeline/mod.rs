//! Per-entry enrichment and its concurrent orchestration.
//!
//! [`EntryProcessor`] turns one [`FeedEntry`](crate::feed::FeedEntry) into an
//! [`EnrichedEntry`], falling back to the feed's own summary when the
//! article cannot be fetched. [`ConcurrentPipeline`] runs the processor over
//! a whole feed with a bounded number of workers.

mod processor;
mod runner;

pub use processor::{EntryError, EntryProcessor};
pub use runner::{ConcurrentPipeline, PipelineStats};

use crate::extract::ImageSet;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

/// How an entry's content was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichMethod {
    /// Fetched and extracted from the article page.
    Cascade,
    /// The feed's own summary, because fetching failed.
    RssSummary,
    /// Nothing usable; content is the placeholder.
    Unavailable,
}

impl EnrichMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            EnrichMethod::Cascade => "cascade",
            EnrichMethod::RssSummary => "rss_summary",
            EnrichMethod::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for EnrichMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A feed entry with full content, images and tags attached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedEntry {
    /// SHA-256 of the link, hex encoded.
    pub id: String,
    pub title: String,
    pub link: String,
    /// HTML content. Never empty, never contains control characters.
    pub content: String,
    pub published: Option<DateTime<Utc>>,
    pub images: ImageSet,
    pub tags: Vec<String>,
    pub method: EnrichMethod,
}

/// Stable identifier for an article link.
pub fn entry_id(link: &str) -> String {
    format!("{:x}", Sha256::digest(link.as_bytes()))
}
