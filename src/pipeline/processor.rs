use super::{entry_id, EnrichMethod, EnrichedEntry};
use crate::config::Config;
use crate::extract::{self, ImageSet, PLACEHOLDER};
use crate::feed::FeedEntry;
use crate::fetch::CascadeFetcher;
use crate::util::{strip_control_chars, visible_text_len};
use std::sync::Arc;
use thiserror::Error;

/// Summaries this short are not worth showing in place of the article.
const MIN_SUMMARY_LEN: usize = 50;

#[derive(Debug, Error)]
pub enum EntryError {
    /// Entry carries no link; skipped before any work is done.
    #[error("Entry has no link: {title}")]
    MissingLink { title: String },
}

/// Enriches a single feed entry.
#[derive(Clone)]
pub struct EntryProcessor {
    fetcher: Arc<CascadeFetcher>,
    config: Arc<Config>,
}

impl EntryProcessor {
    pub fn new(fetcher: Arc<CascadeFetcher>, config: Arc<Config>) -> Self {
        Self { fetcher, config }
    }

    /// Fetch and extract the article behind `entry`.
    ///
    /// Any fetch failure downgrades the entry to its RSS summary (when that
    /// summary is longer than 50 characters) or to the placeholder. Only a
    /// missing link is an error. `position` and `total` are for logging.
    pub async fn process(
        &self,
        entry: &FeedEntry,
        position: usize,
        total: usize,
        preferred: Option<&str>,
    ) -> Result<EnrichedEntry, EntryError> {
        let link = entry
            .link
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .ok_or_else(|| {
                tracing::warn!(entry = position, total = total, title = %entry.title, "Entry has no link, skipping");
                EntryError::MissingLink {
                    title: entry.title.clone(),
                }
            })?;

        let (content, images, tags, method) = match self.fetcher.fetch(link, preferred).await {
            Ok(page) => {
                let extracted =
                    extract::extract_all(&page.html, link, &entry.categories, &self.config);
                tracing::debug!(
                    entry = position,
                    total = total,
                    url = %link,
                    strategy = page.strategy,
                    chars = visible_text_len(&extracted.content),
                    tags = extracted.tags.len(),
                    image = extracted.images.article_image.is_some(),
                    "Entry enriched"
                );
                (
                    extracted.content,
                    extracted.images,
                    extracted.tags,
                    EnrichMethod::Cascade,
                )
            }
            Err(e) => {
                let (content, method) = summary_fallback(entry.summary.as_deref());
                tracing::warn!(
                    entry = position,
                    total = total,
                    url = %link,
                    error = %e,
                    method = %method,
                    "Fetch failed, using fallback"
                );
                (
                    content,
                    ImageSet::default(),
                    extract::normalize_categories(&entry.categories, self.config.max_tags),
                    method,
                )
            }
        };

        let content = match strip_control_chars(&content) {
            clean if clean.trim().is_empty() => PLACEHOLDER.to_string(),
            clean => clean.into_owned(),
        };

        Ok(EnrichedEntry {
            id: entry_id(link),
            title: strip_control_chars(&entry.title).into_owned(),
            link: link.to_string(),
            content,
            published: entry.published,
            images,
            tags,
            method,
        })
    }
}

/// Content to use when the article could not be fetched.
fn summary_fallback(summary: Option<&str>) -> (String, EnrichMethod) {
    match summary.map(str::trim) {
        Some(summary) if summary.chars().count() > MIN_SUMMARY_LEN => {
            let content = if summary.contains('<') {
                summary.to_string()
            } else {
                format!("<p>{summary}</p>")
            };
            (content, EnrichMethod::RssSummary)
        }
        _ => (PLACEHOLDER.to_string(), EnrichMethod::Unavailable),
    }
}
