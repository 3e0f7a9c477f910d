//! The single entry point: enrich the feed at a URL.

use crate::config::Config;
use crate::feed::{parse_feed, write_rss, Channel, FetchError, SourceFeed, SourceFetcher};
use crate::fetch::{browser_client, CascadeFetcher};
use crate::pipeline::{ConcurrentPipeline, EntryProcessor, PipelineStats};
use crate::storage::FeedCache;
use crate::util::strip_control_chars;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Request-level failures. Per-entry problems never surface here.
#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("Invalid feed URL: {0}")]
    InvalidUrl(String),
    #[error("Feed unreachable: {0}")]
    Unreachable(String),
    #[error("Feed request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Feed returned HTTP {0}")]
    HttpStatus(u16),
    #[error("Feed too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    #[error("Feed could not be parsed: {0}")]
    Parse(String),
    #[error("Feed has no entries")]
    EmptyFeed,
    #[error("Failed to generate feed: {0}")]
    Serialize(String),
    #[error("Failed to initialize: {0}")]
    Setup(String),
}

impl EnrichError {
    /// HTTP status a serving layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            EnrichError::InvalidUrl(_) | EnrichError::Parse(_) => 400,
            EnrichError::EmptyFeed => 404,
            EnrichError::HttpStatus(status) => *status,
            EnrichError::Unreachable(_) | EnrichError::ResponseTooLarge(_) => 502,
            EnrichError::Timeout(_) => 504,
            EnrichError::Serialize(_) | EnrichError::Setup(_) => 500,
        }
    }
}

impl From<FetchError> for EnrichError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::InvalidUrl(msg) => EnrichError::InvalidUrl(msg),
            FetchError::HttpStatus(status) => EnrichError::HttpStatus(status),
            FetchError::RateLimited(_) => EnrichError::HttpStatus(429),
            FetchError::Timeout(after) => EnrichError::Timeout(after),
            FetchError::ResponseTooLarge(limit) => EnrichError::ResponseTooLarge(limit),
            e @ (FetchError::Network(_) | FetchError::IncompleteResponse { .. }) => {
                EnrichError::Unreachable(e.to_string())
            }
        }
    }
}

/// Parameters of one enrichment request.
#[derive(Debug, Clone, Default)]
pub struct EnrichRequest {
    pub url: String,
    /// Restrict fetching to one strategy (`readability`, `http`, `browser`).
    /// `cascade` or blank means no restriction.
    pub preferred_method: Option<String>,
    /// Process only the first N entries of the source feed.
    pub max_entries: Option<usize>,
    /// Worker count, clamped to the configured bounds.
    pub workers: Option<usize>,
}

/// The enriched feed, serialized.
#[derive(Debug, Clone)]
pub struct FeedDocument {
    /// RSS 2.0 bytes.
    pub xml: Vec<u8>,
    pub from_cache: bool,
    /// `None` when served from cache.
    pub stats: Option<PipelineStats>,
}

/// Wires source retrieval, the pipeline, serialization and the cache.
pub struct FeedEnricher {
    config: Arc<Config>,
    source: SourceFetcher,
    fetcher: Arc<CascadeFetcher>,
    cache: FeedCache,
}

impl FeedEnricher {
    pub fn new(config: Config) -> Result<Self, EnrichError> {
        let client =
            browser_client(&config.user_agent).map_err(|e| EnrichError::Setup(e.to_string()))?;
        let fetcher =
            CascadeFetcher::from_config(&config).map_err(|e| EnrichError::Setup(e.to_string()))?;

        tracing::debug!(strategies = ?fetcher.strategy_names(), "Fetch cascade ready");

        Ok(Self {
            source: SourceFetcher::new(client, &config),
            cache: FeedCache::from_config(&config),
            fetcher: Arc::new(fetcher),
            config: Arc::new(config),
        })
    }

    /// Replace the article fetch cascade.
    pub fn with_fetcher(mut self, fetcher: CascadeFetcher) -> Self {
        self.fetcher = Arc::new(fetcher);
        self
    }

    pub fn cache(&self) -> &FeedCache {
        &self.cache
    }

    /// Enrich the feed described by `request`.
    ///
    /// A fresh cached document for the same URL, method and entry cap is
    /// returned as is. Otherwise the source feed is fetched and parsed, every
    /// entry is enriched, and the serialized result is cached.
    ///
    /// # Errors
    ///
    /// Only upstream feed problems fail the request: an invalid or
    /// unreachable URL, a non-2xx status (propagated), a timeout, a document
    /// that does not parse, or a feed without entries.
    pub async fn enrich(&self, request: &EnrichRequest) -> Result<FeedDocument, EnrichError> {
        let start = Instant::now();
        let url = request.url.trim();
        let preferred = normalize_method(request.preferred_method.as_deref());
        let cap = request
            .max_entries
            .unwrap_or(self.config.max_feed_entries)
            .clamp(1, self.config.max_feed_entries.max(1));
        let workers = self.config.clamp_workers(request.workers);

        let extra = format!("{}|{}", preferred.as_deref().unwrap_or_default(), cap);
        let key = FeedCache::fingerprint(url, Some(&extra));

        tracing::info!(
            url = %url,
            method = preferred.as_deref().unwrap_or("cascade"),
            max_entries = cap,
            workers = workers,
            "Enriching feed"
        );

        if let Some(xml) = self.cache.get(&key).await {
            tracing::info!(url = %url, bytes = xml.len(), "Cache hit");
            return Ok(FeedDocument {
                xml,
                from_cache: true,
                stats: None,
            });
        }
        tracing::debug!(url = %url, "Cache miss, generating feed");

        let bytes = self.source.fetch(url).await.inspect_err(|e| {
            tracing::error!(url = %url, error = %e, "Source feed fetch failed");
        })?;

        let SourceFeed {
            title,
            link: _,
            description,
            language,
            mut entries,
        } = parse_feed(&bytes).map_err(|e| {
            tracing::error!(url = %url, error = %e, "Source feed parse failed");
            EnrichError::Parse(e.to_string())
        })?;

        if entries.is_empty() {
            tracing::error!(url = %url, "Source feed has no entries");
            return Err(EnrichError::EmptyFeed);
        }
        tracing::info!(url = %url, entries = entries.len(), "Source feed parsed");
        entries.truncate(cap);

        let processor = EntryProcessor::new(Arc::clone(&self.fetcher), Arc::clone(&self.config));
        let (enriched, stats) = ConcurrentPipeline::new(processor)
            .run(entries, workers, preferred.as_deref())
            .await;

        let channel = Channel {
            title: strip_control_chars(&title).into_owned(),
            link: url.to_string(),
            description: strip_control_chars(&description).into_owned(),
            language: strip_control_chars(&language).into_owned(),
        };
        let xml = write_rss(&channel, &enriched).map_err(|e| {
            tracing::error!(url = %url, error = %e, "Feed serialization failed");
            EnrichError::Serialize(format!("{e:#}"))
        })?;

        self.cache.put(&key, &xml).await;

        tracing::info!(
            url = %url,
            bytes = xml.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Feed generated"
        );

        Ok(FeedDocument {
            xml,
            from_cache: false,
            stats: Some(stats),
        })
    }
}

/// Lowercase and trim a requested method; `cascade` and blanks mean none.
fn normalize_method(method: Option<&str>) -> Option<String> {
    let method = method?.trim().to_ascii_lowercase();
    if method.is_empty() || method == "cascade" {
        None
    } else {
        Some(method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(EnrichError::HttpStatus(403).status_code(), 403);
        assert_eq!(EnrichError::EmptyFeed.status_code(), 404);
        assert_eq!(EnrichError::Parse("bad".into()).status_code(), 400);
        assert_eq!(EnrichError::Unreachable("dns".into()).status_code(), 502);
        assert_eq!(EnrichError::Timeout(Duration::from_secs(30)).status_code(), 504);
        assert_eq!(EnrichError::Serialize("io".into()).status_code(), 500);
    }

    #[test]
    fn test_fetch_error_mapping() {
        assert!(matches!(
            EnrichError::from(FetchError::RateLimited(3)),
            EnrichError::HttpStatus(429)
        ));
        assert!(matches!(
            EnrichError::from(FetchError::IncompleteResponse {
                expected: 10,
                received: 5
            }),
            EnrichError::Unreachable(_)
        ));
    }

    #[test]
    fn test_normalize_method() {
        assert_eq!(normalize_method(None), None);
        assert_eq!(normalize_method(Some("  ")), None);
        assert_eq!(normalize_method(Some("Cascade")), None);
        assert_eq!(normalize_method(Some(" HTTP ")).as_deref(), Some("http"));
        assert_eq!(normalize_method(Some("jina")).as_deref(), Some("jina"));
    }
}
