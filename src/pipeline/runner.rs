use super::{EnrichMethod, EnrichedEntry, EntryProcessor};
use crate::feed::FeedEntry;
use futures::stream::{self, StreamExt};
use std::cmp::Reverse;
use std::time::{Duration, Instant};

/// Aggregate outcome of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub cascade: usize,
    pub rss_summary: usize,
    pub unavailable: usize,
    /// Entries that produced nothing: no link, or processing panicked.
    pub failed: usize,
    pub submitted: usize,
    /// Enriched entries carrying an article image.
    pub with_image: usize,
    /// Total number of tags across enriched entries.
    pub tags: usize,
    pub elapsed: Duration,
}

impl PipelineStats {
    pub fn count(&self, method: EnrichMethod) -> usize {
        match method {
            EnrichMethod::Cascade => self.cascade,
            EnrichMethod::RssSummary => self.rss_summary,
            EnrichMethod::Unavailable => self.unavailable,
        }
    }

    /// Entries that made it into the output.
    pub fn processed(&self) -> usize {
        self.cascade + self.rss_summary + self.unavailable
    }

    fn record(&mut self, entry: &EnrichedEntry) {
        match entry.method {
            EnrichMethod::Cascade => self.cascade += 1,
            EnrichMethod::RssSummary => self.rss_summary += 1,
            EnrichMethod::Unavailable => self.unavailable += 1,
        }
        if entry.images.article_image.is_some() {
            self.with_image += 1;
        }
        self.tags += entry.tags.len();
    }
}

/// Runs an [`EntryProcessor`] over a feed with bounded parallelism.
pub struct ConcurrentPipeline {
    processor: EntryProcessor,
}

impl ConcurrentPipeline {
    pub fn new(processor: EntryProcessor) -> Self {
        Self { processor }
    }

    /// Enrich `entries` with at most `workers` in flight.
    ///
    /// Each entry runs as its own task, so a panic while processing one is
    /// counted as a failure and the rest of the batch carries on. Output is
    /// sorted newest first; undated entries go last, in feed order.
    pub async fn run(
        &self,
        entries: Vec<FeedEntry>,
        workers: usize,
        preferred: Option<&str>,
    ) -> (Vec<EnrichedEntry>, PipelineStats) {
        let start = Instant::now();
        let total = entries.len();
        let workers = workers.max(1);
        let preferred = preferred.map(str::to_owned);

        tracing::info!(entries = total, workers = workers, "Processing entries");

        let outcomes: Vec<_> = stream::iter(entries.into_iter().enumerate())
            .map(|(index, entry)| {
                let processor = self.processor.clone();
                let preferred = preferred.clone();
                async move {
                    let task = tokio::spawn(async move {
                        processor
                            .process(&entry, index + 1, total, preferred.as_deref())
                            .await
                    });
                    (index, task.await)
                }
            })
            .buffer_unordered(workers)
            .collect()
            .await;

        let mut stats = PipelineStats {
            submitted: total,
            ..PipelineStats::default()
        };
        let mut enriched = Vec::with_capacity(outcomes.len());

        for (index, outcome) in outcomes {
            match outcome {
                Ok(Ok(entry)) => {
                    stats.record(&entry);
                    enriched.push((index, entry));
                }
                Ok(Err(e)) => {
                    tracing::debug!(entry = index + 1, error = %e, "Entry skipped");
                    stats.failed += 1;
                }
                Err(e) => {
                    tracing::error!(entry = index + 1, error = %e, "Entry processing crashed");
                    stats.failed += 1;
                }
            }
        }

        // None sorts below Some, so Reverse puts undated entries last
        enriched.sort_by_key(|(index, entry)| (Reverse(entry.published), *index));
        stats.elapsed = start.elapsed();

        tracing::info!(
            processed = stats.processed(),
            submitted = stats.submitted,
            cascade = stats.cascade,
            rss_summary = stats.rss_summary,
            unavailable = stats.unavailable,
            failed = stats.failed,
            images = stats.with_image,
            tags = stats.tags,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "Pipeline finished"
        );

        (enriched.into_iter().map(|(_, entry)| entry).collect(), stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::fetch::{CascadeFetcher, FetchStrategy, StrategyError};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Serves a long article for every URL, except `/fail` (error) and
    /// `/panic` (panics). Tracks peak concurrency.
    #[derive(Default)]
    struct Site {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl FetchStrategy for Site {
        fn name(&self) -> &'static str {
            "site"
        }

        fn is_enabled(&self) -> bool {
            true
        }

        async fn fetch(&self, url: &str) -> Result<String, StrategyError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            if url.ends_with("/panic") {
                panic!("parser blew up");
            }
            if url.ends_with("/fail") {
                return Err(StrategyError::HttpStatus(500));
            }
            Ok(format!(
                "<html><body><article><img src='/a.jpg'><p>{}</p></article></body></html>",
                "Article body text. ".repeat(10)
            ))
        }
    }

    fn pipeline(site: Arc<Site>) -> ConcurrentPipeline {
        let fetcher = CascadeFetcher::new(vec![site as Arc<dyn FetchStrategy>]);
        ConcurrentPipeline::new(EntryProcessor::new(
            Arc::new(fetcher),
            Arc::new(Config::default()),
        ))
    }

    fn entry(path: &str, day: Option<u32>) -> FeedEntry {
        FeedEntry {
            title: path.to_string(),
            link: Some(format!("https://example.com{path}")),
            published: day.map(|d| Utc.with_ymd_and_hms(2024, 5, d, 12, 0, 0).unwrap()),
            categories: vec![],
            summary: None,
        }
    }

    #[tokio::test]
    async fn test_sorted_by_date_desc_with_undated_last() {
        let entries = vec![
            entry("/a", None),
            entry("/b", Some(1)),
            entry("/c", Some(3)),
            entry("/d", None),
            entry("/e", Some(2)),
        ];
        let (out, stats) = pipeline(Arc::new(Site::default())).run(entries, 3, None).await;

        let order: Vec<_> = out.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(order, vec!["/c", "/e", "/b", "/a", "/d"]);
        assert_eq!(stats.cascade, 5);
        assert_eq!(stats.with_image, 5);
        assert_eq!(stats.submitted, 5);
    }

    #[tokio::test]
    async fn test_worker_bound_respected() {
        let site = Arc::new(Site::default());
        let entries = (0..12).map(|i| entry(&format!("/{i}"), None)).collect();

        let (out, _) = pipeline(site.clone()).run(entries, 4, None).await;
        assert_eq!(out.len(), 12);
        assert!(site.peak.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test]
    async fn test_failures_isolated() {
        let mut no_link = entry("/x", None);
        no_link.link = None;
        let entries = vec![
            entry("/ok", Some(1)),
            entry("/fail", Some(2)),
            entry("/panic", Some(3)),
            no_link,
        ];

        let (out, stats) = pipeline(Arc::new(Site::default())).run(entries, 2, None).await;

        assert_eq!(out.len(), 2);
        assert_eq!(stats.cascade, 1);
        assert_eq!(stats.count(EnrichMethod::Unavailable), 1);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.processed(), 2);
    }

    #[tokio::test]
    async fn test_zero_workers_still_runs() {
        let (out, _) = pipeline(Arc::new(Site::default()))
            .run(vec![entry("/a", None)], 0, None)
            .await;
        assert_eq!(out.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let (out, stats) = pipeline(Arc::new(Site::default())).run(vec![], 4, None).await;
        assert!(out.is_empty());
        assert_eq!(stats.processed(), 0);
    }
}
