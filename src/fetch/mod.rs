//! Cascading article retrieval.
//!
//! A [`CascadeFetcher`] holds an ordered list of [`FetchStrategy`]
//! implementations and returns the raw HTML of the first one that succeeds:
//!
//! 1. [`ReadabilityStrategy`] - external text-extraction service
//! 2. [`HttpStrategy`] - direct GET with browser-like headers
//! 3. [`BrowserStrategy`] - headless Chromium behind an exclusive [`RenderGate`]
//!
//! Strategy failures (timeouts, transport errors, short content) never escape
//! the cascade; they are logged and the next strategy is tried. Only when the
//! list is exhausted, or empty from the start, does the caller see a
//! [`CascadeError`].

mod browser;
mod http;
mod readability;

pub use browser::{BrowserStrategy, ChromiumRenderer, PageRenderer, RenderGate};
pub use http::{browser_client, HttpStrategy};
pub use readability::ReadabilityStrategy;

use crate::config::Config;
use crate::util::BodyError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Why a single strategy failed. Local to the cascade.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Content too short: {len} visible chars (min {min})")]
    TooShort { len: usize, min: usize },
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    #[error("Invalid UTF-8 in response")]
    InvalidUtf8,
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Insecure base URL: HTTPS required (except localhost for testing)")]
    InsecureBaseUrl,
    #[error("Browser error: {0}")]
    Browser(String),
}

/// Failure of the whole cascade, surfaced to the entry processor.
#[derive(Debug, Error)]
pub enum CascadeError {
    /// Nothing to try: every strategy is disabled or unavailable, or the
    /// preferred strategy is unknown/disabled. No network I/O happened.
    #[error("No fetch strategy enabled{}", requested_suffix(.requested))]
    NoStrategies { requested: Option<String> },
    /// Every attempted strategy failed.
    #[error("All {} fetch strategies failed", .attempts.len())]
    Exhausted { attempts: Vec<FetchAttempt> },
}

impl From<BodyError> for StrategyError {
    fn from(e: BodyError) -> Self {
        match e {
            BodyError::Network(e) => StrategyError::Network(e),
            BodyError::TooLarge(limit) => StrategyError::ResponseTooLarge(limit),
            BodyError::Incomplete { expected, received } => {
                StrategyError::IncompleteResponse { expected, received }
            }
        }
    }
}

fn requested_suffix(requested: &Option<String>) -> String {
    requested
        .as_deref()
        .map(|r| format!(" (requested: {r})"))
        .unwrap_or_default()
}

/// Diagnostics for one strategy invocation. Never persisted.
#[derive(Debug, Clone)]
pub struct FetchAttempt {
    pub strategy: &'static str,
    pub elapsed: Duration,
    /// `None` on success, otherwise the failure message.
    pub error: Option<String>,
}

impl FetchAttempt {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Raw page obtained by the cascade.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub html: String,
    /// Name of the strategy that produced `html`.
    pub strategy: &'static str,
    /// Every attempt made, in order, including the successful one.
    pub attempts: Vec<FetchAttempt>,
}

/// One way of turning an article URL into HTML.
///
/// Implementations enforce their own timeout and content-length validation;
/// any failure is reported as a [`StrategyError`].
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    /// Canonical name used for preferred-method selection and logging.
    fn name(&self) -> &'static str;

    /// Alternative names accepted for preferred-method selection.
    fn aliases(&self) -> &'static [&'static str] {
        &[]
    }

    /// Whether configuration turned this strategy on.
    fn is_enabled(&self) -> bool;

    /// Whether the runtime components this strategy needs can be initialized.
    async fn is_available(&self) -> bool {
        true
    }

    async fn fetch(&self, url: &str) -> Result<String, StrategyError>;
}

fn answers_to(strategy: &dyn FetchStrategy, requested: &str) -> bool {
    strategy.name().eq_ignore_ascii_case(requested)
        || strategy
            .aliases()
            .iter()
            .any(|alias| alias.eq_ignore_ascii_case(requested))
}

/// Ordered list of strategies tried until one succeeds.
pub struct CascadeFetcher {
    strategies: Vec<Arc<dyn FetchStrategy>>,
}

impl CascadeFetcher {
    /// Build a cascade over `strategies`, tried in the given order.
    pub fn new(strategies: Vec<Arc<dyn FetchStrategy>>) -> Self {
        Self { strategies }
    }

    /// Standard cascade: readability service, direct HTTP, headless browser.
    pub fn from_config(config: &Config) -> Result<Self, StrategyError> {
        let readability = ReadabilityStrategy::from_config(config)?;
        let http = HttpStrategy::from_config(config)?;
        let browser = BrowserStrategy::from_config(config, RenderGate::new());

        let strategies: Vec<Arc<dyn FetchStrategy>> =
            vec![Arc::new(readability), Arc::new(http), Arc::new(browser)];
        Ok(Self::new(strategies))
    }

    /// Canonical names of all registered strategies, in priority order.
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Strategies that will be attempted for this request, in order.
    async fn plan(&self, preferred: Option<&str>) -> Vec<Arc<dyn FetchStrategy>> {
        let mut planned = Vec::new();

        for strategy in &self.strategies {
            if let Some(requested) = preferred {
                if !answers_to(strategy.as_ref(), requested) {
                    continue;
                }
            }
            if !strategy.is_enabled() {
                tracing::debug!(strategy = strategy.name(), "Fetch strategy disabled");
                continue;
            }
            if !strategy.is_available().await {
                tracing::debug!(strategy = strategy.name(), "Fetch strategy unavailable");
                continue;
            }
            planned.push(Arc::clone(strategy));
        }

        planned
    }

    /// Fetch the raw HTML of `url`.
    ///
    /// With `preferred` set, only the strategy answering to that name is
    /// attempted; otherwise every enabled and available strategy is tried in
    /// priority order, stopping at the first success.
    ///
    /// # Errors
    ///
    /// - [`CascadeError::NoStrategies`] immediately, without network I/O,
    ///   when nothing is eligible (including an unknown preferred name)
    /// - [`CascadeError::Exhausted`] when every attempted strategy failed
    pub async fn fetch(
        &self,
        url: &str,
        preferred: Option<&str>,
    ) -> Result<FetchedPage, CascadeError> {
        let planned = self.plan(preferred).await;
        if planned.is_empty() {
            return Err(CascadeError::NoStrategies {
                requested: preferred.map(str::to_owned),
            });
        }

        tracing::debug!(
            url = %url,
            strategies = ?planned.iter().map(|s| s.name()).collect::<Vec<_>>(),
            "Fetching article"
        );

        let mut attempts = Vec::with_capacity(planned.len());
        for strategy in planned {
            let start = Instant::now();
            let result = strategy.fetch(url).await;
            let elapsed = start.elapsed();

            match result {
                Ok(html) => {
                    tracing::info!(
                        url = %url,
                        strategy = strategy.name(),
                        elapsed_ms = elapsed.as_millis() as u64,
                        bytes = html.len(),
                        "Article fetched"
                    );
                    attempts.push(FetchAttempt {
                        strategy: strategy.name(),
                        elapsed,
                        error: None,
                    });
                    return Ok(FetchedPage {
                        html,
                        strategy: strategy.name(),
                        attempts,
                    });
                }
                Err(e) => {
                    tracing::debug!(
                        url = %url,
                        strategy = strategy.name(),
                        elapsed_ms = elapsed.as_millis() as u64,
                        error = %e,
                        "Fetch strategy failed"
                    );
                    attempts.push(FetchAttempt {
                        strategy: strategy.name(),
                        elapsed,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        tracing::warn!(url = %url, attempts = attempts.len(), "All fetch strategies failed");
        Err(CascadeError::Exhausted { attempts })
    }
}
