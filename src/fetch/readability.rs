use super::{FetchStrategy, StrategyError};
use crate::config::Config;
use crate::util::{check_url, has_min_text, read_limited_bytes, visible_text_len};
use async_trait::async_trait;
use lru::LruCache;
use pulldown_cmark::{html, Options, Parser};
use secrecy::{ExposeSecret, SecretString};
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;

const MAX_CONTENT_SIZE: usize = 5 * 1024 * 1024; // 5MB

/// CSS selectors targeting main article content across common blog platforms.
/// Order matters: more specific selectors first, generic fallbacks last.
const TARGET_SELECTORS: &str =
    "article, .entry-content, .post-content, .article-content, .post-body, main .content, main";

/// If X-Target-Selector returns less than this many bytes, retry without it.
/// Accounts for the metadata lines (Title, URL Source, etc.) the service prepends.
const SELECTOR_RETRY_THRESHOLD: usize = 200;

/// Raw service output shorter than this is treated as a failed extraction.
const MIN_RAW_CHARS: usize = 100;

/// Rendered markdown memo size.
const RENDER_CACHE_SIZE: usize = 200;

/// Fetches article text through an external readability service
/// (jina.ai reader API by default) and converts its markdown to HTML.
pub struct ReadabilityStrategy {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    timeout: Duration,
    enabled: bool,
    min_content_length: usize,
    allow_private: bool,
    rendered: Mutex<LruCache<String, String>>,
}

impl ReadabilityStrategy {
    pub fn from_config(config: &Config) -> Result<Self, StrategyError> {
        let settings = &config.readability;
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .build()?;

        // Env var takes precedence over the config file
        let api_key = std::env::var("JINA_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| settings.api_key.clone())
            .map(SecretString::from);

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key,
            timeout: Duration::from_secs(settings.timeout_secs),
            enabled: settings.enabled,
            min_content_length: config.min_content_length,
            allow_private: config.allow_private_networks,
            rendered: Mutex::new(LruCache::new(
                NonZeroUsize::new(RENDER_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN),
            )),
        })
    }

    /// SEC-002: Enforce HTTPS for the service root so the API key never
    /// travels in clear text. Plain HTTP is allowed for localhost only.
    fn check_base_url(&self) -> Result<(), StrategyError> {
        let base = self.base_url.as_str();
        if base.starts_with("https://") {
            return Ok(());
        }
        let is_localhost =
            base.starts_with("http://127.0.0.1") || base.starts_with("http://localhost");
        if !is_localhost {
            tracing::error!(base_url = %base, "Rejecting non-HTTPS readability base URL");
            return Err(StrategyError::InsecureBaseUrl);
        }
        Ok(())
    }

    /// Only the official service host receives the API key.
    fn sends_api_key(&self) -> bool {
        self.base_url == "https://r.jina.ai" || self.base_url == "https://api.jina.ai"
    }

    async fn request(&self, reader_url: &str, use_selector: bool) -> Result<String, StrategyError> {
        let mut request = self
            .client
            .get(reader_url)
            .header("X-Timeout", self.timeout.as_secs().to_string());

        if use_selector {
            request = request.header("X-Target-Selector", TARGET_SELECTORS);
        }

        if let Some(key) = &self.api_key {
            if self.sends_api_key() {
                request = request.header("Authorization", format!("Bearer {}", key.expose_secret()));
            } else {
                tracing::trace!("Skipping API key for non-official readability base URL");
            }
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(StrategyError::HttpStatus(response.status().as_u16()));
        }

        let bytes = read_limited_bytes(response, MAX_CONTENT_SIZE).await?;
        String::from_utf8(bytes).map_err(|_| StrategyError::InvalidUtf8)
    }

    /// Ask with a target selector first; some sites don't use standard
    /// containers, so a near-empty answer is retried without it.
    async fn fetch_markdown(&self, reader_url: &str) -> Result<String, StrategyError> {
        let content = self.request(reader_url, true).await?;
        if content.len() >= SELECTOR_RETRY_THRESHOLD {
            return Ok(content);
        }

        tracing::debug!(
            content_len = content.len(),
            "Target selector returned minimal content, retrying without selector"
        );
        self.request(reader_url, false).await
    }

    fn render(&self, markdown: &str) -> String {
        if let Ok(mut cache) = self.rendered.lock() {
            if let Some(html) = cache.get(markdown) {
                return html.clone();
            }
        }

        let html = markdown_to_html(markdown);

        if let Ok(mut cache) = self.rendered.lock() {
            cache.put(markdown.to_owned(), html.clone());
        }
        html
    }
}

#[async_trait]
impl FetchStrategy for ReadabilityStrategy {
    fn name(&self) -> &'static str {
        "readability"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["jina"]
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn fetch(&self, url: &str) -> Result<String, StrategyError> {
        // SEC-001: Validate URL before use to prevent SSRF attacks
        let parsed = check_url(url, self.allow_private)
            .map_err(|e| StrategyError::InvalidUrl(e.to_string()))?;
        self.check_base_url()?;

        let reader_url = format!("{}/{}", self.base_url, parsed.as_str());
        let markdown = tokio::time::timeout(self.timeout, self.fetch_markdown(&reader_url))
            .await
            .map_err(|_| StrategyError::Timeout(self.timeout))??;

        let raw_len = markdown.chars().count();
        if raw_len < MIN_RAW_CHARS {
            return Err(StrategyError::TooShort {
                len: raw_len,
                min: MIN_RAW_CHARS,
            });
        }

        let html = self.render(&strip_boilerplate(&markdown));
        if !has_min_text(&html, self.min_content_length) {
            return Err(StrategyError::TooShort {
                len: visible_text_len(&html),
                min: self.min_content_length,
            });
        }

        Ok(html)
    }
}

/// Render CommonMark (plus tables, strikethrough and footnotes) to HTML.
pub(crate) fn markdown_to_html(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_FOOTNOTES;
    let parser = Parser::new_ext(markdown, options);
    let mut out = String::with_capacity(markdown.len() + markdown.len() / 2);
    html::push_html(&mut out, parser);
    out
}

/// Lines the reader service passes through that are never article text.
fn is_cruft_line(trimmed: &str) -> bool {
    trimmed.starts_with("[Skip to content]")
        || trimmed == "Loading Comments..."
        || trimmed == "Write a Comment..."
        || trimmed.starts_with("Email (Required)")
        || trimmed == "%d"
        || trimmed.contains("Proudly powered by WordPress")
        || trimmed == "Menu"
}

const MONTHS: &[&str] = &[
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Matches the archive-widget shape `*   [Month Year](url)`.
fn is_archive_link(line: &str) -> bool {
    let Some(rest) = line.trim().strip_prefix('*') else {
        return false;
    };
    let Some(label) = rest.trim_start().strip_prefix('[') else {
        return false;
    };
    MONTHS.iter().any(|month| {
        label
            .strip_prefix(month)
            .and_then(|after| after.get(1..5))
            .is_some_and(|year| year.chars().all(|c| c.is_ascii_digit()))
    })
}

/// Strip boilerplate the reader service doesn't filter: cruft lines, and
/// runs of three or more consecutive archive links.
fn strip_boilerplate(content: &str) -> String {
    let lines: Vec<&str> = content
        .lines()
        .filter(|line| !is_cruft_line(line.trim()))
        .collect();

    let mut kept: Vec<&str> = Vec::with_capacity(lines.len());
    let mut run: Vec<&str> = Vec::new();
    for line in lines {
        if is_archive_link(line) {
            run.push(line);
            continue;
        }
        if run.len() < 3 {
            kept.append(&mut run);
        }
        run.clear();
        kept.push(line);
    }
    if run.len() < 3 {
        kept.append(&mut run);
    }

    kept.join("\n")
}
