use super::{FetchStrategy, StrategyError};
use crate::config::Config;
use crate::util::{check_url, has_min_text, read_limited_bytes, visible_text_len};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use std::time::Duration;

const MAX_PAGE_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Headers a mobile Chrome sends on a top-level navigation. Enough to get
/// past the basic bot checks that reject library user agents.
fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.9,fr;q=0.8"),
    );
    headers.insert(
        HeaderName::from_static("upgrade-insecure-requests"),
        HeaderValue::from_static("1"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-dest"),
        HeaderValue::from_static("document"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-mode"),
        HeaderValue::from_static("navigate"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-site"),
        HeaderValue::from_static("none"),
    );
    headers.insert(
        HeaderName::from_static("sec-ch-ua-mobile"),
        HeaderValue::from_static("?1"),
    );
    headers.insert(
        HeaderName::from_static("sec-ch-ua-platform"),
        HeaderValue::from_static("\"Android\""),
    );
    headers
}

/// Build the browser-impersonating client shared by the HTTP strategy and
/// the source-feed fetch.
pub fn browser_client(user_agent: &str) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .default_headers(browser_headers())
        .build()
}

/// Direct GET of the article page.
pub struct HttpStrategy {
    client: reqwest::Client,
    timeout: Duration,
    enabled: bool,
    min_page_length: usize,
    allow_private: bool,
}

impl HttpStrategy {
    pub fn from_config(config: &Config) -> Result<Self, StrategyError> {
        Ok(Self {
            client: browser_client(&config.user_agent)?,
            timeout: Duration::from_secs(config.http.timeout_secs),
            enabled: config.http.enabled,
            min_page_length: config.min_page_length,
            allow_private: config.allow_private_networks,
        })
    }

    async fn get(&self, url: &str) -> Result<Vec<u8>, StrategyError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(StrategyError::HttpStatus(response.status().as_u16()));
        }
        Ok(read_limited_bytes(response, MAX_PAGE_SIZE).await?)
    }
}

#[async_trait]
impl FetchStrategy for HttpStrategy {
    fn name(&self) -> &'static str {
        "http"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["cloudscraper"]
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn fetch(&self, url: &str) -> Result<String, StrategyError> {
        let parsed = check_url(url, self.allow_private)
            .map_err(|e| StrategyError::InvalidUrl(e.to_string()))?;

        let bytes = tokio::time::timeout(self.timeout, self.get(parsed.as_str()))
            .await
            .map_err(|_| StrategyError::Timeout(self.timeout))??;

        // Pages in legacy encodings still carry usable markup
        let html = String::from_utf8_lossy(&bytes).into_owned();
        if !has_min_text(&html, self.min_page_length) {
            return Err(StrategyError::TooShort {
                len: visible_text_len(&html),
                min: self.min_page_length,
            });
        }

        Ok(html)
    }
}
