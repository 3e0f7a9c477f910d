use crate::config::Config;
use crate::util::{check_url, read_limited_bytes, BodyError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::{timeout_at, Instant};

const MAX_RETRIES: u32 = 3;
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB
const DEFAULT_BACKOFF: Duration = Duration::from_secs(2);

/// Errors retrieving the upstream feed document.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid feed URL: {0}")]
    InvalidUrl(String),
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    /// Received fewer bytes than Content-Length announced
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

impl From<BodyError> for FetchError {
    fn from(e: BodyError) -> Self {
        match e {
            BodyError::Network(e) => FetchError::Network(e),
            BodyError::TooLarge(limit) => FetchError::ResponseTooLarge(limit),
            BodyError::Incomplete { expected, received } => {
                FetchError::IncompleteResponse { expected, received }
            }
        }
    }
}

/// Downloads upstream feeds with retry on rate limiting and server errors.
#[derive(Clone)]
pub struct SourceFetcher {
    client: reqwest::Client,
    timeout: Duration,
    allow_private: bool,
    backoff: Duration,
}

impl SourceFetcher {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            timeout: config.request_timeout(),
            allow_private: config.allow_private_networks,
            backoff: DEFAULT_BACKOFF,
        }
    }

    /// Base delay for exponential backoff; retry `n` waits `base * 2^n`.
    pub fn with_backoff(mut self, base: Duration) -> Self {
        self.backoff = base;
        self
    }

    /// Fetch the raw feed document at `url`.
    ///
    /// 429 and 5xx responses, as well as truncated bodies, are retried up to
    /// three times with exponential backoff (2s, 4s, 8s by default). Other
    /// non-2xx statuses fail immediately.
    ///
    /// # Errors
    ///
    /// - [`FetchError::InvalidUrl`] - Not http(s), or a private/loopback host
    /// - [`FetchError::Timeout`] - Headers and body not received within the
    ///   request timeout
    /// - [`FetchError::HttpStatus`] - Non-2xx after retries
    /// - [`FetchError::RateLimited`] - Still 429 after retries
    /// - [`FetchError::ResponseTooLarge`] - Body exceeded 10MB
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let parsed = check_url(url, self.allow_private)
            .map_err(|e| FetchError::InvalidUrl(e.to_string()))?;

        let mut retry_count = 0;

        loop {
            // One deadline per attempt, covering headers and body
            let deadline = Instant::now() + self.timeout;
            let response = timeout_at(deadline, self.client.get(parsed.clone()).send())
                .await
                .map_err(|_| FetchError::Timeout(self.timeout))?
                .map_err(FetchError::Network)?;

            let status = response.status();

            // EDGE-004: Handle rate limiting with exponential backoff
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                if retry_count >= MAX_RETRIES {
                    return Err(FetchError::RateLimited(MAX_RETRIES));
                }
                let delay = self.backoff * 2u32.pow(retry_count);
                tracing::warn!(
                    feed = %parsed,
                    retry = retry_count,
                    delay_ms = delay.as_millis() as u64,
                    "Rate limited, backing off"
                );
                tokio::time::sleep(delay).await;
                retry_count += 1;
                continue;
            }

            if status.is_server_error() {
                if retry_count >= MAX_RETRIES {
                    return Err(FetchError::HttpStatus(status.as_u16()));
                }
                let delay = self.backoff * 2u32.pow(retry_count);
                tracing::warn!(
                    feed = %parsed,
                    status = %status,
                    retry = retry_count,
                    delay_ms = delay.as_millis() as u64,
                    "Server error, retrying after delay"
                );
                tokio::time::sleep(delay).await;
                retry_count += 1;
                continue;
            }

            if !status.is_success() {
                return Err(FetchError::HttpStatus(status.as_u16()));
            }

            let body = timeout_at(deadline, read_limited_bytes(response, MAX_FEED_SIZE))
                .await
                .map_err(|_| FetchError::Timeout(self.timeout))?;

            match body {
                Ok(bytes) => return Ok(bytes),
                Err(BodyError::Incomplete { expected, received })
                    if retry_count < MAX_RETRIES =>
                {
                    let delay = self.backoff * 2u32.pow(retry_count);
                    tracing::debug!(
                        feed = %parsed,
                        expected = expected,
                        received = received,
                        attempt = retry_count + 1,
                        "Retrying incomplete download"
                    );
                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{any, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <item><title>Test</title><link>https://example.com/1</link></item>
</channel></rss>"#;

    fn fetcher() -> SourceFetcher {
        let config = Config {
            allow_private_networks: true,
            ..Config::default()
        };
        SourceFetcher::new(reqwest::Client::new(), &config).with_backoff(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .insert_header("Content-Type", "application/xml"),
            )
            .mount(&mock_server)
            .await;

        let bytes = fetcher()
            .fetch(&format!("{}/feed", mock_server.uri()))
            .await
            .unwrap();
        assert_eq!(bytes, VALID_RSS.as_bytes());
    }

    #[tokio::test]
    async fn test_404_fails_without_retry() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&mock_server)
            .await;

        match fetcher().fetch(&format!("{}/feed", mock_server.uri())).await {
            Err(FetchError::HttpStatus(404)) => {}
            other => panic!("Expected HttpStatus(404), got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_500_retries_then_fails() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(4) // Initial request + 3 retries
            .mount(&mock_server)
            .await;

        match fetcher().fetch(&format!("{}/feed", mock_server.uri())).await {
            Err(FetchError::HttpStatus(500)) => {}
            other => panic!("Expected HttpStatus(500), got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_503_retry_then_success() {
        let mock_server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&mock_server)
            .await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .mount(&mock_server)
            .await;

        let result = fetcher().fetch(&format!("{}/feed", mock_server.uri())).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_rate_limited_after_retries() {
        let mock_server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(429))
            .expect(4)
            .mount(&mock_server)
            .await;

        let result = fetcher().fetch(&format!("{}/feed", mock_server.uri())).await;
        assert!(matches!(result, Err(FetchError::RateLimited(3))));
    }

    #[tokio::test]
    async fn test_private_address_rejected_by_default() {
        let fetcher = SourceFetcher::new(reqwest::Client::new(), &Config::default());
        let result = fetcher.fetch("http://192.168.1.10/feed.xml").await;
        assert!(matches!(result, Err(FetchError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_non_http_scheme_rejected() {
        let result = fetcher().fetch("file:///etc/passwd").await;
        assert!(matches!(result, Err(FetchError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_stalled_body_times_out() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        // Announces 1000 bytes, sends four, then goes quiet
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\n<rss")
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let config = Config {
            allow_private_networks: true,
            request_timeout_secs: 1,
            ..Config::default()
        };
        let fetcher = SourceFetcher::new(reqwest::Client::new(), &config);

        let start = std::time::Instant::now();
        let result = tokio::time::timeout(
            Duration::from_secs(6),
            fetcher.fetch(&format!("http://{addr}/feed.xml")),
        )
        .await
        .expect("fetch must give up on its own");

        assert!(matches!(result, Err(FetchError::Timeout(_))), "{result:?}");
        assert!(start.elapsed() < Duration::from_secs(3));
    }
}
