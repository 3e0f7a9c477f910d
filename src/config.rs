//! Configuration file parser for `fullfeed.toml`.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are silently ignored by serde (with `deny_unknown_fields` off),
//! though we log a warning when the file contains potential typos.
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Defaults
// ============================================================================

/// Mobile Chrome user agent sent by the direct HTTP strategy, the browser
/// strategy and the source-feed fetch.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 10; Mobile) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Mobile Safari/537.36";

const DEFAULT_AD_DOMAINS: &[&str] = &[
    "doubleclick.net",
    "googlesyndication.com",
    "googleadservices.com",
    "adnxs.com",
    "advertising.com",
    "adsystem.com",
    "adtech.de",
    "criteo.com",
    "outbrain.com",
    "taboola.com",
    "pubmatic.com",
    "casalemedia.com",
    "rubiconproject.com",
    "openx.net",
];

const DEFAULT_TRACKER_DOMAINS: &[&str] = &[
    "google-analytics.com",
    "googletagmanager.com",
    "analytics.google.com",
    "facebook.com/tr",
    "connect.facebook.net",
    "pixel.facebook.com",
    "mixpanel.com",
    "segment.com",
    "amplitude.com",
    "hotjar.com",
    "mouseflow.com",
    "crazyegg.com",
    "quantserve.com",
    "scorecardresearch.com",
    "chartbeat.com",
    "newrelic.com",
];

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration consumed by the enrichment core.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Worker count used when a request does not ask for one.
    pub default_workers: usize,

    /// Lower bound applied to any requested worker count.
    pub min_workers: usize,

    /// Upper bound applied to any requested worker count.
    pub max_workers: usize,

    /// Hard cap on the number of entries processed per request.
    pub max_feed_entries: usize,

    /// Minimum visible characters for an extracted fragment or readability result.
    pub min_content_length: usize,

    /// Minimum visible characters for a raw page from the HTTP or browser strategy.
    pub min_page_length: usize,

    /// Maximum number of tags kept per entry.
    pub max_tags: usize,

    /// Timeout for fetching the source feed itself.
    pub request_timeout_secs: u64,

    /// Directory holding cached feed documents.
    pub cache_dir: PathBuf,

    /// Age after which a cached feed document is regenerated.
    pub cache_ttl_minutes: u64,

    /// Skip the localhost/private-range URL checks (self-hosted setups, tests).
    pub allow_private_networks: bool,

    /// User agent for direct page and feed requests.
    pub user_agent: String,

    pub readability: ReadabilityConfig,

    pub http: HttpConfig,

    pub browser: BrowserConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_workers: 10,
            min_workers: 1,
            max_workers: 20,
            max_feed_entries: 200,
            min_content_length: 50,
            min_page_length: 200,
            max_tags: 10,
            request_timeout_secs: 30,
            cache_dir: PathBuf::from("cache/feeds"),
            cache_ttl_minutes: 120,
            allow_private_networks: false,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            readability: ReadabilityConfig::default(),
            http: HttpConfig::default(),
            browser: BrowserConfig::default(),
        }
    }
}

/// Settings for the external text-extraction service strategy.
///
/// SEC-015: Custom Debug impl masks `api_key`; the key is never serialized.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReadabilityConfig {
    pub enabled: bool,

    /// Service root; the article URL is appended as a path.
    pub base_url: String,

    pub timeout_secs: u64,

    /// API key (alternative to the JINA_API_KEY env var).
    /// Env var takes precedence over config file.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for ReadabilityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://r.jina.ai".to_string(),
            timeout_secs: 30,
            api_key: None,
        }
    }
}

/// SEC-015: Mask api_key in Debug output to prevent secret leakage.
impl std::fmt::Debug for ReadabilityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadabilityConfig")
            .field("enabled", &self.enabled)
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Settings for the direct, browser-impersonating HTTP strategy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    pub enabled: bool,
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: 30,
        }
    }
}

/// Settings for the headless-browser strategy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub enabled: bool,
    pub timeout_secs: u64,

    /// How long to wait for a content-bearing selector after DOM ready.
    pub selector_wait_ms: u64,

    /// Explicit Chromium binary; auto-detected when unset.
    pub executable: Option<PathBuf>,

    pub disable_javascript: bool,
    pub block_images: bool,
    pub block_media: bool,
    pub block_fonts: bool,
    pub block_stylesheets: bool,
    pub block_ads: bool,
    pub block_trackers: bool,

    /// Substrings matched against every request URL when `block_ads` is on.
    pub ad_domains: Vec<String>,

    /// Substrings matched against every request URL when `block_trackers` is on.
    pub tracker_domains: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: 30,
            selector_wait_ms: 5000,
            executable: None,
            disable_javascript: true,
            block_images: true,
            block_media: true,
            block_fonts: true,
            block_stylesheets: true,
            block_ads: true,
            block_trackers: true,
            ad_domains: owned(DEFAULT_AD_DOMAINS),
            tracker_domains: owned(DEFAULT_TRACKER_DOMAINS),
        }
    }
}

impl BrowserConfig {
    /// Whether a request URL hits one of the enabled block-lists.
    pub fn is_blocked_url(&self, url: &str) -> bool {
        (self.block_ads && self.ad_domains.iter().any(|d| url.contains(d.as_str())))
            || (self.block_trackers && self.tracker_domains.iter().any(|d| url.contains(d.as_str())))
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: &'static [&'static str] = &[
        "default_workers",
        "min_workers",
        "max_workers",
        "max_feed_entries",
        "min_content_length",
        "min_page_length",
        "max_tags",
        "request_timeout_secs",
        "cache_dir",
        "cache_ttl_minutes",
        "allow_private_networks",
        "user_agent",
        "readability",
        "http",
        "browser",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading to prevent memory exhaustion
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text; blank input yields defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        // Parse as a raw table first to detect unknown keys
        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        tracing::info!(
            default_workers = config.default_workers,
            readability = config.readability.enabled,
            http = config.http.enabled,
            browser = config.browser.enabled,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Bound a requested worker count to `[min_workers, max_workers]`.
    pub fn clamp_workers(&self, requested: Option<usize>) -> usize {
        let floor = self.min_workers.max(1);
        let ceiling = self.max_workers.max(floor);
        requested
            .unwrap_or(self.default_workers)
            .clamp(floor, ceiling)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_minutes.saturating_mul(60))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config(name: &str, content: &str) -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join(format!("fullfeed_config_test_{name}"));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("fullfeed.toml");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.default_workers, 10);
        assert_eq!(config.min_workers, 1);
        assert_eq!(config.max_workers, 20);
        assert_eq!(config.max_tags, 10);
        assert_eq!(config.min_content_length, 50);
        assert!(config.readability.enabled);
        assert!(config.http.enabled);
        assert!(config.browser.enabled);
        assert!(!config.allow_private_networks);
        assert_eq!(config.cache_ttl(), Duration::from_secs(2 * 60 * 60));
        assert!(config.readability.api_key.is_none());
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/fullfeed_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.default_workers, 10);
    }

    #[test]
    fn test_whitespace_only_file_returns_default() {
        let (dir, path) = temp_config("whitespace", "   \n  \n  ");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.max_tags, 10);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let content = r#"
max_tags = 5

[browser]
enabled = false
"#;
        let (dir, path) = temp_config("partial", content);
        let config = Config::load(&path).unwrap();
        assert_eq!(config.max_tags, 5);
        assert!(!config.browser.enabled);
        assert!(config.browser.block_images); // default
        assert!(!config.browser.ad_domains.is_empty()); // default
        assert!(config.http.enabled); // default
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_full_sections() {
        let content = r#"
default_workers = 4
allow_private_networks = true
cache_dir = "/var/cache/fullfeed"

[readability]
base_url = "https://reader.example.com"
timeout_secs = 12
api_key = "test-key-123"

[http]
enabled = false

[browser]
selector_wait_ms = 1000
ad_domains = ["ads.example.com"]
"#;
        let config = Config::from_toml_str(content).unwrap();
        assert_eq!(config.default_workers, 4);
        assert!(config.allow_private_networks);
        assert_eq!(config.cache_dir, PathBuf::from("/var/cache/fullfeed"));
        assert_eq!(config.readability.base_url, "https://reader.example.com");
        assert_eq!(config.readability.timeout_secs, 12);
        assert_eq!(config.readability.api_key.as_deref(), Some("test-key-123"));
        assert!(!config.http.enabled);
        assert_eq!(config.browser.selector_wait_ms, 1000);
        assert_eq!(config.browser.ad_domains, vec!["ads.example.com".to_string()]);
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let (dir, path) = temp_config("invalid", "this is not [valid toml");
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let config = Config::from_toml_str("max_tags = 3\ntotally_fake_key = 1\n").unwrap();
        assert_eq!(config.max_tags, 3);
    }

    #[test]
    fn test_wrong_type_returns_error() {
        assert!(Config::from_toml_str("max_tags = \"ten\"\n").is_err());
    }

    // SEC-014: File size limit
    #[test]
    fn test_too_large_file_rejected() {
        let (dir, path) = temp_config("too_large", &"a".repeat(1_048_577));
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_clamp_workers() {
        let config = Config::default();
        assert_eq!(config.clamp_workers(None), 10);
        assert_eq!(config.clamp_workers(Some(0)), 1);
        assert_eq!(config.clamp_workers(Some(7)), 7);
        assert_eq!(config.clamp_workers(Some(500)), 20);
    }

    #[test]
    fn test_clamp_workers_with_inverted_bounds() {
        let config = Config {
            min_workers: 8,
            max_workers: 2,
            ..Config::default()
        };
        assert_eq!(config.clamp_workers(Some(1)), 8);
        assert_eq!(config.clamp_workers(Some(50)), 8);
    }

    #[test]
    fn test_blocked_url_matching() {
        let mut browser = BrowserConfig::default();
        assert!(browser.is_blocked_url("https://securepubads.g.doubleclick.net/tag/js/gpt.js"));
        assert!(browser.is_blocked_url("https://www.google-analytics.com/analytics.js"));
        assert!(!browser.is_blocked_url("https://example.com/article.html"));

        browser.block_ads = false;
        assert!(!browser.is_blocked_url("https://securepubads.g.doubleclick.net/tag/js/gpt.js"));
        assert!(browser.is_blocked_url("https://www.google-analytics.com/analytics.js"));
    }

    // SEC-015: Debug output masks API key
    #[test]
    fn test_debug_masks_api_key() {
        let mut config = Config::default();
        config.readability.api_key = Some("super-secret-key-12345".to_string());

        let debug_output = format!("{:?}", config);
        assert!(!debug_output.contains("super-secret-key-12345"));
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[test]
    fn test_serialized_config_omits_api_key() {
        let mut config = Config::default();
        config.readability.api_key = Some("super-secret-key-12345".to_string());

        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("super-secret-key-12345"));
        assert!(!json.contains("api_key"));
    }
}
