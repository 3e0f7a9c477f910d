//! HTML extraction heuristics.
//!
//! Three independent, infallible passes over a fetched page:
//!
//! - [`extract_content`] picks the main-content fragment
//! - [`extract_images`] resolves the article image, site logo and favicon
//! - [`extract_tags`] collects and normalizes tags
//!
//! None of these return an error. Whatever cannot be found comes back as a
//! placeholder, `None` or an empty list.

mod content;
mod images;
mod tags;

pub use content::extract_content;
pub use images::extract_images;
pub use tags::{extract_tags, normalize_categories, normalize_tag};

use crate::config::Config;
use scraper::Selector;
use serde::Serialize;
use url::Url;

/// Content used when nothing usable could be extracted.
pub const PLACEHOLDER: &str = "<p>Content unavailable</p>";

/// Image references for one article. Every URL is absolute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImageSet {
    pub article_image: Option<String>,
    pub site_logo: Option<String>,
    pub favicon: Option<String>,
}

/// Everything pulled out of one article page.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionResult {
    /// Main-content HTML fragment. Never empty.
    pub content: String,
    pub images: ImageSet,
    pub tags: Vec<String>,
}

/// Run all three extractors over `html`, fetched from `page_url`.
pub fn extract_all(
    html: &str,
    page_url: &str,
    categories: &[String],
    config: &Config,
) -> ExtractionResult {
    let content = extract_content(html, config.min_content_length);
    ExtractionResult {
        content: if content.trim().is_empty() {
            PLACEHOLDER.to_string()
        } else {
            content
        },
        images: extract_images(html, page_url),
        tags: extract_tags(html, categories, config.max_tags),
    }
}

fn selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(selector) => Some(selector),
        Err(e) => {
            tracing::debug!(selector = css, error = %e, "Invalid CSS selector");
            None
        }
    }
}

/// Resolve `raw` against `base`, keeping only http(s) results.
fn make_absolute(raw: &str, base: Option<&Url>) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let resolved = match base {
        Some(base) => base.join(raw).ok()?,
        None => Url::parse(raw).ok()?,
    };

    matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_absolute_resolves_relative_paths() {
        let base = Url::parse("https://example.com/blog/post").ok();
        assert_eq!(
            make_absolute("/img/a.png", base.as_ref()).as_deref(),
            Some("https://example.com/img/a.png")
        );
        assert_eq!(
            make_absolute("b.png", base.as_ref()).as_deref(),
            Some("https://example.com/blog/b.png")
        );
        assert_eq!(
            make_absolute("//cdn.example.com/c.png", base.as_ref()).as_deref(),
            Some("https://cdn.example.com/c.png")
        );
    }

    #[test]
    fn test_make_absolute_rejects_non_http() {
        let base = Url::parse("https://example.com/").ok();
        assert_eq!(make_absolute("data:image/png;base64,AAAA", base.as_ref()), None);
        assert_eq!(make_absolute("   ", base.as_ref()), None);
        assert_eq!(make_absolute("relative.png", None), None);
    }

    #[test]
    fn test_extract_all_never_returns_empty_content() {
        let result = extract_all("   ", "https://example.com/", &[], &Config::default());
        assert_eq!(result.content, PLACEHOLDER);
        assert!(result.tags.is_empty());
    }
}
