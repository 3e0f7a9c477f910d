use super::{make_absolute, selector, ImageSet};
use scraper::Html;
use url::Url;

/// Substrings that disqualify an inline image from being the article image.
const NON_ARTICLE_IMAGE_HINTS: &[&str] = &["icon", "logo", "avatar", "emoji"];

fn first_attr(document: &Html, css: &str, attr: &str) -> Option<String> {
    let selector = selector(css)?;
    document
        .select(&selector)
        .find_map(|el| el.value().attr(attr).map(str::to_owned))
}

fn article_image(document: &Html, base: Option<&Url>) -> Option<String> {
    let from_meta = first_attr(document, "meta[property='og:image']", "content")
        .and_then(|src| make_absolute(&src, base))
        .or_else(|| {
            first_attr(document, "meta[name='twitter:image']", "content")
                .and_then(|src| make_absolute(&src, base))
        });
    if from_meta.is_some() {
        return from_meta;
    }

    let container = ["article", "main"]
        .into_iter()
        .filter_map(selector)
        .find_map(|s| document.select(&s).next())?;

    let img = selector("img[src]")?;
    container
        .select(&img)
        .filter_map(|el| el.value().attr("src"))
        .find(|src| {
            let lower = src.to_lowercase();
            !NON_ARTICLE_IMAGE_HINTS.iter().any(|hint| lower.contains(hint))
        })
        .and_then(|src| make_absolute(src, base))
}

fn site_logo(document: &Html, base: Option<&Url>) -> Option<String> {
    if let Some(logo) = first_attr(document, "meta[property='og:logo']", "content")
        .and_then(|src| make_absolute(&src, base))
    {
        return Some(logo);
    }

    let header = document.select(&selector("header")?).next()?;
    let img = selector("img[src][alt]")?;
    header
        .select(&img)
        .find(|el| {
            el.value()
                .attr("alt")
                .is_some_and(|alt| alt.to_lowercase().contains("logo"))
        })
        .and_then(|el| el.value().attr("src"))
        .and_then(|src| make_absolute(src, base))
}

fn icon_link(document: &Html, base: Option<&Url>, rel_hint: &str) -> Option<String> {
    let links = selector("link[rel][href]")?;
    document
        .select(&links)
        .find(|el| {
            el.value()
                .attr("rel")
                .is_some_and(|rel| rel.to_lowercase().contains(rel_hint))
        })
        .and_then(|el| el.value().attr("href"))
        .and_then(|href| make_absolute(href, base))
}

fn favicon(document: &Html, base: Option<&Url>) -> Option<String> {
    icon_link(document, base, "apple-touch-icon")
        .or_else(|| icon_link(document, base, "icon"))
        .or_else(|| {
            let base = base?;
            make_absolute("/favicon.ico", Some(base))
        })
}

/// Resolve the article image, site logo and favicon of a page.
///
/// Each role is resolved independently, first match wins:
///
/// - article image: `og:image`, `twitter:image`, then the first inline image
///   of the article/main container that is not an icon, logo, avatar or emoji
/// - site logo: `og:logo`, then a header image whose alt text mentions "logo"
/// - favicon: apple-touch-icon, any `rel~=icon` link, then `/favicon.ico`
///
/// The favicon is resolved before the logo falls back to it.
pub fn extract_images(html: &str, page_url: &str) -> ImageSet {
    let base = Url::parse(page_url).ok();
    let document = Html::parse_document(html);

    let mut images = ImageSet {
        article_image: article_image(&document, base.as_ref()),
        site_logo: site_logo(&document, base.as_ref()),
        favicon: favicon(&document, base.as_ref()),
    };

    if images.site_logo.is_none() {
        images.site_logo = images.favicon.clone();
    }

    images
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const BASE: &str = "https://example.com/posts/1";

    #[test]
    fn test_og_image_beats_twitter_and_inline() {
        let html = r#"<html><head>
            <meta property="og:image" content="/og.jpg">
            <meta name="twitter:image" content="/tw.jpg">
            </head><body><article><img src="/inline.jpg"></article></body></html>"#;
        let images = extract_images(html, BASE);
        assert_eq!(images.article_image.as_deref(), Some("https://example.com/og.jpg"));
    }

    #[test]
    fn test_twitter_image_when_no_og() {
        let html = r#"<html><head><meta name="twitter:image" content="https://cdn.example.com/tw.jpg"></head></html>"#;
        let images = extract_images(html, BASE);
        assert_eq!(
            images.article_image.as_deref(),
            Some("https://cdn.example.com/tw.jpg")
        );
    }

    #[test]
    fn test_inline_image_skips_icons_and_avatars() {
        let html = r#"<html><body><article>
            <img src="/static/author-avatar.png">
            <img src="/static/emoji/smile.png">
            <img src="photo.jpg">
            </article></body></html>"#;
        let images = extract_images(html, BASE);
        assert_eq!(
            images.article_image.as_deref(),
            Some("https://example.com/posts/photo.jpg")
        );
    }

    #[test]
    fn test_inline_image_from_main_when_no_article() {
        let html = r#"<html><body><main><img src="/hero.png"></main></body></html>"#;
        let images = extract_images(html, BASE);
        assert_eq!(images.article_image.as_deref(), Some("https://example.com/hero.png"));
    }

    #[test]
    fn test_header_logo_by_alt_text() {
        let html = r#"<html><body><header>
            <img src="/banner.png" alt="Spring sale">
            <img src="/brand.svg" alt="Site LOGO">
            </header></body></html>"#;
        let images = extract_images(html, BASE);
        assert_eq!(images.site_logo.as_deref(), Some("https://example.com/brand.svg"));
    }

    #[test]
    fn test_apple_touch_icon_preferred() {
        let html = r#"<html><head>
            <link rel="icon" href="/favicon-32.png">
            <link rel="apple-touch-icon" href="/apple.png">
            </head></html>"#;
        let images = extract_images(html, BASE);
        assert_eq!(images.favicon.as_deref(), Some("https://example.com/apple.png"));
    }

    #[test]
    fn test_shortcut_icon_link() {
        let html = r#"<html><head><link rel="Shortcut Icon" href="/fav.png"></head></html>"#;
        let images = extract_images(html, BASE);
        assert_eq!(images.favicon.as_deref(), Some("https://example.com/fav.png"));
    }

    #[test]
    fn test_default_favicon_and_logo_fallback() {
        let images = extract_images("<html><body><p>Nothing here</p></body></html>", BASE);
        assert_eq!(
            images,
            ImageSet {
                article_image: None,
                site_logo: Some("https://example.com/favicon.ico".to_string()),
                favicon: Some("https://example.com/favicon.ico".to_string()),
            }
        );
    }

    #[test]
    fn test_og_logo_not_replaced_by_favicon() {
        let html = r#"<html><head>
            <meta property="og:logo" content="/logo.png">
            <link rel="icon" href="/fav.png">
            </head></html>"#;
        let images = extract_images(html, BASE);
        assert_eq!(images.site_logo.as_deref(), Some("https://example.com/logo.png"));
        assert_eq!(images.favicon.as_deref(), Some("https://example.com/fav.png"));
    }

    #[test]
    fn test_unparseable_base_url_keeps_absolute_urls_only() {
        let html = r#"<html><head><meta property="og:image" content="https://img.example.com/a.jpg"></head></html>"#;
        let images = extract_images(html, "not a url");
        assert_eq!(images.article_image.as_deref(), Some("https://img.example.com/a.jpg"));
        assert_eq!(images.favicon, None);
        assert_eq!(images.site_logo, None);
    }
}
