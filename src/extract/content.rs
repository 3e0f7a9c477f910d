use super::{selector, PLACEHOLDER};
use crate::util::has_min_text;
use scraper::{ElementRef, Html};

/// Class substrings marking a content container.
const CONTENT_CLASS_HINTS: &[&str] = &[
    "content",
    "article",
    "post",
    "entry",
    "main-content",
    "article-content",
];

/// Class/id substrings marking page furniture inside an extracted fragment.
const NOISE_HINTS: &[&str] = &[
    "cookie", "consent", "gdpr", "privacy", "advert", "ads", "pub", "sponsor", "promo", "banner",
    "social", "share", "follow", "newsletter", "subscribe", "footer", "header", "nav", "sidebar",
    "recommend", "related", "suggest", "comment", "responses", "reply", "discussion", "disqus",
];

/// Editorial elements never removed by the noise pass.
const KEPT_ELEMENTS: &[&str] = &["article", "section", "figure", "picture", "img"];

const NOISY_IFRAME_HOSTS: &[&str] = &["disqus", "facebook", "ads", "doubleclick"];

/// Pick the main-content fragment of an article page.
///
/// Candidates, first one with at least `min_len` visible characters wins:
///
/// 1. the first `<article>`
/// 2. the first `<div>` whose class mentions content/article/post/entry
/// 3. the first `<main>` or `[role=main]`
///
/// Failing all three, the document body is used. Input without a body is
/// returned unchanged, and empty input yields the placeholder.
pub fn extract_content(html: &str, min_len: usize) -> String {
    if html.trim().is_empty() {
        return PLACEHOLDER.to_string();
    }

    let document = Html::parse_document(html);

    if let Some(fragment) = select_candidate(&document, min_len) {
        return clean_fragment(&fragment);
    }

    // html5ever synthesizes a <body> for any input, so only trust it when
    // the page actually had one.
    if html.to_ascii_lowercase().contains("<body") {
        if let Some(body) = selector("body").and_then(|s| document.select(&s).next()) {
            tracing::debug!("No content container qualified, falling back to <body>");
            return clean_fragment(&body.inner_html());
        }
    }

    html.to_string()
}

fn select_candidate(document: &Html, min_len: usize) -> Option<String> {
    let qualifies = |el: &ElementRef| has_min_text(&el.html(), min_len);

    let article = selector("article")
        .and_then(|s| document.select(&s).next())
        .filter(|el| qualifies(el));
    if let Some(el) = article {
        return Some(el.html());
    }

    let by_class = selector("div[class]")
        .and_then(|s| {
            document.select(&s).find(|el| {
                el.value()
                    .attr("class")
                    .map(|class| {
                        let class = class.to_lowercase();
                        CONTENT_CLASS_HINTS.iter().any(|hint| class.contains(hint))
                    })
                    .unwrap_or(false)
            })
        })
        .filter(|el| qualifies(el));
    if let Some(el) = by_class {
        return Some(el.html());
    }

    selector("main, [role='main']")
        .and_then(|s| document.select(&s).next())
        .filter(|el| qualifies(el))
        .map(|el| el.html())
}

fn is_noise(el: &ElementRef) -> bool {
    let value = el.value();
    match value.name() {
        "script" | "style" | "noscript" => return true,
        "iframe" => {
            let src = value.attr("src").unwrap_or_default().to_lowercase();
            return NOISY_IFRAME_HOSTS.iter().any(|host| src.contains(host));
        }
        name if KEPT_ELEMENTS.contains(&name) => return false,
        _ => {}
    }

    let identifiers = format!(
        "{} {}",
        value.attr("class").unwrap_or_default(),
        value.id().unwrap_or_default()
    )
    .to_lowercase();
    NOISE_HINTS.iter().any(|hint| identifiers.contains(hint))
}

/// Drop scripts, styles, social/ad iframes and page furniture from a
/// fragment. Top-level elements of the fragment are never removed.
fn clean_fragment(fragment: &str) -> String {
    let mut document = Html::parse_fragment(fragment);
    let root = document.root_element();

    let doomed: Vec<_> = root
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.id() != root.id())
        .filter(|el| {
            let top_level = el.parent().map(|p| p.id()) == Some(root.id());
            let name = el.value().name();
            let always = matches!(name, "script" | "style" | "noscript" | "iframe");
            (always || !top_level) && is_noise(el)
        })
        .map(|el| el.id())
        .collect();

    for id in doomed {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }

    document.root_element().inner_html()
}
