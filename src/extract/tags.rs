use super::selector;
use regex::Regex;
use scraper::Html;
use std::collections::BTreeSet;
use std::sync::OnceLock;

const MIN_TAG_LEN: usize = 3;
const MAX_TAG_LEN: usize = 50;

/// Tag-link texts this long are sentences, not tags.
const MAX_LINK_TEXT_LEN: usize = 30;
const MAX_TAG_LINKS: usize = 10;

static DISALLOWED: OnceLock<Regex> = OnceLock::new();
static TAG_LINK_CLASS: OnceLock<Regex> = OnceLock::new();

fn disallowed() -> &'static Regex {
    // \w is Unicode-aware, so accented letters survive
    DISALLOWED.get_or_init(|| Regex::new(r"[^\w\s-]").expect("static tag filter is valid"))
}

fn tag_link_class() -> &'static Regex {
    TAG_LINK_CLASS
        .get_or_init(|| Regex::new(r"(?i)tag|category|label|topic").expect("static class pattern is valid"))
}

/// Normalize one raw tag, or reject it.
///
/// Trims, requires 3..=50 characters, strips anything that is not a word
/// character, whitespace or hyphen, then re-checks the minimum length.
pub fn normalize_tag(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let len = trimmed.chars().count();
    if !(MIN_TAG_LEN..=MAX_TAG_LEN).contains(&len) {
        return None;
    }

    let stripped = disallowed().replace_all(trimmed, "");
    let cleaned = stripped.trim();
    (cleaned.chars().count() >= MIN_TAG_LEN).then(|| cleaned.to_string())
}

fn finish(raw: impl IntoIterator<Item = String>, max_tags: usize) -> Vec<String> {
    raw.into_iter()
        .filter_map(|tag| normalize_tag(&tag))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .take(max_tags)
        .collect()
}

/// Feed categories alone, normalized, sorted and capped.
pub fn normalize_categories(categories: &[String], max_tags: usize) -> Vec<String> {
    finish(categories.iter().cloned(), max_tags)
}

/// Collect tags for an article.
///
/// Starts from the feed's own categories and adds `<meta name="keywords">`
/// (comma separated), every `article:tag` meta value, and the text of the
/// first ten links whose class looks like a tag/category/label/topic link.
/// The result is normalized, deduplicated, sorted and capped at `max_tags`.
pub fn extract_tags(html: &str, categories: &[String], max_tags: usize) -> Vec<String> {
    let mut raw: Vec<String> = categories.to_vec();

    if html.trim().is_empty() {
        return finish(raw, max_tags);
    }

    let document = Html::parse_document(html);

    if let Some(keywords) = selector("meta[name='keywords'][content]") {
        for el in document.select(&keywords) {
            if let Some(content) = el.value().attr("content") {
                raw.extend(content.split(',').map(|k| k.trim().to_string()));
            }
        }
    }

    if let Some(article_tags) = selector("meta[property='article:tag'][content]") {
        raw.extend(
            document
                .select(&article_tags)
                .filter_map(|el| el.value().attr("content"))
                .map(|c| c.trim().to_string()),
        );
    }

    if let Some(links) = selector("a[class]") {
        let before = raw.len();
        raw.extend(
            document
                .select(&links)
                .filter(|el| {
                    el.value()
                        .attr("class")
                        .is_some_and(|class| tag_link_class().is_match(class))
                })
                .take(MAX_TAG_LINKS)
                .map(|el| el.text().collect::<String>().trim().to_string())
                .filter(|text| !text.is_empty() && text.chars().count() < MAX_LINK_TEXT_LEN),
        );
        tracing::trace!(found = raw.len() - before, "Tag links collected");
    }

    finish(raw, max_tags)
}
