use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;

static TAG_PATTERN: OnceLock<Regex> = OnceLock::new();

fn tag_pattern() -> &'static Regex {
    TAG_PATTERN.get_or_init(|| Regex::new(r"<[^>]+>").expect("static tag pattern is valid"))
}

/// Returns true for characters the sanitizer removes: every Unicode control
/// character (C0, DEL and C1) other than tab, newline and carriage return.
#[inline]
fn is_stripped(c: char) -> bool {
    c.is_control() && !matches!(c, '\t' | '\n' | '\r')
}

/// Remove NUL and other control characters from article content.
///
/// Strips `U+0000-U+0008`, `U+000B`, `U+000C`, `U+000E-U+001F`, `U+007F`
/// and the C1 range `U+0080-U+009F`, none of which XML 1.0 documents may
/// carry safely. Tab, newline and carriage return survive since they are
/// meaningful in HTML source.
///
/// Returns `Cow::Borrowed` when the input is already clean (the common case),
/// so calling this on every entry costs a single scan.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_stripped) {
        return Cow::Borrowed(s);
    }
    Cow::Owned(s.chars().filter(|&c| !is_stripped(c)).collect())
}

/// Strip markup with a tag-shaped regex and trim the remainder.
///
/// This is deliberately cruder than a DOM walk: it is applied to fetched
/// pages before any parsing happens, and to serialized fragments.
pub fn strip_tags(html: &str) -> Cow<'_, str> {
    tag_pattern().replace_all(html, "")
}

/// Number of characters of text left once tags are removed and the result trimmed.
pub fn visible_text_len(html: &str) -> usize {
    strip_tags(html).trim().chars().count()
}

/// Whether `html` carries at least `min_len` visible characters.
pub fn has_min_text(html: &str, min_len: usize) -> bool {
    !html.is_empty() && visible_text_len(html) >= min_len
}
