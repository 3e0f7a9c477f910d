//! Utility functions shared by the fetchers, extractors and pipeline.
//!
//! - **Text**: control-character sanitizing and visible-text measurement
//! - **URL validation**: SSRF guard applied to every outbound URL
//! - **Bodies**: size-capped response reads shared by every HTTP caller
//!
//! # Examples
//!
//! ```
//! use fullfeed::util::{strip_control_chars, validate_url, visible_text_len};
//!
//! let url = validate_url("https://example.com/feed.xml").unwrap();
//! assert_eq!(url.host_str(), Some("example.com"));
//!
//! assert_eq!(visible_text_len("<p>Hello</p>"), 5);
//! assert_eq!(strip_control_chars("a\u{0}b"), "ab");
//! ```

mod body;
mod text;
mod url_validator;

pub use body::{read_limited_bytes, BodyError};
pub use text::{has_min_text, strip_control_chars, strip_tags, visible_text_len};
pub use url_validator::{check_url, validate_url, UrlValidationError};
