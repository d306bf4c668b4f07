//! Utility functions and helpers.

pub mod http;
pub mod retry;

use std::sync::OnceLock;

use regex::Regex;
use url::Url;

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Extract the first run of digits from an attribute or URL.
///
/// Release containers carry the id directly (`id="123456"`), detail links
/// lead with it (`/vinyl/123456-artist-title`).
pub fn extract_release_id(text: &str) -> Option<u64> {
    static DIGITS: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = DIGITS.get_or_init(|| Regex::new(r"\d+").ok()).as_ref()?;
    pattern.find(text).and_then(|m| m.as_str().parse().ok())
}

/// Collapse runs of whitespace into single spaces.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
