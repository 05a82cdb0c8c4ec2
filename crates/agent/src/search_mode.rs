//! Decides whether a request should ask the model for live search.

use std::sync::LazyLock;

use quill_core::provider::SearchMode;
use regex::Regex;

const KEYWORDS: &[&str] = &[
    "today",
    "latest",
    "news",
    "trending",
    "breaking",
    "current",
    "now",
    "recent",
    "x.com",
    "twitter",
    "tweet",
    "what happened",
    "as of",
    "update on",
    "release notes",
    "changelog",
    "price",
];

static YEAR: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"20\d{2}").ok());

/// `Auto` for grok models when the message looks time-sensitive, `Off`
/// otherwise. Keywords match as substrings, so "know" counts for "now".
pub fn search_mode_for(model: &str, message: &str) -> SearchMode {
    if !model.to_lowercase().contains("grok") {
        return SearchMode::Off;
    }
    let text = message.to_lowercase();
    if KEYWORDS.iter().any(|k| text.contains(k)) || YEAR.as_ref().is_some_and(|re| re.is_match(&text)) {
        SearchMode::Auto
    } else {
        SearchMode::Off
    }
}
