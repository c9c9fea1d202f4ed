use once_cell::sync::Lazy;
use regex::Regex;

// Channel handle, then an optional numeric message id, then an optional
// trailing alphanumeric segment (topic/comment slugs).
static POST_LINK_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"https?://(?:t\.me|telegram\.me)/[A-Za-z0-9_]+(?:/[0-9]+)?(?:/[A-Za-z0-9_]+)?")
        .expect("invalid post link pattern")
});

/// Returns the first Telegram post reference in `text`, scanning left to
/// right. Later links in the same message are ignored.
pub(super) fn extract_post_link(text: &str) -> Option<String> {
    POST_LINK_PATTERN
        .find(text)
        .map(|m| m.as_str().to_string())
}
