//! Text normalization helpers shared by scoring, ingestion and the providers.
//!
//! Profile sheets and user requests are typed by hand, so every comparison goes
//! through the same normalization: lowercase, trimmed, single-spaced.

/// Normalizes text for consistent comparison.
///
/// This function applies the following transformations:
/// - Converts to lowercase
/// - Trims leading/trailing whitespace
/// - Collapses multiple consecutive spaces to a single space
///
/// # Example
/// ```
/// use buddy_match::text::normalize_text;
/// assert_eq!(normalize_text("  Los   Angeles "), "los angeles");
/// ```
pub fn normalize_text(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split a comma-separated tag list into normalized, de-duplicated tags.
///
/// Empty tags are dropped and the first occurrence of a tag keeps its position.
pub fn split_tags(text: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in text.split(',').map(normalize_text) {
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

/// Case-insensitive substring test on normalized text.
///
/// An empty needle never matches.
pub fn contains_normalized(haystack: &str, needle: &str) -> bool {
    let needle = normalize_text(needle);
    if needle.is_empty() {
        return false;
    }
    normalize_text(haystack).contains(&needle)
}
