//! Bounded excerpts of large text blobs for diagnostics.

/// Characters of output kept when a diagnostic excerpt is needed.
pub const DEFAULT_EXCERPT_CHARS: usize = 500;

/// The last `max_chars` characters of `text`, cut on a char boundary.
pub fn tail_excerpt(text: &str, max_chars: usize) -> &str {
    let total = text.chars().count();
    if total <= max_chars {
        return text;
    }
    let skip = total - max_chars;
    match text.char_indices().nth(skip) {
        Some((offset, _)) => &text[offset..],
        None => "",
    }
}
