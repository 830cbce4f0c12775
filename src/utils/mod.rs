/// Maximum number of characters kept when logging response bodies.
pub const PREVIEW_CHARS: usize = 200;

/// Truncates `text` to at most `max_chars` characters, appending an ellipsis
/// when something was cut. Never splits a UTF-8 sequence.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}…", &text[..byte_idx]),
        None => text.to_string(),
    }
}

/// Turns a novel title into a file name safe for a `Content-Disposition` header.
pub fn file_stem(title: &str) -> String {
    let stem: String = title
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    let stem = stem.trim_matches('_');
    if stem.is_empty() {
        "novela".to_string()
    } else {
        stem.to_string()
    }
}

/// Drops a leading UTF-8 byte order mark, which some editors prepend to pasted text.
pub fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}
