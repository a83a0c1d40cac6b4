//! MIME type helpers for deciding what the download stage keeps.

/// Non-`text/*` MIME types that still carry an extractable document.
const TEXT_LIKE_APPLICATION_TYPES: &[&str] = &[
    "application/xhtml+xml",
    "application/xml",
    "application/json",
    "application/rss+xml",
    "application/atom+xml",
];

/// Strip parameters (`; charset=...`) and normalize case.
pub fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Whether a response with this `Content-Type` is worth handing to the
/// text extractor. A missing header is treated as text, servers omit it
/// for plain HTML often enough.
pub fn is_text_like(content_type: Option<&str>) -> bool {
    let Some(raw) = content_type else {
        return true;
    };
    let mime = essence(raw);
    mime.is_empty() || mime.starts_with("text/") || TEXT_LIKE_APPLICATION_TYPES.contains(&mime.as_str())
}
