use percent_encoding::percent_decode_str;

pub const DEFAULT_PREFIX: &str = "/custom-model/";

/// Brings a configured prefix into `/segment/` form.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        return DEFAULT_PREFIX.to_string();
    }
    format!("/{trimmed}/")
}

/// Extracts the asset path following `prefix` from a request path or URL.
///
/// Query and fragment are dropped and percent-escapes decoded. Returns `None`
/// when the request is outside the reserved namespace.
pub fn normalize(raw: &str, prefix: &str) -> Option<String> {
    let without_suffix = raw.split(['?', '#']).next().unwrap_or(raw);
    let start = without_suffix.find(prefix)? + prefix.len();
    let relative = &without_suffix[start..];
    let decoded = percent_decode_str(relative).decode_utf8_lossy();
    Some(decoded.trim_start_matches('/').to_string())
}

pub fn is_reserved(raw: &str, prefix: &str) -> bool {
    normalize(raw, prefix).is_some()
}
