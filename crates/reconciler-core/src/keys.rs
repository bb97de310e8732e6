//! Stable canonical keys for `(artist, album)` and `(artist, album, source)`
//! pairs, used by the album-year cache and the API-response cache
//! respectively.

use sha2::{Digest, Sha256};

/// Lowercases and strips Unicode punctuation, collapsing the result the way
/// the scoring normalizer does for names, but without the `&` → `and`
/// substitution (album-year cache keys are not scored, only looked up).
fn strip_punctuation(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// `SHA256(normalize(artist) + "|" + normalize(album))`.
pub fn album_year_key(artist: &str, album: &str) -> String {
    let normalized = format!("{}|{}", strip_punctuation(artist), strip_punctuation(album));
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// `SHA256("api_request" + source + url + canonical(params))`.
///
/// `params` is rendered as a sorted `key=value` list joined with `&`, giving
/// a stable canonical form regardless of caller-provided ordering.
pub fn api_response_key(source: &str, url: &str, params: &[(String, String)]) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    let canonical_params = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(b"api_request");
    hasher.update(source.as_bytes());
    hasher.update(url.as_bytes());
    hasher.update(canonical_params.as_bytes());
    format!("{:x}", hasher.finalize())
}
