//! Name normalization and edition-suffix stripping shared by the release
//! scorer.
//!
//! Grounded on `examples/original_source/src/services/api/year_scoring.py`'s
//! `_normalize_name` and `_strip_edition_suffix`.

use regex::Regex;

/// Lowercases, maps `&` to `and`, strips non-word characters, and collapses
/// whitespace. Idempotent: normalizing an already-normalized name is a no-op.
pub fn normalize_name(name: &str) -> String {
    if name.is_empty() {
        return String::new();
    }

    let lowered = name.to_lowercase().replace('&', "and");

    let non_word = Regex::new(r"[^\w\s]").expect("static pattern");
    let stripped = non_word.replace_all(&lowered, "");

    let whitespace = Regex::new(r"\s+").expect("static pattern");
    whitespace.replace_all(stripped.trim(), " ").to_string()
}

/// Strips parenthesized/bracketed suffixes whose contents contain (case
/// insensitively) one of `keywords` — e.g. `"Album (Deluxe Edition)"` with
/// keyword `"deluxe"` becomes `"Album"`. A no-op when the album name
/// contains no such suffix.
pub fn strip_edition_suffix(album_name: &str, keywords: &[String]) -> String {
    if keywords.is_empty() || album_name.is_empty() {
        return album_name.to_string();
    }

    let bracketed = Regex::new(r"[(\[]([^)\]]*)[)\]]").expect("static pattern");
    let mut result = album_name.to_string();

    for capture in bracketed.captures_iter(album_name) {
        let whole = capture.get(0).expect("group 0 always matches").as_str();
        let inner = capture.get(1).map(|m| m.as_str()).unwrap_or_default();
        let inner_lower = inner.to_lowercase();
        if keywords.iter().any(|kw| inner_lower.contains(&kw.to_lowercase())) {
            result = result.replacen(whole, "", 1);
        }
    }

    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_maps_ampersand() {
        assert_eq!(normalize_name("Simon & Garfunkel"), "simon and garfunkel");
    }

    #[test]
    fn normalization_is_idempotent() {
        let once = normalize_name("The Beatles!!");
        let twice = normalize_name(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn strips_deluxe_suffix() {
        let keywords = vec!["deluxe".to_string(), "remaster".to_string()];
        assert_eq!(
            strip_edition_suffix("Abbey Road (Deluxe Edition)", &keywords),
            "Abbey Road"
        );
    }

    #[test]
    fn strip_is_noop_without_matching_suffix() {
        let keywords = vec!["deluxe".to_string()];
        assert_eq!(strip_edition_suffix("Abbey Road", &keywords), "Abbey Road");
    }

    #[test]
    fn strip_handles_bracketed_suffix() {
        let keywords = vec!["bonus".to_string()];
        assert_eq!(
            strip_edition_suffix("Album [Bonus Tracks]", &keywords),
            "Album"
        );
    }
}
