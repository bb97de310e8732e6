//! SHA-256 fingerprints over canonical track attributes.
//!
//! Grounded on `examples/original_source/src/services/cache/fingerprint_generator.py`:
//! sorted-key, minimal-separator canonical JSON; numeric fields best-effort
//! parsed with a `0.0` fallback; string fields trimmed with a `""` fallback.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FingerprintError {
    #[error("missing required field: {0}")]
    MissingRequired(String),
}

/// The raw attributes a fingerprint is computed over. Fields outside this
/// set (`play_count`, `rating`, `last_played`, `genre`) are excluded by
/// design — they are mutable without representing a meaningful track change.
#[derive(Debug, Clone, Default)]
pub struct TrackAttrs {
    pub persistent_id: Option<String>,
    pub location: Option<String>,
    pub file_size: Option<String>,
    pub duration: Option<String>,
    pub date_modified: Option<String>,
    pub date_added: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct CanonicalRepr {
    date_added: String,
    date_modified: String,
    duration: f64,
    file_size: f64,
    location: String,
    persistent_id: String,
}

fn normalize_numeric(value: &Option<String>) -> f64 {
    value
        .as_ref()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .unwrap_or(0.0)
}

fn normalize_string(value: &Option<String>) -> String {
    value
        .as_ref()
        .map(|v| v.trim().to_string())
        .unwrap_or_default()
}

/// Computes the 64-hex SHA-256 fingerprint for a track's canonical
/// attributes. Fails if `persistent_id` or `location` is absent or blank.
///
/// Determinism: given equal canonical inputs the output is byte-identical
/// across processes and hosts. No time, hostname, or randomness enters.
pub fn fingerprint(attrs: &TrackAttrs) -> Result<String, FingerprintError> {
    let persistent_id = attrs
        .persistent_id
        .as_ref()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| FingerprintError::MissingRequired("persistent_id".to_string()))?
        .to_string();

    let location = attrs
        .location
        .as_ref()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| FingerprintError::MissingRequired("location".to_string()))?
        .trim()
        .to_string();

    let canonical = CanonicalRepr {
        date_added: normalize_string(&attrs.date_added),
        date_modified: normalize_string(&attrs.date_modified),
        duration: normalize_numeric(&attrs.duration),
        file_size: normalize_numeric(&attrs.file_size),
        location,
        persistent_id,
    };

    // serde_json serializes struct fields in declaration order, which we keep
    // alphabetical above so the wire form matches the sorted-key contract.
    let canonical_json =
        serde_json::to_string(&canonical).expect("canonical representation is always valid JSON");

    let mut hasher = Sha256::new();
    hasher.update(canonical_json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// `true` iff `fp` is 64 hex characters.
pub fn validate(fp: &str) -> bool {
    fp.len() == 64 && fp.chars().all(|c| c.is_ascii_hexdigit())
}

/// Case-insensitive equality after validating both sides.
pub fn fingerprints_match(a: &str, b: &str) -> bool {
    validate(a) && validate(b) && a.eq_ignore_ascii_case(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs() -> TrackAttrs {
        TrackAttrs {
            persistent_id: Some("ABC123".to_string()),
            location: Some("/music/track.m4a".to_string()),
            file_size: Some("1024".to_string()),
            duration: Some("180.5".to_string()),
            date_modified: Some("2024-01-01".to_string()),
            date_added: Some("2023-01-01".to_string()),
        }
    }

    #[test]
    fn deterministic_across_calls() {
        let a = fingerprint(&attrs()).unwrap();
        let b = fingerprint(&attrs()).unwrap();
        assert_eq!(a, b);
        assert!(validate(&a));
    }

    #[test]
    fn differs_when_a_field_changes() {
        let base = fingerprint(&attrs()).unwrap();
        let mut changed = attrs();
        changed.duration = Some("181.0".to_string());
        assert_ne!(base, fingerprint(&changed).unwrap());
    }

    #[test]
    fn missing_persistent_id_fails() {
        let mut a = attrs();
        a.persistent_id = None;
        assert_eq!(
            fingerprint(&a),
            Err(FingerprintError::MissingRequired("persistent_id".to_string()))
        );
    }

    #[test]
    fn whitespace_only_persistent_id_fails() {
        let mut a = attrs();
        a.persistent_id = Some("   ".to_string());
        assert!(fingerprint(&a).is_err());
    }

    #[test]
    fn bad_numeric_input_falls_back_to_zero() {
        let mut a = attrs();
        a.file_size = Some("not-a-number".to_string());
        assert!(fingerprint(&a).is_ok());
    }

    #[test]
    fn match_is_case_insensitive() {
        let fp = fingerprint(&attrs()).unwrap();
        assert!(fingerprints_match(&fp, &fp.to_uppercase()));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn fingerprint_is_deterministic(
            pid in "[a-zA-Z0-9]{1,20}",
            loc in "[a-zA-Z0-9/._-]{1,40}",
        ) {
            let attrs = TrackAttrs {
                persistent_id: Some(pid),
                location: Some(loc),
                ..Default::default()
            };
            let a = fingerprint(&attrs).unwrap();
            let b = fingerprint(&attrs).unwrap();
            prop_assert_eq!(a, b);
        }
    }
}
