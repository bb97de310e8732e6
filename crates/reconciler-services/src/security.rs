//! Input sanitization for track-update parameters.
//!
//! Grounded on the validation step of
//! `examples/original_source/src/core/tracks/update_executor.py`'s
//! `_validate_and_sanitize_update_parameters`: every value destined for the
//! external script surface passes through a length bound and a control
//! character check before use. Unicode normalization (NFC) is added here so
//! equivalent-looking artist/album names compare and hash consistently
//! across the album-year and API-response caches.

use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SecurityValidationError {
    #[error("{field} exceeds the maximum length of {max} characters")]
    TooLong { field: String, max: usize },
    #[error("{field} contains a control character")]
    ControlCharacter { field: String },
}

/// Rejects control characters and over-length values, then normalizes the
/// survivors to NFC. Instances are cheap and stateless beyond `max_length`;
/// callers may construct one per update or share a single instance.
#[derive(Debug, Clone)]
pub struct SecurityValidator {
    pub max_length: usize,
}

impl Default for SecurityValidator {
    fn default() -> Self {
        Self { max_length: 1000 }
    }
}

impl SecurityValidator {
    pub fn new(max_length: usize) -> Self {
        Self { max_length }
    }

    pub fn sanitize_string(
        &self,
        value: &str,
        field: &str,
    ) -> Result<String, SecurityValidationError> {
        if value.chars().count() > self.max_length {
            return Err(SecurityValidationError::TooLong {
                field: field.to_string(),
                max: self.max_length,
            });
        }
        if value.chars().any(|c| c.is_control()) {
            return Err(SecurityValidationError::ControlCharacter {
                field: field.to_string(),
            });
        }
        Ok(value.nfc().collect())
    }

    /// Sanitizes an optional value, passing `None` through unchanged.
    pub fn sanitize_optional(
        &self,
        value: Option<&str>,
        field: &str,
    ) -> Result<Option<String>, SecurityValidationError> {
        value.map(|v| self.sanitize_string(v, field)).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_value_passes_through() {
        let v = SecurityValidator::default();
        assert_eq!(v.sanitize_string("Abbey Road", "album").unwrap(), "Abbey Road");
    }

    #[test]
    fn over_length_value_is_rejected() {
        let v = SecurityValidator::new(4);
        assert!(v.sanitize_string("too long", "name").is_err());
    }

    #[test]
    fn control_character_is_rejected() {
        let v = SecurityValidator::default();
        assert!(v.sanitize_string("bad\u{0007}value", "name").is_err());
    }

    #[test]
    fn newline_is_a_control_character() {
        let v = SecurityValidator::default();
        assert!(v.sanitize_string("line1\nline2", "name").is_err());
    }
}
