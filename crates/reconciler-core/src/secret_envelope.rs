//! Detects whether a string looks like a wrapped secret token, without
//! decrypting it. The core consumes tokens that may already be sealed in a
//! symmetric authenticated envelope (see the module-level docs) but never
//! seals or opens them itself.
//!
//! Grounded on `examples/original_source/src/app/features/crypto/encryption.py`'s
//! `CryptographyManager.is_token_encrypted`: same version byte, length
//! bounds, and double/single base64url decode fallback.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;

/// Version byte identifying a sealed envelope's inner payload.
const ENVELOPE_VERSION_BYTE: u8 = 0x80;

/// Minimum length, in bytes, of the decoded inner payload.
const ENVELOPE_MIN_DECODED_LENGTH: usize = 57;

/// Minimum length, in characters, of the outer base64url-encoded token.
const ENVELOPE_MIN_ENCODED_LENGTH: usize = 80;

/// `true` iff `token` plausibly carries a sealed envelope: long enough, and
/// either doubly or singly base64url-decodable to a payload that is long
/// enough and starts with the envelope version byte.
///
/// This is a shape check only — it never attempts to open the envelope, and
/// a `true` result does not guarantee the token is genuinely sealed, only
/// that it is shaped like one.
pub fn looks_like_sealed_envelope(token: &str) -> bool {
    if token.is_empty() || token.len() < ENVELOPE_MIN_ENCODED_LENGTH {
        return false;
    }

    match URL_SAFE.decode(token) {
        Ok(outer_decoded) => match URL_SAFE.decode(&outer_decoded) {
            Ok(inner_decoded) => starts_with_version_byte(&inner_decoded),
            Err(_) => starts_with_version_byte(&outer_decoded),
        },
        Err(_) => false,
    }
}

fn starts_with_version_byte(decoded: &[u8]) -> bool {
    decoded.len() >= ENVELOPE_MIN_DECODED_LENGTH && decoded[0] == ENVELOPE_VERSION_BYTE
}
