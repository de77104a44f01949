//! Base64 decoding for share links and subscription blobs
//!
//! Links in the wild mix standard and URL-safe alphabets and frequently drop
//! padding, so decoding tries each variant in turn.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::{DecodeError, Engine};
use tracing::trace;

/// Decodes Base64 content, trying standard, URL-safe, and unpadded variants.
///
/// Whitespace (including line breaks inside long blobs) is stripped first.
/// Returns the error of the last attempted variant when none succeed.
pub fn decode_base64(content: &str) -> Result<Vec<u8>, DecodeError> {
    let cleaned: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    trace!("Attempting Base64 decode of {} bytes", cleaned.len());

    if let Ok(decoded) = STANDARD.decode(&cleaned) {
        return Ok(decoded);
    }
    if let Ok(decoded) = URL_SAFE.decode(&cleaned) {
        trace!("Decoded using URL-safe Base64");
        return Ok(decoded);
    }

    let unpadded = cleaned.trim_end_matches('=');
    if let Ok(decoded) = STANDARD_NO_PAD.decode(unpadded) {
        trace!("Decoded using standard Base64 without padding");
        return Ok(decoded);
    }
    URL_SAFE_NO_PAD.decode(unpadded)
}

/// Decodes Base64 and requires the result to be UTF-8 text
pub fn decode_base64_text(content: &str) -> Option<String> {
    decode_base64(content)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
}
