//! Subscription content detection
//!
//! Subscription sources deliver either a plain list of share links (one per
//! line) or the same list wrapped in a single Base64 blob.

use tracing::debug;

use super::base64::decode_base64_text;
use crate::descriptor::Protocol;

/// Detected subscription content type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionType {
    /// Base64 encoded link list
    Base64UriList,
    /// Plain text link list (one link per line)
    PlainUriList,
    Unknown,
}

impl std::fmt::Display for SubscriptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubscriptionType::Base64UriList => write!(f, "Base64 URI List"),
            SubscriptionType::PlainUriList => write!(f, "Plain URI List"),
            SubscriptionType::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Detects the type of subscription content
pub fn detect_subscription_type(content: &str) -> SubscriptionType {
    let trimmed = content.trim();
    debug!(
        "Detecting subscription type, content length: {} bytes",
        trimmed.len()
    );

    if is_plain_uri_list(trimmed) {
        return SubscriptionType::PlainUriList;
    }

    if is_base64_content(trimmed) {
        return SubscriptionType::Base64UriList;
    }

    SubscriptionType::Unknown
}

/// Checks whether any non-comment line is a supported share link
pub fn is_plain_uri_list(content: &str) -> bool {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .any(is_proxy_uri)
}

/// Checks if a string starts with a supported share-link scheme
pub fn is_proxy_uri(s: &str) -> bool {
    match s.split_once("://") {
        Some((scheme, _)) => Protocol::from_scheme(scheme).is_some(),
        None => false,
    }
}

/// Checks whether content is a Base64 blob wrapping share links
pub fn is_base64_content(content: &str) -> bool {
    let cleaned: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.len() < 4 {
        return false;
    }

    let alphabet_ok = cleaned.chars().all(|c| {
        c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=' || c == '-' || c == '_'
    });
    if !alphabet_ok {
        return false;
    }

    decode_base64_text(&cleaned)
        .map(|decoded| decoded.lines().any(|line| is_proxy_uri(line.trim())))
        .unwrap_or(false)
}
