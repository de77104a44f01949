//! Share-link parsing
//!
//! This module provides functionality for:
//! - Parsing single share links (vmess://, vless://, trojan://, ss://, hy2://, tuic://)
//!   into [`ProxyDescriptor`]s
//! - Detecting and decoding subscription content (plain or Base64 link lists)
//! - Batch parsing where individual bad links are dropped, never fatal

pub mod base64;
pub mod detection;
pub mod protocols;

use std::sync::LazyLock;

use thiserror::Error;
use tracing::{debug, warn};

use crate::descriptor::{Protocol, ProxyDescriptor};

pub use detection::{SubscriptionType, detect_subscription_type};
pub use protocols::{ProtocolParser, ProtocolRegistry};

// ============================================================================
// Errors
// ============================================================================

/// Why a single share link was rejected
///
/// Absent fields and malformed fields are reported separately.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("missing scheme separator ://")]
    MissingScheme,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URI: {0}")]
    InvalidUri(#[from] url::ParseError),

    #[error("{protocol} link missing {field}")]
    MissingField {
        protocol: Protocol,
        field: &'static str,
    },

    #[error("invalid port: {0}")]
    InvalidPort(String),

    #[error("{protocol} link has undecodable Base64 {part}")]
    InvalidBase64 {
        protocol: Protocol,
        part: &'static str,
    },

    #[error("vmess payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("{protocol} link malformed: {reason}")]
    Malformed {
        protocol: Protocol,
        reason: &'static str,
    },
}

impl ParseError {
    pub fn missing(protocol: Protocol, field: &'static str) -> Self {
        ParseError::MissingField { protocol, field }
    }

    /// Whether the link lacked a field, as opposed to carrying a broken one
    pub fn is_missing_field(&self) -> bool {
        matches!(self, ParseError::MissingField { .. })
    }
}

// ============================================================================
// Entry Points
// ============================================================================

static REGISTRY: LazyLock<ProtocolRegistry> = LazyLock::new(ProtocolRegistry::with_builtin_parsers);

/// Parses one share link with the built-in parsers
pub fn parse_descriptor(raw: &str) -> Result<ProxyDescriptor, ParseError> {
    REGISTRY.parse_uri(raw)
}

/// Parses every link, silently dropping the ones that fail
///
/// Failures are logged at `warn` so a bad link in a batch is visible without
/// aborting the rest of the batch.
pub fn parse_all<S: AsRef<str>>(raws: &[S]) -> Vec<ProxyDescriptor> {
    let descriptors: Vec<ProxyDescriptor> = raws
        .iter()
        .filter_map(|raw| match parse_descriptor(raw.as_ref()) {
            Ok(descriptor) => Some(descriptor),
            Err(e) => {
                warn!("Dropping share link: {}", e);
                None
            }
        })
        .collect();

    debug!("Parsed {} of {} share links", descriptors.len(), raws.len());
    descriptors
}

/// Splits subscription content into candidate share links
///
/// Base64 blobs are unwrapped first; blank lines and `#` comments are skipped.
pub fn split_subscription(content: &str) -> Vec<String> {
    let subscription_type = detect_subscription_type(content);
    debug!("Detected subscription type: {}", subscription_type);

    let text = match subscription_type {
        SubscriptionType::Base64UriList => base64::decode_base64_text(content).unwrap_or_default(),
        SubscriptionType::PlainUriList | SubscriptionType::Unknown => content.to_string(),
    };

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Parses subscription content into descriptors, dropping bad links
pub fn parse_subscription(content: &str) -> Vec<ProxyDescriptor> {
    parse_all(&split_subscription(content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::base64::Engine;
    use ::base64::engine::general_purpose::STANDARD;

    #[test]
    fn test_parse_descriptor_rejects_non_uri() {
        assert!(matches!(
            parse_descriptor("not-a-valid-uri"),
            Err(ParseError::MissingScheme)
        ));
    }

    #[test]
    fn test_parse_descriptor_rejects_unknown_scheme() {
        assert!(matches!(
            parse_descriptor("socks5://host:1080"),
            Err(ParseError::UnsupportedScheme(s)) if s == "socks5"
        ));
    }

    #[test]
    fn test_parse_all_drops_failures_and_keeps_order() {
        let raws = [
            "trojan://pw@a.example.com:443#first",
            "garbage",
            "vless://@example.com:443",
            "trojan://pw@b.example.com:443#second",
        ];
        let parsed = parse_all(&raws);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].name, "first");
        assert_eq!(parsed[1].name, "second");
    }

    #[test]
    fn test_split_subscription_plain() {
        let content = "# comment\n\ntrojan://pw@example.com:443#a\n  hy2://pw@example.com:443#b  \n";
        assert_eq!(
            split_subscription(content),
            vec!["trojan://pw@example.com:443#a", "hy2://pw@example.com:443#b"]
        );
    }

    #[test]
    fn test_parse_subscription_base64() {
        let content = STANDARD.encode("trojan://pw@example.com:443#a\nbroken\ntuic://uuid:pw@example.com:443#t");
        let parsed = parse_subscription(&content);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].protocol(), Protocol::Trojan);
        assert_eq!(parsed[1].protocol(), Protocol::Tuic);
    }

    #[test]
    fn test_missing_field_is_distinguished() {
        let err = parse_descriptor("vless://@example.com:443").unwrap_err();
        assert!(err.is_missing_field());
        let err = parse_descriptor("vless://uuid@example.com:notaport").unwrap_err();
        assert!(!err.is_missing_field());
    }
}
