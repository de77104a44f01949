//! Shadowsocks protocol parser
//!
//! This module provides parsing for Shadowsocks (ss://) URIs.
//! Supports the SIP002 format with Base64 or plain user-info, and the legacy
//! whole-body Base64 format.

use tracing::{debug, trace};

use crate::descriptor::{Protocol, ProtocolConfig, ProxyDescriptor, ShadowsocksConfig};
use crate::parser::ParseError;
use crate::parser::base64::decode_base64_text;

use super::{ProtocolParser, fragment_name, parse_host_port, percent_decode};

// ============================================================================
// Shadowsocks Parser
// ============================================================================

/// Parser for Shadowsocks (ss:// or shadowsocks://) URIs
///
/// - SIP002: ss://BASE64(method:password)@host:port#tag
/// - SIP002 with plain userinfo: ss://method:password@host:port#tag
/// - Legacy: ss://BASE64(method:password@host:port)#tag
pub struct ShadowsocksParser {
    scheme: &'static str,
}

impl ShadowsocksParser {
    pub fn new(scheme: &'static str) -> Self {
        Self { scheme }
    }
}

impl ProtocolParser for ShadowsocksParser {
    fn scheme(&self) -> &str {
        self.scheme
    }

    fn parse(&self, uri: &str) -> Result<ProxyDescriptor, ParseError> {
        trace!("Parsing Shadowsocks URI (scheme: {})", self.scheme);

        let without_scheme = uri
            .split_once("://")
            .map(|(_, rest)| rest)
            .ok_or(ParseError::MissingScheme)?;

        let (main_part, fragment) = match without_scheme.split_once('#') {
            Some((main, fragment)) => (main, Some(fragment)),
            None => (without_scheme, None),
        };

        // SIP003 plugin parameters have no representation downstream
        let main_part = match main_part.split_once('?') {
            Some((main, query)) => {
                debug!("Ignoring Shadowsocks query parameters: {}", query);
                main
            }
            None => main_part,
        };
        let main_part = main_part.trim_end_matches('/');

        let (userinfo, hostport) = match main_part.rsplit_once('@') {
            Some(parts) => {
                trace!("Parsing as SIP002 format");
                parts
            }
            None => return self.parse_legacy(main_part, fragment),
        };

        let (server, port) = parse_host_port(hostport, Protocol::Ss)?;
        let (cipher, password) = parse_userinfo(userinfo)?;
        let name = fragment_name(fragment, Protocol::Ss, &server);

        Ok(build(name, server, port, cipher, password))
    }
}

impl ShadowsocksParser {
    /// Legacy format: the whole `method:password@host:port` is Base64 encoded
    fn parse_legacy(
        &self,
        encoded: &str,
        fragment: Option<&str>,
    ) -> Result<ProxyDescriptor, ParseError> {
        trace!("Parsing as legacy Base64 format");
        if encoded.is_empty() {
            return Err(ParseError::missing(Protocol::Ss, "userinfo"));
        }

        let decoded = decode_base64_text(&percent_decode(encoded)).ok_or(ParseError::InvalidBase64 {
            protocol: Protocol::Ss,
            part: "body",
        })?;

        let (credentials, hostport) = decoded.rsplit_once('@').ok_or(ParseError::Malformed {
            protocol: Protocol::Ss,
            reason: "legacy body has no '@' separator",
        })?;
        let (server, port) = parse_host_port(hostport, Protocol::Ss)?;
        let (cipher, password) = split_credentials(credentials)?;
        let name = fragment_name(fragment, Protocol::Ss, &server);

        Ok(build(name, server, port, cipher, password))
    }
}

/// Decodes SIP002 user-info into `(cipher, password)`
///
/// Plain `cipher:password` (percent-encoded) is taken as-is; anything else
/// must be Base64 whose decoded text contains a colon.
fn parse_userinfo(userinfo: &str) -> Result<(String, String), ParseError> {
    let userinfo = percent_decode(userinfo);
    if userinfo.is_empty() {
        return Err(ParseError::missing(Protocol::Ss, "userinfo"));
    }

    if userinfo.contains(':') {
        trace!("Shadowsocks userinfo is plain text");
        return split_credentials(&userinfo);
    }

    let decoded = decode_base64_text(&userinfo).ok_or(ParseError::InvalidBase64 {
        protocol: Protocol::Ss,
        part: "userinfo",
    })?;
    split_credentials(&decoded)
}

fn split_credentials(credentials: &str) -> Result<(String, String), ParseError> {
    let (cipher, password) = credentials.split_once(':').ok_or(ParseError::Malformed {
        protocol: Protocol::Ss,
        reason: "credentials have no ':' separator",
    })?;
    if cipher.is_empty() {
        return Err(ParseError::missing(Protocol::Ss, "cipher"));
    }
    if password.is_empty() {
        return Err(ParseError::missing(Protocol::Ss, "password"));
    }
    Ok((cipher.to_string(), password.to_string()))
}

fn build(name: String, server: String, port: u16, cipher: String, password: String) -> ProxyDescriptor {
    ProxyDescriptor {
        name,
        server,
        port,
        config: ProtocolConfig::Shadowsocks(ShadowsocksConfig { cipher, password }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};

    fn ss_config(descriptor: &ProxyDescriptor) -> &ShadowsocksConfig {
        match &descriptor.config {
            ProtocolConfig::Shadowsocks(c) => c,
            other => panic!("expected shadowsocks, got {:?}", other),
        }
    }

    fn parser() -> ShadowsocksParser {
        ShadowsocksParser::new("ss")
    }

    #[test]
    fn test_parse_sip002_base64_userinfo() {
        let uri = format!("ss://{}@1.2.3.4:8388#ss-node", STANDARD.encode("aes-256-gcm:pass123"));
        let descriptor = parser().parse(&uri).unwrap();

        assert_eq!(descriptor.protocol(), Protocol::Ss);
        assert_eq!(descriptor.name, "ss-node");
        assert_eq!(descriptor.server, "1.2.3.4");
        assert_eq!(descriptor.port, 8388);
        let config = ss_config(&descriptor);
        assert_eq!(config.cipher, "aes-256-gcm");
        assert_eq!(config.password, "pass123");
    }

    #[test]
    fn test_parse_sip002_url_safe_userinfo_with_plugin() {
        let userinfo = URL_SAFE_NO_PAD.encode("chacha20-ietf-poly1305:p:w");
        let uri = format!("ss://{}@example.com:443/?plugin=obfs-local%3Bobfs%3Dhttp#x", userinfo);
        let descriptor = parser().parse(&uri).unwrap();
        let config = ss_config(&descriptor);
        assert_eq!(config.cipher, "chacha20-ietf-poly1305");
        // Only the first colon separates cipher from password
        assert_eq!(config.password, "p:w");
    }

    #[test]
    fn test_parse_sip002_plain_userinfo() {
        let descriptor = parser()
            .parse("ss://2022-blake3-aes-128-gcm:YWJj%2BZGVm@[::1]:8388")
            .unwrap();
        assert_eq!(descriptor.server, "::1");
        assert_eq!(descriptor.name, "ss-::1");
        let config = ss_config(&descriptor);
        assert_eq!(config.cipher, "2022-blake3-aes-128-gcm");
        assert_eq!(config.password, "YWJj+ZGVm");
    }

    #[test]
    fn test_parse_legacy_format() {
        let uri = format!("ss://{}#legacy", STANDARD.encode("aes-128-gcm:secret@example.com:8388"));
        let descriptor = parser().parse(&uri).unwrap();
        assert_eq!(descriptor.name, "legacy");
        assert_eq!(descriptor.server, "example.com");
        assert_eq!(ss_config(&descriptor).password, "secret");
    }

    #[test]
    fn test_decoded_userinfo_without_colon_fails() {
        let uri = format!("ss://{}@1.2.3.4:8388", STANDARD.encode("nocolonhere"));
        assert!(matches!(
            parser().parse(&uri),
            Err(ParseError::Malformed { .. })
        ));
    }

    #[test]
    fn test_invalid_userinfo_and_port() {
        assert!(matches!(
            parser().parse("ss://!!!@1.2.3.4:8388"),
            Err(ParseError::InvalidBase64 { .. })
        ));
        let uri = format!("ss://{}@1.2.3.4:abc", STANDARD.encode("aes-256-gcm:p"));
        assert!(matches!(parser().parse(&uri), Err(ParseError::InvalidPort(_))));
        assert!(matches!(
            parser().parse("ss://@1.2.3.4:8388"),
            Err(ParseError::MissingField { .. })
        ));
    }
}
