//! Trojan protocol parser
//!
//! This module provides parsing for Trojan (trojan://) URIs.
//! Format: trojan://password@host:port?params#tag

use tracing::trace;

use crate::descriptor::{Protocol, ProtocolConfig, ProxyDescriptor, TrojanConfig};
use crate::parser::ParseError;

use super::{
    ProtocolParser, build_tls, build_transport, fragment_name, parse_url, query_params,
    url_port, url_server, userinfo_secret,
};

// ============================================================================
// Trojan Parser
// ============================================================================

/// Parser for Trojan (trojan://) URIs
///
/// TLS is always on; `sni` falls back to the ws Host header, then the server.
pub struct TrojanParser;

impl ProtocolParser for TrojanParser {
    fn scheme(&self) -> &str {
        "trojan"
    }

    fn parse(&self, uri: &str) -> Result<ProxyDescriptor, ParseError> {
        trace!("Parsing Trojan URI");
        let url = parse_url(uri)?;

        let password = userinfo_secret(&url);
        if password.is_empty() {
            return Err(ParseError::missing(Protocol::Trojan, "password"));
        }

        let server = url_server(&url, Protocol::Trojan)?;
        let port = url_port(&url, Protocol::Trojan)?;
        let params = query_params(&url);

        let transport = build_transport(
            params.get("type").map(String::as_str),
            params.get("path").map(String::as_str),
            params.get("host").map(String::as_str),
            params.get("serviceName").map(String::as_str),
            &server,
        );

        // `peer` is the older spelling still emitted by some panels
        let sni = params
            .get("sni")
            .or_else(|| params.get("peer"))
            .map(String::as_str);
        let tls = build_tls(&params, sni, Some(&transport), &server);

        let name = fragment_name(url.fragment(), Protocol::Trojan, &server);

        Ok(ProxyDescriptor {
            name,
            server,
            port,
            config: ProtocolConfig::Trojan(TrojanConfig {
                password,
                transport,
                tls,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trojan_config(descriptor: &ProxyDescriptor) -> &TrojanConfig {
        match &descriptor.config {
            ProtocolConfig::Trojan(c) => c,
            other => panic!("expected trojan, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_trojan_basic() {
        let descriptor = TrojanParser
            .parse("trojan://p%40ss@example.com:443?sni=sni.example.com#JP%20Node")
            .unwrap();

        assert_eq!(descriptor.name, "JP Node");
        assert_eq!(descriptor.port, 443);
        let config = trojan_config(&descriptor);
        assert_eq!(config.password, "p@ss");
        assert_eq!(config.tls.sni, "sni.example.com");
    }

    #[test]
    fn test_parse_trojan_sni_falls_back_to_server() {
        let descriptor = TrojanParser.parse("trojan://pw@example.com:8443").unwrap();
        assert_eq!(trojan_config(&descriptor).tls.sni, "example.com");
        assert_eq!(descriptor.name, "trojan-example.com");
    }

    #[test]
    fn test_parse_trojan_ws_host_feeds_sni() {
        let descriptor = TrojanParser
            .parse("trojan://pw@1.2.3.4:443?type=ws&host=cdn.example.com&path=%2Ftr")
            .unwrap();
        let config = trojan_config(&descriptor);
        assert_eq!(config.transport.ws().unwrap().path, "/tr");
        assert_eq!(config.tls.sni, "cdn.example.com");
    }

    #[test]
    fn test_parse_trojan_password_with_colon() {
        let descriptor = TrojanParser.parse("trojan://pa:ss@example.com:443#T").unwrap();
        assert_eq!(trojan_config(&descriptor).password, "pa:ss");
    }

    #[test]
    fn test_parse_trojan_requires_password() {
        assert!(matches!(
            TrojanParser.parse("trojan://example.com:443"),
            Err(ParseError::MissingField { field: "password", .. })
        ));
    }
}
