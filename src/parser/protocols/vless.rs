//! VLESS protocol parser
//!
//! This module provides parsing for VLESS (vless://) URIs.
//! Format: vless://uuid@host:port?params#tag

use tracing::trace;

use crate::descriptor::{Protocol, ProtocolConfig, ProxyDescriptor, VLessConfig};
use crate::parser::ParseError;

use super::{
    ProtocolParser, build_tls, build_transport, fragment_name, parse_url, percent_decode,
    query_params, url_port, url_server,
};

// ============================================================================
// VLESS Parser
// ============================================================================

/// Parser for VLESS (vless://) URIs
///
/// Format: vless://uuid@host:port?params#tag
pub struct VLessParser;

impl ProtocolParser for VLessParser {
    fn scheme(&self) -> &str {
        "vless"
    }

    fn parse(&self, uri: &str) -> Result<ProxyDescriptor, ParseError> {
        trace!("Parsing VLESS URI");
        let url = parse_url(uri)?;

        let uuid = percent_decode(url.username());
        if uuid.is_empty() {
            return Err(ParseError::missing(Protocol::Vless, "uuid"));
        }

        let server = url_server(&url, Protocol::Vless)?;
        let port = url_port(&url, Protocol::Vless)?;
        let params = query_params(&url);

        let transport = build_transport(
            params.get("type").map(String::as_str),
            params.get("path").map(String::as_str),
            params.get("host").map(String::as_str),
            params.get("serviceName").map(String::as_str),
            &server,
        );

        let security = params.get("security").map(String::as_str).unwrap_or("");
        let tls = matches!(security, "tls" | "reality").then(|| {
            build_tls(
                &params,
                params.get("sni").map(String::as_str),
                Some(&transport),
                &server,
            )
        });

        let name = fragment_name(url.fragment(), Protocol::Vless, &server);

        Ok(ProxyDescriptor {
            name,
            server,
            port,
            config: ProtocolConfig::VLess(VLessConfig {
                uuid,
                flow: params.get("flow").cloned().unwrap_or_default(),
                encryption: params
                    .get("encryption")
                    .cloned()
                    .unwrap_or_else(|| "none".to_string()),
                transport,
                tls,
            }),
        })
    }
}
