//! Protocol parsers module
//!
//! This module contains parsers for the supported share-link formats.
//! Each parser implements the `ProtocolParser` trait and produces a
//! [`ProxyDescriptor`], or a [`ParseError`] without any partial result.

mod hysteria2;
mod shadowsocks;
mod trojan;
mod tuic;
mod vless;
mod vmess;

pub use hysteria2::Hysteria2Parser;
pub use shadowsocks::ShadowsocksParser;
pub use trojan::TrojanParser;
pub use tuic::TuicParser;
pub use vless::VLessParser;
pub use vmess::VMessParser;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::debug;
use url::{Host, Url};

use super::ParseError;
use crate::descriptor::{
    Protocol, ProxyDescriptor, RealityOptions, TlsOptions, Transport, WsOptions, fallback_name,
};

// ============================================================================
// Protocol Parser Trait
// ============================================================================

/// Trait for parsing individual protocol share links
pub trait ProtocolParser: Send + Sync {
    /// Returns the scheme this parser handles (e.g., "ss", "vmess")
    fn scheme(&self) -> &str;

    /// Parses a share link into a descriptor
    fn parse(&self, uri: &str) -> Result<ProxyDescriptor, ParseError>;

    /// Checks if this parser can handle the given link
    fn can_parse(&self, uri: &str) -> bool {
        extract_scheme(uri)
            .map(|scheme| scheme.eq_ignore_ascii_case(self.scheme()))
            .unwrap_or(false)
    }
}

// ============================================================================
// Protocol Registry
// ============================================================================

/// Registry for protocol parsers with dynamic dispatch
#[derive(Default)]
pub struct ProtocolRegistry {
    parsers: HashMap<String, Arc<dyn ProtocolParser>>,
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// Creates a registry with all built-in parsers, aliases included
    pub fn with_builtin_parsers() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(VMessParser));
        registry.register(Arc::new(VLessParser));
        registry.register(Arc::new(TrojanParser));
        registry.register(Arc::new(ShadowsocksParser::new("ss")));
        registry.register(Arc::new(ShadowsocksParser::new("shadowsocks")));
        registry.register(Arc::new(Hysteria2Parser::new("hy2")));
        registry.register(Arc::new(Hysteria2Parser::new("hysteria2")));
        registry.register(Arc::new(TuicParser));
        registry
    }

    pub fn register(&mut self, parser: Arc<dyn ProtocolParser>) {
        self.parsers.insert(parser.scheme().to_ascii_lowercase(), parser);
    }

    pub fn get(&self, scheme: &str) -> Option<&Arc<dyn ProtocolParser>> {
        self.parsers.get(&scheme.to_ascii_lowercase())
    }

    /// Parses a link using the parser registered for its scheme
    pub fn parse_uri(&self, uri: &str) -> Result<ProxyDescriptor, ParseError> {
        let uri = uri.trim();
        let scheme = extract_scheme(uri)?;

        let parser = self
            .get(scheme)
            .ok_or_else(|| ParseError::UnsupportedScheme(scheme.to_string()))?;

        let result = parser.parse(uri);
        match &result {
            Ok(descriptor) => debug!(
                "Parsed {} link -> '{}' ({}:{})",
                descriptor.protocol(),
                descriptor.name,
                descriptor.server,
                descriptor.port
            ),
            Err(e) => debug!("Failed to parse {} link: {}", scheme, e),
        }
        result
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Extracts the scheme from a link
pub fn extract_scheme(uri: &str) -> Result<&str, ParseError> {
    match uri.split_once("://") {
        Some((scheme, _)) if !scheme.is_empty() => Ok(scheme),
        _ => Err(ParseError::MissingScheme),
    }
}

/// Parses a link with the `url` crate, surfacing bad ports as such
pub(crate) fn parse_url(uri: &str) -> Result<Url, ParseError> {
    Url::parse(uri).map_err(|e| match e {
        url::ParseError::InvalidPort => ParseError::InvalidPort(uri.to_string()),
        other => ParseError::InvalidUri(other),
    })
}

/// Host of a parsed link without IPv6 brackets
pub(crate) fn url_server(url: &Url, protocol: Protocol) -> Result<String, ParseError> {
    let server = match url.host() {
        Some(Host::Domain(domain)) => domain.to_string(),
        Some(Host::Ipv4(addr)) => addr.to_string(),
        Some(Host::Ipv6(addr)) => addr.to_string(),
        None => String::new(),
    };
    if server.is_empty() {
        return Err(ParseError::missing(protocol, "server"));
    }
    Ok(server)
}

/// Port of a parsed link; zero is rejected
pub(crate) fn url_port(url: &Url, protocol: Protocol) -> Result<u16, ParseError> {
    match url.port() {
        Some(0) => Err(ParseError::InvalidPort("0".to_string())),
        Some(port) => Ok(port),
        None => Err(ParseError::missing(protocol, "port")),
    }
}

/// Parses a port string; must be an integer in 1..=65535
pub(crate) fn parse_port(value: &str) -> Result<u16, ParseError> {
    match value.trim().parse::<u16>() {
        Ok(0) | Err(_) => Err(ParseError::InvalidPort(value.to_string())),
        Ok(port) => Ok(port),
    }
}

/// Parses host:port string, handling IPv6 addresses in brackets
pub(crate) fn parse_host_port(hostport: &str, protocol: Protocol) -> Result<(String, u16), ParseError> {
    if let Some(rest) = hostport.strip_prefix('[') {
        let (host, after) = rest
            .split_once(']')
            .ok_or(ParseError::Malformed {
                protocol,
                reason: "unterminated IPv6 address",
            })?;
        let port = after
            .strip_prefix(':')
            .ok_or_else(|| ParseError::missing(protocol, "port"))?;
        return Ok((host.to_string(), parse_port(port)?));
    }

    let (host, port) = hostport
        .rsplit_once(':')
        .ok_or_else(|| ParseError::missing(protocol, "port"))?;
    if host.is_empty() {
        return Err(ParseError::missing(protocol, "server"));
    }
    Ok((host.to_string(), parse_port(port)?))
}

/// Percent-decodes a component, keeping the raw text when it is not UTF-8
pub(crate) fn percent_decode(value: &str) -> String {
    urlencoding::decode(value)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

/// Whole user-info as one secret; `url` splits `a:b@host` at the first colon
pub(crate) fn userinfo_secret(url: &Url) -> String {
    let user = percent_decode(url.username());
    match url.password() {
        Some(rest) => format!("{}:{}", user, percent_decode(rest)),
        None => user,
    }
}

/// Display name from a link fragment, synthesized when absent or undecodable
pub(crate) fn fragment_name(fragment: Option<&str>, protocol: Protocol, server: &str) -> String {
    let decoded = fragment
        .and_then(|f| urlencoding::decode(f).ok())
        .map(|f| f.into_owned());
    fallback_name_if_blank(decoded, protocol, server)
}

/// Trimmed name, synthesized when blank
pub(crate) fn fallback_name_if_blank(name: Option<String>, protocol: Protocol, server: &str) -> String {
    name.map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| fallback_name(protocol, server))
}

/// Query parameters with empty values dropped
pub(crate) fn query_params(url: &Url) -> HashMap<String, String> {
    url.query_pairs()
        .into_owned()
        .filter(|(_, v)| !v.is_empty())
        .collect()
}

/// Builds the transport named by `type`/`net`, filling ws defaults
pub(crate) fn build_transport(
    network: Option<&str>,
    path: Option<&str>,
    host: Option<&str>,
    service_name: Option<&str>,
    server: &str,
) -> Transport {
    match network.map(str::to_ascii_lowercase).as_deref() {
        None | Some("") | Some("tcp") | Some("raw") => Transport::Tcp,
        Some("ws") | Some("websocket") => {
            let path = path
                .filter(|p| !p.is_empty())
                .unwrap_or("/")
                .to_string();
            let host = host.filter(|h| !h.is_empty()).unwrap_or(server);
            let mut headers = BTreeMap::new();
            headers.insert("Host".to_string(), host.to_string());
            Transport::Ws(WsOptions { path, headers })
        }
        Some("grpc") => Transport::Grpc {
            service_name: service_name.unwrap_or_default().to_string(),
        },
        Some(other) => Transport::Other(other.to_string()),
    }
}

/// Builds TLS options, resolving SNI as explicit → ws Host → server
pub(crate) fn build_tls(
    params: &HashMap<String, String>,
    explicit_sni: Option<&str>,
    transport: Option<&Transport>,
    server: &str,
) -> TlsOptions {
    let sni = explicit_sni
        .filter(|s| !s.is_empty())
        .or_else(|| transport.and_then(Transport::ws).and_then(WsOptions::host))
        .unwrap_or(server)
        .to_string();

    let reality = match (params.get("security").map(String::as_str), params.get("pbk")) {
        (Some("reality"), Some(public_key)) => Some(RealityOptions {
            public_key: public_key.clone(),
            short_id: params.get("sid").cloned(),
        }),
        _ => None,
    };

    TlsOptions {
        sni,
        alpn: params
            .get("alpn")
            .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_default(),
        fingerprint: params.get("fp").cloned(),
        reality,
    }
}
