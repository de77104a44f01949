//! Normalized proxy descriptor
//!
//! Every share link accepted by the parser ends up as a [`ProxyDescriptor`]:
//! the common addressing fields plus one [`ProtocolConfig`] variant carrying
//! the protocol-specific credentials. Serializers match on the variant, so a
//! new protocol cannot be added without every output format handling it.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ============================================================================
// Protocol
// ============================================================================

/// Canonical protocol identifiers
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Vless,
    Vmess,
    Trojan,
    Ss,
    Hy2,
    Tuic,
}

impl Protocol {
    /// All canonical protocols, in display order
    pub const ALL: [Protocol; 6] = [
        Protocol::Vless,
        Protocol::Vmess,
        Protocol::Trojan,
        Protocol::Ss,
        Protocol::Hy2,
        Protocol::Tuic,
    ];

    /// Resolves a URI scheme, folding the `shadowsocks` and `hysteria2` aliases
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "vless" => Some(Protocol::Vless),
            "vmess" => Some(Protocol::Vmess),
            "trojan" => Some(Protocol::Trojan),
            "ss" | "shadowsocks" => Some(Protocol::Ss),
            "hy2" | "hysteria2" => Some(Protocol::Hy2),
            "tuic" => Some(Protocol::Tuic),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Vless => "vless",
            Protocol::Vmess => "vmess",
            Protocol::Trojan => "trojan",
            Protocol::Ss => "ss",
            Protocol::Hy2 => "hy2",
            Protocol::Tuic => "tuic",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Protocol::from_scheme(s).ok_or_else(|| format!("unknown protocol: {}", s))
    }
}

// ============================================================================
// Transport & TLS
// ============================================================================

/// Stream transport carried by V2Ray-family protocols
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum Transport {
    #[default]
    Tcp,
    Ws(WsOptions),
    Grpc { service_name: String },
    /// Transport named in the link but not mapped to either output format
    Other(String),
}

impl Transport {
    /// Network name as written in share links (`tcp`, `ws`, `grpc`, ...)
    pub fn network(&self) -> &str {
        match self {
            Transport::Tcp => "tcp",
            Transport::Ws(_) => "ws",
            Transport::Grpc { .. } => "grpc",
            Transport::Other(name) => name,
        }
    }

    pub fn ws(&self) -> Option<&WsOptions> {
        match self {
            Transport::Ws(ws) => Some(ws),
            _ => None,
        }
    }
}

/// WebSocket options; path defaults to `/`, headers to `{Host: server}`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WsOptions {
    pub path: String,
    pub headers: BTreeMap<String, String>,
}

impl WsOptions {
    pub fn host(&self) -> Option<&str> {
        self.headers.get("Host").map(String::as_str)
    }
}

/// TLS parameters, present only when TLS is enabled
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TlsOptions {
    /// Resolved server name: explicit parameter, then ws Host, then server
    pub sni: String,
    pub alpn: Vec<String>,
    /// uTLS client fingerprint (`fp`)
    pub fingerprint: Option<String>,
    pub reality: Option<RealityOptions>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RealityOptions {
    pub public_key: String,
    pub short_id: Option<String>,
}

// ============================================================================
// Protocol Configs
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VMessConfig {
    pub uuid: String,
    pub alter_id: u32,
    pub cipher: String,
    pub transport: Transport,
    pub tls: Option<TlsOptions>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VLessConfig {
    pub uuid: String,
    pub flow: String,
    pub encryption: String,
    pub transport: Transport,
    pub tls: Option<TlsOptions>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrojanConfig {
    pub password: String,
    pub transport: Transport,
    pub tls: TlsOptions,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShadowsocksConfig {
    pub cipher: String,
    pub password: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hysteria2Config {
    pub password: String,
    pub obfs: Option<Hysteria2Obfs>,
    pub tls: TlsOptions,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hysteria2Obfs {
    pub obfs_type: String,
    pub password: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TuicConfig {
    pub uuid: String,
    pub password: String,
    pub tls: TlsOptions,
}

/// Protocol-specific part of a descriptor
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProtocolConfig {
    VMess(VMessConfig),
    VLess(VLessConfig),
    Trojan(TrojanConfig),
    Shadowsocks(ShadowsocksConfig),
    Hysteria2(Hysteria2Config),
    Tuic(TuicConfig),
}

impl ProtocolConfig {
    pub fn protocol(&self) -> Protocol {
        match self {
            ProtocolConfig::VMess(_) => Protocol::Vmess,
            ProtocolConfig::VLess(_) => Protocol::Vless,
            ProtocolConfig::Trojan(_) => Protocol::Trojan,
            ProtocolConfig::Shadowsocks(_) => Protocol::Ss,
            ProtocolConfig::Hysteria2(_) => Protocol::Hy2,
            ProtocolConfig::Tuic(_) => Protocol::Tuic,
        }
    }

    pub fn tls(&self) -> Option<&TlsOptions> {
        match self {
            ProtocolConfig::VMess(c) => c.tls.as_ref(),
            ProtocolConfig::VLess(c) => c.tls.as_ref(),
            ProtocolConfig::Trojan(c) => Some(&c.tls),
            ProtocolConfig::Shadowsocks(_) => None,
            ProtocolConfig::Hysteria2(c) => Some(&c.tls),
            ProtocolConfig::Tuic(c) => Some(&c.tls),
        }
    }

    pub fn transport(&self) -> Option<&Transport> {
        match self {
            ProtocolConfig::VMess(c) => Some(&c.transport),
            ProtocolConfig::VLess(c) => Some(&c.transport),
            ProtocolConfig::Trojan(c) => Some(&c.transport),
            _ => None,
        }
    }
}

// ============================================================================
// Descriptor
// ============================================================================

/// One proxy server's connection parameters
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxyDescriptor {
    pub name: String,
    pub server: String,
    pub port: u16,
    pub config: ProtocolConfig,
}

impl ProxyDescriptor {
    pub fn protocol(&self) -> Protocol {
        self.config.protocol()
    }

    pub fn tls(&self) -> Option<&TlsOptions> {
        self.config.tls()
    }

    pub fn transport(&self) -> Option<&Transport> {
        self.config.transport()
    }
}

/// Display name used when a link carries no usable remark
pub fn fallback_name(protocol: Protocol, server: &str) -> String {
    format!("{}-{}", protocol, server)
}
