//! sing-box document model
//!
//! A deliberately small subset of the sing-box configuration schema: only the
//! blocks a generated subscription emits.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[inline]
fn is_false(b: &bool) -> bool {
    !*b
}

/// Top-level sing-box configuration
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SingBoxDocument {
    pub log: Log,
    pub dns: Dns,
    pub inbounds: Vec<Inbound>,
    pub outbounds: Vec<Outbound>,
    pub route: Route,
}

// ============================================================================
// Log / DNS / Inbounds / Route
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Log {
    pub level: String,
    #[serde(default)]
    pub timestamp: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Dns {
    pub servers: Vec<DnsServer>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DnsServer {
    pub tag: String,
    pub address: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Inbound {
    Mixed(MixedInbound),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MixedInbound {
    pub tag: String,
    pub listen: String,
    pub listen_port: u16,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Route {
    pub rules: Vec<RouteRule>,
    #[serde(rename = "final")]
    pub final_outbound: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub auto_detect_interface: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RouteRule {
    pub geoip: Vec<String>,
    pub outbound: String,
}

// ============================================================================
// Outbounds
// ============================================================================

/// Outbound configuration, tagged by `type`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Outbound {
    #[serde(rename = "urltest")]
    UrlTest(UrlTestOutbound),
    Direct(DirectOutbound),
    VMess(VMessOutbound),
    VLess(VLessOutbound),
    Trojan(TrojanOutbound),
    Shadowsocks(ShadowsocksOutbound),
    Hysteria2(Hysteria2Outbound),
    Tuic(TuicOutbound),
}

impl Outbound {
    pub fn tag(&self) -> &str {
        match self {
            Outbound::UrlTest(o) => &o.tag,
            Outbound::Direct(o) => &o.tag,
            Outbound::VMess(o) => &o.tag,
            Outbound::VLess(o) => &o.tag,
            Outbound::Trojan(o) => &o.tag,
            Outbound::Shadowsocks(o) => &o.tag,
            Outbound::Hysteria2(o) => &o.tag,
            Outbound::Tuic(o) => &o.tag,
        }
    }

    /// `server_port` of proxy outbounds; `None` for groups and `direct`
    pub fn server_port(&self) -> Option<u16> {
        match self {
            Outbound::UrlTest(_) | Outbound::Direct(_) => None,
            Outbound::VMess(o) => Some(o.server_port),
            Outbound::VLess(o) => Some(o.server_port),
            Outbound::Trojan(o) => Some(o.server_port),
            Outbound::Shadowsocks(o) => Some(o.server_port),
            Outbound::Hysteria2(o) => Some(o.server_port),
            Outbound::Tuic(o) => Some(o.server_port),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UrlTestOutbound {
    pub tag: String,
    pub outbounds: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DirectOutbound {
    pub tag: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct VMessOutbound {
    pub tag: String,
    pub server: String,
    pub server_port: u16,
    pub uuid: String,
    pub security: String,
    pub alter_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<OutboundTls>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<V2RayTransport>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct VLessOutbound {
    pub tag: String,
    pub server: String,
    pub server_port: u16,
    pub uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow: Option<String>,
    pub packet_encoding: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<OutboundTls>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<V2RayTransport>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TrojanOutbound {
    pub tag: String,
    pub server: String,
    pub server_port: u16,
    pub password: String,
    pub tls: OutboundTls,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<V2RayTransport>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ShadowsocksOutbound {
    pub tag: String,
    pub server: String,
    pub server_port: u16,
    pub method: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Hysteria2Outbound {
    pub tag: String,
    pub server: String,
    pub server_port: u16,
    pub password: String,
    pub up_mbps: u32,
    pub down_mbps: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obfs: Option<Hysteria2Obfs>,
    pub tls: OutboundTls,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Hysteria2Obfs {
    #[serde(rename = "type")]
    pub obfs_type: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TuicOutbound {
    pub tag: String,
    pub server: String,
    pub server_port: u16,
    pub uuid: String,
    pub password: String,
    pub congestion_control: String,
    pub udp_relay_mode: String,
    pub tls: OutboundTls,
}

// ============================================================================
// Shared: TLS and V2Ray transports
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OutboundTls {
    pub enabled: bool,
    pub server_name: String,
    pub insecure: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alpn: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utls: Option<Utls>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reality: Option<Reality>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Utls {
    pub enabled: bool,
    pub fingerprint: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Reality {
    pub enabled: bool,
    pub public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_id: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum V2RayTransport {
    Ws(WebSocketTransport),
    Grpc(GrpcTransport),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct WebSocketTransport {
    pub path: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct GrpcTransport {
    pub service_name: String,
}
