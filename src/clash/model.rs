//! Clash document model
//!
//! Field order in these structs is the key order of the emitted YAML.

use std::collections::BTreeMap;

use serde::Serialize;

/// Complete Clash configuration document
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct ClashDocument {
    pub port: u16,
    pub socks_port: u16,
    pub allow_lan: bool,
    pub mode: String,
    pub log_level: String,
    pub proxies: Vec<ClashProxy>,
    pub proxy_groups: Vec<ProxyGroup>,
    pub rules: Vec<String>,
}

// ============================================================================
// Proxies
// ============================================================================

/// One entry of `proxies`
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ClashProxy {
    pub name: String,
    #[serde(rename = "type")]
    pub proxy_type: String,
    pub server: String,
    pub port: u16,
    #[serde(flatten)]
    pub settings: ProxySettings,
    #[serde(rename = "skip-cert-verify")]
    pub skip_cert_verify: bool,
    pub udp: bool,
}

/// Protocol-specific proxy fields
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum ProxySettings {
    VMess(VMessSettings),
    VLess(VLessSettings),
    Trojan(TrojanSettings),
    Shadowsocks(ShadowsocksSettings),
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct VMessSettings {
    pub uuid: String,
    #[serde(rename = "alterId")]
    pub alter_id: u32,
    pub cipher: String,
    pub tls: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub servername: Option<String>,
    #[serde(flatten)]
    pub transport: TransportSettings,
    #[serde(rename = "client-fingerprint", skip_serializing_if = "Option::is_none")]
    pub client_fingerprint: Option<String>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct VLessSettings {
    pub uuid: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub flow: String,
    #[serde(rename = "packet-encoding")]
    pub packet_encoding: String,
    pub tls: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub servername: Option<String>,
    #[serde(flatten)]
    pub transport: TransportSettings,
    #[serde(rename = "client-fingerprint", skip_serializing_if = "Option::is_none")]
    pub client_fingerprint: Option<String>,
    #[serde(rename = "reality-opts", skip_serializing_if = "Option::is_none")]
    pub reality_opts: Option<RealityOpts>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct TrojanSettings {
    pub password: String,
    pub sni: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub alpn: Vec<String>,
    #[serde(flatten)]
    pub transport: TransportSettings,
    #[serde(rename = "client-fingerprint", skip_serializing_if = "Option::is_none")]
    pub client_fingerprint: Option<String>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ShadowsocksSettings {
    pub cipher: String,
    pub password: String,
}

/// `network` plus the matching `*-opts` block
#[derive(Serialize, Clone, Debug, PartialEq, Default)]
pub struct TransportSettings {
    pub network: String,
    #[serde(rename = "ws-opts", skip_serializing_if = "Option::is_none")]
    pub ws_opts: Option<WsOpts>,
    #[serde(rename = "grpc-opts", skip_serializing_if = "Option::is_none")]
    pub grpc_opts: Option<GrpcOpts>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct WsOpts {
    pub path: String,
    pub headers: BTreeMap<String, String>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct GrpcOpts {
    #[serde(rename = "grpc-service-name")]
    pub grpc_service_name: String,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct RealityOpts {
    #[serde(rename = "public-key")]
    pub public_key: String,
    #[serde(rename = "short-id", skip_serializing_if = "Option::is_none")]
    pub short_id: Option<String>,
}

// ============================================================================
// Proxy Groups
// ============================================================================

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ProxyGroup {
    pub name: String,
    #[serde(rename = "type")]
    pub group_type: String,
    pub proxies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<u32>,
}
