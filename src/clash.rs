//! Clash YAML serializer
//!
//! Turns descriptors into a Clash document: proxies, an `Auto` url-test
//! group, a `Proxy` selector and a fixed rule list. Hysteria2 and TUIC have
//! no Clash representation and are always skipped.

pub mod model;

use tracing::{debug, trace};

pub use model::ClashDocument;
use model::{
    ClashProxy, GrpcOpts, ProxyGroup, ProxySettings, RealityOpts, ShadowsocksSettings,
    TransportSettings, TrojanSettings, VLessSettings, VMessSettings, WsOpts,
};

use crate::descriptor::{Protocol, ProtocolConfig, ProxyDescriptor, TlsOptions, Transport};
use crate::filter::{AllowList, TargetClient};

pub const AUTO_GROUP: &str = "Auto";
pub const PROXY_GROUP: &str = "Proxy";
pub const URL_TEST_TARGET: &str = "http://www.gstatic.com/generate_204";
pub const URL_TEST_INTERVAL: u32 = 300;

const DIRECT_CIDRS: [&str; 5] = [
    "127.0.0.0/8",
    "10.0.0.0/8",
    "172.16.0.0/12",
    "192.168.0.0/16",
    "169.254.0.0/16",
];
const DIRECT_CIDRS6: [&str; 2] = ["::1/128", "fc00::/7"];
const DIRECT_COUNTRY: &str = "IR";

/// Builds the Clash document, or `None` when no descriptor survives filtering
pub fn to_clash_document(
    descriptors: &[ProxyDescriptor],
    target: TargetClient,
    allow: &AllowList,
) -> Option<ClashDocument> {
    let proxies: Vec<ClashProxy> = descriptors
        .iter()
        .filter(|d| {
            let protocol = d.protocol();
            let keep = allow.is_allowed(protocol, target)
                && !matches!(protocol, Protocol::Hy2 | Protocol::Tuic);
            if !keep {
                debug!("Skipping '{}' ({}) for Clash/{}", d.name, protocol, target);
            }
            keep
        })
        .filter_map(to_clash_proxy)
        .collect();

    if proxies.is_empty() {
        debug!("No proxies left for Clash/{}", target);
        return None;
    }

    let names: Vec<String> = proxies.iter().map(|p| p.name.clone()).collect();
    trace!("Clash proxies: {:?}", names);

    Some(ClashDocument {
        port: 7890,
        socks_port: 7891,
        allow_lan: false,
        mode: "rule".to_string(),
        log_level: "info".to_string(),
        proxies,
        proxy_groups: build_groups(&names),
        rules: build_rules(),
    })
}

impl ClashDocument {
    /// Block-style YAML in struct field order
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

fn build_groups(names: &[String]) -> Vec<ProxyGroup> {
    let mut selectable = Vec::with_capacity(names.len() + 1);
    selectable.push(AUTO_GROUP.to_string());
    selectable.extend(names.iter().cloned());

    vec![
        ProxyGroup {
            name: AUTO_GROUP.to_string(),
            group_type: "url-test".to_string(),
            proxies: names.to_vec(),
            url: Some(URL_TEST_TARGET.to_string()),
            interval: Some(URL_TEST_INTERVAL),
        },
        ProxyGroup {
            name: PROXY_GROUP.to_string(),
            group_type: "select".to_string(),
            proxies: selectable,
            url: None,
            interval: None,
        },
    ]
}

fn build_rules() -> Vec<String> {
    let mut rules: Vec<String> = DIRECT_CIDRS
        .iter()
        .map(|cidr| format!("IP-CIDR,{},DIRECT", cidr))
        .collect();
    rules.extend(
        DIRECT_CIDRS6
            .iter()
            .map(|cidr| format!("IP-CIDR6,{},DIRECT", cidr)),
    );
    rules.push(format!("GEOIP,{},DIRECT", DIRECT_COUNTRY));
    rules.push(format!("MATCH,{}", PROXY_GROUP));
    rules
}

// ============================================================================
// Per-protocol mapping
// ============================================================================

fn to_clash_proxy(descriptor: &ProxyDescriptor) -> Option<ClashProxy> {
    let (proxy_type, settings) = match &descriptor.config {
        ProtocolConfig::VMess(c) => (
            "vmess",
            ProxySettings::VMess(VMessSettings {
                uuid: c.uuid.clone(),
                alter_id: c.alter_id,
                cipher: c.cipher.clone(),
                tls: c.tls.is_some(),
                servername: c.tls.as_ref().map(|t| t.sni.clone()),
                transport: transport_settings(&c.transport),
                client_fingerprint: fingerprint(c.tls.as_ref()),
            }),
        ),
        ProtocolConfig::VLess(c) => (
            "vless",
            ProxySettings::VLess(VLessSettings {
                uuid: c.uuid.clone(),
                flow: c.flow.clone(),
                packet_encoding: "xudp".to_string(),
                tls: c.tls.is_some(),
                servername: c.tls.as_ref().map(|t| t.sni.clone()),
                transport: transport_settings(&c.transport),
                client_fingerprint: fingerprint(c.tls.as_ref()),
                reality_opts: c
                    .tls
                    .as_ref()
                    .and_then(|t| t.reality.as_ref())
                    .map(|r| RealityOpts {
                        public_key: r.public_key.clone(),
                        short_id: r.short_id.clone(),
                    }),
            }),
        ),
        ProtocolConfig::Trojan(c) => (
            "trojan",
            ProxySettings::Trojan(TrojanSettings {
                password: c.password.clone(),
                sni: c.tls.sni.clone(),
                alpn: c.tls.alpn.clone(),
                transport: transport_settings(&c.transport),
                client_fingerprint: c.tls.fingerprint.clone(),
            }),
        ),
        ProtocolConfig::Shadowsocks(c) => (
            "ss",
            ProxySettings::Shadowsocks(ShadowsocksSettings {
                cipher: c.cipher.clone(),
                password: c.password.clone(),
            }),
        ),
        ProtocolConfig::Hysteria2(_) | ProtocolConfig::Tuic(_) => return None,
    };

    Some(ClashProxy {
        name: descriptor.name.clone(),
        proxy_type: proxy_type.to_string(),
        server: descriptor.server.clone(),
        port: descriptor.port,
        settings,
        skip_cert_verify: true,
        udp: true,
    })
}

fn transport_settings(transport: &Transport) -> TransportSettings {
    let mut settings = TransportSettings {
        network: transport.network().to_string(),
        ..Default::default()
    };
    match transport {
        Transport::Ws(ws) => {
            settings.ws_opts = Some(WsOpts {
                path: ws.path.clone(),
                headers: ws.headers.clone(),
            });
        }
        Transport::Grpc { service_name } => {
            settings.grpc_opts = Some(GrpcOpts {
                grpc_service_name: service_name.clone(),
            });
        }
        Transport::Tcp | Transport::Other(_) => {}
    }
    settings
}

fn fingerprint(tls: Option<&TlsOptions>) -> Option<String> {
    tls.and_then(|t| t.fingerprint.clone())
}
