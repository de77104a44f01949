//! sing-box JSON serializer
//!
//! Every allowed descriptor becomes one outbound tagged with its name. The
//! outbound list is wrapped between an `auto` urltest group and a `direct`
//! outbound, next to fixed log, DNS, inbound and route blocks.

pub mod model;

use tracing::{debug, trace};

pub use model::SingBoxDocument;
use model::{
    DirectOutbound, Dns, DnsServer, GrpcTransport, Hysteria2Obfs, Hysteria2Outbound, Inbound,
    Log, MixedInbound, Outbound, OutboundTls, Reality, Route, RouteRule, ShadowsocksOutbound,
    TrojanOutbound, TuicOutbound, UrlTestOutbound, Utls, V2RayTransport, VLessOutbound,
    VMessOutbound, WebSocketTransport,
};

use crate::descriptor::{ProtocolConfig, ProxyDescriptor, TlsOptions, Transport};
use crate::filter::{AllowList, TargetClient};

pub const AUTO_TAG: &str = "auto";
pub const DIRECT_TAG: &str = "direct";
pub const INBOUND_PORT: u16 = 2080;

/// Builds the sing-box document, or `None` when no descriptor is allowed
pub fn to_singbox_document(
    descriptors: &[ProxyDescriptor],
    target: TargetClient,
    allow: &AllowList,
) -> Option<SingBoxDocument> {
    let proxies: Vec<Outbound> = descriptors
        .iter()
        .filter(|d| {
            let allowed = allow.is_allowed(d.protocol(), target);
            if !allowed {
                debug!("Skipping '{}' ({}) for sing-box/{}", d.name, d.protocol(), target);
            }
            allowed
        })
        .map(to_outbound)
        .collect();

    if proxies.is_empty() {
        debug!("No outbounds left for sing-box/{}", target);
        return None;
    }

    let tags: Vec<String> = proxies.iter().map(|o| o.tag().to_string()).collect();
    trace!("sing-box outbound tags: {:?}", tags);

    let mut outbounds = Vec::with_capacity(proxies.len() + 2);
    outbounds.push(Outbound::UrlTest(UrlTestOutbound {
        tag: AUTO_TAG.to_string(),
        outbounds: tags,
    }));
    outbounds.extend(proxies);
    outbounds.push(Outbound::Direct(DirectOutbound {
        tag: DIRECT_TAG.to_string(),
    }));

    Some(SingBoxDocument {
        log: Log {
            level: "info".to_string(),
            timestamp: true,
        },
        dns: Dns {
            servers: vec![DnsServer {
                tag: "dns-remote".to_string(),
                address: "8.8.8.8".to_string(),
            }],
        },
        inbounds: vec![Inbound::Mixed(MixedInbound {
            tag: "mixed-in".to_string(),
            listen: "127.0.0.1".to_string(),
            listen_port: INBOUND_PORT,
        })],
        outbounds,
        route: Route {
            rules: vec![
                RouteRule {
                    geoip: vec!["ir".to_string()],
                    outbound: DIRECT_TAG.to_string(),
                },
                RouteRule {
                    geoip: vec!["private".to_string()],
                    outbound: DIRECT_TAG.to_string(),
                },
            ],
            final_outbound: AUTO_TAG.to_string(),
            auto_detect_interface: true,
        },
    })
}

impl SingBoxDocument {
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

// ============================================================================
// Per-protocol mapping
// ============================================================================

fn to_outbound(descriptor: &ProxyDescriptor) -> Outbound {
    let tag = descriptor.name.clone();
    let server = descriptor.server.clone();
    let server_port = descriptor.port;

    match &descriptor.config {
        ProtocolConfig::VMess(c) => Outbound::VMess(VMessOutbound {
            tag,
            server,
            server_port,
            uuid: c.uuid.clone(),
            security: c.cipher.clone(),
            alter_id: c.alter_id,
            tls: c.tls.as_ref().map(outbound_tls),
            transport: v2ray_transport(&c.transport),
        }),
        ProtocolConfig::VLess(c) => Outbound::VLess(VLessOutbound {
            tag,
            server,
            server_port,
            uuid: c.uuid.clone(),
            flow: Some(c.flow.clone()).filter(|f| !f.is_empty()),
            packet_encoding: "xudp".to_string(),
            tls: c.tls.as_ref().map(outbound_tls),
            transport: v2ray_transport(&c.transport),
        }),
        ProtocolConfig::Trojan(c) => Outbound::Trojan(TrojanOutbound {
            tag,
            server,
            server_port,
            password: c.password.clone(),
            tls: outbound_tls(&c.tls),
            transport: v2ray_transport(&c.transport),
        }),
        ProtocolConfig::Shadowsocks(c) => Outbound::Shadowsocks(ShadowsocksOutbound {
            tag,
            server,
            server_port,
            method: c.cipher.clone(),
            password: c.password.clone(),
        }),
        ProtocolConfig::Hysteria2(c) => Outbound::Hysteria2(Hysteria2Outbound {
            tag,
            server,
            server_port,
            password: c.password.clone(),
            up_mbps: 100,
            down_mbps: 100,
            obfs: c.obfs.as_ref().map(|o| Hysteria2Obfs {
                obfs_type: o.obfs_type.clone(),
                password: o.password.clone(),
            }),
            tls: outbound_tls(&c.tls),
        }),
        ProtocolConfig::Tuic(c) => Outbound::Tuic(TuicOutbound {
            tag,
            server,
            server_port,
            uuid: c.uuid.clone(),
            password: c.password.clone(),
            congestion_control: "cubic".to_string(),
            udp_relay_mode: "native".to_string(),
            tls: outbound_tls(&c.tls),
        }),
    }
}

fn outbound_tls(tls: &TlsOptions) -> OutboundTls {
    OutboundTls {
        enabled: true,
        server_name: tls.sni.clone(),
        insecure: true,
        alpn: tls.alpn.clone(),
        utls: tls.fingerprint.as_ref().map(|fp| Utls {
            enabled: true,
            fingerprint: fp.clone(),
        }),
        reality: tls.reality.as_ref().map(|r| Reality {
            enabled: true,
            public_key: r.public_key.clone(),
            short_id: r.short_id.clone(),
        }),
    }
}

fn v2ray_transport(transport: &Transport) -> Option<V2RayTransport> {
    match transport {
        Transport::Tcp => None,
        Transport::Ws(ws) => Some(V2RayTransport::Ws(WebSocketTransport {
            path: ws.path.clone(),
            headers: ws.headers.clone(),
        })),
        Transport::Grpc { service_name } => Some(V2RayTransport::Grpc(GrpcTransport {
            service_name: service_name.clone(),
        })),
        Transport::Other(name) => {
            debug!("Transport '{}' has no sing-box mapping, using tcp", name);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_descriptor;
    use serde_json::Value;

    fn parse(uris: &[&str]) -> Vec<ProxyDescriptor> {
        uris.iter().map(|u| parse_descriptor(u).unwrap()).collect()
    }

    fn mixed() -> Vec<ProxyDescriptor> {
        parse(&[
            "vless://uuid@example.com:443?security=tls&type=ws&path=%2Fws#V",
            "hy2://pw@hy.example.com:8443#H",
            "tuic://uuid:pw@tuic.example.com:10443#T",
            "ss://YWVzLTI1Ni1nY206cGFzczEyMw==@1.2.3.4:8388#S",
        ])
    }

    #[test]
    fn test_tag_and_port_match_descriptor() {
        let descriptors = mixed();
        let doc = to_singbox_document(&descriptors, TargetClient::Singbox, &AllowList::default())
            .unwrap();

        // auto, four proxies, direct
        assert_eq!(doc.outbounds.len(), 6);
        for (descriptor, outbound) in descriptors.iter().zip(&doc.outbounds[1..5]) {
            assert_eq!(outbound.tag(), descriptor.name);
            assert_eq!(outbound.server_port(), Some(descriptor.port));
        }
    }

    #[test]
    fn test_xray_target_excludes_hy2_and_tuic() {
        let doc = to_singbox_document(&mixed(), TargetClient::Xray, &AllowList::default()).unwrap();
        let tags: Vec<&str> = doc.outbounds.iter().map(Outbound::tag).collect();
        assert_eq!(tags, vec!["auto", "V", "S", "direct"]);

        match &doc.outbounds[0] {
            Outbound::UrlTest(group) => assert_eq!(group.outbounds, vec!["V", "S"]),
            other => panic!("expected urltest, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_result_is_none() {
        let only_hy2 = parse(&["hy2://pw@example.com:443"]);
        assert!(to_singbox_document(&only_hy2, TargetClient::Xray, &AllowList::default()).is_none());
        assert!(to_singbox_document(&[], TargetClient::Singbox, &AllowList::default()).is_none());
    }

    #[test]
    fn test_json_shape() {
        let doc = to_singbox_document(&mixed(), TargetClient::Singbox, &AllowList::default())
            .unwrap();
        let json: Value = serde_json::from_str(&doc.to_json_pretty().unwrap()).unwrap();

        assert_eq!(json["log"]["level"], "info");
        assert_eq!(json["dns"]["servers"][0]["address"], "8.8.8.8");
        assert_eq!(json["inbounds"][0]["type"], "mixed");
        assert_eq!(json["inbounds"][0]["listen_port"], 2080);
        assert_eq!(json["route"]["final"], "auto");
        assert_eq!(json["route"]["auto_detect_interface"], true);
        assert_eq!(json["route"]["rules"][0]["geoip"][0], "ir");
        assert_eq!(json["route"]["rules"][1]["geoip"][0], "private");

        let vless = &json["outbounds"][1];
        assert_eq!(vless["type"], "vless");
        assert_eq!(vless["packet_encoding"], "xudp");
        assert_eq!(vless["tls"]["insecure"], true);
        assert_eq!(vless["tls"]["server_name"], "example.com");
        assert_eq!(vless["transport"]["type"], "ws");
        assert_eq!(vless["transport"]["path"], "/ws");
        assert!(vless.get("flow").is_none());

        let hy2 = &json["outbounds"][2];
        assert_eq!(hy2["type"], "hysteria2");
        assert_eq!(hy2["up_mbps"], 100);
        assert_eq!(hy2["down_mbps"], 100);

        let tuic = &json["outbounds"][3];
        assert_eq!(tuic["type"], "tuic");
        assert_eq!(tuic["congestion_control"], "cubic");
        assert_eq!(tuic["udp_relay_mode"], "native");

        let ss = &json["outbounds"][4];
        assert_eq!(ss["type"], "shadowsocks");
        assert_eq!(ss["method"], "aes-256-gcm");
        assert!(ss.get("tls").is_none());

        assert_eq!(json["outbounds"][5]["type"], "direct");
    }

    #[test]
    fn test_document_round_trips_through_json() {
        let doc = to_singbox_document(&mixed(), TargetClient::Singbox, &AllowList::default())
            .unwrap();
        let parsed: SingBoxDocument = serde_json::from_str(&doc.to_json_pretty().unwrap()).unwrap();
        assert_eq!(parsed, doc);
    }
}
