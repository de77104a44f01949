//! VMess protocol parser
//!
//! This module provides parsing for VMess (vmess://) URIs.
//! VMess URIs are Base64 encoded JSON containing connection details.

use std::collections::HashMap;

use serde::Deserialize;
use serde::Deserializer;
use tracing::trace;

use crate::descriptor::{Protocol, ProtocolConfig, ProxyDescriptor, VMessConfig};
use crate::parser::ParseError;
use crate::parser::base64::decode_base64;

use super::{ProtocolParser, build_tls, build_transport, fallback_name_if_blank, parse_port};

// ============================================================================
// VMess Parser
// ============================================================================

/// Parser for VMess (vmess://) URIs
///
/// vmess://BASE64({ "v": "2", "ps": "name", "add": "host", "port": 443, ... })
pub struct VMessParser;

/// VMess URI JSON structure
///
/// Every field is optional at the serde level so an absent field reports as
/// missing rather than as a JSON error.
#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct VMessJson {
    ps: Option<String>,
    add: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    port: Option<String>,
    id: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    aid: Option<String>,
    scy: Option<String>,
    net: Option<String>,
    #[serde(rename = "type")]
    header_type: Option<String>,
    host: Option<String>,
    path: Option<String>,
    tls: Option<String>,
    sni: Option<String>,
    alpn: Option<String>,
    fp: Option<String>,
}

/// Accepts `443`, `"443"` and `null` alike
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n.to_string())),
        Some(Raw::Text(s)) => Ok(Some(s)),
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ParseError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ParseError::missing(Protocol::Vmess, field))
}

impl ProtocolParser for VMessParser {
    fn scheme(&self) -> &str {
        "vmess"
    }

    fn parse(&self, uri: &str) -> Result<ProxyDescriptor, ParseError> {
        trace!("Parsing VMess URI");

        let encoded = uri
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or_default();

        let decoded = decode_base64(encoded)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or(ParseError::InvalidBase64 {
                protocol: Protocol::Vmess,
                part: "payload",
            })?;

        let json: VMessJson = serde_json::from_str(&decoded)?;
        trace!(
            "VMess config: add={:?}, port={:?}, net={:?}, tls={:?}",
            json.add, json.port, json.net, json.tls
        );

        let server = required(json.add, "add")?;
        let port = parse_port(&required(json.port, "port")?)?;
        let uuid = required(json.id, "id")?;

        let alter_id = match json.aid.as_deref().map(str::trim) {
            None | Some("") => 0,
            Some(aid) => aid
                .parse::<u32>()
                .map_err(|_| ParseError::Malformed {
                    protocol: Protocol::Vmess,
                    reason: "aid is not an integer",
                })?,
        };

        let cipher = json
            .scy
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "auto".to_string());

        let transport = build_transport(
            json.net.as_deref(),
            json.path.as_deref(),
            json.host.as_deref(),
            // gRPC links reuse `path` for the service name
            json.path.as_deref(),
            &server,
        );
        if json.header_type.as_deref().is_some_and(|t| t != "none") {
            trace!("Ignoring VMess header type {:?}", json.header_type);
        }

        let tls = if json.tls.as_deref() == Some("tls") {
            let mut params = HashMap::new();
            if let Some(alpn) = json.alpn.filter(|a| !a.is_empty()) {
                params.insert("alpn".to_string(), alpn);
            }
            if let Some(fp) = json.fp.filter(|f| !f.is_empty()) {
                params.insert("fp".to_string(), fp);
            }
            Some(build_tls(&params, json.sni.as_deref(), Some(&transport), &server))
        } else {
            None
        };

        let name = fallback_name_if_blank(json.ps, Protocol::Vmess, &server);

        Ok(ProxyDescriptor {
            name,
            server,
            port,
            config: ProtocolConfig::VMess(VMessConfig {
                uuid,
                alter_id,
                cipher,
                transport,
                tls,
            }),
        })
    }
}
