//! Protocol allow-lists per target client
//!
//! The allow-list is built once at startup and handed to the serializers by
//! reference; it is never mutated afterwards.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::descriptor::Protocol;

/// Downstream client family a subscription is generated for
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum TargetClient {
    #[default]
    Xray,
    Singbox,
}

impl TargetClient {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetClient::Xray => "xray",
            TargetClient::Singbox => "singbox",
        }
    }
}

impl fmt::Display for TargetClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetClient {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xray" => Ok(TargetClient::Xray),
            "singbox" | "sing-box" => Ok(TargetClient::Singbox),
            other => Err(format!("unknown target client: {}", other)),
        }
    }
}

/// Which protocols each target client supports
#[derive(Clone, Debug)]
pub struct AllowList {
    allowed: HashMap<TargetClient, HashSet<Protocol>>,
}

impl Default for AllowList {
    fn default() -> Self {
        let xray = [Protocol::Vless, Protocol::Vmess, Protocol::Trojan, Protocol::Ss];

        let mut allowed = HashMap::new();
        allowed.insert(TargetClient::Xray, xray.into_iter().collect());
        allowed.insert(TargetClient::Singbox, Protocol::ALL.into_iter().collect());
        Self { allowed }
    }
}

impl AllowList {
    pub fn is_allowed(&self, protocol: Protocol, target: TargetClient) -> bool {
        self.allowed
            .get(&target)
            .is_some_and(|set| set.contains(&protocol))
    }
}
