//! Service settings
//!
//! Loaded from a TOML file (path or URL). Every field has a default, so an
//! empty file is a valid configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::helpers::{expand_tilde, is_url, load_text};

/// Which `KvStore` backend to use
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Memory,
    File,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Address the HTTP server binds to
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Base URL used to build subscription links, without trailing slash.
    /// Defaults to `http://{listen}` when empty.
    #[serde(default)]
    pub public_url: String,

    #[serde(default)]
    pub store: StoreKind,

    /// Directory for the file store. Ignored for the memory store.
    #[serde(default = "default_store_dir")]
    pub store_dir: String,

    /// Subscription lifetime, refreshed on every fetch
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,

    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// CORS origins; empty allows any origin
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            public_url: String::new(),
            store: StoreKind::default(),
            store_dir: default_store_dir(),
            ttl_seconds: default_ttl_seconds(),
            probe_timeout_ms: default_probe_timeout_ms(),
            allowed_origins: Vec::new(),
        }
    }
}

impl Settings {
    /// Parse settings from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content).context("Failed to parse settings TOML")?;

        if settings.ttl_seconds == 0 {
            anyhow::bail!("ttl_seconds must be greater than zero");
        }
        if settings.probe_timeout_ms == 0 {
            anyhow::bail!("probe_timeout_ms must be greater than zero");
        }
        if !settings.public_url.is_empty() && !is_url(&settings.public_url) {
            anyhow::bail!("public_url must start with http:// or https://");
        }

        Ok(settings)
    }

    /// Load settings from file path or URL
    pub async fn load(path_or_url: &str) -> Result<Self> {
        debug!("Loading settings from {}", path_or_url);
        let content = load_text(path_or_url)
            .await
            .with_context(|| format!("Failed to load settings from {}", path_or_url))?;
        Self::from_toml(&content)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Base for subscription URLs
    pub fn base_url(&self) -> String {
        if self.public_url.is_empty() {
            format!("http://{}", self.listen)
        } else {
            self.public_url.trim_end_matches('/').to_string()
        }
    }

    pub fn store_dir_expanded(&self) -> PathBuf {
        expand_tilde(&self.store_dir)
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8787))
}

fn default_store_dir() -> String {
    "./data".to_string()
}

fn default_ttl_seconds() -> u64 {
    30 * 24 * 60 * 60
}

fn default_probe_timeout_ms() -> u64 {
    5000
}
