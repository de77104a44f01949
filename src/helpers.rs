//! Input sources
//!
//! Settings files and link lists are named either by a local path (with `~`
//! expansion) or by an http(s) URL. Remote subscriptions are fetched with a
//! bounded timeout so a stalled panel cannot hang the CLI.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::debug;
use url::Url;

use crate::get_version;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Where text input comes from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Source {
    Remote(Url),
    Local(PathBuf),
}

impl Source {
    /// Anything that is not a valid http(s) URL is treated as a path
    pub fn parse(path_or_url: &str) -> Self {
        if is_url(path_or_url)
            && let Ok(url) = Url::parse(path_or_url)
        {
            return Source::Remote(url);
        }
        Source::Local(expand_tilde(path_or_url))
    }

    pub async fn read_text(&self) -> Result<String> {
        match self {
            Source::Remote(url) => fetch_text(url).await,
            Source::Local(path) => tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display())),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Remote(url) => write!(f, "{}", url),
            Source::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Reads text from a file path or URL
pub async fn load_text(path_or_url: &str) -> Result<String> {
    Source::parse(path_or_url).read_text().await
}

pub fn is_url(path_or_url: &str) -> bool {
    path_or_url.starts_with("http://") || path_or_url.starts_with("https://")
}

/// Resolves a leading `~` or `~/` against the user's home directory
pub fn expand_tilde(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some("") => "",
        Some(rest) if rest.starts_with('/') => rest.trim_start_matches('/'),
        _ => return PathBuf::from(path),
    };
    match home_dir() {
        Some(home) => home.join(rest),
        None => PathBuf::from(path),
    }
}

fn home_dir() -> Option<PathBuf> {
    let var = if cfg!(windows) { "USERPROFILE" } else { "HOME" };
    std::env::var_os(var).map(PathBuf::from)
}

async fn fetch_text(url: &Url) -> Result<String> {
    debug!("Fetching {}", url);

    let client = reqwest::Client::builder()
        .user_agent(format!("subsmith/{}", get_version()))
        .timeout(FETCH_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")?;

    let response = client
        .get(url.clone())
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .with_context(|| format!("Failed to fetch {}", url))?;

    response
        .text()
        .await
        .with_context(|| format!("Failed to read response body from {}", url))
}
