//! Subscription orchestration
//!
//! `create` validates and persists the raw links under a handle; `fetch`
//! loads them back, renews the TTL and renders the requested format. Nothing
//! rendered is cached: every fetch re-runs parsing and serialization.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clash::to_clash_document;
use crate::descriptor::ProxyDescriptor;
use crate::filter::{AllowList, TargetClient};
use crate::parser::parse_all;
use crate::singbox::to_singbox_document;
use crate::store::{KvStore, StoreError};

// ============================================================================
// Types
// ============================================================================

/// Output document format
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Clash,
    Singbox,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Clash => "clash",
            OutputFormat::Singbox => "singbox",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Clash => "text/yaml; charset=utf-8",
            OutputFormat::Singbox => "application/json; charset=utf-8",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "clash" => Ok(OutputFormat::Clash),
            "singbox" | "sing-box" => Ok(OutputFormat::Singbox),
            other => Err(format!("unknown format: {}", other)),
        }
    }
}

/// Persisted value: the raw links exactly as submitted
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionRecord {
    pub configs: Vec<String>,
    pub core: TargetClient,
    /// Creation time in epoch milliseconds
    pub created: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CreateRequest {
    pub configs: Vec<String>,
    #[serde(default)]
    pub uuid: Option<String>,
    pub core: TargetClient,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateResponse {
    pub uuid: String,
    pub clash_subscription_url: String,
    pub singbox_subscription_url: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedDocument {
    pub body: String,
    pub content_type: &'static str,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("no valid proxy configuration")]
    EmptyResult,

    #[error("subscription not found")]
    NotFound,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("failed to render document: {0}")]
    Render(String),
}

// ============================================================================
// Rendering
// ============================================================================

/// Serializes descriptors into the requested format
pub fn render_document(
    descriptors: &[ProxyDescriptor],
    format: OutputFormat,
    target: TargetClient,
    allow: &AllowList,
) -> Result<RenderedDocument, ServiceError> {
    let body = match format {
        OutputFormat::Clash => to_clash_document(descriptors, target, allow)
            .ok_or(ServiceError::EmptyResult)?
            .to_yaml()
            .map_err(|e| ServiceError::Render(e.to_string()))?,
        OutputFormat::Singbox => to_singbox_document(descriptors, target, allow)
            .ok_or(ServiceError::EmptyResult)?
            .to_json_pretty()
            .map_err(|e| ServiceError::Render(e.to_string()))?,
    };

    Ok(RenderedDocument {
        body,
        content_type: format.content_type(),
    })
}

// ============================================================================
// Service
// ============================================================================

pub struct SubscriptionService {
    store: Arc<dyn KvStore>,
    allow: AllowList,
    ttl: Duration,
    base_url: String,
}

impl SubscriptionService {
    pub fn new(store: Arc<dyn KvStore>, allow: AllowList, ttl: Duration, base_url: impl Into<String>) -> Self {
        Self {
            store,
            allow,
            ttl,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Persists the links under a new or caller-supplied handle
    pub async fn create(&self, request: CreateRequest) -> Result<CreateResponse, ServiceError> {
        let handle = match request.uuid {
            Some(handle) if !handle.is_empty() => {
                validate_handle(&handle)?;
                handle
            }
            _ => Uuid::new_v4().to_string(),
        };

        let parsed = parse_all(&request.configs);
        let usable = parsed
            .iter()
            .filter(|d| self.allow.is_allowed(d.protocol(), request.core))
            .count();
        if usable == 0 {
            info!(
                "Rejecting subscription '{}': {} of {} configs parsed, none usable by {}",
                handle,
                parsed.len(),
                request.configs.len(),
                request.core
            );
            return Err(ServiceError::EmptyResult);
        }

        let record = SubscriptionRecord {
            configs: request.configs,
            core: request.core,
            created: Utc::now().timestamp_millis(),
        };
        let bytes = serde_json::to_vec(&record).map_err(|e| ServiceError::Render(e.to_string()))?;
        self.store.put(&handle, bytes, self.ttl).await?;

        info!(
            "Stored subscription '{}' ({} configs, {} usable, core {})",
            handle,
            record.configs.len(),
            usable,
            record.core
        );

        Ok(CreateResponse {
            clash_subscription_url: self.subscription_url(OutputFormat::Clash, &handle),
            singbox_subscription_url: self.subscription_url(OutputFormat::Singbox, &handle),
            uuid: handle,
        })
    }

    /// Loads, renews and renders a stored subscription
    pub async fn fetch(&self, format: OutputFormat, handle: &str) -> Result<RenderedDocument, ServiceError> {
        let Some(bytes) = self.store.get(handle).await? else {
            debug!("Subscription '{}' not found", handle);
            return Err(ServiceError::NotFound);
        };

        let record: SubscriptionRecord = match serde_json::from_slice(&bytes) {
            Ok(record) => record,
            Err(e) => {
                warn!("Subscription '{}' is malformed: {}", handle, e);
                return Err(ServiceError::NotFound);
            }
        };

        // Renew on read with the identical bytes
        self.store.put(handle, bytes, self.ttl).await?;

        let descriptors = parse_all(&record.configs);
        let rendered = render_document(&descriptors, format, record.core, &self.allow)?;
        debug!(
            "Rendered '{}' as {} ({} bytes)",
            handle,
            format,
            rendered.body.len()
        );
        Ok(rendered)
    }

    pub fn subscription_url(&self, format: OutputFormat, handle: &str) -> String {
        format!("{}/sub/{}/{}", self.base_url, format, handle)
    }
}

/// Caller-supplied handles end up in URL paths and file names
fn validate_handle(handle: &str) -> Result<(), ServiceError> {
    let valid = handle.len() <= 64
        && handle
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ServiceError::InvalidRequest(format!(
            "uuid must be 1-64 characters of [A-Za-z0-9_-], got '{}'",
            handle
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FileStore, MemoryStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const VLESS: &str = "vless://uuid@example.com:443?encryption=none&security=tls&sni=example.com&type=ws&path=%2Fws&host=example.com#MyNode";
    const HY2: &str = "hy2://pw@example.com:443#H";

    /// Counts puts so tests can assert on store mutation
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        puts: AtomicUsize,
    }

    #[async_trait]
    impl KvStore for CountingStore {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
            self.inner.get(key).await
        }

        async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            self.inner.put(key, value, ttl).await
        }
    }

    struct FailingStore;

    #[async_trait]
    impl KvStore for FailingStore {
        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, StoreError> {
            Err(StoreError::Io(std::io::Error::other("backend down")))
        }

        async fn put(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::other("backend down")))
        }
    }

    fn service(store: Arc<dyn KvStore>) -> SubscriptionService {
        SubscriptionService::new(store, AllowList::default(), Duration::from_secs(60), "https://subs.example.com/")
    }

    fn request(configs: &[&str], uuid: Option<&str>, core: TargetClient) -> CreateRequest {
        CreateRequest {
            configs: configs.iter().map(|s| s.to_string()).collect(),
            uuid: uuid.map(str::to_string),
            core,
        }
    }

    #[tokio::test]
    async fn test_create_then_fetch_both_formats() {
        let svc = service(Arc::new(MemoryStore::new()));
        let created = svc
            .create(request(&[VLESS, "garbage"], None, TargetClient::Xray))
            .await
            .unwrap();

        assert!(Uuid::parse_str(&created.uuid).is_ok());
        assert_eq!(
            created.clash_subscription_url,
            format!("https://subs.example.com/sub/clash/{}", created.uuid)
        );

        let clash = svc.fetch(OutputFormat::Clash, &created.uuid).await.unwrap();
        assert_eq!(clash.content_type, "text/yaml; charset=utf-8");
        assert!(clash.body.contains("name: MyNode"));

        let singbox = svc.fetch(OutputFormat::Singbox, &created.uuid).await.unwrap();
        assert_eq!(singbox.content_type, "application/json; charset=utf-8");
        assert!(singbox.body.contains("\"tag\": \"MyNode\""));
    }

    #[tokio::test]
    async fn test_create_rejects_when_nothing_parses() {
        let store = Arc::new(CountingStore::default());
        let svc = service(store.clone());
        let err = svc
            .create(request(&["not-a-valid-uri"], None, TargetClient::Xray))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::EmptyResult));
        assert_eq!(store.puts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_create_rejects_when_nothing_survives_allow_list() {
        let store = Arc::new(CountingStore::default());
        let svc = service(store.clone());
        let err = svc
            .create(request(&[HY2, "tuic://uuid:pw@example.com:443"], None, TargetClient::Xray))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::EmptyResult));
        assert_eq!(store.puts.load(Ordering::SeqCst), 0);

        assert!(svc.create(request(&[HY2], None, TargetClient::Singbox)).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_keeps_raw_unfiltered_configs() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(store.clone());
        svc.create(request(&[HY2, VLESS, "junk"], Some("mine"), TargetClient::Xray))
            .await
            .unwrap();

        let bytes = store.get("mine").await.unwrap().unwrap();
        let record: SubscriptionRecord = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(record.configs, vec![HY2, VLESS, "junk"]);
        assert_eq!(record.core, TargetClient::Xray);
        assert!(record.created > 0);
    }

    #[tokio::test]
    async fn test_caller_handle_last_write_wins() {
        let svc = service(Arc::new(MemoryStore::new()));
        svc.create(request(&[VLESS], Some("shared"), TargetClient::Xray))
            .await
            .unwrap();
        svc.create(request(&[HY2], Some("shared"), TargetClient::Singbox))
            .await
            .unwrap();

        let doc = svc.fetch(OutputFormat::Singbox, "shared").await.unwrap();
        assert!(doc.body.contains("hysteria2"));
        assert!(!doc.body.contains("MyNode"));
    }

    #[tokio::test]
    async fn test_invalid_handle_is_rejected() {
        let svc = service(Arc::new(MemoryStore::new()));
        let err = svc
            .create(request(&[VLESS], Some("../etc"), TargetClient::Xray))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_fetch_missing_does_not_touch_store() {
        let store = Arc::new(CountingStore::default());
        let svc = service(store.clone());
        let err = svc.fetch(OutputFormat::Clash, "nope").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound));
        assert_eq!(store.puts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetch_malformed_record_is_not_found() {
        let store = Arc::new(CountingStore::default());
        store
            .inner
            .put("bad", b"{not json".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        let svc = service(store.clone());
        assert!(matches!(
            svc.fetch(OutputFormat::Clash, "bad").await,
            Err(ServiceError::NotFound)
        ));
        assert_eq!(store.puts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetch_renews_with_identical_bytes() {
        let store = Arc::new(CountingStore::default());
        let svc = service(store.clone());
        svc.create(request(&[VLESS], Some("h"), TargetClient::Xray))
            .await
            .unwrap();
        let before = store.get("h").await.unwrap();

        svc.fetch(OutputFormat::Clash, "h").await.unwrap();
        assert_eq!(store.puts.load(Ordering::SeqCst), 2);
        assert_eq!(store.get("h").await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_fetch_empty_after_filtering() {
        let svc = service(Arc::new(MemoryStore::new()));
        svc.create(request(&[HY2], Some("quic"), TargetClient::Singbox))
            .await
            .unwrap();

        // Clash has no hy2 representation
        assert!(matches!(
            svc.fetch(OutputFormat::Clash, "quic").await,
            Err(ServiceError::EmptyResult)
        ));
        assert!(svc.fetch(OutputFormat::Singbox, "quic").await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_fetches_on_file_store_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let svc = Arc::new(service(Arc::new(FileStore::new(dir.path()))));
        svc.create(request(&[VLESS], Some("h"), TargetClient::Xray))
            .await
            .unwrap();

        let tasks: Vec<_> = (0..100)
            .map(|_| {
                let svc = svc.clone();
                tokio::spawn(async move { svc.fetch(OutputFormat::Clash, "h").await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_distinct_from_not_found() {
        let svc = service(Arc::new(FailingStore));
        assert!(matches!(
            svc.fetch(OutputFormat::Clash, "h").await,
            Err(ServiceError::Store(_))
        ));
        assert!(matches!(
            svc.create(request(&[VLESS], None, TargetClient::Xray)).await,
            Err(ServiceError::Store(_))
        ));
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("clash".parse::<OutputFormat>().unwrap(), OutputFormat::Clash);
        assert_eq!("SingBox".parse::<OutputFormat>().unwrap(), OutputFormat::Singbox);
        assert!("v2ray".parse::<OutputFormat>().is_err());
    }
}
