//! File-backed store
//!
//! Each key is one JSON envelope `{expires_at, value}` in the store
//! directory. Expiry is checked on read, and writes periodically sweep the
//! directory for entries that expired without being read again.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use super::{KvStore, StoreError};

const ENTRY_SUFFIX: &str = ".entry.json";
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[derive(Serialize, Deserialize)]
struct Envelope {
    /// Epoch milliseconds after which the entry is gone
    expires_at: i64,
    /// Base64 of the stored bytes
    value: String,
}

/// Persistent store rooted at a directory
pub struct FileStore {
    dir: PathBuf,
    sweep_interval: Duration,
    /// Epoch milliseconds of the last sweep
    last_sweep: AtomicI64,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            last_sweep: AtomicI64::new(Utc::now().timestamp_millis()),
        }
    }

    /// How often a write scans the directory for expired entries
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File path for a key; the key is percent-encoded so it cannot escape
    /// the directory or collide with another key
    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}{}", urlencoding::encode(key), ENTRY_SUFFIX))
    }

    fn corrupt(key: &str, reason: impl ToString) -> StoreError {
        StoreError::Corrupt {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Claims the sweep slot if the interval has passed; only one writer wins
    fn sweep_due(&self, now_ms: i64) -> bool {
        let interval_ms = i64::try_from(self.sweep_interval.as_millis()).unwrap_or(i64::MAX);
        let last = self.last_sweep.load(Ordering::Acquire);
        now_ms.saturating_sub(last) >= interval_ms
            && self
                .last_sweep
                .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }

    /// Removes every entry whose envelope has expired
    ///
    /// Unreadable or corrupt files are left alone; `get` reports those.
    async fn sweep(&self, now_ms: i64) -> Result<usize, StoreError> {
        let mut removed = 0;
        let mut dir = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            let is_entry = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(ENTRY_SUFFIX));
            if !is_entry {
                continue;
            }

            let Ok(content) = tokio::fs::read_to_string(&path).await else {
                continue;
            };
            let Ok(envelope) = serde_json::from_str::<Envelope>(&content) else {
                continue;
            };
            if envelope.expires_at <= now_ms {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        Ok(removed)
    }
}

#[async_trait]
impl KvStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.entry_path(key);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let envelope: Envelope =
            serde_json::from_str(&content).map_err(|e| Self::corrupt(key, e))?;

        if envelope.expires_at <= Utc::now().timestamp_millis() {
            debug!("Entry '{}' expired, removing {}", key, path.display());
            if let Err(e) = tokio::fs::remove_file(&path).await
                && e.kind() != std::io::ErrorKind::NotFound
            {
                return Err(e.into());
            }
            return Ok(None);
        }

        let value = STANDARD
            .decode(envelope.value)
            .map_err(|e| Self::corrupt(key, e))?;
        Ok(Some(value))
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let now_ms = Utc::now().timestamp_millis();
        if self.sweep_due(now_ms) {
            match self.sweep(now_ms).await {
                Ok(0) => {}
                Ok(removed) => {
                    debug!("Swept {} expired entries from {}", removed, self.dir.display());
                }
                Err(e) => warn!("Sweeping {} failed: {}", self.dir.display(), e),
            }
        }

        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let envelope = Envelope {
            expires_at: now_ms.saturating_add(ttl_ms),
            value: STANDARD.encode(&value),
        };
        let content = serde_json::to_string(&envelope).map_err(|e| Self::corrupt(key, e))?;

        // Readers must never see a half-written envelope, and concurrent
        // writers to one key each need their own temp file
        let path = self.entry_path(key);
        let tmp = self.dir.join(format!(".{}.tmp", Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, content).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        trace!("Stored {} bytes under '{}'", value.len(), key);
        Ok(())
    }
}
