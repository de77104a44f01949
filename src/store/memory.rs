//! In-process store backed by a concurrent map

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::trace;

use super::{KvStore, StoreError};

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// Volatile store; contents are lost on restart
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, expired ones included until the next read or write
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key)
            && entry.expires_at > now
        {
            return Ok(Some(entry.value.clone()));
        }

        // Lazy eviction; the guard above must be dropped before removing
        if self
            .entries
            .remove_if(key, |_, entry| entry.expires_at <= now)
            .is_some()
        {
            trace!("Evicted expired key '{}'", key);
        }
        Ok(None)
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        let now = Instant::now();

        // Keys that are never read again would otherwise live forever
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        let swept = before.saturating_sub(self.entries.len());
        if swept > 0 {
            trace!("Swept {} expired keys", swept);
        }

        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }
}
