//! Key-value storage for subscription records
//!
//! Records are opaque bytes stored under a handle with a time-to-live.
//! Expired entries read as absent; a failing backend is an error, never an
//! absence.

pub mod file;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use file::FileStore;
pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored entry for '{key}' is corrupt: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Byte store with per-entry expiry
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Returns the value, or `None` if the key is absent or expired
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Stores the value, replacing any previous one, and resets its expiry
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError>;
}
