//! Persistent byte cache for index assets.
//!
//! Assets are cached under their SHA-256 content hash, so a cache record
//! can never go stale: a changed shard gets a new hash and the old record
//! is simply never read again. Cache failures are recoverable by design;
//! callers log and fall through to the network.

mod redb_cache;

pub use redb_cache::RedbCache;

use crate::error::CacheError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Content-addressed byte store.
#[async_trait]
pub trait ByteCache: Send + Sync {
    /// Returns the cached bytes for `key` (a lowercase hex SHA-256), or
    /// `None` on a miss.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Stores `bytes` under `key`.
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), CacheError>;
}

/// In-memory cache used in tests and when persistence is disabled.
#[derive(Default)]
pub struct MemoryCache {
    map: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.map.lock().expect("cache mutex poisoned").len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ByteCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self
            .map
            .lock()
            .expect("cache mutex poisoned")
            .get(key)
            .cloned())
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), CacheError> {
        self.map
            .lock()
            .expect("cache mutex poisoned")
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}
