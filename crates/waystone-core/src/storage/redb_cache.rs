//! Redb-backed asset cache.
//!
//! Uses [redb](https://github.com/cberner/redb), a pure Rust ACID embedded
//! B-tree database, with a single table mapping content hash to raw bytes.
//! Reads and writes are small and synchronous; they run inline on the
//! worker's thread.

use super::ByteCache;
use crate::error::CacheError;
use async_trait::async_trait;
use redb::{Database, TableDefinition};
use std::path::Path;

const ASSETS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("assets");

/// Persistent content-addressed cache.
pub struct RedbCache {
    db: Database,
}

impl RedbCache {
    /// Opens or creates the cache database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CacheError> {
        let db = Database::create(path.as_ref())
            .map_err(|e| CacheError::WriteFailed(format!("open database: {e}")))?;

        // Create the table up front so first reads see it.
        let write_txn = db
            .begin_write()
            .map_err(|e| CacheError::WriteFailed(e.to_string()))?;
        write_txn
            .open_table(ASSETS_TABLE)
            .map_err(|e| CacheError::WriteFailed(e.to_string()))?;
        write_txn
            .commit()
            .map_err(|e| CacheError::WriteFailed(e.to_string()))?;

        Ok(Self { db })
    }
}

#[async_trait]
impl ByteCache for RedbCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| CacheError::ReadFailed(e.to_string()))?;
        let table = read_txn
            .open_table(ASSETS_TABLE)
            .map_err(|e| CacheError::ReadFailed(e.to_string()))?;
        let value = table
            .get(key)
            .map_err(|e| CacheError::ReadFailed(e.to_string()))?;
        Ok(value.map(|v| v.value().to_vec()))
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), CacheError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| CacheError::WriteFailed(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(ASSETS_TABLE)
                .map_err(|e| CacheError::WriteFailed(e.to_string()))?;
            table
                .insert(key, bytes)
                .map_err(|e| CacheError::WriteFailed(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| CacheError::WriteFailed(e.to_string()))?;
        Ok(())
    }
}
