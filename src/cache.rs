// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Snapshot cache of server state for offline reads.
//!
//! Each entity type has one [`CacheSnapshot`]: the last server-consistent
//! list of records. Snapshots are replaced wholesale, never patched.
//!
//! Absence and emptiness are different answers: [`CacheLayer::load`] returns
//! `None` for a key that was never saved and `Some(vec![])` for a saved empty
//! list.
//!
//! # Example
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use offline_sync::{CacheLayer, InMemoryKvStore};
//! # use serde_json::{json, Value};
//! # async fn example() -> Result<(), offline_sync::StorageError> {
//! let cache = CacheLayer::new(Arc::new(InMemoryKvStore::new()), "app");
//!
//! assert!(cache.load::<Value>("customers").await?.is_none());
//!
//! cache.save("customers", &[json!({"_id": "c1", "credit": 100})]).await?;
//! let records: Vec<Value> = cache.load("customers").await?.unwrap();
//! assert_eq!(records.len(), 1);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::action::now_millis;
use crate::storage::traits::{KvStore, StorageError};

/// Last known server-consistent list for one entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot<T> {
    pub key: String,
    pub records: Vec<T>,
    /// Time of the successful write (epoch millis)
    pub saved_at: i64,
}

/// Borrowed form of [`CacheSnapshot`] for writing without cloning records.
#[derive(Serialize)]
struct SnapshotRef<'a, T> {
    key: &'a str,
    records: &'a [T],
    saved_at: i64,
}

/// Typed snapshot reads/writes over a [`KvStore`].
#[derive(Clone)]
pub struct CacheLayer {
    store: Arc<dyn KvStore>,
    prefix: String,
}

impl CacheLayer {
    pub fn new(store: Arc<dyn KvStore>, key_prefix: &str) -> Self {
        Self {
            store,
            prefix: format!("{}:cache:", key_prefix),
        }
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Replace the snapshot for `key`.
    ///
    /// Serialization happens before anything is written, so a failure leaves
    /// the previous snapshot untouched.
    pub async fn save<T: Serialize>(&self, key: &str, records: &[T]) -> Result<(), StorageError> {
        let snapshot = SnapshotRef {
            key,
            records,
            saved_at: now_millis(),
        };
        let encoded = serde_json::to_string(&snapshot)?;

        self.store.set(&self.storage_key(key), &encoded).await?;
        crate::metrics::record_cache_write(key, records.len());
        debug!(key, records = records.len(), "Cache snapshot saved");
        Ok(())
    }

    /// Full snapshot including its save time, or `None` if never saved.
    pub async fn snapshot<T: DeserializeOwned>(&self, key: &str) -> Result<Option<CacheSnapshot<T>>, StorageError> {
        match self.store.get(&self.storage_key(key)).await? {
            Some(raw) => {
                let snapshot: CacheSnapshot<T> = serde_json::from_str(&raw).map_err(|e| {
                    StorageError::Serialization(format!("Corrupt cache snapshot '{}': {}", key, e))
                })?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    /// Most recently saved records for `key`, or `None` if never saved.
    pub async fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<Vec<T>>, StorageError> {
        Ok(self.snapshot(key).await?.map(|s| s.records))
    }

    /// Drop the snapshot for `key`.
    pub async fn invalidate(&self, key: &str) -> Result<(), StorageError> {
        self.store.delete(&self.storage_key(key)).await
    }
}
