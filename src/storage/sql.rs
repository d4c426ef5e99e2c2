// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQLite key-value store: the durable store behind the cache and the
//! pending action log.
//!
//! Schema:
//! ```sql
//! CREATE TABLE kv_entries (
//!   key TEXT PRIMARY KEY,
//!   value TEXT NOT NULL,
//!   updated_at INTEGER NOT NULL  -- epoch millis
//! )
//! ```
//!
//! Every `set` is a single upsert statement, so a value is replaced
//! atomically, and `set_many` wraps its upserts in one transaction. The
//! database runs in WAL journal mode with `synchronous = FULL` so a resolved
//! write survives a crash.

use async_trait::async_trait;
use sqlx::{AnyPool, Row, any::AnyPoolOptions};
use super::traits::{KvStore, StorageError};
use crate::resilience::retry::{retry, RetryConfig};
use std::path::Path;
use std::sync::Once;
use std::time::Duration;
use tracing::debug;

// SQLx `Any` driver requires runtime installation
static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

pub struct SqlKvStore {
    pool: AnyPool,
    path: String,
}

impl SqlKvStore {
    /// Open (or create) the store at `path`, with startup-mode retry.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        install_drivers();

        let path = path.as_ref().to_string_lossy().to_string();
        let url = format!("sqlite://{}?mode=rwc", path);

        let pool = retry("kv_connect", &RetryConfig::startup(), || async {
            AnyPoolOptions::new()
                // One connection: writes are serialized, nothing to gain from more
                .max_connections(1)
                .acquire_timeout(Duration::from_secs(10))
                .connect(&url)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))
        })
        .await?;

        let store = Self { pool, path };
        store.configure_journal().await?;
        store.init_schema().await?;
        debug!(path = %store.path, "Key-value store opened");
        Ok(store)
    }

    /// Path to the SQLite file.
    pub fn path(&self) -> &str {
        &self.path
    }

    async fn configure_journal(&self) -> Result<(), StorageError> {
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to enable WAL mode: {}", e)))?;

        // FULL: a write is on disk once the call resolves
        sqlx::query("PRAGMA synchronous = FULL")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to set synchronous mode: {}", e)))?;

        Ok(())
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        let sql = r#"
            CREATE TABLE IF NOT EXISTS kv_entries (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
        "#;

        retry("kv_init_schema", &RetryConfig::startup(), || async {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))
        })
        .await?;

        Ok(())
    }

    /// Count stored keys.
    pub async fn count_all(&self) -> Result<u64, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) as cnt FROM kv_entries")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let count: i64 = row.try_get("cnt").unwrap_or(0);
        Ok(count as u64)
    }

    /// Close the pool, flushing the WAL.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl KvStore for SqlKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        retry("kv_get", &RetryConfig::query(), || async {
            let result = sqlx::query("SELECT value FROM kv_entries WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;

            match result {
                Some(row) => {
                    // TEXT may come back as bytes through the Any driver
                    let value = row
                        .try_get::<String, _>("value")
                        .ok()
                        .or_else(|| {
                            row.try_get::<Vec<u8>, _>("value")
                                .ok()
                                .and_then(|bytes| String::from_utf8(bytes).ok())
                        })
                        .ok_or_else(|| {
                            StorageError::Serialization(format!("Unreadable value for key '{}'", key))
                        })?;
                    Ok(Some(value))
                }
                None => Ok(None),
            }
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let updated_at = crate::action::now_millis();

        retry("kv_set", &RetryConfig::query(), || async {
            sqlx::query(
                "INSERT INTO kv_entries (key, value, updated_at) VALUES (?, ?, ?)
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at",
            )
            .bind(key)
            .bind(value)
            .bind(updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StorageError> {
        let updated_at = crate::action::now_millis();

        retry("kv_set_many", &RetryConfig::query(), || async {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;

            for (key, value) in entries {
                sqlx::query(
                    "INSERT INTO kv_entries (key, value, updated_at) VALUES (?, ?, ?)
                     ON CONFLICT(key) DO UPDATE SET
                        value = excluded.value,
                        updated_at = excluded.updated_at",
                )
                .bind(*key)
                .bind(*value)
                .bind(updated_at)
                .execute(&mut *tx)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            }

            tx.commit()
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        retry("kv_delete", &RetryConfig::query(), || async {
            sqlx::query("DELETE FROM kv_entries WHERE key = ?")
                .bind(key)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        retry("kv_exists", &RetryConfig::query(), || async {
            let result = sqlx::query("SELECT 1 FROM kv_entries WHERE key = ? LIMIT 1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            Ok(result.is_some())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_set_get_delete() {
        let dir = tempdir().unwrap();
        let store = SqlKvStore::open(dir.path().join("kv.db")).await.unwrap();

        assert!(store.get("missing").await.unwrap().is_none());

        store.set("customers", "[1,2]").await.unwrap();
        assert_eq!(store.get("customers").await.unwrap().as_deref(), Some("[1,2]"));
        assert!(store.exists("customers").await.unwrap());

        store.delete("customers").await.unwrap();
        assert!(store.get("customers").await.unwrap().is_none());
        assert!(!store.exists("customers").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_overwrites_single_row() {
        let dir = tempdir().unwrap();
        let store = SqlKvStore::open(dir.path().join("kv.db")).await.unwrap();

        store.set("k", "old").await.unwrap();
        store.set("k", "new").await.unwrap();

        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("new"));
        assert_eq!(store.count_all().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_persistence_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kv_restart.db");

        {
            let store = SqlKvStore::open(&path).await.unwrap();
            store.set("pending", "[\"a\"]").await.unwrap();
            store.close().await;
        }

        let store = SqlKvStore::open(&path).await.unwrap();
        assert_eq!(store.get("pending").await.unwrap().as_deref(), Some("[\"a\"]"));
    }

    #[tokio::test]
    async fn test_set_many_writes_every_key() {
        let dir = tempdir().unwrap();
        let store = SqlKvStore::open(dir.path().join("kv.db")).await.unwrap();
        store.set("log", "old").await.unwrap();

        store.set_many(&[("log", "[]"), ("resolved", "{}")]).await.unwrap();

        assert_eq!(store.get("log").await.unwrap().as_deref(), Some("[]"));
        assert_eq!(store.get("resolved").await.unwrap().as_deref(), Some("{}"));
        assert_eq!(store.count_all().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_delete_nonexistent_is_ok() {
        let dir = tempdir().unwrap();
        let store = SqlKvStore::open(dir.path().join("kv.db")).await.unwrap();
        assert!(store.delete("nope").await.is_ok());
    }
}
