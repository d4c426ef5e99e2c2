use async_trait::async_trait;
use dashmap::DashMap;
use super::traits::{KvStore, StorageError};

/// Volatile store. Survives engine restarts only while the same instance is
/// shared, which is what tests use to simulate a process restart.
pub struct InMemoryKvStore {
    data: DashMap<String, String>,
}

impl InMemoryKvStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    /// Get current key count
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Clear all keys
    pub fn clear(&self) {
        self.data.clear();
    }
}

impl Default for InMemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.data.get(key).map(|r| r.value().clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.data.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.data.contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_store_is_empty() {
        let store = InMemoryKvStore::new();
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let store = InMemoryKvStore::new();

        store.set("k1", "v1").await.unwrap();

        assert_eq!(store.get("k1").await.unwrap().as_deref(), Some("v1"));
        assert!(store.exists("k1").await.unwrap());
    }

    #[tokio::test]
    async fn test_get_nonexistent_returns_none() {
        let store = InMemoryKvStore::new();

        assert!(store.get("nonexistent").await.unwrap().is_none());
        assert!(!store.exists("nonexistent").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = InMemoryKvStore::new();
        store.set("to-delete", "x").await.unwrap();
        assert_eq!(store.len(), 1);

        store.delete("to-delete").await.unwrap();
        assert_eq!(store.len(), 0);
        assert!(store.get("to-delete").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_nonexistent_is_ok() {
        let store = InMemoryKvStore::new();
        assert!(store.delete("nonexistent").await.is_ok());
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let store = InMemoryKvStore::new();

        store.set("same", "1").await.unwrap();
        store.set("same", "2").await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("same").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_concurrent_access() {
        use std::sync::Arc;

        let store = Arc::new(InMemoryKvStore::new());
        let mut handles = vec![];

        for batch in 0..10 {
            let store_clone = store.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..10 {
                    store_clone.set(&format!("batch-{}-key-{}", batch, i), "v").await.unwrap();
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.len(), 100);
    }
}
