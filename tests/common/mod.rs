//! Shared fixtures for the integration test binaries.
//!
//! [`MockRemote`] is an in-memory REST backend: it keeps per-resource record
//! lists, assigns ids on create, logs every mutation call in arrival order,
//! and can delay or fail specific calls.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use offline_sync::{
    ConnectivityMonitor, EntityKind, InMemoryKvStore, KvStore, OfflineSyncConfig, RemoteApi,
    RemoteError, SyncEngine,
};

/// One mutation call as seen by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub op: &'static str,
    pub entity: EntityKind,
    pub id: Option<String>,
    pub data: Value,
}

#[derive(Default)]
pub struct MockRemote {
    records: Mutex<HashMap<EntityKind, Vec<Value>>>,
    calls: Mutex<Vec<Call>>,
    /// Mutation call number (1-indexed) -> error to return
    failures: Mutex<HashMap<usize, RemoteError>>,
    delays: Mutex<HashMap<&'static str, Duration>>,
    list_error: Mutex<Option<RemoteError>>,
    next_id: Mutex<u64>,
}

impl MockRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed(&self, entity: EntityKind, records: Vec<Value>) {
        self.records.lock().insert(entity, records);
    }

    pub fn records(&self, entity: EntityKind) -> Vec<Value> {
        self.records.lock().get(&entity).cloned().unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Calls rendered as `"{op} {entity}[ {id}]"`.
    pub fn call_log(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .map(|c| match &c.id {
                Some(id) => format!("{} {} {}", c.op, c.entity, id),
                None => format!("{} {}", c.op, c.entity),
            })
            .collect()
    }

    /// Make the `n`th mutation call (1-indexed, counted across all ops) fail.
    pub fn fail_call(&self, n: usize, error: RemoteError) {
        self.failures.lock().insert(n, error);
    }

    pub fn clear_failures(&self) {
        self.failures.lock().clear();
    }

    /// Delay every call of `op` ("create", "update", "delete", "list").
    pub fn set_delay(&self, op: &'static str, delay: Duration) {
        self.delays.lock().insert(op, delay);
    }

    pub fn fail_lists(&self, error: Option<RemoteError>) {
        *self.list_error.lock() = error;
    }

    async fn pause(&self, op: &'static str) {
        let delay = self.delays.lock().get(op).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn begin(&self, op: &'static str, entity: EntityKind, id: Option<&str>, data: &Value) -> Result<(), RemoteError> {
        let n = {
            let mut calls = self.calls.lock();
            calls.push(Call {
                op,
                entity,
                id: id.map(str::to_string),
                data: data.clone(),
            });
            calls.len()
        };
        match self.failures.lock().remove(&n) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn not_found(entity: EntityKind, id: &str) -> RemoteError {
        RemoteError::Rejected {
            status: 404,
            message: format!("{} {} not found", entity, id),
        }
    }
}

#[async_trait]
impl RemoteApi for MockRemote {
    async fn list(&self, entity: EntityKind) -> Result<Vec<Value>, RemoteError> {
        self.pause("list").await;
        if let Some(error) = self.list_error.lock().clone() {
            return Err(error);
        }
        Ok(self.records(entity))
    }

    async fn create(&self, entity: EntityKind, data: &Value) -> Result<Value, RemoteError> {
        self.pause("create").await;
        self.begin("create", entity, None, data)?;

        let id = {
            let mut next = self.next_id.lock();
            *next += 1;
            format!("{}-{}", entity, *next)
        };
        let mut record = match data {
            Value::Object(map) => map.clone(),
            _ => serde_json::Map::new(),
        };
        record.insert("_id".to_string(), Value::String(id));
        let record = Value::Object(record);

        self.records.lock().entry(entity).or_default().push(record.clone());
        Ok(record)
    }

    async fn update(&self, entity: EntityKind, id: &str, data: &Value) -> Result<Value, RemoteError> {
        self.pause("update").await;
        self.begin("update", entity, Some(id), data)?;

        let mut records = self.records.lock();
        let record = records
            .entry(entity)
            .or_default()
            .iter_mut()
            .find(|r| r.get("_id").and_then(Value::as_str) == Some(id))
            .ok_or_else(|| Self::not_found(entity, id))?;
        if let (Value::Object(target), Value::Object(patch)) = (&mut *record, data) {
            for (k, v) in patch {
                target.insert(k.clone(), v.clone());
            }
        }
        Ok(record.clone())
    }

    async fn delete(&self, entity: EntityKind, id: &str) -> Result<Value, RemoteError> {
        self.pause("delete").await;
        self.begin("delete", entity, Some(id), &Value::Null)?;

        let mut records = self.records.lock();
        let list = records.entry(entity).or_default();
        let before = list.len();
        list.retain(|r| r.get("_id").and_then(Value::as_str) != Some(id));
        if list.len() == before {
            return Err(Self::not_found(entity, id));
        }
        Ok(Value::Null)
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn test_config() -> OfflineSyncConfig {
    OfflineSyncConfig {
        request_timeout_ms: 1_000,
        ..Default::default()
    }
}

pub async fn open_engine(
    remote: Arc<dyn RemoteApi>,
    store: Arc<dyn KvStore>,
    connectivity: Arc<ConnectivityMonitor>,
) -> Arc<SyncEngine> {
    SyncEngine::open_with_store(test_config(), store, remote, connectivity)
        .await
        .expect("engine should open")
}

/// Engine over a fresh in-memory store.
pub async fn memory_engine(remote: Arc<dyn RemoteApi>, online: bool) -> (Arc<SyncEngine>, Arc<ConnectivityMonitor>) {
    let connectivity = Arc::new(ConnectivityMonitor::new(online));
    let engine = open_engine(remote, Arc::new(InMemoryKvStore::new()), connectivity.clone()).await;
    (engine, connectivity)
}
