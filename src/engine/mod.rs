// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync engine.
//!
//! The [`SyncEngine`] ties the components together:
//! - [`CacheLayer`] snapshots for offline reads
//! - [`PendingActionLog`] for mutations the server has not confirmed
//! - a [`RemoteApi`] the mutations are replayed against
//! - a [`ConnectivityObserver`] whose offline→online edge triggers a drain
//!
//! # Flow
//!
//! ```text
//! record_mutation ──online──▶ RemoteApi ──ok──▶ refresh cache
//!        │                       │
//!        │                  network/timeout
//!        ▼                       ▼
//!    offline ─────────────▶ PendingActionLog ──drain()──▶ RemoteApi (in order)
//!                                                          │
//!                                                   refresh touched caches
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use offline_sync::{
//!     ConnectivityMonitor, EntityKind, MutationOp, OfflineSyncConfig, RemoteApi, SyncEngine,
//! };
//! use serde_json::json;
//!
//! # async fn example(remote: Arc<dyn RemoteApi>) -> Result<(), offline_sync::StorageError> {
//! let connectivity = Arc::new(ConnectivityMonitor::new(false));
//! let engine = SyncEngine::open(OfflineSyncConfig::default(), remote, connectivity.clone()).await?;
//! engine.start().await;
//!
//! // Offline: queued and visible in the local view
//! let outcome = engine
//!     .record_mutation(EntityKind::Product, MutationOp::Add, None, json!({"productName": "Rice"}))
//!     .await;
//! assert!(outcome.is_queued());
//! assert!(engine.get_status().has_pending);
//!
//! // Back online: the watcher drains the log
//! connectivity.set_online(true);
//! # Ok(())
//! # }
//! ```

mod types;
mod mutation;
mod drain;
mod lifecycle;

pub use types::{
    DataSource, DrainOutcome, DrainReport, FailureKind, FetchResult, MutationOutcome, SyncFailure,
    SyncStatus,
};

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::action::{EntityKind, PendingAction};
use crate::cache::CacheLayer;
use crate::config::OfflineSyncConfig;
use crate::connectivity::ConnectivityObserver;
use crate::optimistic;
use crate::pending_log::PendingActionLog;
use crate::remote::RemoteApi;
use crate::storage::memory::InMemoryKvStore;
use crate::storage::sql::SqlKvStore;
use crate::storage::traits::{KvStore, StorageError};

/// Offline-first sync orchestrator.
///
/// Owns its [`SyncStatus`]; independent instances never share state.
///
/// # Thread Safety
///
/// `Send + Sync`, shared as `Arc<SyncEngine>`. Log writes are serialized by
/// the log's own lock and `drain()` is single-flight, so calling entry points
/// from several tasks is safe.
pub struct SyncEngine {
    pub(super) config: OfflineSyncConfig,

    pub(super) cache: CacheLayer,

    pub(super) log: PendingActionLog,

    pub(super) remote: Arc<dyn RemoteApi>,

    pub(super) connectivity: Arc<dyn ConnectivityObserver>,

    /// Status (broadcast to subscribers)
    pub(super) status: watch::Sender<SyncStatus>,

    /// Single-flight flag for drain
    pub(super) syncing: AtomicBool,

    /// Connectivity watcher task, present between start() and shutdown()
    pub(super) watcher: Mutex<Option<JoinHandle<()>>>,
}

impl SyncEngine {
    /// Open the engine with the store described by `config`.
    ///
    /// Without `store_path` an in-memory store is used.
    pub async fn open(
        config: OfflineSyncConfig,
        remote: Arc<dyn RemoteApi>,
        connectivity: Arc<dyn ConnectivityObserver>,
    ) -> Result<Arc<Self>, StorageError> {
        let store: Arc<dyn KvStore> = match config.store_path {
            Some(ref path) => Arc::new(SqlKvStore::open(path).await?),
            None => {
                warn!("No store path configured - pending actions will not survive a restart!");
                Arc::new(InMemoryKvStore::new())
            }
        };
        Self::open_with_store(config, store, remote, connectivity).await
    }

    /// Open the engine over an existing store.
    ///
    /// Status is rebuilt from the log found in the store.
    pub async fn open_with_store(
        config: OfflineSyncConfig,
        store: Arc<dyn KvStore>,
        remote: Arc<dyn RemoteApi>,
        connectivity: Arc<dyn ConnectivityObserver>,
    ) -> Result<Arc<Self>, StorageError> {
        let log = PendingActionLog::open(store.clone(), &config.key_prefix, config.max_pending_actions).await?;
        let cache = CacheLayer::new(store, &config.key_prefix);

        let stats = log.stats().await;
        let is_online = connectivity.is_online();
        let (status, _rx) = watch::channel(SyncStatus {
            is_online,
            has_pending: stats.pending > 0,
            pending_count: stats.pending,
            needs_attention: stats.needs_attention > 0,
            ..SyncStatus::default()
        });
        crate::metrics::set_online(is_online);

        Ok(Arc::new(Self {
            config,
            cache,
            log,
            remote,
            connectivity,
            status,
            syncing: AtomicBool::new(false),
            watcher: Mutex::new(None),
        }))
    }

    #[must_use]
    pub fn config(&self) -> &OfflineSyncConfig {
        &self.config
    }

    #[must_use]
    pub fn cache(&self) -> &CacheLayer {
        &self.cache
    }

    #[must_use]
    pub fn pending_log(&self) -> &PendingActionLog {
        &self.log
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    /// Current status snapshot, as published to subscribers.
    #[must_use]
    pub fn get_status(&self) -> SyncStatus {
        self.observe_connectivity();
        self.status.borrow().clone()
    }

    /// Receiver notified on every status change.
    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Queued actions in enqueue order.
    pub async fn pending_actions(&self) -> Vec<PendingAction> {
        self.log.list().await
    }

    /// Clear the hold on a rejected action so the next drain retries it.
    pub async fn release_action(&self, id: &str) -> Result<bool, StorageError> {
        let released = self.log.release(id).await?;
        self.publish_log_state().await;
        Ok(released)
    }

    /// Local view of `entity`: cached snapshot with queued mutations applied.
    pub async fn view(&self, entity: EntityKind) -> Result<Vec<Value>, StorageError> {
        let base: Vec<Value> = self.cache.load(entity.resource()).await?.unwrap_or_default();
        let pending = self.log.list_for(entity).await;
        Ok(optimistic::overlay(base, &pending, &self.config.id_field))
    }

    /// Refresh `entity` from the server when possible, then return the view.
    pub async fn fetch(&self, entity: EntityKind) -> Result<FetchResult, StorageError> {
        let mut source = DataSource::Cache;
        if self.is_online() && self.refresh_entity(entity).await {
            source = DataSource::Remote;
        }
        if source == DataSource::Cache && self.cache.load::<Value>(entity.resource()).await?.is_none() {
            source = DataSource::Empty;
        }

        Ok(FetchResult {
            records: self.view(entity).await?,
            source,
        })
    }

    /// Re-derive log-based status fields.
    pub(super) async fn publish_log_state(&self) {
        let stats = self.log.stats().await;
        self.status.send_modify(|s| {
            s.has_pending = stats.pending > 0;
            s.pending_count = stats.pending;
            s.needs_attention = stats.needs_attention > 0;
        });
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        if let Some(handle) = self.watcher.lock().take() {
            handle.abort();
        }
    }
}
