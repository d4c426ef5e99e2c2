//! Engine lifecycle: connectivity watcher, start and shutdown.

use std::sync::Arc;

use tracing::{debug, info};

use super::SyncEngine;

impl SyncEngine {
    /// Start watching connectivity. Every offline→online edge triggers a
    /// drain. With `drain_on_start`, leftover work is drained right away when
    /// already online.
    ///
    /// Calling `start` twice is a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn start(self: &Arc<Self>) {
        {
            let mut watcher = self.watcher.lock();
            if watcher.is_some() {
                debug!("Sync engine already started");
                return;
            }

            // Baseline taken here: edges after start() returns must reach the task
            let mut rx = self.connectivity.subscribe();
            let mut was_online = *rx.borrow_and_update();
            self.set_online(was_online);

            let engine = Arc::downgrade(self);
            *watcher = Some(tokio::spawn(async move {
                while rx.changed().await.is_ok() {
                    let online = *rx.borrow_and_update();
                    let Some(engine) = engine.upgrade() else {
                        break;
                    };

                    engine.set_online(online);
                    if online && !was_online {
                        info!("Connectivity restored, draining pending actions");
                        engine.drain().await;
                    }
                    was_online = online;
                }
                debug!("Connectivity watcher stopped");
            }));
        }

        info!(
            online = self.is_online(),
            pending = self.log.len().await,
            "Sync engine started"
        );

        if self.config.drain_on_start && self.is_online() && !self.log.is_empty().await {
            self.drain().await;
        }
    }

    /// Stop watching connectivity. Queued work stays in the log.
    pub fn shutdown(&self) {
        if let Some(handle) = self.watcher.lock().take() {
            handle.abort();
            info!("Sync engine shut down");
        }
    }

    /// Whether the connectivity watcher is running.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.watcher.lock().is_some()
    }

    /// Read the observer, publishing the value if the status is stale.
    pub(super) fn observe_connectivity(&self) -> bool {
        let online = self.connectivity.is_online();
        self.set_online(online);
        online
    }

    pub(super) fn set_online(&self, online: bool) {
        let changed = self.status.send_if_modified(|s| {
            if s.is_online == online {
                return false;
            }
            s.is_online = online;
            true
        });
        if changed {
            crate::metrics::set_online(online);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use tokio::sync::watch;

    use crate::action::{EntityKind, NewAction};
    use crate::config::OfflineSyncConfig;
    use crate::connectivity::ConnectivityMonitor;
    use crate::engine::SyncStatus;
    use crate::remote::{RemoteApi, RemoteError};
    use crate::storage::memory::InMemoryKvStore;

    use super::*;

    #[derive(Default)]
    struct CountingRemote {
        creates: Mutex<usize>,
        create_delay: Mutex<Option<Duration>>,
    }

    #[async_trait]
    impl RemoteApi for CountingRemote {
        async fn list(&self, _entity: EntityKind) -> Result<Vec<Value>, RemoteError> {
            Ok(Vec::new())
        }

        async fn create(&self, _entity: EntityKind, _data: &Value) -> Result<Value, RemoteError> {
            let delay = *self.create_delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            *self.creates.lock() += 1;
            Ok(json!({"_id": "srv"}))
        }

        async fn update(&self, _entity: EntityKind, id: &str, _data: &Value) -> Result<Value, RemoteError> {
            Ok(json!({"_id": id}))
        }

        async fn delete(&self, _entity: EntityKind, _id: &str) -> Result<Value, RemoteError> {
            Ok(Value::Null)
        }
    }

    async fn open(remote: Arc<CountingRemote>, connectivity: Arc<ConnectivityMonitor>) -> Arc<SyncEngine> {
        SyncEngine::open_with_store(
            OfflineSyncConfig::default(),
            Arc::new(InMemoryKvStore::new()),
            remote,
            connectivity,
        )
        .await
        .unwrap()
    }

    async fn wait_for_status(rx: &mut watch::Receiver<SyncStatus>, what: impl FnMut(&SyncStatus) -> bool) {
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(what))
            .await
            .expect("status never reached")
            .unwrap();
    }

    #[tokio::test]
    async fn test_reconnect_triggers_drain() {
        let remote = Arc::new(CountingRemote::default());
        let connectivity = Arc::new(ConnectivityMonitor::new(false));
        let engine = open(remote.clone(), connectivity.clone()).await;
        let mut status = engine.subscribe_status();
        engine.start().await;
        assert!(engine.is_started());

        engine.pending_log().append(NewAction::add(EntityKind::Sale, json!({"total": 5}))).await.unwrap();
        // Flipped right after start(), before the watcher task first runs
        connectivity.set_online(true);

        wait_for_status(&mut status, |s| s.last_sync.is_some() && !s.is_syncing).await;
        assert!(engine.pending_log().is_empty().await);
        assert_eq!(*remote.creates.lock(), 1);

        engine.shutdown();
        assert!(!engine.is_started());
    }

    #[tokio::test]
    async fn test_start_drains_leftover_work() {
        let remote = Arc::new(CountingRemote::default());
        let engine = open(remote.clone(), Arc::new(ConnectivityMonitor::new(true))).await;
        engine.pending_log().append(NewAction::add(EntityKind::Purchase, json!({}))).await.unwrap();

        engine.start().await;

        assert!(engine.pending_log().is_empty().await);
        assert_eq!(*remote.creates.lock(), 1);
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_going_offline_updates_status() {
        let connectivity = Arc::new(ConnectivityMonitor::new(true));
        let engine = open(Arc::new(CountingRemote::default()), connectivity.clone()).await;
        let mut status = engine.subscribe_status();
        engine.start().await;

        connectivity.set_online(false);

        wait_for_status(&mut status, |s| !s.is_online).await;
        assert!(!engine.get_status().is_online);
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_published_status_tracks_observer_before_start() {
        let connectivity = Arc::new(ConnectivityMonitor::new(false));
        let engine = open(Arc::new(CountingRemote::default()), connectivity.clone()).await;
        let status = engine.subscribe_status();

        connectivity.set_online(true);

        assert!(engine.get_status().is_online);
        assert!(status.borrow().is_online);
    }

    #[tokio::test]
    async fn test_shutdown_mid_drain_clears_syncing() {
        let remote = Arc::new(CountingRemote::default());
        *remote.create_delay.lock() = Some(Duration::from_secs(5));
        let connectivity = Arc::new(ConnectivityMonitor::new(false));
        let engine = open(remote.clone(), connectivity.clone()).await;
        let mut status = engine.subscribe_status();
        engine.start().await;
        engine.pending_log().append(NewAction::add(EntityKind::Sale, json!({}))).await.unwrap();

        connectivity.set_online(true);
        wait_for_status(&mut status, |s| s.is_syncing).await;

        engine.shutdown();

        wait_for_status(&mut status, |s| !s.is_syncing).await;
        assert!(!engine.get_status().is_syncing);
        assert_eq!(engine.pending_log().len().await, 1);
        assert_eq!(*remote.creates.lock(), 0);

        // The single-flight flag was released too
        *remote.create_delay.lock() = None;
        let outcome = engine.drain().await;
        assert_eq!(outcome.report().map(|r| r.replayed), Some(1));
        assert!(engine.pending_log().is_empty().await);
    }
}
