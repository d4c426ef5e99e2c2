//! # Offline Sync Engine
//!
//! Offline-first data synchronization for a client that talks to a REST
//! backend over an unreliable network.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Sync Engine                          │
//! │  • record_mutation(): direct call online, queue otherwise  │
//! │  • drain(): single-flight ordered replay                   │
//! │  • status: online / syncing / last sync / pending          │
//! └─────────────────────────────────────────────────────────────┘
//!            │                    │                    ▲
//!            ▼                    ▼                    │ offline→online
//! ┌─────────────────────┐ ┌─────────────────────┐ ┌──────────────────────┐
//! │ Pending Action Log  │ │    Cache Layer      │ │ Connectivity         │
//! │ • durable, ordered  │ │ • last server state │ │ Observer             │
//! │ • placeholder ids   │ │ • wholesale writes  │ │ • watch channel      │
//! └─────────────────────┘ └─────────────────────┘ └──────────────────────┘
//!            │                    │
//!            └──────────┬─────────┘
//!                       ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                KvStore (SQLite WAL / memory)                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use offline_sync::{
//!     ConnectivityMonitor, EntityKind, MutationOp, OfflineSyncConfig, RemoteApi, SyncEngine,
//! };
//! use serde_json::json;
//!
//! # async fn run(remote: Arc<dyn RemoteApi>) -> Result<(), offline_sync::StorageError> {
//! let config = OfflineSyncConfig {
//!     store_path: Some("./offline_sync.db".into()),
//!     ..Default::default()
//! };
//! let connectivity = Arc::new(ConnectivityMonitor::new(true));
//! let engine = SyncEngine::open(config, remote, connectivity.clone()).await?;
//! engine.start().await;
//!
//! let outcome = engine
//!     .record_mutation(EntityKind::Customer, MutationOp::Add, None, json!({"name": "Ana"}))
//!     .await;
//! println!("customer id: {:?}", outcome.record_id("_id"));
//!
//! // Offline reads: cached snapshot with queued mutations applied
//! let customers = engine.view(EntityKind::Customer).await?;
//! println!("{} customers", customers.len());
//!
//! engine.shutdown();
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`engine`]: The [`SyncEngine`] orchestrating everything below
//! - [`pending_log`]: Durable ordered log of unconfirmed mutations
//! - [`cache`]: Per-resource snapshots of server state
//! - [`storage`]: Key-value backends (SQLite, memory)
//! - [`remote`]: The REST contract the host implements
//! - [`connectivity`]: Online/offline observation
//! - [`optimistic`]: Local view derived from cache + log
//! - [`resilience`]: Retry for store access

pub mod config;
pub mod action;
pub mod storage;
pub mod resilience;
pub mod cache;
pub mod pending_log;
pub mod remote;
pub mod connectivity;
pub mod optimistic;
pub mod engine;
pub mod metrics;

pub use config::OfflineSyncConfig;
pub use action::{EntityKind, MutationOp, NewAction, PendingAction, TargetRef, LOCAL_ID_PREFIX};
pub use cache::{CacheLayer, CacheSnapshot};
pub use pending_log::{PendingActionLog, PendingLogStats};
pub use storage::traits::{KvStore, StorageError};
pub use storage::memory::InMemoryKvStore;
pub use storage::sql::SqlKvStore;
pub use resilience::retry::RetryConfig;
pub use remote::{RemoteApi, RemoteError};
pub use connectivity::{ConnectivityMonitor, ConnectivityObserver};
pub use engine::{
    DataSource, DrainOutcome, DrainReport, FailureKind, FetchResult, MutationOutcome, SyncEngine,
    SyncFailure, SyncStatus,
};
