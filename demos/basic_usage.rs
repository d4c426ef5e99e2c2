// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic offline-sync usage example.
//!
//! Demonstrates:
//! 1. Opening the engine over a SQLite store
//! 2. Recording mutations while offline (queued + local view)
//! 3. Editing a record that only has a placeholder id
//! 4. Reconnecting: the watcher drains the log in order
//! 5. Displaying sync status and metrics
//! 6. Clean shutdown
//!
//! The backend is an in-process stand-in for the REST API, so nothing needs
//! to be running.
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use parking_lot::Mutex;
use serde_json::{json, Value};

use offline_sync::{
    ConnectivityMonitor, EntityKind, MutationOp, OfflineSyncConfig, RemoteApi, RemoteError,
    SyncEngine, TargetRef,
};

const DB_PATH: &str = "./offline_sync_demo.db";

/// In-process REST backend standing in for `/api/{resource}`.
#[derive(Default)]
struct DemoBackend {
    records: Mutex<HashMap<EntityKind, Vec<Value>>>,
    next_id: Mutex<u64>,
}

#[async_trait]
impl RemoteApi for DemoBackend {
    async fn list(&self, entity: EntityKind) -> Result<Vec<Value>, RemoteError> {
        Ok(self.records.lock().get(&entity).cloned().unwrap_or_default())
    }

    async fn create(&self, entity: EntityKind, data: &Value) -> Result<Value, RemoteError> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let id = {
            let mut next = self.next_id.lock();
            *next += 1;
            format!("{}{:04}", &entity.resource()[..1], *next)
        };
        let mut record = data.clone();
        if let Value::Object(map) = &mut record {
            map.insert("_id".into(), Value::String(id));
        }
        self.records.lock().entry(entity).or_default().push(record.clone());
        Ok(record)
    }

    async fn update(&self, entity: EntityKind, id: &str, data: &Value) -> Result<Value, RemoteError> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let mut records = self.records.lock();
        let record = records
            .entry(entity)
            .or_default()
            .iter_mut()
            .find(|r| r["_id"] == id)
            .ok_or_else(|| RemoteError::Rejected { status: 404, message: format!("{} not found", id) })?;
        if let (Value::Object(target), Value::Object(patch)) = (&mut *record, data) {
            for (k, v) in patch {
                target.insert(k.clone(), v.clone());
            }
        }
        Ok(record.clone())
    }

    async fn delete(&self, entity: EntityKind, id: &str) -> Result<Value, RemoteError> {
        self.records.lock().entry(entity).or_default().retain(|r| r["_id"] != id);
        Ok(Value::Null)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install metrics recorder (captures everything the engine emits)
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .map_err(|_| "failed to install metrics recorder")?;

    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║           offline-sync: Basic Usage Example                   ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Open the engine (starts offline)
    // ─────────────────────────────────────────────────────────────────────────
    println!("📦 Opening engine over {}...", DB_PATH);
    let config = OfflineSyncConfig {
        store_path: Some(DB_PATH.into()),
        request_timeout_ms: 5_000,
        ..Default::default()
    };
    let backend = Arc::new(DemoBackend::default());
    let connectivity = Arc::new(ConnectivityMonitor::new(false));
    let engine = SyncEngine::open(config, backend.clone(), connectivity.clone()).await?;
    engine.start().await;
    println!("   ✅ Started. Status: {:?}\n", engine.get_status());

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Record mutations offline
    // ─────────────────────────────────────────────────────────────────────────
    println!("📝 Recording while offline...");
    let product = engine
        .record_mutation(EntityKind::Product, MutationOp::Add, None, json!({"productName": "Rice", "price": 40}))
        .await;
    let customer = engine
        .record_mutation(EntityKind::Customer, MutationOp::Add, None, json!({"name": "Ana", "credit": 0}))
        .await;
    let customer_id = customer.record_id("_id").unwrap_or_default();
    println!("   ├─ product queued: {}", product.is_queued());
    println!("   └─ customer queued with placeholder id {}", customer_id);

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Edit the offline-created customer by its placeholder
    // ─────────────────────────────────────────────────────────────────────────
    engine
        .record_mutation(
            EntityKind::Customer,
            MutationOp::Edit,
            Some(TargetRef::parse(&customer_id)),
            json!({"credit": 150}),
        )
        .await;

    println!("\n👀 Local view (cache + pending):");
    for record in engine.view(EntityKind::Customer).await? {
        println!("   └─ {}", record);
    }
    let status = engine.get_status();
    println!("   Pending: {} (has_pending={})", status.pending_count, status.has_pending);

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Reconnect: the watcher drains the log
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📶 Going online...");
    let mut status_rx = engine.subscribe_status();
    connectivity.set_online(true);
    tokio::time::timeout(
        Duration::from_secs(10),
        status_rx.wait_for(|s| !s.is_syncing && !s.has_pending),
    )
    .await??;

    let status = engine.get_status();
    println!("   ✅ Drained. last_sync={:?} pending={}", status.last_sync, status.pending_count);

    println!("\n🔎 Server state:");
    for entity in [EntityKind::Product, EntityKind::Customer] {
        for record in backend.list(entity).await.unwrap_or_default() {
            println!("   └─ {}: {}", entity, record);
        }
    }

    println!("\n🗂  Cached customers (refreshed after drain):");
    let cached: Vec<Value> = engine.cache().load("customers").await?.unwrap_or_default();
    for record in &cached {
        println!("   └─ {}", record);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Dump raw metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📈 Raw Metrics:");
    dump_metrics(&snapshotter);

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Clean shutdown
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🛑 Shutting down...");
    engine.shutdown();
    drop(engine);

    println!("\n🧹 Cleaning up store file...");
    for suffix in ["", "-shm", "-wal"] {
        let _ = std::fs::remove_file(format!("{}{}", DB_PATH, suffix));
    }

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                    Example complete!                          ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    Ok(())
}

/// Dump all captured metrics grouped by kind
fn dump_metrics(snapshotter: &Snapshotter) {
    let snapshot = snapshotter.snapshot();

    let mut counters: Vec<_> = vec![];
    let mut gauges: Vec<_> = vec![];
    let mut histograms: Vec<_> = vec![];

    for (composite_key, _, _, value) in snapshot.into_vec() {
        let (_, key) = composite_key.into_parts();
        let name = key.name().to_string();
        let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };

        match value {
            DebugValue::Counter(v) => counters.push((name, label_str, v)),
            DebugValue::Gauge(v) => gauges.push((name, label_str, v.into_inner())),
            DebugValue::Histogram(samples) => {
                let count = samples.len();
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                histograms.push((name, label_str, count, sum));
            }
        }
    }

    counters.sort_by(|a, b| a.0.cmp(&b.0));
    gauges.sort_by(|a, b| a.0.cmp(&b.0));
    histograms.sort_by(|a, b| a.0.cmp(&b.0));

    if !counters.is_empty() {
        println!("   ┌─ Counters");
        for (name, labels, value) in &counters {
            println!("   │  └─ {}{} = {}", name, labels, value);
        }
    }
    if !gauges.is_empty() {
        println!("   ├─ Gauges");
        for (name, labels, value) in &gauges {
            println!("   │  └─ {}{} = {:.2}", name, labels, value);
        }
    }
    if !histograms.is_empty() {
        println!("   └─ Histograms");
        for (name, labels, count, sum) in &histograms {
            println!("      └─ {}{} count={} sum={:.4}s", name, labels, count, sum);
        }
    }
    if counters.is_empty() && gauges.is_empty() && histograms.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
}
