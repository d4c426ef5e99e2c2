// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the offline sync engine.
//!
//! Uses the `metrics` crate facade. The host application installs the
//! exporter; without one every call is a no-op.
//!
//! # Metric Naming Convention
//! - `offline_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `entity`: customer, product, sale, ...
//! - `outcome` / `status`: applied, queued, failed / success, retryable, rejected

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record the outcome of one `record_mutation` call
pub fn record_mutation(entity: &str, outcome: &str) {
    counter!(
        "offline_sync_mutations_total",
        "entity" => entity.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record one replayed action during a drain
pub fn record_replay(entity: &str, status: &str) {
    counter!(
        "offline_sync_replays_total",
        "entity" => entity.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a completed drain pass
pub fn record_drain(duration: Duration, replayed: usize, failed: usize) {
    histogram!("offline_sync_drain_seconds").record(duration.as_secs_f64());
    counter!("offline_sync_drains_total").increment(1);
    counter!("offline_sync_drain_replayed_total").increment(replayed as u64);
    counter!("offline_sync_drain_failed_total").increment(failed as u64);
}

/// Record a drain request dropped because one was already running
pub fn record_drain_skipped(reason: &str) {
    counter!(
        "offline_sync_drains_skipped_total",
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Set the current pending log length
pub fn set_pending_actions(count: usize) {
    gauge!("offline_sync_pending_actions").set(count as f64);
}

/// Record a cache snapshot write
pub fn record_cache_write(key: &str, records: usize) {
    counter!(
        "offline_sync_cache_writes_total",
        "key" => key.to_string()
    )
    .increment(1);
    gauge!(
        "offline_sync_cache_records",
        "key" => key.to_string()
    )
    .set(records as f64);
}

/// Record a cache refresh attempt from the server
pub fn record_refresh(entity: &str, status: &str) {
    counter!(
        "offline_sync_refreshes_total",
        "entity" => entity.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Set online state (1 = online)
pub fn set_online(online: bool) {
    gauge!("offline_sync_online").set(if online { 1.0 } else { 0.0 });
}
