// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Drain: replay the pending log against the remote API.
//!
//! # Algorithm
//!
//! 1. Single-flight: a second caller returns [`DrainOutcome::AlreadyRunning`].
//! 2. Snapshot the log and replay it as one globally ordered sequence,
//!    awaiting each call before the next.
//! 3. A failure blocks the rest of that entity's chain; other entities go on.
//! 4. Successful actions leave the log one by one (an `add` also resolves its
//!    placeholder id in later actions, and remembers it for late references).
//! 5. Refresh the cache of every entity with a successful replay.
//! 6. Publish status. `last_sync` only moves when nothing failed or stayed held.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::action::{now_millis, EntityKind, MutationOp, PendingAction, TargetRef};

use super::{DrainOutcome, DrainReport, FailureKind, SyncEngine, SyncFailure, SyncStatus};

/// Clears the single-flight flag and the published `is_syncing` however the
/// drain exits, cancellation included.
struct DrainGuard<'a> {
    flag: &'a AtomicBool,
    status: &'a watch::Sender<SyncStatus>,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        // Status first: the flag still keeps other drains out
        self.status.send_if_modified(|s| std::mem::replace(&mut s.is_syncing, false));
        self.flag.store(false, Ordering::Release);
    }
}

/// Per-pass replay bookkeeping.
#[derive(Default)]
struct ReplayState {
    /// Entities whose chain stopped this pass
    blocked: HashSet<EntityKind>,
    /// Placeholder id -> server id, for adds replayed this pass
    resolved: HashMap<String, String>,
    /// Entities with at least one accepted replay
    touched: BTreeSet<EntityKind>,
    /// Ids accepted by the server whose log removal failed
    unremoved: Vec<String>,
    /// Ids accepted by the server this pass
    replayed_ids: HashSet<String>,
}

impl SyncEngine {
    /// Replay every queued action, in enqueue order.
    ///
    /// Never fails: problems are reported in the [`DrainReport`] and in
    /// [`SyncStatus::last_failure`](super::SyncStatus::last_failure).
    #[tracing::instrument(skip(self))]
    pub async fn drain(&self) -> DrainOutcome {
        if !self.observe_connectivity() {
            debug!("Offline, drain skipped");
            crate::metrics::record_drain_skipped("offline");
            return DrainOutcome::Offline;
        }

        if self.syncing.swap(true, Ordering::AcqRel) {
            debug!("Drain already in flight");
            crate::metrics::record_drain_skipped("already_running");
            return DrainOutcome::AlreadyRunning;
        }

        let _guard = DrainGuard {
            flag: &self.syncing,
            status: &self.status,
        };
        self.status.send_modify(|s| s.is_syncing = true);

        let start = Instant::now();
        let report = self.replay_all().await;
        let stats = self.log.stats().await;

        self.status.send_modify(|s| {
            s.is_syncing = false;
            s.has_pending = stats.pending > 0;
            s.pending_count = stats.pending;
            s.needs_attention = stats.needs_attention > 0;
            if report.is_clean() {
                s.last_sync = Some(now_millis());
                s.last_failure = None;
            } else if let Some(failure) = report.failures.last() {
                s.last_failure = Some(failure.clone());
            }
        });

        crate::metrics::record_drain(start.elapsed(), report.replayed, report.failures.len());
        info!(
            replayed = report.replayed,
            failed = report.failures.len(),
            skipped = report.skipped,
            held = report.held,
            remaining = report.remaining,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Drain finished"
        );

        DrainOutcome::Completed(report)
    }

    async fn replay_all(&self) -> DrainReport {
        let actions = self.log.list().await;
        let mut report = DrainReport::default();
        let mut state = ReplayState::default();

        if actions.is_empty() {
            return report;
        }
        info!(pending = actions.len(), "Starting drain");

        for (index, action) in actions.iter().enumerate() {
            if state.blocked.contains(&action.entity) {
                report.skipped += 1;
                continue;
            }

            if action.needs_attention {
                debug!(id = %action.id, "Action held, blocking its entity");
                report.held += 1;
                state.blocked.insert(action.entity);
                continue;
            }

            let target = match &action.target_id {
                None => None,
                Some(TargetRef::Server(id)) => Some(id.clone()),
                Some(TargetRef::Local(local)) => match state
                    .resolved
                    .get(local)
                    .cloned()
                    .or_else(|| self.log.resolved_id(local))
                {
                    Some(server_id) => Some(server_id),
                    None if add_pending_before(&actions[..index], local) => {
                        // Its add has not gone through yet
                        report.skipped += 1;
                        state.blocked.insert(action.entity);
                        continue;
                    }
                    None => {
                        let message = format!("no pending add for placeholder id {}", local);
                        self.fail(action, FailureKind::NeedsAttention, message, &mut state, &mut report)
                            .await;
                        continue;
                    }
                },
            };

            match self.send(action.entity, action.op, target.as_deref(), &action.data).await {
                Ok(response) => {
                    self.accept(action, &response, &mut state).await;
                    report.replayed += 1;
                    crate::metrics::record_replay(&action.entity.to_string(), "success");
                }
                Err(e) => {
                    let kind = if e.is_retryable() {
                        FailureKind::Retryable
                    } else {
                        FailureKind::NeedsAttention
                    };
                    self.fail(action, kind, e.to_string(), &mut state, &mut report).await;
                }
            }
        }

        self.sweep(&mut state, &mut report).await;

        for entity in &state.touched {
            if self.refresh_entity(*entity).await {
                report.refreshed.push(*entity);
            } else {
                report.refresh_failed.push(*entity);
            }
        }

        report.remaining = self.log.len().await;
        report
    }

    /// Take an accepted action out of the log.
    async fn accept(&self, action: &PendingAction, response: &serde_json::Value, state: &mut ReplayState) {
        state.touched.insert(action.entity);
        state.replayed_ids.insert(action.id.clone());

        let server_id = crate::optimistic::record_id(response, &self.config.id_field);
        let removal = match (action.op, &action.local_id, server_id) {
            (MutationOp::Add, Some(local_id), Some(server_id)) => {
                let result = self.log.resolve_add(&action.id, local_id, &server_id).await;
                state.resolved.insert(local_id.clone(), server_id);
                result.map(|_| ())
            }
            (MutationOp::Add, Some(local_id), None) => {
                warn!(
                    id = %action.id,
                    local_id = %local_id,
                    id_field = %self.config.id_field,
                    "Add response carries no id, later actions on this record cannot resolve"
                );
                self.log.remove(&action.id).await.map(|_| ())
            }
            _ => self.log.remove(&action.id).await.map(|_| ()),
        };

        if let Err(e) = removal {
            warn!(id = %action.id, error = %e, "Replayed action could not be removed from log");
            state.unremoved.push(action.id.clone());
        }
    }

    /// Record a failed replay and stop the entity's chain.
    async fn fail(
        &self,
        action: &PendingAction,
        kind: FailureKind,
        message: String,
        state: &mut ReplayState,
        report: &mut DrainReport,
    ) {
        let hold = kind == FailureKind::NeedsAttention;
        warn!(
            id = %action.id,
            entity = %action.entity,
            op = %action.op,
            attempts = action.attempts.saturating_add(1),
            hold,
            error = %message,
            "Replay failed"
        );

        if let Err(e) = self.log.record_failure(&action.id, &message, hold).await {
            warn!(id = %action.id, error = %e, "Failed to record replay failure");
        }

        let status = if hold { "rejected" } else { "retryable" };
        crate::metrics::record_replay(&action.entity.to_string(), status);

        state.blocked.insert(action.entity);
        report.failures.push(SyncFailure::for_action(action, kind, message));
    }

    /// Retry removals that failed during the pass. After a clean pass the log
    /// can only hold replayed actions or ones appended meanwhile, so it is
    /// cleared when every leftover was replayed.
    async fn sweep(&self, state: &mut ReplayState, report: &mut DrainReport) {
        for id in std::mem::take(&mut state.unremoved) {
            if let Err(e) = self.log.remove(&id).await {
                warn!(id = %id, error = %e, "Replayed action still in log, it will replay again");
                report.stuck += 1;
            }
        }

        if !report.is_clean() {
            return;
        }

        let leftover = self.log.list().await;
        if !leftover.is_empty() && leftover.iter().all(|a| state.replayed_ids.contains(&a.id)) {
            if let Err(e) = self.log.clear().await {
                warn!(error = %e, "Consistency clear of pending log failed");
            }
        }
    }
}

/// Whether an `add` minting `local_id` sits earlier in this pass.
fn add_pending_before(earlier: &[PendingAction], local_id: &str) -> bool {
    earlier
        .iter()
        .any(|a| a.op == MutationOp::Add && a.local_id.as_deref() == Some(local_id))
}
