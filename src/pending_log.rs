// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Durable log of mutations awaiting server confirmation.
//!
//! The log is the single durable record of "work not yet confirmed by the
//! server". An action leaves the log only after the remote API accepted it.
//!
//! The whole log lives under one key in the [`KvStore`]; every mutation of the
//! log rewrites that key in a single `set`, so each operation (including the
//! remove-and-rewrite done when an `add` resolves its placeholder id) is
//! atomic on disk. An async mutex serializes writers, and the in-memory mirror
//! is only updated after the write succeeded.
//!
//! Order is enqueue order. The log never reorders or deduplicates.
//!
//! Placeholder ids resolved by replayed adds are remembered under
//! `{key_prefix}:resolved_ids`, written in the same `set_many` as the log
//! rewrite, so a `local-…` id a caller still holds keeps pointing at its
//! server record after the add has left the log.

use std::collections::HashMap;
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::action::{now_millis, EntityKind, NewAction, PendingAction, TargetRef};
use crate::storage::traits::{KvStore, StorageError};

/// Resolutions kept for late references; the oldest go first.
const MAX_RESOLUTIONS: usize = 1_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Resolution {
    server_id: String,
    resolved_at: i64,
}

/// Point-in-time counters for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingLogStats {
    /// Actions currently queued
    pub pending: usize,
    /// Actions held back until released
    pub needs_attention: usize,
    /// Enqueue time of the oldest queued action (epoch millis)
    pub oldest_created_at: Option<i64>,
}

pub struct PendingActionLog {
    store: Arc<dyn KvStore>,
    key: String,
    resolved_key: String,
    max_actions: usize,
    actions: Mutex<Vec<PendingAction>>,
    /// Placeholder id -> server id. Only written while `actions` is locked.
    resolved: parking_lot::Mutex<HashMap<String, Resolution>>,
}

impl PendingActionLog {
    /// Open the log stored under `{key_prefix}:pending_actions`, loading any
    /// actions left over from a previous run.
    pub async fn open(
        store: Arc<dyn KvStore>,
        key_prefix: &str,
        max_actions: usize,
    ) -> Result<Self, StorageError> {
        let key = format!("{}:pending_actions", key_prefix);
        let resolved_key = format!("{}:resolved_ids", key_prefix);

        let actions: Vec<PendingAction> = match store.get(&key).await? {
            Some(raw) => serde_json::from_str(&raw).map_err(|e| {
                StorageError::Serialization(format!("Corrupt pending action log: {}", e))
            })?,
            None => Vec::new(),
        };

        let resolved: HashMap<String, Resolution> = match store.get(&resolved_key).await? {
            Some(raw) => serde_json::from_str(&raw).map_err(|e| {
                StorageError::Serialization(format!("Corrupt placeholder resolutions: {}", e))
            })?,
            None => HashMap::new(),
        };

        if !actions.is_empty() {
            warn!(pending = actions.len(), "Pending action log has actions from previous run");
        }
        crate::metrics::set_pending_actions(actions.len());

        Ok(Self {
            store,
            key,
            resolved_key,
            max_actions,
            actions: Mutex::new(actions),
            resolved: parking_lot::Mutex::new(resolved),
        })
    }

    async fn persist(&self, actions: &[PendingAction]) -> Result<(), StorageError> {
        if actions.is_empty() {
            self.store.delete(&self.key).await?;
        } else {
            let encoded = serde_json::to_string(actions)?;
            self.store.set(&self.key, &encoded).await?;
        }
        crate::metrics::set_pending_actions(actions.len());
        Ok(())
    }

    /// Stamp and durably append an action at the tail.
    ///
    /// The returned record is on disk when this resolves.
    pub async fn append(&self, action: NewAction) -> Result<PendingAction, StorageError> {
        let mut actions = self.actions.lock().await;
        if actions.len() >= self.max_actions {
            return Err(StorageError::LogFull {
                pending: actions.len(),
                max: self.max_actions,
            });
        }

        let record = PendingAction::from_new(action);
        let mut next = actions.clone();
        next.push(record.clone());
        self.persist(&next).await?;
        *actions = next;

        debug!(
            id = %record.id,
            entity = %record.entity,
            op = %record.op,
            pending = actions.len(),
            "Action appended to pending log"
        );
        Ok(record)
    }

    /// All actions in enqueue order.
    pub async fn list(&self) -> Vec<PendingAction> {
        self.actions.lock().await.clone()
    }

    /// Queued actions for one entity type, in enqueue order.
    pub async fn list_for(&self, entity: EntityKind) -> Vec<PendingAction> {
        self.actions
            .lock()
            .await
            .iter()
            .filter(|a| a.entity == entity)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.actions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.actions.lock().await.is_empty()
    }

    /// Whether any action for `entity` is still queued.
    pub async fn has_pending_for(&self, entity: EntityKind) -> bool {
        self.actions.lock().await.iter().any(|a| a.entity == entity)
    }

    pub async fn stats(&self) -> PendingLogStats {
        let actions = self.actions.lock().await;
        PendingLogStats {
            pending: actions.len(),
            needs_attention: actions.iter().filter(|a| a.needs_attention).count(),
            oldest_created_at: actions.first().map(|a| a.created_at),
        }
    }

    /// Apply `f` to a copy of the log and persist it if `f` reports a change.
    async fn rewrite<F>(&self, f: F) -> Result<bool, StorageError>
    where
        F: FnOnce(&mut Vec<PendingAction>) -> bool,
    {
        let mut actions = self.actions.lock().await;
        let mut next = actions.clone();
        if !f(&mut next) {
            return Ok(false);
        }
        self.persist(&next).await?;
        *actions = next;
        Ok(true)
    }

    /// Remove one action by id. Unknown ids are a no-op (`Ok(false)`).
    pub async fn remove(&self, id: &str) -> Result<bool, StorageError> {
        let removed = self
            .rewrite(|actions| {
                let before = actions.len();
                actions.retain(|a| a.id != id);
                actions.len() != before
            })
            .await?;

        if removed {
            debug!(id, "Action removed from pending log");
        }
        Ok(removed)
    }

    /// Remove every action.
    pub async fn clear(&self) -> Result<(), StorageError> {
        let mut actions = self.actions.lock().await;
        if !actions.is_empty() {
            warn!(remaining = actions.len(), "Clearing non-empty pending action log");
        }
        self.persist(&[]).await?;
        actions.clear();
        Ok(())
    }

    /// Remove a replayed `add`, rewrite later references to its placeholder
    /// id and remember the resolution, in one write.
    ///
    /// Returns how many actions had their target rewritten.
    pub async fn resolve_add(
        &self,
        id: &str,
        local_id: &str,
        server_id: &str,
    ) -> Result<usize, StorageError> {
        let mut actions = self.actions.lock().await;
        let mut next = actions.clone();
        next.retain(|a| a.id != id);

        let mut rewritten = 0;
        for action in next.iter_mut() {
            if matches!(&action.target_id, Some(TargetRef::Local(l)) if l == local_id) {
                action.target_id = Some(TargetRef::Server(server_id.to_string()));
                rewritten += 1;
            }
        }

        let mut resolved = self.resolved.lock().clone();
        resolved.insert(
            local_id.to_string(),
            Resolution {
                server_id: server_id.to_string(),
                resolved_at: now_millis(),
            },
        );
        prune_resolutions(&mut resolved);

        let encoded_actions = serde_json::to_string(&next)?;
        let encoded_resolved = serde_json::to_string(&resolved)?;
        self.store
            .set_many(&[
                (self.key.as_str(), encoded_actions.as_str()),
                (self.resolved_key.as_str(), encoded_resolved.as_str()),
            ])
            .await?;
        crate::metrics::set_pending_actions(next.len());
        *actions = next;
        *self.resolved.lock() = resolved;

        info!(local_id, server_id, rewritten, "Resolved local id");
        Ok(rewritten)
    }

    /// Server id a replayed `add` assigned to `local_id`, if known.
    #[must_use]
    pub fn resolved_id(&self, local_id: &str) -> Option<String> {
        self.resolved.lock().get(local_id).map(|r| r.server_id.clone())
    }

    /// Record a failed replay attempt. `hold` keeps the action out of later
    /// drains until [`release`](Self::release) is called.
    pub async fn record_failure(&self, id: &str, error: &str, hold: bool) -> Result<bool, StorageError> {
        self.rewrite(|actions| match actions.iter_mut().find(|a| a.id == id) {
            Some(action) => {
                action.attempts = action.attempts.saturating_add(1);
                action.last_error = Some(error.to_string());
                action.needs_attention |= hold;
                true
            }
            None => false,
        })
        .await
    }

    /// Clear the hold on an action so the next drain retries it.
    pub async fn release(&self, id: &str) -> Result<bool, StorageError> {
        let released = self
            .rewrite(|actions| match actions.iter_mut().find(|a| a.id == id && a.needs_attention) {
                Some(action) => {
                    action.needs_attention = false;
                    true
                }
                None => false,
            })
            .await?;

        if released {
            info!(id, "Held action released for retry");
        }
        Ok(released)
    }
}

fn prune_resolutions(resolved: &mut HashMap<String, Resolution>) {
    while resolved.len() > MAX_RESOLUTIONS {
        let oldest = resolved
            .iter()
            .min_by_key(|(_, r)| r.resolved_at)
            .map(|(local_id, _)| local_id.clone());
        match oldest {
            Some(local_id) => {
                resolved.remove(&local_id);
            }
            None => break,
        }
    }
}
