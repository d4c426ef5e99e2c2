//! Mutation path: direct call when online, durable queue otherwise.

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::action::{EntityKind, MutationOp, NewAction, TargetRef};
use crate::remote::RemoteError;

use super::{FailureKind, MutationOutcome, SyncEngine, SyncFailure};

impl SyncEngine {
    /// Record a create/update/delete from the UI.
    ///
    /// The server is called directly only when online, no earlier action of
    /// the same entity is still queued and the target is a server id.
    /// Otherwise, or when the direct call fails with a network error or
    /// timeout, the mutation is appended to the pending log.
    ///
    /// Never returns an error: the outcome says whether the mutation was
    /// applied, queued, or failed (rejected by the server, or the log could
    /// not take it).
    #[tracing::instrument(skip(self, data), fields(entity = %entity, op = %op))]
    pub async fn record_mutation(
        &self,
        entity: EntityKind,
        op: MutationOp,
        target_id: Option<TargetRef>,
        data: Value,
    ) -> MutationOutcome {
        if op != MutationOp::Add && target_id.is_none() {
            let failure = SyncFailure::new(
                entity,
                op,
                FailureKind::NeedsAttention,
                format!("{} requires a target id", op),
            );
            crate::metrics::record_mutation(&entity.to_string(), "failed");
            return MutationOutcome::Failed(failure);
        }

        let target_id = target_id.map(|target| self.resolve_target(target));
        let online = self.observe_connectivity();
        let behind_local = target_id.as_ref().is_some_and(TargetRef::is_local);
        let behind_queue = self.log.has_pending_for(entity).await;

        if online && !behind_local && !behind_queue {
            let target = target_id.as_ref().map(TargetRef::as_str);
            match self.send(entity, op, target, &data).await {
                Ok(response) => {
                    crate::metrics::record_mutation(&entity.to_string(), "applied");
                    self.refresh_entity(entity).await;
                    return MutationOutcome::Applied { response };
                }
                Err(e) if e.is_retryable() => {
                    warn!(error = %e, "Direct call failed, queueing mutation");
                }
                Err(e) => {
                    crate::metrics::record_mutation(&entity.to_string(), "failed");
                    return MutationOutcome::Failed(SyncFailure::new(
                        entity,
                        op,
                        FailureKind::NeedsAttention,
                        e.to_string(),
                    ));
                }
            }
        } else if online {
            debug!(behind_local, behind_queue, "Queueing behind unsynced work");
        }

        match self.log.append(NewAction::new(entity, op, target_id, data)).await {
            Ok(action) => {
                info!(id = %action.id, local_id = ?action.local_id, "Mutation queued");
                crate::metrics::record_mutation(&entity.to_string(), "queued");
                self.publish_log_state().await;
                MutationOutcome::Queued { action }
            }
            Err(e) => {
                warn!(error = %e, "Failed to queue mutation");
                crate::metrics::record_mutation(&entity.to_string(), "failed");
                MutationOutcome::Failed(SyncFailure::new(
                    entity,
                    op,
                    FailureKind::NeedsAttention,
                    e.to_string(),
                ))
            }
        }
    }

    /// Swap a placeholder whose add already reached the server for its
    /// server id.
    pub(super) fn resolve_target(&self, target: TargetRef) -> TargetRef {
        match target {
            TargetRef::Local(local) => match self.log.resolved_id(&local) {
                Some(server_id) => {
                    debug!(local_id = %local, server_id = %server_id, "Placeholder already resolved");
                    TargetRef::Server(server_id)
                }
                None => TargetRef::Local(local),
            },
            server => server,
        }
    }

    /// One remote call, bounded by the configured timeout.
    pub(super) async fn send(
        &self,
        entity: EntityKind,
        op: MutationOp,
        target: Option<&str>,
        data: &Value,
    ) -> Result<Value, RemoteError> {
        let timeout = self.config.request_timeout();
        let call = async {
            match (op, target) {
                (MutationOp::Add, _) => self.remote.create(entity, data).await,
                (MutationOp::Edit, Some(id)) => self.remote.update(entity, id, data).await,
                (MutationOp::Delete, Some(id)) => self.remote.delete(entity, id).await,
                (_, None) => Err(RemoteError::Rejected {
                    status: 400,
                    message: format!("{} requires a target id", op),
                }),
            }
        };

        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout(timeout)),
        }
    }

    /// Overwrite the cached snapshot of `entity` with the server's list.
    ///
    /// Returns false (cache untouched) if the fetch or the write failed.
    pub(super) async fn refresh_entity(&self, entity: EntityKind) -> bool {
        let timeout = self.config.request_timeout();
        let fetched = match tokio::time::timeout(timeout, self.remote.list(entity)).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout(timeout)),
        };

        let records = match fetched {
            Ok(records) => records,
            Err(e) => {
                warn!(entity = %entity, error = %e, "Cache refresh fetch failed");
                crate::metrics::record_refresh(&entity.to_string(), "fetch_failed");
                return false;
            }
        };

        match self.cache.save(entity.resource(), &records).await {
            Ok(()) => {
                debug!(entity = %entity, records = records.len(), "Cache refreshed from server");
                crate::metrics::record_refresh(&entity.to_string(), "success");
                true
            }
            Err(e) => {
                warn!(entity = %entity, error = %e, "Cache refresh write failed");
                crate::metrics::record_refresh(&entity.to_string(), "write_failed");
                false
            }
        }
    }
}
