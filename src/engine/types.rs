//! Public types for the sync engine.

use serde::Serialize;
use serde_json::Value;

use crate::action::{now_millis, EntityKind, MutationOp, PendingAction};

/// What the UI should tell the user about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Transient; the action stays queued and the next drain retries it
    Retryable,
    /// Will not succeed unchanged; held until the user acts
    NeedsAttention,
}

/// A failure surfaced to the UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncFailure {
    /// Queued action concerned, if the mutation made it into the log
    pub action_id: Option<String>,
    pub entity: EntityKind,
    pub op: MutationOp,
    pub kind: FailureKind,
    pub message: String,
    /// When it happened (epoch millis)
    pub at: i64,
}

impl SyncFailure {
    pub(crate) fn new(entity: EntityKind, op: MutationOp, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            action_id: None,
            entity,
            op,
            kind,
            message: message.into(),
            at: now_millis(),
        }
    }

    pub(crate) fn for_action(action: &PendingAction, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            action_id: Some(action.id.clone()),
            ..Self::new(action.entity, action.op, kind, message)
        }
    }
}

impl std::fmt::Display for SyncFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} failed: {}", self.op, self.entity, self.message)
    }
}

/// Process-wide sync state, published to subscribers on every change.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SyncStatus {
    pub is_online: bool,
    /// True only while a drain is in flight
    pub is_syncing: bool,
    /// Completion time of the last clean drain (epoch millis)
    pub last_sync: Option<i64>,
    pub has_pending: bool,
    pub pending_count: usize,
    /// Some queued action is held until the user acts
    pub needs_attention: bool,
    /// Most recent failure of the last drain, cleared by a clean drain
    pub last_failure: Option<SyncFailure>,
}

/// Result of [`super::SyncEngine::record_mutation`].
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    /// Accepted by the server
    Applied { response: Value },
    /// Durably queued for the next drain. For an `add`, `action.local_id` is
    /// the placeholder id shown in the local view.
    Queued { action: PendingAction },
    /// Neither applied nor queued
    Failed(SyncFailure),
}

impl MutationOutcome {
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    #[must_use]
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued { .. })
    }

    /// Id to use for the record in the UI: server id when applied, local
    /// placeholder when a queued `add`.
    #[must_use]
    pub fn record_id(&self, id_field: &str) -> Option<String> {
        match self {
            Self::Applied { response } => crate::optimistic::record_id(response, id_field),
            Self::Queued { action } => action
                .local_id
                .clone()
                .or_else(|| action.target_id.as_ref().map(|t| t.as_str().to_string())),
            Self::Failed(_) => None,
        }
    }
}

/// Summary of one replay pass.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DrainReport {
    /// Actions accepted by the server
    pub replayed: usize,
    /// Actions not attempted because an earlier action of the same entity failed
    pub skipped: usize,
    /// Actions not attempted because they are held
    pub held: usize,
    pub failures: Vec<SyncFailure>,
    /// Actions accepted by the server that the log could not drop; they
    /// replay again on the next pass
    pub stuck: usize,
    /// Entity caches refreshed from the server after replay
    pub refreshed: Vec<EntityKind>,
    /// Entity caches whose refresh failed (cache left as it was)
    pub refresh_failed: Vec<EntityKind>,
    /// Log length after the pass
    pub remaining: usize,
}

impl DrainReport {
    /// Every queued action was attempted, accepted and dropped from the log.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.held == 0 && self.skipped == 0 && self.stuck == 0
    }
}

/// Result of [`super::SyncEngine::drain`].
#[derive(Debug, Clone, PartialEq)]
pub enum DrainOutcome {
    /// Another drain is in flight; this call did nothing
    AlreadyRunning,
    /// Connectivity reports offline; nothing attempted
    Offline,
    Completed(DrainReport),
}

impl DrainOutcome {
    #[must_use]
    pub fn report(&self) -> Option<&DrainReport> {
        match self {
            Self::Completed(report) => Some(report),
            _ => None,
        }
    }
}

/// Where [`super::SyncEngine::fetch`] got its base records from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Remote,
    Cache,
    /// Offline and never cached
    Empty,
}

/// Records for one entity with queued mutations applied on top.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    pub records: Vec<Value>,
    pub source: DataSource,
}
