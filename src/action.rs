// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Pending action data structures.
//!
//! A [`PendingAction`] is one mutation (add / edit / delete) that has not yet
//! been confirmed by the server. Actions are stored in the
//! [`PendingActionLog`](crate::pending_log::PendingActionLog) in enqueue order
//! and replayed by the engine's drain.
//!
//! # Example
//!
//! ```
//! use offline_sync::{EntityKind, MutationOp, NewAction};
//! use serde_json::json;
//!
//! let action = NewAction::add(EntityKind::Product, json!({"productName": "Rice"}));
//! assert_eq!(action.op, MutationOp::Add);
//! assert!(action.target_id.is_none());
//! assert_eq!(EntityKind::Product.resource(), "products");
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Prefix used for ids minted locally for records created while offline.
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Resource types the engine knows how to replay.
///
/// Closed set: every variant maps to one `/api/{resource}` collection and one
/// cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Customer,
    Product,
    Sale,
    Expense,
    Purchase,
    /// Personal finance ledger entries
    Transaction,
}

impl EntityKind {
    pub const ALL: [EntityKind; 6] = [
        Self::Customer,
        Self::Product,
        Self::Sale,
        Self::Expense,
        Self::Purchase,
        Self::Transaction,
    ];

    /// REST collection name, also used as the cache key.
    #[must_use]
    pub fn resource(&self) -> &'static str {
        match self {
            Self::Customer => "customers",
            Self::Product => "products",
            Self::Sale => "sales",
            Self::Expense => "expenses",
            Self::Purchase => "purchases",
            Self::Transaction => "transactions",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Customer => write!(f, "customer"),
            Self::Product => write!(f, "product"),
            Self::Sale => write!(f, "sale"),
            Self::Expense => write!(f, "expense"),
            Self::Purchase => write!(f, "purchase"),
            Self::Transaction => write!(f, "transaction"),
        }
    }
}

/// Mutation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationOp {
    Add,
    Edit,
    Delete,
}

impl std::fmt::Display for MutationOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Edit => write!(f, "edit"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Identifier of the entity an edit/delete applies to.
///
/// `Local` ids are placeholders for records created offline whose server id
/// is not known yet. They are rewritten to `Server` ids once the originating
/// `add` has been replayed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum TargetRef {
    Server(String),
    Local(String),
}

impl TargetRef {
    /// Classify a raw id coming from the UI (local ids carry [`LOCAL_ID_PREFIX`]).
    #[must_use]
    pub fn parse(id: &str) -> Self {
        if id.starts_with(LOCAL_ID_PREFIX) {
            Self::Local(id.to_string())
        } else {
            Self::Server(id.to_string())
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Server(id) | Self::Local(id) => id,
        }
    }

    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }
}

impl std::fmt::Display for TargetRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A mutation as requested by the caller, before it is stamped by the log.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAction {
    pub entity: EntityKind,
    pub op: MutationOp,
    pub target_id: Option<TargetRef>,
    pub data: Value,
}

impl NewAction {
    pub fn new(entity: EntityKind, op: MutationOp, target_id: Option<TargetRef>, data: Value) -> Self {
        Self { entity, op, target_id, data }
    }

    pub fn add(entity: EntityKind, data: Value) -> Self {
        Self::new(entity, MutationOp::Add, None, data)
    }

    pub fn edit(entity: EntityKind, target: TargetRef, data: Value) -> Self {
        Self::new(entity, MutationOp::Edit, Some(target), data)
    }

    pub fn delete(entity: EntityKind, target: TargetRef) -> Self {
        Self::new(entity, MutationOp::Delete, Some(target), Value::Null)
    }
}

/// A durably queued mutation awaiting transmission to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    /// Locally generated action id (UUID v4), not an entity id
    pub id: String,
    pub entity: EntityKind,
    pub op: MutationOp,
    /// Entity the mutation applies to; `None` for `add`
    pub target_id: Option<TargetRef>,
    /// Placeholder id handed out for an `add` (`local-<uuid>`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_id: Option<String>,
    /// Opaque payload passed through to the remote API
    pub data: Value,
    /// Enqueue time (epoch millis)
    pub created_at: i64,
    /// Failed replay attempts so far
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Held back from replay until released (server rejected it)
    #[serde(default)]
    pub needs_attention: bool,
}

impl PendingAction {
    /// Stamp a new action with a fresh id and timestamp.
    pub fn from_new(action: NewAction) -> Self {
        let local_id = (action.op == MutationOp::Add)
            .then(|| format!("{}{}", LOCAL_ID_PREFIX, uuid::Uuid::new_v4()));

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            entity: action.entity,
            op: action.op,
            target_id: action.target_id,
            local_id,
            data: action.data,
            created_at: now_millis(),
            attempts: 0,
            last_error: None,
            needs_attention: false,
        }
    }

    /// Age of the action in milliseconds, for staleness diagnostics.
    #[must_use]
    pub fn age_millis(&self) -> i64 {
        (now_millis() - self.created_at).max(0)
    }
}

pub(crate) fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_add_gets_local_placeholder() {
        let action = PendingAction::from_new(NewAction::add(EntityKind::Customer, json!({"name": "Ana"})));
        let local = action.local_id.expect("add should mint a local id");
        assert!(local.starts_with(LOCAL_ID_PREFIX));
        assert!(action.target_id.is_none());
        assert_eq!(action.attempts, 0);
    }

    #[test]
    fn test_edit_has_no_local_id() {
        let action = PendingAction::from_new(NewAction::edit(
            EntityKind::Customer,
            TargetRef::Server("c1".into()),
            json!({"credit": 5}),
        ));
        assert!(action.local_id.is_none());
        assert_eq!(action.target_id, Some(TargetRef::Server("c1".into())));
    }

    #[test]
    fn test_ids_are_unique() {
        let a = PendingAction::from_new(NewAction::add(EntityKind::Product, json!({})));
        let b = PendingAction::from_new(NewAction::add(EntityKind::Product, json!({})));
        assert_ne!(a.id, b.id);
        assert_ne!(a.local_id, b.local_id);
    }

    #[test]
    fn test_target_ref_parse() {
        assert_eq!(TargetRef::parse("c1"), TargetRef::Server("c1".into()));
        assert!(TargetRef::parse("local-1234").is_local());
        assert_eq!(TargetRef::parse("local-1234").as_str(), "local-1234");
    }

    #[test]
    fn test_entity_display_and_resource() {
        assert_eq!(EntityKind::Customer.to_string(), "customer");
        assert_eq!(EntityKind::Customer.resource(), "customers");
        assert_eq!(EntityKind::Transaction.resource(), "transactions");
        assert_eq!(MutationOp::Delete.to_string(), "delete");
    }

    #[test]
    fn test_action_serde_shape() {
        let action = PendingAction::from_new(NewAction::delete(EntityKind::Sale, TargetRef::Server("s9".into())));
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value["entity"], "sale");
        assert_eq!(value["op"], "delete");
        assert_eq!(value["target_id"]["kind"], "server");
        assert_eq!(value["target_id"]["id"], "s9");

        let back: PendingAction = serde_json::from_value(value).unwrap();
        assert_eq!(back, action);
    }

    #[test]
    fn test_legacy_record_without_bookkeeping_fields() {
        let raw = json!({
            "id": "a1",
            "entity": "expense",
            "op": "add",
            "target_id": null,
            "data": {"amount": 3},
            "created_at": 1
        });
        let action: PendingAction = serde_json::from_value(raw).unwrap();
        assert_eq!(action.attempts, 0);
        assert!(!action.needs_attention);
        assert!(action.local_id.is_none());
    }
}
