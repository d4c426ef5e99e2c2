//! Best-effort local view: cached snapshot + queued mutations.
//!
//! The view is derived on demand and never persisted. Once the log drains and
//! the snapshot is refreshed from the server, the view equals server truth.

use serde_json::Value;

use crate::action::{MutationOp, PendingAction};

/// String form of a record's id field, accepting string or numeric ids.
pub fn record_id(record: &Value, id_field: &str) -> Option<String> {
    match record.get(id_field)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Apply one queued action to `records`.
pub fn apply(records: &mut Vec<Value>, action: &PendingAction, id_field: &str) {
    match action.op {
        MutationOp::Add => {
            let mut record = action.data.clone();
            if let (Value::Object(map), Some(local_id)) = (&mut record, &action.local_id) {
                map.entry(id_field.to_string())
                    .or_insert_with(|| Value::String(local_id.clone()));
            }
            records.push(record);
        }
        MutationOp::Edit => {
            let Some(target) = &action.target_id else { return };
            let Value::Object(patch) = &action.data else { return };
            if let Some(Value::Object(existing)) = records
                .iter_mut()
                .find(|r| record_id(r, id_field).as_deref() == Some(target.as_str()))
            {
                for (k, v) in patch {
                    existing.insert(k.clone(), v.clone());
                }
            }
        }
        MutationOp::Delete => {
            if let Some(target) = &action.target_id {
                records.retain(|r| record_id(r, id_field).as_deref() != Some(target.as_str()));
            }
        }
    }
}

/// Apply every action in order on top of `base`.
pub fn overlay<'a, I>(mut base: Vec<Value>, actions: I, id_field: &str) -> Vec<Value>
where
    I: IntoIterator<Item = &'a PendingAction>,
{
    for action in actions {
        apply(&mut base, action, id_field);
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{EntityKind, NewAction, TargetRef};
    use serde_json::json;

    fn stamped(action: NewAction) -> PendingAction {
        PendingAction::from_new(action)
    }

    #[test]
    fn test_record_id_accepts_numbers() {
        assert_eq!(record_id(&json!({"_id": "c1"}), "_id").as_deref(), Some("c1"));
        assert_eq!(record_id(&json!({"_id": 7}), "_id").as_deref(), Some("7"));
        assert_eq!(record_id(&json!({"name": "x"}), "_id"), None);
    }

    #[test]
    fn test_add_uses_local_id() {
        let add = stamped(NewAction::add(EntityKind::Product, json!({"productName": "Rice"})));
        let view = overlay(vec![], [&add], "_id");

        assert_eq!(view.len(), 1);
        assert_eq!(view[0]["_id"], json!(add.local_id.unwrap()));
        assert_eq!(view[0]["productName"], "Rice");
    }

    #[test]
    fn test_edit_then_delete_on_local_record() {
        let add = stamped(NewAction::add(EntityKind::Customer, json!({"name": "Ana", "credit": 0})));
        let local = TargetRef::Local(add.local_id.clone().unwrap());
        let edit = stamped(NewAction::edit(EntityKind::Customer, local.clone(), json!({"credit": 50})));

        let view = overlay(vec![], [&add, &edit], "_id");
        assert_eq!(view[0]["credit"], 50);
        assert_eq!(view[0]["name"], "Ana");

        let delete = stamped(NewAction::delete(EntityKind::Customer, local));
        let view = overlay(view, [&delete], "_id");
        assert!(view.is_empty());
    }

    #[test]
    fn test_edit_of_unknown_record_is_ignored() {
        let base = vec![json!({"_id": "c1", "credit": 100})];
        let edit = stamped(NewAction::edit(EntityKind::Customer, TargetRef::Server("zz".into()), json!({"credit": 1})));

        assert_eq!(overlay(base.clone(), [&edit], "_id"), base);
    }

    #[test]
    fn test_delete_server_record() {
        let base = vec![json!({"_id": "c1"}), json!({"_id": "c2"})];
        let delete = stamped(NewAction::delete(EntityKind::Customer, TargetRef::Server("c1".into())));

        assert_eq!(overlay(base, [&delete], "_id"), vec![json!({"_id": "c2"})]);
    }
}
