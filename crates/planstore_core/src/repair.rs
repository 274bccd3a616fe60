//! Consistency repair for entity collections.
//!
//! A collection is consistent when every id in `ids` has an entry in
//! `entities` and every entry in `entities` is listed in `ids` exactly once.
//! Repair never drops data that is present in both:
//!
//! - ids without an entity are removed
//! - duplicate ids are removed (first occurrence wins)
//! - entities without an id are appended to `ids`
//!
//! Other top-level fields are left untouched. Values that are not
//! collection-shaped are returned as they are.

use serde_json::Value;
use std::collections::HashSet;
use tracing::warn;

/// Returns the id as a map key, if it can be one.
fn id_key(id: &Value) -> Option<String> {
    match id {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Returns true if the value has an `ids` array and an `entities` object.
#[must_use]
pub fn is_collection(state: &Value) -> bool {
    state.get("ids").is_some_and(Value::is_array)
        && state.get("entities").is_some_and(Value::is_object)
}

/// Returns true if the collection needs no repair.
///
/// Non-collection values are considered consistent.
#[must_use]
pub fn is_consistent(state: &Value) -> bool {
    let (Some(ids), Some(entities)) = (
        state.get("ids").and_then(Value::as_array),
        state.get("entities").and_then(Value::as_object),
    ) else {
        return true;
    };

    let mut seen = HashSet::with_capacity(ids.len());
    for id in ids {
        match id_key(id) {
            Some(key) if entities.contains_key(&key) => {
                if !seen.insert(key) {
                    return false;
                }
            }
            _ => return false,
        }
    }
    seen.len() == entities.len()
}

/// Repairs id/entity mismatches in a collection-shaped value.
///
/// Idempotent; a consistent collection comes back unchanged.
#[must_use]
pub fn repair_entity_collection(mut state: Value, logical_key: &str) -> Value {
    if is_consistent(&state) {
        return state;
    }
    let Some(obj) = state.as_object_mut() else {
        return state;
    };
    let (Some(Value::Array(ids)), Some(Value::Object(entities))) =
        (obj.get("ids"), obj.get("entities"))
    else {
        return state;
    };

    let mut seen = HashSet::with_capacity(entities.len());
    let mut repaired: Vec<Value> = Vec::with_capacity(entities.len());
    let mut dropped = 0usize;
    for id in ids {
        match id_key(id) {
            Some(key) if entities.contains_key(&key) => {
                if seen.insert(key) {
                    repaired.push(id.clone());
                } else {
                    dropped += 1;
                }
            }
            _ => dropped += 1,
        }
    }

    let mut appended = 0usize;
    for key in entities.keys() {
        if seen.insert(key.clone()) {
            repaired.push(Value::String(key.clone()));
            appended += 1;
        }
    }

    warn!(
        logical_key,
        dropped_ids = dropped,
        appended_ids = appended,
        "repaired inconsistent entity collection"
    );
    obj.insert("ids".to_string(), Value::Array(repaired));
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn consistent_state_is_untouched() {
        let state = json!({
            "ids": ["a", "b"],
            "entities": {"a": {"id": "a"}, "b": {"id": "b"}},
            "currentId": "a"
        });
        assert!(is_consistent(&state));
        assert_eq!(repair_entity_collection(state.clone(), "task"), state);
    }

    #[test]
    fn dangling_and_duplicate_ids_removed() {
        let state = json!({
            "ids": ["a", "ghost", "a", "b"],
            "entities": {"a": {}, "b": {}}
        });
        let repaired = repair_entity_collection(state, "task");
        assert_eq!(repaired["ids"], json!(["a", "b"]));
    }

    #[test]
    fn duplicate_ids_keep_first_occurrence() {
        let state = json!({
            "ids": ["b", "a", "b", "a", "c"],
            "entities": {"a": {}, "b": {}, "c": {}}
        });
        assert!(!is_consistent(&state));
        let repaired = repair_entity_collection(state, "task");
        assert_eq!(repaired["ids"], json!(["b", "a", "c"]));
        assert!(is_consistent(&repaired));
    }

    #[test]
    fn orphaned_entities_are_listed() {
        let state = json!({
            "ids": ["b"],
            "entities": {"a": {"title": "keep me"}, "b": {}}
        });
        let repaired = repair_entity_collection(state, "tag");
        assert_eq!(repaired["ids"], json!(["b", "a"]));
        assert_eq!(repaired["entities"]["a"]["title"], "keep me");
    }

    #[test]
    fn extra_fields_survive() {
        let state = json!({
            "ids": [],
            "entities": {"x": {}},
            "currentTaskId": "x"
        });
        let repaired = repair_entity_collection(state, "task");
        assert_eq!(repaired["currentTaskId"], "x");
        assert!(is_consistent(&repaired));
    }

    #[test]
    fn numeric_ids_match_entity_keys() {
        let state = json!({"ids": [1], "entities": {"1": {}}});
        assert!(is_consistent(&state));
    }

    #[test]
    fn non_collections_pass_through() {
        for value in [json!(null), json!([1, 2]), json!({"theme": "dark"}), json!("x")] {
            assert_eq!(repair_entity_collection(value.clone(), "globalConfig"), value);
        }
    }
}
