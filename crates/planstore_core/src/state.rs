//! Typed entity collection state.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};

/// A normalized entity collection: ordered ids plus an id-to-entity map.
///
/// Top-level fields other than `ids` and `entities` are kept in `extra` and
/// written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "E: Serialize", deserialize = "E: Deserialize<'de>"))]
pub struct EntityState<E> {
    /// Entity ids in display order.
    pub ids: Vec<String>,
    /// Entities by id.
    pub entities: BTreeMap<String, E>,
    /// Any other top-level fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl<E> Default for EntityState<E> {
    fn default() -> Self {
        Self {
            ids: Vec::new(),
            entities: BTreeMap::new(),
            extra: Map::new(),
        }
    }
}

impl<E> EntityState<E> {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entity with the given id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&E> {
        self.entities.get(id)
    }

    /// Inserts or replaces an entity, appending its id if new.
    pub fn insert(&mut self, id: impl Into<String>, entity: E) {
        let id = id.into();
        if self.entities.insert(id.clone(), entity).is_none() {
            self.ids.push(id);
        }
    }

    /// Removes an entity and its id.
    pub fn remove(&mut self, id: &str) -> Option<E> {
        let removed = self.entities.remove(id)?;
        self.ids.retain(|i| i != id);
        Some(removed)
    }

    /// Returns the number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns true if the collection is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Iterates over entities in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &E)> {
        self.ids
            .iter()
            .filter_map(|id| self.entities.get(id).map(|e| (id.as_str(), e)))
    }

    /// Returns the collection with ids and entities brought back in line.
    ///
    /// Same rules as [`crate::repair::repair_entity_collection`].
    #[must_use]
    pub fn repaired(mut self) -> Self {
        let mut seen = HashSet::with_capacity(self.entities.len());
        let entities = &self.entities;
        self.ids
            .retain(|id| entities.contains_key(id) && seen.insert(id.clone()));
        for id in self.entities.keys() {
            if !seen.contains(id) {
                self.ids.push(id.clone());
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Tag {
        title: String,
    }

    fn tag(title: &str) -> Tag {
        Tag {
            title: title.to_string(),
        }
    }

    #[test]
    fn insert_and_remove_keep_ids_in_sync() {
        let mut state = EntityState::new();
        state.insert("a", tag("one"));
        state.insert("b", tag("two"));
        state.insert("a", tag("uno"));

        assert_eq!(state.ids, vec!["a", "b"]);
        assert_eq!(state.get("a"), Some(&tag("uno")));

        assert_eq!(state.remove("a"), Some(tag("uno")));
        assert_eq!(state.ids, vec!["b"]);
        assert_eq!(state.remove("missing"), None);
    }

    #[test]
    fn extra_fields_roundtrip() {
        let raw = json!({
            "ids": ["t1"],
            "entities": {"t1": {"title": "x"}},
            "currentTaskId": "t1"
        });
        let state: EntityState<Tag> = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(state.extra["currentTaskId"], "t1");
        assert_eq!(serde_json::to_value(&state).unwrap(), raw);
    }

    #[test]
    fn repaired_fixes_both_directions() {
        let mut state = EntityState::new();
        state.entities.insert("a".into(), tag("a"));
        state.entities.insert("b".into(), tag("b"));
        state.ids = vec!["b".into(), "ghost".into(), "b".into()];

        let state = state.repaired();
        assert_eq!(state.ids, vec!["b", "a"]);
        assert_eq!(state.iter().count(), 2);
    }
}
