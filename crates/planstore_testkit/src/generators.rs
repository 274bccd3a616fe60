//! Property-based test generators using proptest.
//!
//! Provides strategies for entity collections (consistent or not) and
//! complete snapshots shaped like the task application's.

use planstore_core::{AppData, AppDataComplete};
use proptest::prelude::*;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Strategy for generating entity ids.
pub fn entity_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9_-]{1,12}").expect("Invalid regex")
}

/// Strategy for generating project ids.
pub fn project_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z0-9]{1,8}").expect("Invalid regex")
}

/// Strategy for generating small entity records.
pub fn entity_strategy() -> impl Strategy<Value = Value> {
    (
        prop::string::string_regex("[a-z ]{0,20}").expect("Invalid regex"),
        any::<bool>(),
        any::<i32>(),
    )
        .prop_map(|(title, done, estimate)| json!({ "title": title, "isDone": done, "estimate": estimate }))
}

/// Strategy for generating consistent collections.
pub fn consistent_collection_strategy() -> impl Strategy<Value = Value> {
    prop::collection::btree_map(entity_id_strategy(), entity_strategy(), 0..8).prop_flat_map(
        |entities: BTreeMap<String, Value>| {
            let ids: Vec<String> = entities.keys().cloned().collect();
            Just(ids).prop_shuffle().prop_map(move |ids| {
                let map: Map<String, Value> = entities.clone().into_iter().collect();
                json!({ "ids": ids, "entities": map })
            })
        },
    )
}

/// Strategy for generating collections whose ids and entities disagree:
/// dangling ids, duplicates and unlisted entities.
pub fn inconsistent_collection_strategy() -> impl Strategy<Value = Value> {
    (
        prop::collection::btree_map(entity_id_strategy(), entity_strategy(), 0..8),
        prop::collection::vec(entity_id_strategy(), 0..8),
        any::<prop::sample::Index>(),
    )
        .prop_map(|(entities, extra_ids, cut)| {
            let mut ids: Vec<String> = entities.keys().cloned().collect();
            if !ids.is_empty() {
                let keep = cut.index(ids.len() + 1);
                ids.truncate(keep);
                if let Some(first) = ids.first().cloned() {
                    ids.push(first);
                }
            }
            ids.extend(extra_ids);
            let map: Map<String, Value> = entities.into_iter().collect();
            json!({ "ids": ids, "entities": map, "currentId": null })
        })
}

/// Strategy for generating complete snapshots of the task application.
///
/// Every generated snapshot lists at least one project and carries a
/// value for every project-scoped key of every listed project.
pub fn snapshot_strategy() -> impl Strategy<Value = AppDataComplete> {
    (
        prop::collection::btree_set(project_id_strategy(), 1..4),
        consistent_collection_strategy(),
        consistent_collection_strategy(),
        prop::option::of(1_600_000_000_000_i64..1_800_000_000_000),
    )
        .prop_flat_map(|(projects, tasks, tags, timestamp)| {
            let projects: Vec<String> = projects.into_iter().collect();
            let notes = prop::collection::vec(consistent_collection_strategy(), projects.len());
            (Just(projects), Just(tasks), Just(tags), Just(timestamp), notes)
        })
        .prop_map(|(projects, tasks, tags, timestamp, notes)| {
            let project_entities: Map<String, Value> = projects
                .iter()
                .map(|id| (id.clone(), json!({ "id": id })))
                .collect();
            let note_map: Map<String, Value> = projects.iter().cloned().zip(notes).collect();
            let empty_per_project: Map<String, Value> = projects
                .iter()
                .map(|id| (id.clone(), json!({ "ids": [], "entities": {} })))
                .collect();

            let mut data = AppData::new();
            data.insert("globalConfig", json!({}));
            data.insert("reminders", json!([]));
            data.insert("project", json!({ "ids": projects, "entities": project_entities }));
            data.insert("tag", tags);
            data.insert("simpleCounter", json!({ "ids": [], "entities": {} }));
            data.insert("task", tasks);
            data.insert("taskArchive", json!({ "ids": [], "entities": {} }));
            data.insert("taskRepeatCfg", json!({ "ids": [], "entities": {} }));
            data.insert("note", Value::Object(note_map));
            for key in ["bookmark", "metric", "improvement", "obstruction"] {
                data.insert(key, Value::Object(empty_per_project.clone()));
            }
            AppDataComplete::new(data).with_timestamp(timestamp)
        })
}
