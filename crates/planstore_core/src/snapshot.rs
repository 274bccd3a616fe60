//! Complete application snapshots.
//!
//! A snapshot is one flat JSON object. Global models map their logical key
//! to their value; project-scoped models map their logical key to an object
//! of `projectId -> value`; the sync timestamp sits beside them:
//!
//! ```json
//! {
//!   "globalConfig": {},
//!   "task": {"ids": [], "entities": {}},
//!   "note": {"p1": {"ids": [], "entities": {}}},
//!   "lastLocalSyncModelChange": 1700000000000
//! }
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Field name of the sync timestamp inside a serialized snapshot.
pub const LAST_LOCAL_SYNC_MODEL_CHANGE_FIELD: &str = "lastLocalSyncModelChange";

/// Related-model data of one project: `logicalKey -> value`.
pub type RelatedModels = BTreeMap<String, Value>;

/// Reads a timestamp stored as a number or as a numeric string.
#[must_use]
pub fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok().or_else(|| {
            s.trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(|f| f as i64)
        }),
        _ => None,
    }
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(parse_timestamp))
}

/// Model values of a snapshot, keyed by logical key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppData(BTreeMap<String, Value>);

impl AppData {
    /// Creates an empty snapshot body.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value of a logical key.
    #[must_use]
    pub fn get(&self, logical_key: &str) -> Option<&Value> {
        self.0.get(logical_key)
    }

    /// Returns one project's value of a project-scoped key.
    #[must_use]
    pub fn project_value(&self, logical_key: &str, project_id: &str) -> Option<&Value> {
        self.0.get(logical_key)?.as_object()?.get(project_id)
    }

    /// Returns the project ids present under a project-scoped key.
    #[must_use]
    pub fn project_ids(&self, logical_key: &str) -> Vec<&str> {
        self.0
            .get(logical_key)
            .and_then(Value::as_object)
            .map(|m| m.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Sets the value of a logical key.
    pub fn insert(&mut self, logical_key: impl Into<String>, value: Value) {
        self.0.insert(logical_key.into(), value);
    }

    /// Returns a copy with one value replaced or removed.
    ///
    /// With a project id, only that project's entry under the logical key
    /// changes; the per-project object is created if needed.
    #[must_use]
    pub fn with_value(&self, logical_key: &str, project_id: Option<&str>, value: Option<Value>) -> Self {
        let mut next = self.0.clone();
        match project_id {
            None => {
                match value {
                    Some(v) => next.insert(logical_key.to_string(), v),
                    None => next.remove(logical_key),
                };
            }
            Some(pid) => {
                let slot = next
                    .entry(logical_key.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !slot.is_object() {
                    *slot = Value::Object(Map::new());
                }
                if let Value::Object(projects) = slot {
                    match value {
                        Some(v) => projects.insert(pid.to_string(), v),
                        None => projects.remove(pid),
                    };
                }
            }
        }
        Self(next)
    }

    /// Iterates over `(logical_key, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the number of logical keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the snapshot body is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consumes the snapshot body.
    #[must_use]
    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.0
    }
}

impl From<BTreeMap<String, Value>> for AppData {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for AppData {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A complete application snapshot: all model values plus the sync timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppDataComplete {
    /// Model values.
    #[serde(flatten)]
    pub data: Arc<AppData>,

    /// Milliseconds since the Unix epoch of the last local change.
    #[serde(
        rename = "lastLocalSyncModelChange",
        default,
        deserialize_with = "deserialize_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_local_sync_model_change: Option<i64>,
}

impl AppDataComplete {
    /// Creates a snapshot without a timestamp.
    #[must_use]
    pub fn new(data: AppData) -> Self {
        Self {
            data: Arc::new(data),
            last_local_sync_model_change: None,
        }
    }

    /// Sets the timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: Option<i64>) -> Self {
        self.last_local_sync_model_change = timestamp;
        self
    }

    /// Parses a snapshot from JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a JSON object.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Serializes the snapshot as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl std::ops::Deref for AppDataComplete {
    type Target = AppData;

    fn deref(&self) -> &AppData {
        &self.data
    }
}

/// What an import wrote and skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Global model values written.
    pub base_written: usize,
    /// Project-scoped values written.
    pub project_written: usize,
    /// Project-scoped logical keys absent from the snapshot.
    pub missing_keys: Vec<String>,
    /// Project entries skipped because their value was `null`.
    pub skipped_null: usize,
}

impl ImportReport {
    /// Returns the total number of values written.
    #[must_use]
    pub fn written(&self) -> usize {
        self.base_written + self.project_written
    }
}

/// A project entity together with all of its related-model data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportedProject {
    /// Fields of the project entity.
    #[serde(flatten)]
    pub project: Map<String, Value>,

    /// Project-scoped data by logical key.
    #[serde(rename = "relatedModels", default)]
    pub related_models: RelatedModels,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn timestamp_parsing() {
        assert_eq!(parse_timestamp(&json!(1_700_000_000_000_i64)), Some(1_700_000_000_000));
        assert_eq!(parse_timestamp(&json!("1700000000000")), Some(1_700_000_000_000));
        assert_eq!(parse_timestamp(&json!(" 42 ")), Some(42));
        assert_eq!(parse_timestamp(&json!("soon")), None);
        assert_eq!(parse_timestamp(&json!(null)), None);
    }

    #[test]
    fn snapshot_is_flat() {
        let snapshot = AppDataComplete::from_json(
            r#"{"task":{"ids":[],"entities":{}},"note":{"p1":1},"lastLocalSyncModelChange":"7"}"#,
        )
        .unwrap();

        assert_eq!(snapshot.last_local_sync_model_change, Some(7));
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.project_value("note", "p1"), Some(&json!(1)));
        assert!(snapshot.get(LAST_LOCAL_SYNC_MODEL_CHANGE_FIELD).is_none());

        let out = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(out["lastLocalSyncModelChange"], json!(7));
        assert_eq!(out["note"], json!({"p1": 1}));
    }

    #[test]
    fn with_value_is_immutable() {
        let base: AppData = [("tag".to_string(), json!(1))].into_iter().collect();
        let patched = base
            .with_value("tag", None, Some(json!(2)))
            .with_value("note", Some("p1"), Some(json!("n")));

        assert_eq!(base.get("tag"), Some(&json!(1)));
        assert_eq!(patched.get("tag"), Some(&json!(2)));
        assert_eq!(patched.project_ids("note"), vec!["p1"]);

        let removed = patched.with_value("note", Some("p1"), None);
        assert_eq!(removed.get("note"), Some(&json!({})));
        assert!(removed.with_value("tag", None, None).get("tag").is_none());
    }

    #[test]
    fn exported_project_shape() {
        let exported = ExportedProject {
            project: json!({"id": "p1", "title": "Home"})
                .as_object()
                .cloned()
                .unwrap(),
            related_models: [("note".to_string(), json!({"ids": []}))].into_iter().collect(),
        };
        let value = serde_json::to_value(&exported).unwrap();
        assert_eq!(value["title"], "Home");
        assert_eq!(value["relatedModels"]["note"], json!({"ids": []}));
    }
}
