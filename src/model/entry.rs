use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One tree in the forest, as reported by `forester query all`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Entry {
    /// Tree address. Unique within a forest.
    pub uri: String,
    pub title: Option<String>,
    pub taxon: Option<String>,
    pub tags: Vec<String>,
    pub route: String,
    pub metas: BTreeMap<String, String>,
    #[serde(rename = "sourcePath")]
    pub source_path: String,
}

/// All trees, in the order forester listed them.
pub type Forest = Vec<Entry>;

impl Entry {
    /// Build an entry from whatever forester emitted for it.
    ///
    /// Never fails: fields that are missing or have an unexpected type fall
    /// back to their defaults so one odd tree does not hide the rest.
    pub fn from_value(value: Value) -> Self {
        match serde_json::from_value::<Entry>(value.clone()) {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!("salvaging malformed forest entry: {err}");
                Self::salvage(&value)
            }
        }
    }

    fn salvage(value: &Value) -> Self {
        let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);

        let tags = value
            .get("tags")
            .and_then(Value::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let metas = value
            .get("metas")
            .and_then(Value::as_object)
            .map(|metas| {
                metas
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            uri: text("uri").unwrap_or_default(),
            title: text("title"),
            taxon: text("taxon"),
            tags,
            route: text("route").unwrap_or_default(),
            metas,
            source_path: text("sourcePath").unwrap_or_default(),
        }
    }
}
