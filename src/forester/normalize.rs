use serde_json::{Map, Value};

use crate::model::entry::{Entry, Forest};

/// The two shapes `forester query all` has emitted over time.
///
/// Newer releases print a list of trees that carry their own `uri`; older
/// ones print an object keyed by address. There is no version field to go
/// by, so the shape itself decides.
#[derive(Debug, Clone, PartialEq)]
pub enum RawForest {
    List(Vec<Value>),
    Keyed(Map<String, Value>),
}

impl From<Value> for RawForest {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => RawForest::List(items),
            Value::Object(map) => RawForest::Keyed(map),
            other => {
                tracing::warn!("forester returned neither a list nor an object: {other}");
                RawForest::Keyed(Map::new())
            }
        }
    }
}

pub fn normalize(raw: RawForest) -> Forest {
    match raw {
        RawForest::List(items) => items.into_iter().map(Entry::from_value).collect(),
        RawForest::Keyed(map) => map
            .into_iter()
            .map(|(uri, fields)| {
                let mut entry = Entry::from_value(fields);
                entry.uri = uri;
                entry
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn list_shape_is_kept_in_order() {
        let raw = RawForest::from(json!([
            {"uri": "b-0002", "title": "Second", "taxon": null, "tags": [], "route": "b-0002.xml", "metas": {}, "sourcePath": "trees/b-0002.tree"},
            {"uri": "a-0001", "title": null, "taxon": "Definition", "tags": ["x"], "route": "a-0001.xml", "metas": {}, "sourcePath": "trees/a-0001.tree"}
        ]));
        assert!(matches!(raw, RawForest::List(_)));

        let forest = normalize(raw);
        let uris: Vec<&str> = forest.iter().map(|e| e.uri.as_str()).collect();
        assert_eq!(uris, ["b-0002", "a-0001"]);
        assert_eq!(forest[0].title.as_deref(), Some("Second"));
        assert_eq!(forest[1].taxon.as_deref(), Some("Definition"));
    }

    #[test]
    fn keyed_shape_yields_one_entry_per_key() {
        let raw = RawForest::from(json!({
            "zz-0009": {"title": "Last key first", "taxon": null, "tags": [], "route": "zz-0009.xml", "metas": {}, "sourcePath": "trees/zz-0009.tree"},
            "aa-0001": {"title": null, "taxon": "Person", "tags": [], "route": "aa-0001.xml", "metas": {"orcid": "0000"}, "sourcePath": "trees/aa-0001.tree"}
        }));
        assert!(matches!(raw, RawForest::Keyed(_)));

        let forest = normalize(raw);
        assert_eq!(forest.len(), 2);
        assert_eq!(forest[0].uri, "zz-0009");
        assert_eq!(forest[0].title.as_deref(), Some("Last key first"));
        assert_eq!(forest[1].uri, "aa-0001");
        assert_eq!(forest[1].metas.get("orcid").map(String::as_str), Some("0000"));
    }

    #[test]
    fn key_wins_over_embedded_uri() {
        let forest = normalize(RawForest::from(json!({
            "real": {"uri": "stale", "title": "T"}
        })));
        assert_eq!(forest[0].uri, "real");
    }

    #[test]
    fn scalars_become_an_empty_forest() {
        assert!(normalize(RawForest::from(json!("nope"))).is_empty());
        assert!(normalize(RawForest::from(Value::Null)).is_empty());
    }

    #[test]
    fn malformed_entries_are_kept() {
        let forest = normalize(RawForest::from(json!([{"title": "no uri"}, 7])));
        assert_eq!(forest.len(), 2);
        assert_eq!(forest[0].uri, "");
        assert_eq!(forest[0].title.as_deref(), Some("no uri"));
    }
}
