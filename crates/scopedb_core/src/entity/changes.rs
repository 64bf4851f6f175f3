//! Recorded field changes.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use scopedb_codec::{Document, Value};
use serde_json::{json, Map as JsonMap, Value as JsonValue};
use std::collections::BTreeMap;

/// Field name to latest value, recorded while change tracking is on.
///
/// Keys are plain or dotted field names. A field set twice keeps only the
/// latest value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    entries: BTreeMap<String, Value>,
}

impl ChangeSet {
    /// Creates an empty change set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites the entry for `field`.
    pub fn record(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(field.into(), value.into());
    }

    /// Returns the recorded value for `field`.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.entries.get(field)
    }

    /// Returns true if `field` has a recorded change.
    pub fn contains(&self, field: &str) -> bool {
        self.entries.contains_key(field)
    }

    /// Number of changed fields.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over changes in field-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    /// Drops every recorded change.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Builds a "set these fields" document. Dotted names become nested paths.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        for (field, value) in &self.entries {
            doc.set(field, value.clone());
        }
        doc
    }

    /// Consumes the change set into a "set these fields" document.
    #[must_use]
    pub fn into_document(self) -> Document {
        let mut doc = Document::new();
        for (field, value) in self.entries {
            doc.set(&field, value);
        }
        doc
    }

    /// Exports the changes as an RFC 6902 JSON Patch of `replace` operations.
    ///
    /// Dotted names map to nested pointers (`a.b` becomes `/a/b`). Byte
    /// values are rendered as standard base64 strings.
    #[must_use]
    pub fn to_json_patch(&self) -> JsonValue {
        let ops = self
            .entries
            .iter()
            .map(|(field, value)| {
                json!({
                    "op": "replace",
                    "path": json_pointer(field),
                    "value": value_to_json(value),
                })
            })
            .collect();
        JsonValue::Array(ops)
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = (&'a String, &'a Value);
    type IntoIter = std::collections::btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

fn json_pointer(field: &str) -> String {
    field
        .split('.')
        .map(|segment| segment.replace('~', "~0").replace('/', "~1"))
        .fold(String::new(), |mut pointer, segment| {
            pointer.push('/');
            pointer.push_str(&segment);
            pointer
        })
}

/// Converts a document value into JSON.
pub(crate) fn value_to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Integer(n) => JsonValue::from(*n),
        Value::Text(s) => JsonValue::String(s.clone()),
        Value::Bytes(bytes) => JsonValue::String(STANDARD.encode(bytes)),
        Value::Array(items) => JsonValue::Array(items.iter().map(value_to_json).collect()),
        Value::Map(map) => JsonValue::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect::<JsonMap<_, _>>(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_value_overwrites() {
        let mut changes = ChangeSet::new();
        changes.record("name", "a");
        changes.record("name", "b");
        assert_eq!(changes.len(), 1);
        assert_eq!(changes.get("name"), Some(&Value::Text("b".into())));
    }

    #[test]
    fn document_nests_dotted_fields() {
        let mut changes = ChangeSet::new();
        changes.record("address.city", "Oslo");
        changes.record("age", 41i64);
        let doc = changes.into_document();
        assert_eq!(doc.get("address.city"), Some(&Value::Text("Oslo".into())));
        assert_eq!(doc.get("age"), Some(&Value::Integer(41)));
    }

    #[test]
    fn json_patch_shape() {
        let mut changes = ChangeSet::new();
        changes.record("name", "Ada");
        changes.record("a/b.c~d", Value::Null);
        changes.record("tags", Value::array(["x", "y"]));

        let patch = changes.to_json_patch();
        assert_eq!(
            patch,
            json!([
                {"op": "replace", "path": "/a~1b/c~0d", "value": null},
                {"op": "replace", "path": "/name", "value": "Ada"},
                {"op": "replace", "path": "/tags", "value": ["x", "y"]},
            ])
        );
    }

    #[test]
    fn bytes_render_as_base64() {
        assert_eq!(
            value_to_json(&Value::Bytes(vec![0xfb, 0xff])),
            JsonValue::String("+/8=".into())
        );
    }
}
