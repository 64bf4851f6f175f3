//! Document type: an ordered map of field name to value.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use std::collections::BTreeMap;

/// A stored document.
///
/// Field access accepts dotted paths (`"address.city"`) that walk nested
/// maps. Top-level keys never contain dots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Document {
    fields: BTreeMap<String, Value>,
}

impl Document {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value at a dotted path, if present.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        let mut current = self.fields.get(first)?;
        for part in parts {
            current = current.as_map()?.get(part)?;
        }
        Some(current)
    }

    /// Sets the value at a dotted path, creating intermediate maps.
    ///
    /// An intermediate value that is not a map is replaced.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) {
        let value = value.into();
        match path.split_once('.') {
            None => {
                self.fields.insert(path.to_string(), value);
            }
            Some((head, rest)) => {
                let slot = self
                    .fields
                    .entry(head.to_string())
                    .or_insert_with(|| Value::Map(BTreeMap::new()));
                set_nested(slot, rest, value);
            }
        }
    }

    /// Removes a top-level field, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    /// Returns true if the dotted path resolves to a value.
    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Iterates over top-level fields in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Number of top-level fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the document has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Copies every field of `other` into this document (dotted keys allowed).
    pub fn merge(&mut self, other: &Document) {
        for (key, value) in other.iter() {
            self.set(key, value.clone());
        }
    }

    /// Returns the text at `path`, failing if absent or of another type.
    pub fn require_text(&self, path: &str) -> CodecResult<&str> {
        match self.get(path) {
            Some(Value::Text(s)) => Ok(s),
            Some(_) => Err(CodecError::unexpected_type(path, "text")),
            None => Err(CodecError::missing_field(path)),
        }
    }

    /// Returns the integer at `path`, failing if absent or of another type.
    pub fn require_integer(&self, path: &str) -> CodecResult<i64> {
        match self.get(path) {
            Some(Value::Integer(n)) => Ok(*n),
            Some(_) => Err(CodecError::unexpected_type(path, "integer")),
            None => Err(CodecError::missing_field(path)),
        }
    }

    /// Returns the text at `path`, or `None` if absent or null.
    pub fn optional_text(&self, path: &str) -> CodecResult<Option<&str>> {
        match self.get(path) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Text(s)) => Ok(Some(s)),
            Some(_) => Err(CodecError::unexpected_type(path, "text or null")),
        }
    }

    /// Converts into the underlying map.
    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.fields
    }
}

fn set_nested(slot: &mut Value, path: &str, value: Value) {
    if !matches!(slot, Value::Map(_)) {
        *slot = Value::Map(BTreeMap::new());
    }
    let Value::Map(map) = slot else {
        return;
    };
    match path.split_once('.') {
        None => {
            map.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let next = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Map(BTreeMap::new()));
            set_nested(next, rest, value);
        }
    }
}

impl From<BTreeMap<String, Value>> for Document {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        Self { fields }
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        Value::Map(doc.fields)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Document {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut doc = Document::new();
        for (k, v) in iter {
            doc.set(&k.into(), v);
        }
        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_set_and_get() {
        let mut doc = Document::new();
        doc.set("address.city", "Oslo");
        doc.set("address.zip", 150);
        doc.set("name", "Kari");

        assert_eq!(doc.get("address.city"), Some(&Value::from("Oslo")));
        assert_eq!(doc.get("address.zip"), Some(&Value::Integer(150)));
        assert_eq!(doc.len(), 2);
        assert!(doc.get("address.street").is_none());
    }

    #[test]
    fn set_replaces_non_map_intermediate() {
        let mut doc = Document::new();
        doc.set("a", 1);
        doc.set("a.b", 2);
        assert_eq!(doc.get("a.b"), Some(&Value::Integer(2)));
    }

    #[test]
    fn require_accessors() {
        let doc: Document = [("name", Value::from("x")), ("n", Value::Integer(3))]
            .into_iter()
            .collect();
        assert_eq!(doc.require_text("name").unwrap(), "x");
        assert_eq!(doc.require_integer("n").unwrap(), 3);
        assert!(matches!(
            doc.require_text("n"),
            Err(CodecError::UnexpectedType { .. })
        ));
        assert!(matches!(
            doc.require_integer("missing"),
            Err(CodecError::MissingField { .. })
        ));
        assert_eq!(doc.optional_text("missing").unwrap(), None);
    }

    #[test]
    fn merge_overwrites_fields() {
        let mut base: Document = [("a", 1), ("b", 2)].into_iter().collect();
        let patch: Document = [("b", 20), ("c", 30)].into_iter().collect();
        base.merge(&patch);
        assert_eq!(base.get("b"), Some(&Value::Integer(20)));
        assert_eq!(base.get("c"), Some(&Value::Integer(30)));
        assert_eq!(base.len(), 3);
    }
}
