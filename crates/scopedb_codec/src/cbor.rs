//! CBOR encoding of documents via `ciborium`.
//!
//! Values map onto native CBOR major types: integers, text, byte strings,
//! arrays and text-keyed maps. `BTreeMap` keeps map keys sorted, so the same
//! document always encodes to the same bytes.

use crate::document::Document;
use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Encodes a document to CBOR bytes.
///
/// # Errors
///
/// Returns an error if the underlying writer fails.
pub fn to_cbor(doc: &Document) -> CodecResult<Vec<u8>> {
    let mut buffer = Vec::new();
    ciborium::ser::into_writer(doc, &mut buffer)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(buffer)
}

/// Decodes a document from CBOR bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not a CBOR map, or contain floats or
/// integers outside the `i64` range.
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Document> {
    ciborium::de::from_reader(bytes).map_err(|e| match e {
        ciborium::de::Error::Semantic(_, msg) if msg.contains(FLOAT_MSG) => {
            CodecError::FloatForbidden
        }
        ciborium::de::Error::Semantic(_, msg) if msg.contains(OVERFLOW_MSG) => {
            CodecError::IntegerOverflow
        }
        other => CodecError::decoding_failed(other.to_string()),
    })
}

/// Encodes any value (not just documents) to CBOR bytes.
///
/// # Errors
///
/// Returns an error if the underlying writer fails.
pub fn value_to_cbor(value: &Value) -> CodecResult<Vec<u8>> {
    let mut buffer = Vec::new();
    ciborium::ser::into_writer(value, &mut buffer)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(buffer)
}

/// Decodes a single value from CBOR bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not valid CBOR for the value model.
pub fn value_from_cbor(bytes: &[u8]) -> CodecResult<Value> {
    ciborium::de::from_reader(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))
}

const FLOAT_MSG: &str = "floats are not supported";
const OVERFLOW_MSG: &str = "integer out of range";

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Integer(n) => serializer.serialize_i64(*n),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Bytes(b) => serializer.serialize_bytes(b),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(map) => serialize_map(map, serializer),
        }
    }
}

fn serialize_map<S: Serializer>(
    map: &BTreeMap<String, Value>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut out = serializer.serialize_map(Some(map.len()))?;
    for (k, v) in map {
        out.serialize_entry(k, v)?;
    }
    out.end()
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut out = serializer.serialize_map(Some(self.len()))?;
        for (k, v) in self.iter() {
            out.serialize_entry(k, v)?;
        }
        out.end()
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a document value")
    }

    fn visit_unit<E>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Value, D::Error> {
        Value::deserialize(d)
    }

    fn visit_bool<E>(self, b: bool) -> Result<Value, E> {
        Ok(Value::Bool(b))
    }

    fn visit_i64<E>(self, n: i64) -> Result<Value, E> {
        Ok(Value::Integer(n))
    }

    fn visit_u64<E: de::Error>(self, n: u64) -> Result<Value, E> {
        i64::try_from(n)
            .map(Value::Integer)
            .map_err(|_| E::custom(OVERFLOW_MSG))
    }

    fn visit_i128<E: de::Error>(self, n: i128) -> Result<Value, E> {
        i64::try_from(n)
            .map(Value::Integer)
            .map_err(|_| E::custom(OVERFLOW_MSG))
    }

    fn visit_u128<E: de::Error>(self, n: u128) -> Result<Value, E> {
        i64::try_from(n)
            .map(Value::Integer)
            .map_err(|_| E::custom(OVERFLOW_MSG))
    }

    fn visit_f64<E: de::Error>(self, _n: f64) -> Result<Value, E> {
        Err(E::custom(FLOAT_MSG))
    }

    fn visit_str<E>(self, s: &str) -> Result<Value, E> {
        Ok(Value::Text(s.to_string()))
    }

    fn visit_string<E>(self, s: String) -> Result<Value, E> {
        Ok(Value::Text(s))
    }

    fn visit_bytes<E>(self, b: &[u8]) -> Result<Value, E> {
        Ok(Value::Bytes(b.to_vec()))
    }

    fn visit_byte_buf<E>(self, b: Vec<u8>) -> Result<Value, E> {
        Ok(Value::Bytes(b))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Value::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Value, A::Error> {
        let mut map = BTreeMap::new();
        while let Some((k, v)) = access.next_entry::<String, Value>()? {
            map.insert(k, v);
        }
        Ok(Value::Map(map))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        d.deserialize_any(ValueVisitor)
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        match Value::deserialize(d)? {
            Value::Map(map) => Ok(Document::from(map)),
            other => Err(de::Error::custom(format!(
                "expected a map at document root, found {}",
                other.type_name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        let mut doc = Document::new();
        doc.set("_id", "65a1f0c2e4b0a1b2c3d4e5f6");
        doc.set("name", "Alice");
        doc.set("age", -42);
        doc.set("avatar", Value::Bytes(vec![0, 1, 2, 255]));
        doc.set("tags", Value::array(["a", "b"]));
        doc.set("address.city", "Lima");
        doc.set("deleted", Value::Null);
        doc.set("active", true);
        doc
    }

    #[test]
    fn document_survives_encoding() {
        let doc = sample();
        let bytes = to_cbor(&doc).unwrap();
        assert_eq!(from_cbor(&bytes).unwrap(), doc);
    }

    #[test]
    fn encoding_is_deterministic() {
        let a = to_cbor(&sample()).unwrap();
        let b = to_cbor(&sample()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn non_map_root_is_rejected() {
        let bytes = value_to_cbor(&Value::Integer(7)).unwrap();
        assert!(matches!(
            from_cbor(&bytes),
            Err(CodecError::DecodingFailed { .. })
        ));
    }

    #[test]
    fn floats_are_rejected() {
        let mut bytes = Vec::new();
        let mut map = BTreeMap::new();
        map.insert("x", 1.5f64);
        ciborium::ser::into_writer(&map, &mut bytes).unwrap();
        assert_eq!(from_cbor(&bytes), Err(CodecError::FloatForbidden));
    }

    #[test]
    fn truncated_input_fails() {
        let bytes = to_cbor(&sample()).unwrap();
        assert!(from_cbor(&bytes[..bytes.len() / 2]).is_err());
    }

    #[test]
    fn value_roundtrip_preserves_bytes_vs_array() {
        let v = Value::Array(vec![Value::Bytes(vec![1, 2]), Value::array([1, 2])]);
        let bytes = value_to_cbor(&v).unwrap();
        assert_eq!(value_from_cbor(&bytes).unwrap(), v);
    }
}
