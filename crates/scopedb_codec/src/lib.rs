//! # scopedb codec
//!
//! Document value model and CBOR encoding for scopedb.
//!
//! Every engine stores entities as [`Document`]s: ordered maps from field
//! name to [`Value`]. The model is deliberately small:
//! - No floats, so values are totally ordered and usable as sort keys
//! - Map keys are text and kept sorted
//! - Encoding is deterministic
//!
//! ## Usage
//!
//! ```
//! use scopedb_codec::{from_cbor, to_cbor, Document, Value};
//!
//! let mut doc = Document::new();
//! doc.set("name", "Alice");
//! doc.set("address.city", "Lima");
//!
//! let bytes = to_cbor(&doc).unwrap();
//! let decoded = from_cbor(&bytes).unwrap();
//! assert_eq!(decoded.get("address.city"), Some(&Value::from("Lima")));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cbor;
mod document;
mod error;
mod value;

pub use cbor::{from_cbor, to_cbor, value_from_cbor, value_to_cbor};
pub use document::Document;
pub use error::{CodecError, CodecResult};
pub use value::Value;
