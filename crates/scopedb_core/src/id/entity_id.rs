//! The 12-byte entity identifier and its two text forms.

use crate::error::{CoreError, CoreResult};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use scopedb_codec::Value;
use std::fmt;
use std::str::FromStr;

/// Number of bytes in an identifier.
pub const ID_LEN: usize = 12;
/// Length of the hex form.
pub const HEX_LEN: usize = 24;
/// Length of the compact (URL-safe base64, unpadded) form.
pub const COMPACT_LEN: usize = 16;

/// Unique identifier for an entity.
///
/// Byte-compatible with a MongoDB ObjectId:
/// `[4-byte unix seconds][5-byte random][3-byte counter]`. Ordering is
/// byte-wise, which matches the lexicographic order of the hex form and,
/// for generated ids, creation order to the second.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId([u8; ID_LEN]);

impl EntityId {
    /// Creates an id from raw bytes.
    #[inline]
    #[must_use]
    pub const fn from_bytes(bytes: [u8; ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }

    /// Creates an id from a slice, or `None` if it isn't 12 bytes.
    #[must_use]
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        <[u8; ID_LEN]>::try_from(slice).ok().map(Self)
    }

    /// Generates a fresh id from the process-wide generator.
    #[must_use]
    pub fn generate() -> Self {
        super::generator::global().next_id()
    }

    /// Parses the 24-character hex form (either letter case).
    ///
    /// # Errors
    ///
    /// Returns `InvalidId` for the wrong length or a non-hex character.
    pub fn from_hex(input: &str) -> CoreResult<Self> {
        if input.len() != HEX_LEN {
            return Err(CoreError::invalid_id(input));
        }
        let mut bytes = [0u8; ID_LEN];
        hex::decode_to_slice(input, &mut bytes).map_err(|_| CoreError::invalid_id(input))?;
        Ok(Self(bytes))
    }

    /// Parses the 16-character compact form.
    ///
    /// # Errors
    ///
    /// Returns `Format` for the wrong length, a character outside the
    /// URL-safe alphabet, or a decoded length other than 12 bytes.
    pub fn from_compact(input: &str) -> CoreResult<Self> {
        let chars = input.chars().count();
        if chars != COMPACT_LEN {
            return Err(CoreError::format(format!(
                "compact id must be {COMPACT_LEN} characters, got {chars}"
            )));
        }
        let decoded = URL_SAFE_NO_PAD
            .decode(input)
            .map_err(|e| CoreError::format(format!("invalid compact id {input:?}: {e}")))?;
        Self::from_slice(&decoded).ok_or_else(|| {
            CoreError::format(format!(
                "compact id decoded to {} bytes, expected {ID_LEN}",
                decoded.len()
            ))
        })
    }

    /// Parses either text form.
    ///
    /// # Errors
    ///
    /// Empty input and any other length are `InvalidId`; see
    /// [`EntityId::from_compact`] for compact-form failures.
    pub fn parse(input: &str) -> CoreResult<Self> {
        match super::try_parse_id(input)? {
            super::ParsedId::Id(id) => Ok(id),
            super::ParsedId::Empty | super::ParsedId::Rejected => {
                Err(CoreError::invalid_id(input))
            }
        }
    }

    /// Lowercase 24-character hex form. This is the canonical stored form.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// 16-character URL-safe base64 form.
    #[must_use]
    pub fn to_compact(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }

    /// Unix seconds stored in the leading four bytes.
    #[must_use]
    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.to_hex())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for EntityId {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        Self::parse(s)
    }
}

impl From<[u8; ID_LEN]> for EntityId {
    fn from(bytes: [u8; ID_LEN]) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<EntityId> for [u8; ID_LEN] {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

impl From<EntityId> for Value {
    fn from(id: EntityId) -> Self {
        Value::Text(id.to_hex())
    }
}

impl From<&EntityId> for Value {
    fn from(id: &EntityId) -> Self {
        Value::Text(id.to_hex())
    }
}

impl TryFrom<&Value> for EntityId {
    type Error = CoreError;

    fn try_from(value: &Value) -> CoreResult<Self> {
        match value {
            Value::Text(s) => Self::parse(s),
            other => Err(CoreError::invalid_format(format!(
                "expected id text, found {}",
                other.type_name()
            ))),
        }
    }
}

/// Converts a compact id to its hex form.
///
/// # Errors
///
/// Returns `Format` on wrong length, bad alphabet or bad decoded length.
pub fn hex_from_compact(compact: &str) -> CoreResult<String> {
    EntityId::from_compact(compact).map(|id| id.to_hex())
}

/// Converts a hex id to its compact form.
///
/// # Errors
///
/// Returns `InvalidId` if `hex` is not 24 hex characters.
pub fn compact_from_hex(hex: &str) -> CoreResult<String> {
    EntityId::from_hex(hex).map(|id| id.to_compact())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX: &str = "507f1f77bcf86cd799439011";

    #[test]
    fn hex_form_is_lowercase_and_24_chars() {
        let id = EntityId::from_hex(&HEX.to_uppercase()).unwrap();
        assert_eq!(id.to_hex(), HEX);
        assert_eq!(id.to_string(), HEX);
    }

    #[test]
    fn compact_uses_url_safe_alphabet() {
        let id = EntityId::from_bytes([0xfb; ID_LEN]);
        let compact = id.to_compact();
        assert_eq!(compact.len(), COMPACT_LEN);
        assert!(!compact.contains('+') && !compact.contains('/') && !compact.contains('='));
        assert!(compact.contains('-') || compact.contains('_'));
        assert_eq!(EntityId::from_compact(&compact).unwrap(), id);
    }

    #[test]
    fn known_conversion() {
        let compact = compact_from_hex(HEX).unwrap();
        assert_eq!(compact, "UH8fd7z4bNeZQ5AR");
        assert_eq!(hex_from_compact(&compact).unwrap(), HEX);
    }

    #[test]
    fn compact_rejects_standard_alphabet() {
        assert!(matches!(
            hex_from_compact("UH8fd7z4bNeZQ5A+"),
            Err(CoreError::Format { .. })
        ));
        assert!(matches!(
            hex_from_compact("UH8fd7z4bNeZQ5A="),
            Err(CoreError::Format { .. })
        ));
    }

    #[test]
    fn compact_rejects_wrong_length() {
        assert!(matches!(
            hex_from_compact("UH8fd7z4"),
            Err(CoreError::Format { .. })
        ));
    }

    #[test]
    fn hex_rejects_non_hex() {
        assert!(matches!(
            EntityId::from_hex("507f1f77bcf86cd79943901z"),
            Err(CoreError::InvalidId { .. })
        ));
    }

    #[test]
    fn parse_accepts_both_forms() {
        let from_hex: EntityId = HEX.parse().unwrap();
        let from_compact: EntityId = "UH8fd7z4bNeZQ5AR".parse().unwrap();
        assert_eq!(from_hex, from_compact);
        assert!(EntityId::parse("").is_err());
        assert!(EntityId::parse("short").is_err());
    }

    #[test]
    fn ordering_matches_hex_order() {
        let a = EntityId::from_hex("0000000000000000000000ff").unwrap();
        let b = EntityId::from_hex("000000000000000000000100").unwrap();
        assert!(a < b);
        assert!(a.to_hex() < b.to_hex());
    }

    #[test]
    fn timestamp_reads_leading_bytes() {
        let id = EntityId::from_hex("65a1f0c2e4b0a1b2c3d4e5f6").unwrap();
        assert_eq!(id.timestamp(), 0x65a1_f0c2);
    }

    #[test]
    fn value_conversion() {
        let id = EntityId::from_hex(HEX).unwrap();
        let value = Value::from(id);
        assert_eq!(value, Value::Text(HEX.into()));
        assert_eq!(EntityId::try_from(&value).unwrap(), id);
        assert!(EntityId::try_from(&Value::Integer(1)).is_err());
    }
}
