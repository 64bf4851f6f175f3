//! Entity identifiers.
//!
//! An [`EntityId`] is 12 bytes with two text forms: 24 lowercase hex
//! characters (canonical, stored and compared) and 16 URL-safe base64
//! characters without padding. Input in either form is normalized to hex.

mod entity_id;
mod generator;

pub use entity_id::{compact_from_hex, hex_from_compact, EntityId, COMPACT_LEN, HEX_LEN, ID_LEN};
pub use generator::{generate_new_id, IdGenerator};

use crate::error::{CoreError, CoreResult};

/// Outcome of [`try_parse_id`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedId {
    /// Empty or whitespace input: valid, and means "no id".
    Empty,
    /// A well-formed id.
    Id(EntityId),
    /// Wrong length, or a 24-character input with a non-hex character.
    Rejected,
}

impl ParsedId {
    /// Returns true unless the input was rejected.
    pub fn is_ok(&self) -> bool {
        !matches!(self, Self::Rejected)
    }
}

/// Parses an identifier in either text form.
///
/// Length and character-set mismatches are reported as
/// [`ParsedId::Rejected`]. A 16-character input is always decoded as the
/// compact form.
///
/// # Errors
///
/// Returns `Format` when a 16-character input is not valid URL-safe base64
/// or does not decode to 12 bytes.
pub fn try_parse_id(input: &str) -> CoreResult<ParsedId> {
    if input.trim().is_empty() {
        return Ok(ParsedId::Empty);
    }
    match input.chars().count() {
        HEX_LEN => {
            if input.bytes().all(|b| b.is_ascii_hexdigit()) {
                EntityId::from_hex(input).map(ParsedId::Id)
            } else {
                Ok(ParsedId::Rejected)
            }
        }
        COMPACT_LEN => EntityId::from_compact(input).map(ParsedId::Id),
        _ => Ok(ParsedId::Rejected),
    }
}

/// Parses an identifier, treating rejection as an error.
///
/// Empty input yields `Ok(None)`.
///
/// # Errors
///
/// Returns `InvalidId` for rejected input and `Format` for a malformed
/// compact form.
pub fn parse_id(input: &str) -> CoreResult<Option<EntityId>> {
    match try_parse_id(input)? {
        ParsedId::Empty => Ok(None),
        ParsedId::Id(id) => Ok(Some(id)),
        ParsedId::Rejected => Err(CoreError::invalid_id(input)),
    }
}
