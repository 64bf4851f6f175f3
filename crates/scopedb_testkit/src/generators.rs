//! Property-based test generators using proptest.

use crate::fixtures::ChildEntity;
use proptest::prelude::*;
use scopedb_core::EntityId;

/// Strategy for arbitrary entity ids.
pub fn entity_id_strategy() -> impl Strategy<Value = EntityId> {
    any::<[u8; 12]>().prop_map(EntityId::from_bytes)
}

/// Strategy for canonical hex id text.
pub fn hex_id_strategy() -> impl Strategy<Value = String> {
    entity_id_strategy().prop_map(|id| id.to_hex())
}

/// Strategy for compact id text.
pub fn compact_id_strategy() -> impl Strategy<Value = String> {
    entity_id_strategy().prop_map(|id| id.to_compact())
}

/// Strategy for a small pool of scope ids, so moves collide often.
pub fn scope_pool_strategy() -> impl Strategy<Value = Vec<EntityId>> {
    prop::collection::vec(entity_id_strategy(), 1..5)
}

/// Strategy for a sequence of scope moves drawn from a pool of `pool` ids.
///
/// `None` entries clear the scope.
pub fn scope_moves_strategy(pool: usize) -> impl Strategy<Value = Vec<Option<usize>>> {
    prop::collection::vec(prop::option::of(0..pool.max(1)), 0..24)
}

/// Strategy for unsaved children with small ranks, so sorts have ties.
pub fn children_strategy(max: usize) -> impl Strategy<Value = Vec<ChildEntity>> {
    prop::collection::vec(("[a-z]{1,8}", 0i64..4), 0..=max).prop_map(|rows| {
        rows.into_iter()
            .map(|(name, rank)| ChildEntity::new(&name, rank))
            .collect()
    })
}

/// Strategy for tracked edits `(on_name, text, number)`: name edits use the
/// text, rank edits the number.
pub fn edits_strategy() -> impl Strategy<Value = Vec<(bool, String, i64)>> {
    prop::collection::vec((any::<bool>(), "[a-z]{0,6}", any::<i64>()), 0..16)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scopedb_core::{try_parse_id, ParsedId};

    proptest! {
        #[test]
        fn generated_text_forms_parse(hex in hex_id_strategy(), compact in compact_id_strategy()) {
            prop_assert!(matches!(try_parse_id(&hex).unwrap(), ParsedId::Id(_)));
            prop_assert!(matches!(try_parse_id(&compact).unwrap(), ParsedId::Id(_)));
        }

        #[test]
        fn moves_stay_in_pool(moves in scope_moves_strategy(3)) {
            prop_assert!(moves.iter().flatten().all(|i| *i < 3));
        }
    }
}
