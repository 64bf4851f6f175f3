//! The entity model.
//!
//! An entity is any type that embeds an [`EntityMeta`] and implements
//! [`Entity`]. Mutating setters go through [`EntityMeta::track`], which
//! assigns, notifies observers and records the change while tracking is on:
//!
//! ```
//! use scopedb_core::{entity_identity, Entity, EntityMeta};
//!
//! #[derive(Debug, Clone, Default)]
//! struct Person {
//!     meta: EntityMeta,
//!     name: String,
//! }
//!
//! impl Entity for Person {
//!     fn meta(&self) -> &EntityMeta { &self.meta }
//!     fn meta_mut(&mut self) -> &mut EntityMeta { &mut self.meta }
//! }
//!
//! impl Person {
//!     fn set_name(&mut self, name: impl Into<String>) -> bool {
//!         self.meta.track("name", &mut self.name, name.into())
//!     }
//! }
//!
//! entity_identity!(Person);
//!
//! let mut person = Person::default();
//! person.set_change_tracking(true);
//! person.set_name("Ada");
//! assert_eq!(person.changes().len(), 1);
//! ```

mod changes;
mod meta;

pub use changes::ChangeSet;
pub use meta::{EntityMeta, PropertyObserver, ID_PROPERTY};

use crate::error::CoreResult;
use crate::id::{parse_id, EntityId};

/// An identified aggregate.
pub trait Entity {
    /// Returns the embedded metadata.
    fn meta(&self) -> &EntityMeta;

    /// Returns the embedded metadata mutably.
    fn meta_mut(&mut self) -> &mut EntityMeta;

    /// The entity's id, if it has one.
    fn id(&self) -> Option<EntityId> {
        self.meta().id()
    }

    /// The id in hex form.
    fn id_string(&self) -> Option<String> {
        self.id().map(|id| id.to_hex())
    }

    /// Sets the id from either text form. Empty input clears it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidId` or `Format` for malformed input; the id is left
    /// unchanged.
    fn set_id(&mut self, input: &str) -> CoreResult<()> {
        let id = parse_id(input)?;
        self.meta_mut().set_id(id);
        Ok(())
    }

    /// Clears the id.
    fn clear_id(&mut self) {
        self.meta_mut().set_id(None);
    }

    /// Optimistic-concurrency version assigned by the repository.
    fn version(&self) -> Option<i64> {
        self.meta().version()
    }

    /// Changes recorded while tracking was on.
    fn changes(&self) -> &ChangeSet {
        self.meta().changes()
    }

    /// Turns change tracking on or off.
    fn set_change_tracking(&mut self, enabled: bool) {
        self.meta_mut().set_tracking(enabled);
    }

    /// Discards recorded changes.
    fn clear_changes(&mut self) {
        self.meta_mut().clear_changes();
    }

    /// True if both entities have the same id. Entities without ids never match.
    fn same_identity(&self, other: &dyn Entity) -> bool {
        matches!((self.id(), other.id()), (Some(a), Some(b)) if a == b)
    }
}

/// Implements `PartialEq`, `Eq` and `Hash` by entity id.
///
/// Two entities without an id compare unequal, so each unsaved entity
/// occupies its own slot in a hash set.
#[macro_export]
macro_rules! entity_identity {
    ($($ty:ty),+ $(,)?) => {$(
        impl ::core::cmp::PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                $crate::Entity::meta(self) == $crate::Entity::meta(other)
            }
        }

        impl ::core::cmp::Eq for $ty {}

        impl ::core::hash::Hash for $ty {
            fn hash<H: ::core::hash::Hasher>(&self, state: &mut H) {
                ::core::hash::Hash::hash($crate::Entity::meta(self), state)
            }
        }
    )+};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use std::collections::HashSet;

    #[derive(Debug, Clone, Default)]
    struct Note {
        meta: EntityMeta,
        body: String,
    }

    impl Entity for Note {
        fn meta(&self) -> &EntityMeta {
            &self.meta
        }
        fn meta_mut(&mut self) -> &mut EntityMeta {
            &mut self.meta
        }
    }

    crate::entity_identity!(Note);

    #[test]
    fn compact_id_reads_back_as_hex() {
        let mut note = Note::default();
        note.set_id("UH8fd7z4bNeZQ5AR").unwrap();
        assert_eq!(note.id_string().as_deref(), Some("507f1f77bcf86cd799439011"));
    }

    #[test]
    fn invalid_id_leaves_entity_untouched() {
        let mut note = Note::default();
        note.set_id("507f1f77bcf86cd799439011").unwrap();
        let err = note.set_id("nope").unwrap_err();
        assert!(matches!(err, CoreError::InvalidId { .. }));
        assert_eq!(note.id_string().as_deref(), Some("507f1f77bcf86cd799439011"));

        note.set_id("").unwrap();
        assert_eq!(note.id(), None);
    }

    #[test]
    fn equality_is_by_id() {
        let id = EntityId::generate();
        let mut a = Note::default();
        let mut b = Note::default();
        a.meta.set_id(Some(id));
        b.meta.set_id(Some(id));
        a.meta.track("body", &mut a.body, "one".to_string());
        b.meta.track("body", &mut b.body, "two".to_string());
        assert_eq!(a, b);
        assert!(a.same_identity(&b));
    }

    #[test]
    fn unsaved_entities_are_distinct() {
        let a = Note::default();
        let b = Note::default();
        assert_ne!(a, b);
        assert!(!a.same_identity(&b));

        let set: HashSet<Note> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 2);
    }
}
