//! Scopes: partition keys for multi-tenant isolation.
//!
//! Scoping is composition. An entity embeds one of [`Scope`],
//! [`Multiscope`] or [`SecondScope`] next to its [`EntityMeta`] and
//! implements [`ScopedEntity`]. Membership bookkeeping lives in
//! [`move_membership`].

mod components;

pub use components::{Multiscope, Scope, SecondScope};

use crate::entity::{Entity, EntityMeta};
use crate::id::EntityId;
use scopedb_codec::Value;

/// Document field holding the current scope.
pub const SCOPE_FIELD: &str = "scope";
/// Document field holding the membership list.
pub const SCOPES_FIELD: &str = "scopes";
/// Document field holding the second scope.
pub const SECOND_SCOPE_FIELD: &str = "second_scope";

/// Moves a membership from `previous` to `next`.
///
/// With `next` set, `next` is added if absent and `previous` is removed
/// when it differs from `next`. With `next` empty, `previous` is removed.
/// The list never gains a duplicate. Returns whether the list changed.
///
/// ```
/// use scopedb_core::scope::move_membership;
/// use scopedb_core::EntityId;
///
/// let a = EntityId::from_bytes([1; 12]);
/// let b = EntityId::from_bytes([2; 12]);
/// let mut scopes = vec![a];
/// assert!(move_membership(&mut scopes, Some(a), Some(b)));
/// assert_eq!(scopes, vec![b]);
/// assert!(move_membership(&mut scopes, Some(b), None));
/// assert!(scopes.is_empty());
/// ```
pub fn move_membership(
    scopes: &mut Vec<EntityId>,
    previous: Option<EntityId>,
    next: Option<EntityId>,
) -> bool {
    let before = scopes.len();
    let mut added = false;
    if let Some(prev) = previous {
        if Some(prev) != next {
            scopes.retain(|s| *s != prev);
        }
    }
    if let Some(next) = next {
        if !scopes.contains(&next) {
            scopes.push(next);
            added = true;
        }
    }
    added || scopes.len() != before
}

/// Scope state embedded in an entity.
pub trait ScopeComponent {
    /// The current scope.
    fn scope_id(&self) -> Option<EntityId>;

    /// Moves to `scope`, maintaining memberships. Returns whether anything changed.
    fn set_scope_id(&mut self, scope: Option<EntityId>) -> bool;

    /// Every scope the entity is visible in.
    fn memberships(&self) -> Vec<EntityId>;

    /// Returns true if the entity is visible in `scope`.
    fn is_visible_in(&self, scope: EntityId) -> bool {
        self.memberships().contains(&scope)
    }

    /// The second scope, for components that have one.
    fn second_scope_id(&self) -> Option<EntityId> {
        None
    }

    /// Moves the second scope. Components without one ignore this.
    fn set_second_scope_id(&mut self, _scope: Option<EntityId>) -> bool {
        false
    }

    /// Reloads state read back from storage, bypassing change tracking.
    fn restore(&mut self, scope: Option<EntityId>, second: Option<EntityId>, memberships: Vec<EntityId>);
}

/// An entity partitioned by scope.
pub trait ScopedEntity: Entity {
    /// The embedded scope component.
    type Scoping: ScopeComponent;

    /// Returns the scope component.
    fn scoping(&self) -> &Self::Scoping;

    /// Returns metadata and scope component together, mutably.
    fn scoping_parts_mut(&mut self) -> (&mut EntityMeta, &mut Self::Scoping);

    /// The current scope.
    fn scope_id(&self) -> Option<EntityId> {
        self.scoping().scope_id()
    }

    /// Moves the entity to `scope`, recording `scope` and `scopes` as changes.
    fn set_scope(&mut self, scope: Option<EntityId>) -> bool {
        let (meta, scoping) = self.scoping_parts_mut();
        if !scoping.set_scope_id(scope) {
            return false;
        }
        meta.mark_changed(SCOPE_FIELD, scope.map_or(Value::Null, Value::from));
        meta.mark_changed(SCOPES_FIELD, Value::array(scoping.memberships()));
        true
    }

    /// Moves the second scope, recording `second_scope` and `scopes` as changes.
    fn set_second_scope(&mut self, scope: Option<EntityId>) -> bool {
        let (meta, scoping) = self.scoping_parts_mut();
        if !scoping.set_second_scope_id(scope) {
            return false;
        }
        meta.mark_changed(SECOND_SCOPE_FIELD, scope.map_or(Value::Null, Value::from));
        meta.mark_changed(SCOPES_FIELD, Value::array(scoping.memberships()));
        true
    }

    /// Returns true if the entity is visible in `scope`.
    fn is_visible_in(&self, scope: EntityId) -> bool {
        self.scoping().is_visible_in(scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone, Default)]
    struct Org {
        meta: EntityMeta,
    }

    impl Entity for Org {
        fn meta(&self) -> &EntityMeta {
            &self.meta
        }
        fn meta_mut(&mut self) -> &mut EntityMeta {
            &mut self.meta
        }
    }

    #[derive(Debug, Clone, Default)]
    struct Doc {
        meta: EntityMeta,
        scoping: SecondScope<Org, Org>,
    }

    impl Entity for Doc {
        fn meta(&self) -> &EntityMeta {
            &self.meta
        }
        fn meta_mut(&mut self) -> &mut EntityMeta {
            &mut self.meta
        }
    }

    impl ScopedEntity for Doc {
        type Scoping = SecondScope<Org, Org>;

        fn scoping(&self) -> &Self::Scoping {
            &self.scoping
        }
        fn scoping_parts_mut(&mut self) -> (&mut EntityMeta, &mut Self::Scoping) {
            (&mut self.meta, &mut self.scoping)
        }
    }

    fn id(n: u8) -> EntityId {
        EntityId::from_bytes([n; 12])
    }

    #[test]
    fn moving_scope_replaces_membership() {
        let mut scoping: Multiscope<Org> = Multiscope::at(id(1));
        scoping.share_with(id(9));
        assert!(scoping.set_scope_id(Some(id(2))));
        assert_eq!(scoping.scopes(), &[id(9), id(2)]);
        assert!(!scoping.set_scope_id(Some(id(2))));
        assert!(scoping.set_scope_id(None));
        assert_eq!(scoping.scopes(), &[id(9)]);
    }

    #[test]
    fn current_scope_cannot_be_revoked() {
        let mut scoping: Multiscope<Org> = Multiscope::at(id(1));
        assert!(!scoping.revoke(id(1)));
        scoping.share_with(id(2));
        assert!(scoping.revoke(id(2)));
        assert_eq!(scoping.scopes(), &[id(1)]);
    }

    #[test]
    fn second_scope_shares_membership_list() {
        let mut doc = Doc::default();
        doc.set_scope(Some(id(1)));
        doc.set_second_scope(Some(id(5)));
        assert!(doc.is_visible_in(id(1)));
        assert!(doc.is_visible_in(id(5)));

        doc.set_second_scope(Some(id(6)));
        assert!(!doc.is_visible_in(id(5)));
        assert!(doc.is_visible_in(id(6)));
        assert_eq!(doc.scope_id(), Some(id(1)));
    }

    #[test]
    fn set_scope_records_changes_when_tracking() {
        let mut doc = Doc::default();
        doc.set_scope(Some(id(1)));
        assert!(doc.changes().is_empty());

        doc.set_change_tracking(true);
        doc.set_scope(Some(id(2)));
        assert_eq!(doc.changes().get(SCOPE_FIELD), Some(&Value::from(id(2))));
        assert_eq!(
            doc.changes().get(SCOPES_FIELD),
            Some(&Value::array([id(2)]))
        );
    }

    #[test]
    fn restore_keeps_invariants() {
        let mut scoping: Multiscope<Org> = Multiscope::new();
        scoping.restore(Some(id(3)), None, vec![id(1), id(1), id(2)]);
        assert_eq!(scoping.scopes(), &[id(1), id(2), id(3)]);
    }

    #[test]
    fn resolve_rejects_other_entity() {
        let mut scoping: Scope<Org> = Scope::at(id(1));
        let other = Org {
            meta: EntityMeta::with_id(id(2)),
        };
        assert!(!scoping.resolve(other));
        let same = Org {
            meta: EntityMeta::with_id(id(1)),
        };
        assert!(scoping.resolve(same));
        assert!(scoping.scope().is_resolved());
    }

    proptest! {
        #[test]
        fn memberships_never_duplicate(moves in proptest::collection::vec(proptest::option::of(0u8..6), 0..40)) {
            let mut scoping: Multiscope<Org> = Multiscope::new();
            for next in moves {
                let next = next.map(id);
                scoping.set_scope_id(next);
                let scopes = scoping.scopes();
                let mut unique = scopes.to_vec();
                unique.sort();
                unique.dedup();
                prop_assert_eq!(unique.len(), scopes.len());
                if let Some(current) = next {
                    prop_assert!(scopes.contains(&current));
                }
                prop_assert!(scopes.len() <= 1);
            }
        }
    }
}
