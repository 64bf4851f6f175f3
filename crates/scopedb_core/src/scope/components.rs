//! Scope components embedded in scoped entities.

use super::{move_membership, ScopeComponent};
use crate::entity::Entity;
use crate::id::EntityId;
use crate::reference::Ref;

/// A single scope.
#[derive(Debug, Clone)]
pub struct Scope<S> {
    scope: Ref<S>,
}

impl<S> Default for Scope<S> {
    fn default() -> Self {
        Self { scope: Ref::empty() }
    }
}

impl<S: Entity> Scope<S> {
    /// An unscoped component.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A component placed in `scope`.
    #[must_use]
    pub fn at(scope: EntityId) -> Self {
        Self {
            scope: Ref::from_entity_id(scope),
        }
    }

    /// The scope reference.
    pub fn scope(&self) -> &Ref<S> {
        &self.scope
    }

    /// Attaches the resolved scope entity. Returns false if its id differs
    /// from the current scope.
    pub fn resolve(&mut self, item: S) -> bool {
        resolve_ref(&mut self.scope, item)
    }
}

impl<S: Entity> ScopeComponent for Scope<S> {
    fn scope_id(&self) -> Option<EntityId> {
        self.scope.id()
    }

    fn set_scope_id(&mut self, scope: Option<EntityId>) -> bool {
        if self.scope.id() == scope {
            return false;
        }
        self.scope.set_id(scope);
        true
    }

    fn memberships(&self) -> Vec<EntityId> {
        self.scope.id().into_iter().collect()
    }

    fn restore(&mut self, scope: Option<EntityId>, _second: Option<EntityId>, _memberships: Vec<EntityId>) {
        self.scope.set_id(scope);
    }
}

/// A current scope plus every scope the entity is visible in.
///
/// `scopes` holds no duplicates and always contains the current scope.
#[derive(Debug, Clone)]
pub struct Multiscope<S> {
    scope: Ref<S>,
    scopes: Vec<EntityId>,
}

impl<S> Default for Multiscope<S> {
    fn default() -> Self {
        Self {
            scope: Ref::empty(),
            scopes: Vec::new(),
        }
    }
}

impl<S: Entity> Multiscope<S> {
    /// An unscoped component.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A component placed in `scope`.
    #[must_use]
    pub fn at(scope: EntityId) -> Self {
        Self {
            scope: Ref::from_entity_id(scope),
            scopes: vec![scope],
        }
    }

    /// The current scope reference.
    pub fn scope(&self) -> &Ref<S> {
        &self.scope
    }

    /// The membership list.
    pub fn scopes(&self) -> &[EntityId] {
        &self.scopes
    }

    /// Adds an extra membership without moving the current scope.
    pub fn share_with(&mut self, scope: EntityId) -> bool {
        move_membership(&mut self.scopes, None, Some(scope))
    }

    /// Removes an extra membership. The current scope cannot be revoked
    /// this way.
    pub fn revoke(&mut self, scope: EntityId) -> bool {
        if self.scope.id() == Some(scope) {
            return false;
        }
        move_membership(&mut self.scopes, Some(scope), None)
    }

    /// Attaches the resolved scope entity. Returns false on id mismatch.
    pub fn resolve(&mut self, item: S) -> bool {
        resolve_ref(&mut self.scope, item)
    }

    fn scopes_mut(&mut self) -> &mut Vec<EntityId> {
        &mut self.scopes
    }
}

impl<S: Entity> ScopeComponent for Multiscope<S> {
    fn scope_id(&self) -> Option<EntityId> {
        self.scope.id()
    }

    fn set_scope_id(&mut self, scope: Option<EntityId>) -> bool {
        let previous = self.scope.id();
        if previous == scope {
            return false;
        }
        self.scope.set_id(scope);
        move_membership(&mut self.scopes, previous, scope);
        true
    }

    fn memberships(&self) -> Vec<EntityId> {
        self.scopes.clone()
    }

    fn is_visible_in(&self, scope: EntityId) -> bool {
        self.scopes.contains(&scope)
    }

    fn restore(&mut self, scope: Option<EntityId>, _second: Option<EntityId>, memberships: Vec<EntityId>) {
        self.scope.set_id(scope);
        self.scopes.clear();
        for id in memberships.into_iter().chain(scope) {
            move_membership(&mut self.scopes, None, Some(id));
        }
    }
}

/// A [`Multiscope`] with an independent second scope axis.
///
/// The second scope is kept in the same membership list as the primary.
#[derive(Debug, Clone)]
pub struct SecondScope<S2, S> {
    primary: Multiscope<S>,
    second: Ref<S2>,
}

impl<S2, S> Default for SecondScope<S2, S> {
    fn default() -> Self {
        Self {
            primary: Multiscope::default(),
            second: Ref::empty(),
        }
    }
}

impl<S2: Entity, S: Entity> SecondScope<S2, S> {
    /// An unscoped component.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The primary component.
    pub fn primary(&self) -> &Multiscope<S> {
        &self.primary
    }

    /// The primary component, mutably.
    pub fn primary_mut(&mut self) -> &mut Multiscope<S> {
        &mut self.primary
    }

    /// The second scope reference.
    pub fn second_scope(&self) -> &Ref<S2> {
        &self.second
    }

    /// Attaches the resolved second scope entity. Returns false on id mismatch.
    pub fn resolve_second(&mut self, item: S2) -> bool {
        resolve_ref(&mut self.second, item)
    }
}

impl<S2: Entity, S: Entity> ScopeComponent for SecondScope<S2, S> {
    fn scope_id(&self) -> Option<EntityId> {
        self.primary.scope_id()
    }

    fn set_scope_id(&mut self, scope: Option<EntityId>) -> bool {
        self.primary.set_scope_id(scope)
    }

    fn memberships(&self) -> Vec<EntityId> {
        self.primary.memberships()
    }

    fn is_visible_in(&self, scope: EntityId) -> bool {
        self.primary.is_visible_in(scope)
    }

    fn second_scope_id(&self) -> Option<EntityId> {
        self.second.id()
    }

    fn set_second_scope_id(&mut self, scope: Option<EntityId>) -> bool {
        let previous = self.second.id();
        if previous == scope {
            return false;
        }
        self.second.set_id(scope);
        move_membership(self.primary.scopes_mut(), previous, scope);
        true
    }

    fn restore(&mut self, scope: Option<EntityId>, second: Option<EntityId>, memberships: Vec<EntityId>) {
        self.primary
            .restore(scope, None, memberships.into_iter().chain(second).collect());
        self.second.set_id(second);
    }
}

fn resolve_ref<T: Entity>(reference: &mut Ref<T>, item: T) -> bool {
    if reference.id().is_some() && item.id() != reference.id() {
        return false;
    }
    reference.set_item(item);
    true
}
