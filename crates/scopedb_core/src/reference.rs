//! Lazy references between entities.

use crate::entity::Entity;
use crate::error::{BoxError, CoreError, CoreResult};
use crate::id::{parse_id, EntityId};
use crate::repository::{DocumentCodec, ScopedRepository};
use crate::scope::ScopedEntity;
use scopedb_codec::Value;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A possibly unresolved pointer to another entity.
///
/// A `Ref` holds a target id and, once resolved, the target itself. When
/// the resolved item has an id, that id wins over the stored one. Equality
/// and hashing look at the id only, so a resolved and an unresolved
/// reference to the same id are equal.
pub struct Ref<T> {
    id: Option<EntityId>,
    item: Option<T>,
}

impl<T> Ref<T> {
    /// A reference to nothing.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            id: None,
            item: None,
        }
    }

    /// An unresolved reference to `id`.
    #[must_use]
    pub const fn from_entity_id(id: EntityId) -> Self {
        Self {
            id: Some(id),
            item: None,
        }
    }

    /// An unresolved reference from either id text form.
    ///
    /// Empty or whitespace input gives an empty reference.
    ///
    /// # Errors
    ///
    /// Returns `InvalidId` or `Format` for a malformed id.
    pub fn from_id(input: &str) -> CoreResult<Self> {
        Ok(Self {
            id: parse_id(input)?,
            item: None,
        })
    }

    /// The resolved item, if any.
    pub fn item(&self) -> Option<&T> {
        self.item.as_ref()
    }

    /// Takes the resolved item out of the reference.
    pub fn into_item(self) -> Option<T> {
        self.item
    }

    /// Returns true once an item has been resolved.
    pub fn is_resolved(&self) -> bool {
        self.item.is_some()
    }

    /// Forgets the resolved item, keeping the id.
    pub fn clear_item(&mut self) {
        self.item = None;
    }
}

impl<T: Entity> Ref<T> {
    /// A resolved reference to `entity`.
    pub fn from_entity(entity: T) -> Self {
        Self {
            id: entity.id(),
            item: Some(entity),
        }
    }

    /// The target id. A resolved item's id takes precedence.
    pub fn id(&self) -> Option<EntityId> {
        self.item.as_ref().and_then(Entity::id).or(self.id)
    }

    /// Returns true if the reference points at nothing.
    pub fn is_empty(&self) -> bool {
        self.id().is_none()
    }

    /// The target id in hex form.
    pub fn to_id_string(&self) -> Option<String> {
        self.id().map(|id| id.to_hex())
    }

    /// Points the reference at `id`, dropping a resolved item with another id.
    pub fn set_id(&mut self, id: Option<EntityId>) {
        if self.item.as_ref().and_then(Entity::id) != id {
            self.item = None;
        }
        self.id = id;
    }

    /// Stores a resolved item. Its id, when present, becomes the target id.
    pub fn set_item(&mut self, item: T) {
        if let Some(id) = item.id() {
            self.id = Some(id);
        }
        self.item = Some(item);
    }

    /// Resolves against a slice by first id match.
    ///
    /// Returns whether a match was found. A miss leaves the reference as it was.
    pub fn fetch_in(&mut self, candidates: &[T]) -> bool
    where
        T: Clone,
    {
        self.fetch_in_iter(candidates)
    }

    /// Resolves against borrowed candidates by first id match.
    pub fn fetch_in_iter<'a, I>(&mut self, candidates: I) -> bool
    where
        I: IntoIterator<Item = &'a T>,
        T: Clone + 'a,
    {
        let Some(id) = self.id() else {
            return false;
        };
        match candidates.into_iter().find(|c| c.id() == Some(id)) {
            Some(found) => {
                self.item = Some(found.clone());
                true
            }
            None => false,
        }
    }

    /// Resolves against an owned, lazily produced sequence.
    ///
    /// The sequence is consumed until a match or exhaustion and is dropped
    /// before this returns, whatever the outcome.
    pub fn fetch_from<I>(&mut self, source: I) -> bool
    where
        I: IntoIterator<Item = T>,
    {
        let Some(id) = self.id() else {
            return false;
        };
        let mut iter = source.into_iter();
        let found = iter.find(|c| c.id() == Some(id));
        drop(iter);
        match found {
            Some(item) => {
                self.item = Some(item);
                true
            }
            None => false,
        }
    }

    /// Resolves against a fallible sequence such as a cursor.
    ///
    /// Stops at the first error, which is returned as `ResolutionFailed`.
    /// The sequence is dropped before this returns.
    ///
    /// # Errors
    ///
    /// Returns `ResolutionFailed` if the sequence yields an error before a match.
    pub fn try_fetch_from<I, E>(&mut self, source: I) -> CoreResult<bool>
    where
        I: IntoIterator<Item = Result<T, E>>,
        E: Into<BoxError>,
    {
        let Some(id) = self.id() else {
            return Ok(false);
        };
        let mut iter = source.into_iter();
        let outcome = iter.find_map(|candidate| match candidate {
            Ok(c) if c.id() == Some(id) => Some(Ok(c)),
            Ok(_) => None,
            Err(e) => Some(Err(e)),
        });
        drop(iter);
        match outcome {
            Some(Ok(item)) => {
                self.item = Some(item);
                Ok(true)
            }
            Some(Err(e)) => Err(CoreError::resolution_failed(id.to_hex(), e)),
            None => Ok(false),
        }
    }

    /// Resolves through a lookup function.
    ///
    /// `Ok(None)` from the lookup is a miss, not an error.
    ///
    /// # Errors
    ///
    /// A lookup failure is wrapped as `ResolutionFailed` with the target id.
    pub fn fetch_with<F, E>(&mut self, lookup: F) -> CoreResult<bool>
    where
        F: FnOnce(&EntityId) -> Result<Option<T>, E>,
        E: Into<BoxError>,
    {
        let Some(id) = self.id() else {
            return Ok(false);
        };
        match lookup(&id) {
            Ok(Some(item)) => {
                self.item = Some(item);
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(CoreError::resolution_failed(id.to_hex(), e)),
        }
    }

    /// Resolves by asking a repository for the id under `scope`.
    ///
    /// # Errors
    ///
    /// Repository errors are wrapped as `ResolutionFailed`.
    pub async fn fetch_scoped<R>(&mut self, repo: &R, scope: Option<EntityId>) -> CoreResult<bool>
    where
        R: ScopedRepository<T> + ?Sized,
        T: ScopedEntity + DocumentCodec + Send + Sync + 'static,
    {
        let Some(id) = self.id() else {
            return Ok(false);
        };
        match repo.by_id(scope, &id.to_hex()).await {
            Ok(Some(item)) => {
                self.item = Some(item);
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(CoreError::resolution_failed(id.to_hex(), e)),
        }
    }

    /// The resolved item, or a default entity carrying only the target id.
    ///
    /// Returns `None` for an empty reference.
    pub fn as_stub(&self) -> Option<T>
    where
        T: Default + Clone,
    {
        if let Some(item) = &self.item {
            return Some(item.clone());
        }
        let id = self.id()?;
        let mut stub = T::default();
        stub.meta_mut().set_id(Some(id));
        Some(stub)
    }

    /// Persisted form: the hex id or null.
    pub fn to_value(&self) -> Value {
        self.id().map_or(Value::Null, Value::from)
    }

    /// Reads a persisted reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is neither null nor an id string.
    pub fn from_value(value: &Value) -> CoreResult<Self> {
        match value {
            Value::Null => Ok(Self::empty()),
            other => EntityId::try_from(other).map(Self::from_entity_id),
        }
    }
}

impl<T> Default for Ref<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: Clone> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            item: self.item.clone(),
        }
    }
}

impl<T> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref")
            .field("id", &self.id)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

impl<T: Entity> PartialEq for Ref<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl<T: Entity> Eq for Ref<T> {}

impl<T: Entity> Hash for Ref<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl<T: Entity> From<&Ref<T>> for Value {
    fn from(reference: &Ref<T>) -> Self {
        reference.to_value()
    }
}

impl<T: Entity> From<Ref<T>> for Value {
    fn from(reference: Ref<T>) -> Self {
        reference.to_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityMeta;
    use std::collections::HashSet;

    #[derive(Debug, Clone, Default)]
    struct Target {
        meta: EntityMeta,
        label: &'static str,
    }

    impl Target {
        fn new(id: EntityId, label: &'static str) -> Self {
            Self {
                meta: EntityMeta::with_id(id),
                label,
            }
        }
    }

    impl Entity for Target {
        fn meta(&self) -> &EntityMeta {
            &self.meta
        }
        fn meta_mut(&mut self) -> &mut EntityMeta {
            &mut self.meta
        }
    }

    const HEX: &str = "507f1f77bcf86cd799439011";

    fn id() -> EntityId {
        EntityId::from_hex(HEX).unwrap()
    }

    #[test]
    fn equality_ignores_resolution() {
        let by_id: Ref<Target> = Ref::from_id(HEX).unwrap();
        let by_compact: Ref<Target> = Ref::from_id("UH8fd7z4bNeZQ5AR").unwrap();
        let resolved = Ref::from_entity(Target::new(id(), "a"));

        assert_eq!(by_id, by_compact);
        assert_eq!(by_id, resolved);

        let set: HashSet<_> = [by_id, resolved].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn blank_input_is_empty_reference() {
        let r: Ref<Target> = Ref::from_id("  ").unwrap();
        assert!(r.is_empty());
        assert_eq!(r.to_value(), Value::Null);
        assert!(Ref::<Target>::from_id("xyz").is_err());
    }

    #[test]
    fn resolved_item_id_wins() {
        let mut r: Ref<Target> = Ref::from_id(HEX).unwrap();
        let other = EntityId::from_bytes([9; 12]);
        r.set_item(Target::new(other, "b"));
        assert_eq!(r.id(), Some(other));
        assert_eq!(r.to_id_string(), Some(other.to_hex()));
    }

    #[test]
    fn fetch_in_first_match() {
        let mut r: Ref<Target> = Ref::from_entity_id(id());
        let candidates = vec![
            Target::new(EntityId::from_bytes([1; 12]), "x"),
            Target::new(id(), "first"),
            Target::new(id(), "second"),
        ];
        assert!(r.fetch_in(&candidates));
        assert_eq!(r.item().map(|t| t.label), Some("first"));
    }

    #[test]
    fn fetch_miss_leaves_unresolved() {
        let mut r: Ref<Target> = Ref::from_entity_id(id());
        assert!(!r.fetch_in(&[Target::new(EntityId::from_bytes([1; 12]), "x")]));
        assert!(!r.is_resolved());
        assert!(!r.fetch_from(Vec::new()));
    }

    #[test]
    fn fetch_from_stops_at_match() {
        let mut pulled = 0;
        let source = (0u8..10).map(|n| {
            pulled += 1;
            if n == 3 {
                Target::new(id(), "hit")
            } else {
                Target::new(EntityId::from_bytes([n; 12]), "miss")
            }
        });
        let mut r: Ref<Target> = Ref::from_entity_id(id());
        assert!(r.fetch_from(source));
        assert_eq!(pulled, 4);
    }

    #[test]
    fn try_fetch_from_surfaces_errors() {
        let mut r: Ref<Target> = Ref::from_entity_id(id());
        let source: Vec<Result<Target, std::io::Error>> = vec![
            Ok(Target::new(EntityId::from_bytes([1; 12]), "x")),
            Err(std::io::Error::new(std::io::ErrorKind::Other, "cursor lost")),
        ];
        let err = r.try_fetch_from(source).unwrap_err();
        assert!(matches!(err, CoreError::ResolutionFailed { ref id, .. } if id == HEX));
    }

    #[test]
    fn fetch_with_wraps_failures() {
        let mut r: Ref<Target> = Ref::from_entity_id(id());
        let err = r
            .fetch_with(|_| Err::<Option<Target>, _>("backend down"))
            .unwrap_err();
        assert!(matches!(err, CoreError::ResolutionFailed { .. }));
        assert!(!r.is_resolved());

        assert!(!r.fetch_with(|_| Ok::<_, std::io::Error>(None)).unwrap());
        assert!(r
            .fetch_with(|found| Ok::<_, std::io::Error>(Some(Target::new(*found, "ok"))))
            .unwrap());
        assert_eq!(r.item().map(|t| t.label), Some("ok"));
    }

    #[test]
    fn stub_carries_only_id() {
        let r: Ref<Target> = Ref::from_entity_id(id());
        let stub = r.as_stub().unwrap();
        assert_eq!(stub.id(), Some(id()));
        assert_eq!(stub.label, "");
        assert!(Ref::<Target>::empty().as_stub().is_none());
    }

    #[test]
    fn value_round_trip() {
        let r: Ref<Target> = Ref::from_entity_id(id());
        let back: Ref<Target> = Ref::from_value(&r.to_value()).unwrap();
        assert_eq!(r, back);
        assert!(Ref::<Target>::from_value(&Value::Integer(3)).is_err());
    }
}
