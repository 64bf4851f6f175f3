//! Identity, version and change-tracking state embedded in every entity.

use super::changes::ChangeSet;
use crate::id::EntityId;
use scopedb_codec::Value;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Receives a notification every time a tracked property changes.
pub trait PropertyObserver: Send + Sync {
    /// Called with the field name after the new value is assigned.
    fn property_changed(&self, field: &str);
}

impl<F> PropertyObserver for F
where
    F: Fn(&str) + Send + Sync,
{
    fn property_changed(&self, field: &str) {
        self(field)
    }
}

/// Field name used for identifier-change notifications.
pub const ID_PROPERTY: &str = "id";

/// Per-entity bookkeeping: id, version, changes and observers.
///
/// Equality is by id only, and an entity without an id is unequal to every
/// entity, itself included.
#[derive(Clone, Default)]
pub struct EntityMeta {
    id: Option<EntityId>,
    version: Option<i64>,
    changes: ChangeSet,
    tracking: bool,
    observers: Vec<Arc<dyn PropertyObserver>>,
}

impl EntityMeta {
    /// Creates metadata with no id and tracking disabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates metadata carrying an existing id.
    #[must_use]
    pub fn with_id(id: EntityId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    /// Returns the id.
    pub fn id(&self) -> Option<EntityId> {
        self.id
    }

    /// Replaces the id, notifying observers if it changed.
    ///
    /// The id is never written into the change set.
    pub fn set_id(&mut self, id: Option<EntityId>) -> bool {
        if self.id == id {
            return false;
        }
        self.id = id;
        self.notify(ID_PROPERTY);
        true
    }

    /// Returns the stored version.
    pub fn version(&self) -> Option<i64> {
        self.version
    }

    /// Sets the version. Only repositories should call this.
    pub fn set_version(&mut self, version: Option<i64>) {
        self.version = version;
    }

    /// Returns the recorded changes.
    pub fn changes(&self) -> &ChangeSet {
        &self.changes
    }

    /// Discards recorded changes.
    pub fn clear_changes(&mut self) {
        self.changes.clear();
    }

    /// Returns true if change tracking is on.
    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    /// Turns change tracking on or off. Existing changes are kept.
    pub fn set_tracking(&mut self, enabled: bool) {
        self.tracking = enabled;
    }

    /// Registers an observer for property changes.
    pub fn observe(&mut self, observer: impl PropertyObserver + 'static) {
        self.observers.push(Arc::new(observer));
    }

    /// Assigns `value` to `slot` if it differs.
    ///
    /// On change, observers are notified with `field` and, while tracking
    /// is on, `field -> value` is recorded. Returns whether a change occurred.
    ///
    /// ```
    /// use scopedb_core::EntityMeta;
    ///
    /// let mut meta = EntityMeta::new();
    /// meta.set_tracking(true);
    /// let mut name = String::new();
    /// assert!(meta.track("name", &mut name, "Ada".to_string()));
    /// assert!(!meta.track("name", &mut name, "Ada".to_string()));
    /// assert_eq!(meta.changes().len(), 1);
    /// ```
    pub fn track<V>(&mut self, field: &str, slot: &mut V, value: V) -> bool
    where
        V: PartialEq + Clone + Into<Value>,
    {
        if *slot == value {
            return false;
        }
        if self.tracking {
            self.changes.record(field, value.clone());
        }
        *slot = value;
        self.notify(field);
        true
    }

    /// Records a change computed by the caller, for fields whose new value
    /// is not a plain `Into<Value>` type.
    pub fn mark_changed(&mut self, field: &str, value: impl Into<Value>) {
        if self.tracking {
            self.changes.record(field, value);
        }
        self.notify(field);
    }

    fn notify(&self, field: &str) {
        for observer in &self.observers {
            observer.property_changed(field);
        }
    }
}

impl fmt::Debug for EntityMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityMeta")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("tracking", &self.tracking)
            .field("changes", &self.changes.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl PartialEq for EntityMeta {
    fn eq(&self, other: &Self) -> bool {
        match (self.id, other.id) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl Hash for EntityMeta {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
