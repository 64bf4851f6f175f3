use crate::error::CoreResult;
use crate::id::EntityId;
use crate::query::{Filter, FindOptions, Page};
use crate::scope::ScopedEntity;
use async_trait::async_trait;
use scopedb_codec::Document;

/// Maps an entity type to its collection and document form.
///
/// Implementations handle domain fields only. The repository writes and
/// reads `_id`, `_v`, `scope`, `scopes` and `second_scope` itself, and
/// restores them onto the decoded entity.
pub trait DocumentCodec: Sized {
    /// Collection holding this type.
    const COLLECTION: &'static str;

    /// Encodes the domain fields.
    ///
    /// # Errors
    ///
    /// Returns an error if a field cannot be represented.
    fn to_document(&self) -> CoreResult<Document>;

    /// Decodes the domain fields.
    ///
    /// # Errors
    ///
    /// Returns an error if a required field is missing or mistyped.
    fn from_document(doc: &Document) -> CoreResult<Self>;
}

/// Scope-partitioned persistence for one entity type.
///
/// Every operation takes the target scope; `None` addresses the unscoped
/// partition. Reads, updates and deletes only ever see documents whose
/// stored scope equals the target. Misses are never errors.
///
/// Id parameters accept either text form. A malformed id fails with
/// `InvalidId` before any I/O.
#[async_trait]
pub trait ScopedRepository<T>: Send + Sync
where
    T: ScopedEntity + DocumentCodec + Send + Sync + 'static,
{
    /// Inserts `item` under `scope`, assigning an id if it has none.
    ///
    /// # Errors
    ///
    /// `DuplicateId` if the id is already stored in any scope.
    async fn insert(&self, scope: Option<EntityId>, item: &mut T) -> CoreResult<()>;

    /// Inserts every item under `scope` as one atomic write.
    ///
    /// # Errors
    ///
    /// `DuplicateId` if any id is taken or repeats. Nothing is written then.
    async fn insert_many(&self, scope: Option<EntityId>, items: &mut [T]) -> CoreResult<()>;

    /// Replaces `item`, which must already exist under `scope`.
    ///
    /// # Errors
    ///
    /// - `MissingId` if `item` has no id
    /// - `NotFoundInScope` if it is not stored under `scope`
    /// - `VersionConflict` if the stored version moved on
    async fn update(&self, scope: Option<EntityId>, item: &mut T) -> CoreResult<()>;

    /// Inserts or replaces `item` keyed by id, moving it to `scope`.
    ///
    /// An item stored under another scope is relocated, not copied.
    async fn upsert(&self, scope: Option<EntityId>, item: &mut T) -> CoreResult<()>;

    /// Same as [`ScopedRepository::upsert`].
    async fn save(&self, scope: Option<EntityId>, item: &mut T) -> CoreResult<()> {
        self.upsert(scope, item).await
    }

    /// Upserts `item` under its own current scope.
    async fn save_unscoped(&self, item: &mut T) -> CoreResult<()> {
        let scope = item.scope_id();
        self.upsert(scope, item).await
    }

    /// Writes only the tracked changes of `item`.
    ///
    /// Returns `false` without I/O when nothing changed.
    ///
    /// # Errors
    ///
    /// Same as [`ScopedRepository::update`].
    async fn apply_changes(&self, scope: Option<EntityId>, item: &mut T) -> CoreResult<bool>;

    /// Deletes the item with `id` under `scope`. Returns whether one was removed.
    ///
    /// # Errors
    ///
    /// `MissingId` for an empty id, `InvalidId` for a malformed one.
    async fn delete_by_id(&self, scope: Option<EntityId>, id: &str) -> CoreResult<bool>;

    /// Deletes `item` under `scope`.
    ///
    /// # Errors
    ///
    /// `MissingId` if `item` has no id.
    async fn delete(&self, scope: Option<EntityId>, item: &T) -> CoreResult<bool>;

    /// Deletes every item under `scope` matching `filter`.
    async fn delete_where(&self, scope: Option<EntityId>, filter: Filter) -> CoreResult<u64>;

    /// Looks up one item by id under `scope`.
    async fn by_id(&self, scope: Option<EntityId>, id: &str) -> CoreResult<Option<T>>;

    /// Looks up several items under `scope`, in request order. Misses are omitted.
    async fn by_ids(&self, scope: Option<EntityId>, ids: &[&str]) -> CoreResult<Vec<T>>;

    /// Counts items under `scope` matching `filter`.
    async fn count(&self, scope: Option<EntityId>, filter: Filter) -> CoreResult<u64>;

    /// Counts items matching `filter` under any of `scopes`.
    async fn count_many(&self, scopes: &[EntityId], filter: Filter) -> CoreResult<u64>;

    /// Every item under `scope`, in id order.
    async fn all(&self, scope: Option<EntityId>) -> CoreResult<Vec<T>>;

    /// One page of items under `scope` matching `filter`.
    async fn many(&self, scope: Option<EntityId>, filter: Filter, options: FindOptions) -> CoreResult<Page<T>>;

    /// The first item under `scope` matching `filter` in sort order, resuming
    /// after `continue_from` when set. Page size and number are ignored.
    async fn one(&self, scope: Option<EntityId>, filter: Filter, options: FindOptions) -> CoreResult<Option<T>> {
        let options = FindOptions {
            page_size: Some(1),
            page_number: None,
            ..options
        };
        let page = self.many(scope, filter, options).await?;
        Ok(page.items.into_iter().next())
    }

    /// Up to `count` items under `scope` matching `filter`, in random order.
    async fn random(&self, scope: Option<EntityId>, filter: Filter, count: usize) -> CoreResult<Vec<T>>;

    /// Items whose membership list contains `scope`, wherever they live.
    async fn visible_in(&self, scope: EntityId, filter: Filter) -> CoreResult<Vec<T>>;
}
