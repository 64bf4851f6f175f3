//! The scoped repository contract and its engine-backed implementation.
//!
//! [`Repository`] implements [`ScopedRepository`] for every entity type
//! over any [`DocumentEngine`]. It owns id and version assignment, writes
//! the scope fields next to the codec's domain fields, and adds the scope
//! filter to every read, update and delete.
//!
//! Stored layout of one entity:
//!
//! | field | content |
//! |---|---|
//! | `_id` | hex id |
//! | `_v` | version, starting at 1 |
//! | `scope` | hex id of the current scope, or null |
//! | `scopes` | hex ids the entity is visible in |
//! | `second_scope` | hex id, only for entities that have one |

mod contract;

pub use contract::{DocumentCodec, ScopedRepository};

use crate::cancel::CancelToken;
use crate::config::RepositoryConfig;
use crate::engine::{document_id, DocumentEngine, ReplaceOutcome, ScanRequest, ID_FIELD, VERSION_FIELD};
use crate::error::{CoreError, CoreResult};
use crate::id::{parse_id, try_parse_id, EntityId, ParsedId};
use crate::query::{Filter, FindOptions, Page, SortDirection, SortOrder};
use crate::scope::{move_membership, ScopeComponent, ScopedEntity, SCOPES_FIELD, SCOPE_FIELD, SECOND_SCOPE_FIELD};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use scopedb_codec::{Document, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Filter selecting the partition of `scope`.
pub fn scope_filter(scope: Option<EntityId>) -> Filter {
    Filter::eq(SCOPE_FIELD, scope_value(scope))
}

fn scope_value(scope: Option<EntityId>) -> Value {
    scope.map_or(Value::Null, Value::from)
}

fn id_filter(id: EntityId) -> Filter {
    Filter::eq(ID_FIELD, id)
}

fn missing_id<T: DocumentCodec>() -> CoreError {
    CoreError::MissingId {
        collection: T::COLLECTION.to_string(),
    }
}

fn not_found<T: DocumentCodec>(scope: Option<EntityId>, id: EntityId) -> CoreError {
    CoreError::NotFoundInScope {
        collection: T::COLLECTION.to_string(),
        scope: scope.map_or_else(|| "none".to_string(), |s| s.to_hex()),
        id: id.to_hex(),
    }
}

fn stored_version(doc: &Document) -> i64 {
    doc.get(VERSION_FIELD).and_then(Value::as_integer).unwrap_or(0)
}

fn optional_id(doc: &Document, field: &str) -> CoreResult<Option<EntityId>> {
    match doc.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => EntityId::try_from(value).map(Some),
    }
}

/// Builds the stored form of `item` as it will be once placed in `scope`.
fn encode<T>(item: &T, id: EntityId, version: i64, scope: Option<EntityId>) -> CoreResult<Document>
where
    T: ScopedEntity + DocumentCodec,
{
    let mut doc = item.to_document()?;
    let mut memberships = item.scoping().memberships();
    move_membership(&mut memberships, item.scope_id(), scope);

    doc.set(ID_FIELD, id);
    doc.set(VERSION_FIELD, version);
    doc.set(SCOPE_FIELD, scope_value(scope));
    doc.set(SCOPES_FIELD, Value::array(memberships));
    if let Some(second) = item.scoping().second_scope_id() {
        doc.set(SECOND_SCOPE_FIELD, second);
    }
    Ok(doc)
}

fn decode<T>(doc: &Document) -> CoreResult<T>
where
    T: ScopedEntity + DocumentCodec,
{
    let mut item = T::from_document(doc)?;
    let id = document_id(doc)?;
    let scope = optional_id(doc, SCOPE_FIELD)?;
    let second = optional_id(doc, SECOND_SCOPE_FIELD)?;
    let memberships = match doc.get(SCOPES_FIELD).and_then(Value::as_array) {
        Some(items) => items.iter().map(EntityId::try_from).collect::<CoreResult<Vec<_>>>()?,
        None => Vec::new(),
    };

    let (meta, scoping) = item.scoping_parts_mut();
    meta.set_id(Some(id));
    meta.set_version(Some(stored_version(doc)));
    scoping.restore(scope, second, memberships);
    meta.clear_changes();
    Ok(item)
}

/// Marks `item` as persisted under `scope`.
fn stamp<T: ScopedEntity>(item: &mut T, id: EntityId, version: i64, scope: Option<EntityId>) {
    item.set_scope(scope);
    let meta = item.meta_mut();
    meta.set_id(Some(id));
    meta.set_version(Some(version));
    meta.clear_changes();
}

/// Appends an ascending `_id` key unless the order already has one.
fn with_tiebreaker(mut sort: Vec<SortOrder>) -> Vec<SortOrder> {
    if !sort.iter().any(|order| order.field == ID_FIELD) {
        sort.push(SortOrder::asc(ID_FIELD));
    }
    sort
}

fn past(order: &SortOrder, value: Value) -> Filter {
    match order.direction {
        SortDirection::Ascending => Filter::gt(order.field.clone(), value),
        SortDirection::Descending => Filter::lt(order.field.clone(), value),
    }
}

/// Matches documents sorting strictly after `anchor` under `sort`.
///
/// For keys `k1..kn` this is `k1 > a1 OR (k1 = a1 AND k2 > a2) OR ...`.
fn keyset_filter(sort: &[SortOrder], anchor: &Document) -> Filter {
    let mut branches = Vec::with_capacity(sort.len());
    let mut prefix = Filter::All;
    for order in sort {
        let value = anchor.get(&order.field).cloned().unwrap_or(Value::Null);
        branches.push(prefix.clone().and(past(order, value.clone())));
        prefix = prefix.and(Filter::eq(order.field.clone(), value));
    }
    Filter::Or(branches)
}

/// A [`ScopedRepository`] over a [`DocumentEngine`].
///
/// Cloning is cheap and shares the engine. Attach a [`CancelToken`] with
/// [`Repository::with_cancellation`] to make a handle whose operations stop
/// once the token fires.
pub struct Repository<E> {
    engine: Arc<E>,
    config: RepositoryConfig,
    cancel: Option<CancelToken>,
}

impl<E> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            config: self.config.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<E> fmt::Debug for Repository<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("config", &self.config)
            .field("cancellable", &self.cancel.is_some())
            .finish_non_exhaustive()
    }
}

impl<E: DocumentEngine> Repository<E> {
    /// Creates a repository owning `engine`.
    pub fn new(engine: E, config: RepositoryConfig) -> Self {
        Self::from_shared(Arc::new(engine), config)
    }

    /// Creates a repository over a shared engine.
    pub fn from_shared(engine: Arc<E>, config: RepositoryConfig) -> Self {
        Self {
            engine,
            config,
            cancel: None,
        }
    }

    /// The underlying engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// The configuration.
    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Returns a handle sharing this engine whose operations observe `token`.
    #[must_use]
    pub fn with_cancellation(&self, token: CancelToken) -> Self {
        Self {
            cancel: Some(token),
            ..self.clone()
        }
    }

    fn check_cancelled(&self) -> CoreResult<()> {
        match &self.cancel {
            Some(token) => token.check(),
            None => Ok(()),
        }
    }

    fn request(&self, filter: Filter) -> ScanRequest {
        ScanRequest::new(filter).batch_size(self.config.scan_batch_size)
    }

    /// Drains a scan, checking for cancellation between batches.
    async fn collect(&self, collection: &str, request: ScanRequest) -> CoreResult<Vec<Document>> {
        let mut cursor = self.engine.scan(collection, request).await?;
        let mut docs = Vec::new();
        loop {
            self.check_cancelled()?;
            match cursor.next_batch().await? {
                Some(batch) => docs.extend(batch),
                None => return Ok(docs),
            }
        }
    }

    async fn find_doc(&self, collection: &str, filter: Filter) -> CoreResult<Option<Document>> {
        let docs = self
            .collect(collection, self.request(filter).window(0, Some(1)))
            .await?;
        Ok(docs.into_iter().next())
    }

    /// Loads the stored document of `id` under `scope` and checks the
    /// caller's version against it. Returns the stored version.
    async fn current_version<T>(&self, scope: Option<EntityId>, id: EntityId, held: Option<i64>) -> CoreResult<i64>
    where
        T: DocumentCodec,
    {
        let stored = self
            .find_doc(T::COLLECTION, id_filter(id).and(scope_filter(scope)))
            .await?
            .ok_or_else(|| not_found::<T>(scope, id))?;
        let actual = stored_version(&stored);
        match held {
            Some(expected) if self.config.optimistic_concurrency && expected != actual => {
                Err(CoreError::VersionConflict {
                    collection: T::COLLECTION.to_string(),
                    id: id.to_hex(),
                    expected,
                    actual,
                })
            }
            _ => Ok(actual),
        }
    }

    /// Explains a guarded write that matched nothing: the document either
    /// left the scope or its version moved.
    async fn missed_write<T>(&self, scope: Option<EntityId>, id: EntityId, expected: i64) -> CoreError
    where
        T: DocumentCodec,
    {
        match self
            .find_doc(T::COLLECTION, id_filter(id).and(scope_filter(scope)))
            .await
        {
            Ok(Some(doc)) => CoreError::VersionConflict {
                collection: T::COLLECTION.to_string(),
                id: id.to_hex(),
                expected,
                actual: stored_version(&doc),
            },
            Ok(None) => not_found::<T>(scope, id),
            Err(e) => e,
        }
    }

    /// Filter for items after the continuation token.
    ///
    /// The anchor is looked up in the target scope only. A token that is
    /// not found there resumes after its id.
    async fn resume_after<T>(&self, scope: Option<EntityId>, token: EntityId, sort: &[SortOrder]) -> CoreResult<Filter>
    where
        T: DocumentCodec,
    {
        let anchor = self
            .find_doc(T::COLLECTION, id_filter(token).and(scope_filter(scope)))
            .await?;
        match anchor {
            Some(anchor) => Ok(keyset_filter(sort, &anchor)),
            None => {
                warn!(
                    collection = T::COLLECTION,
                    scope = ?scope,
                    token = %token,
                    "continuation token not found in scope, resuming after its id"
                );
                let by_id = sort
                    .iter()
                    .find(|order| order.field == ID_FIELD)
                    .cloned()
                    .unwrap_or_else(|| SortOrder::asc(ID_FIELD));
                Ok(past(&by_id, Value::from(token)))
            }
        }
    }
}

#[async_trait]
impl<E, T> ScopedRepository<T> for Repository<E>
where
    E: DocumentEngine,
    T: ScopedEntity + DocumentCodec + Send + Sync + 'static,
{
    async fn insert(&self, scope: Option<EntityId>, item: &mut T) -> CoreResult<()> {
        let id = item.id().unwrap_or_else(EntityId::generate);
        let doc = encode(item, id, 1, scope)?;
        self.check_cancelled()?;
        self.engine.insert_many(T::COLLECTION, vec![doc]).await?;
        debug!(collection = T::COLLECTION, scope = ?scope, id = %id, "inserted");
        stamp(item, id, 1, scope);
        Ok(())
    }

    async fn insert_many(&self, scope: Option<EntityId>, items: &mut [T]) -> CoreResult<()> {
        if items.is_empty() {
            return Ok(());
        }
        let ids: Vec<EntityId> = items
            .iter()
            .map(|item| item.id().unwrap_or_else(EntityId::generate))
            .collect();
        let docs = items
            .iter()
            .zip(&ids)
            .map(|(item, id)| encode(item, *id, 1, scope))
            .collect::<CoreResult<Vec<_>>>()?;
        self.check_cancelled()?;
        self.engine.insert_many(T::COLLECTION, docs).await?;
        debug!(collection = T::COLLECTION, scope = ?scope, count = ids.len(), "inserted batch");
        for (item, id) in items.iter_mut().zip(ids) {
            stamp(item, id, 1, scope);
        }
        Ok(())
    }

    async fn update(&self, scope: Option<EntityId>, item: &mut T) -> CoreResult<()> {
        let id = item.id().ok_or_else(missing_id::<T>)?;
        let current = self.current_version::<T>(scope, id, item.version()).await?;
        let next = current + 1;
        let doc = encode(item, id, next, scope)?;
        let guard = id_filter(id)
            .and(scope_filter(scope))
            .and(Filter::eq(VERSION_FIELD, current));

        self.check_cancelled()?;
        match self.engine.replace_one(T::COLLECTION, &guard, doc, false).await? {
            ReplaceOutcome::Replaced => {}
            ReplaceOutcome::Inserted | ReplaceOutcome::Missed => {
                return Err(self.missed_write::<T>(scope, id, current).await);
            }
        }
        debug!(collection = T::COLLECTION, scope = ?scope, id = %id, version = next, "updated");
        stamp(item, id, next, scope);
        Ok(())
    }

    async fn upsert(&self, scope: Option<EntityId>, item: &mut T) -> CoreResult<()> {
        let id = item.id().unwrap_or_else(EntityId::generate);
        let existing = self.find_doc(T::COLLECTION, id_filter(id)).await?;
        let version = existing.as_ref().map_or(1, |doc| stored_version(doc) + 1);
        let previous_scope = match &existing {
            Some(doc) => Some(optional_id(doc, SCOPE_FIELD)?),
            None => None,
        };
        let doc = encode(item, id, version, scope)?;

        self.check_cancelled()?;
        let outcome = self
            .engine
            .replace_one(T::COLLECTION, &id_filter(id), doc, true)
            .await?;
        match previous_scope {
            Some(previous) if previous != scope => debug!(
                collection = T::COLLECTION,
                from = ?previous,
                to = ?scope,
                id = %id,
                "moved between scopes"
            ),
            _ => debug!(collection = T::COLLECTION, scope = ?scope, id = %id, ?outcome, "upserted"),
        }
        stamp(item, id, version, scope);
        Ok(())
    }

    async fn apply_changes(&self, scope: Option<EntityId>, item: &mut T) -> CoreResult<bool> {
        if item.changes().is_empty() {
            return Ok(false);
        }
        let id = item.id().ok_or_else(missing_id::<T>)?;
        let current = self.current_version::<T>(scope, id, item.version()).await?;
        let next = current + 1;

        // Dotted keys stay literal so the merge only touches the named paths.
        let mut fields: BTreeMap<String, Value> = item
            .changes()
            .iter()
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect();
        fields.insert(VERSION_FIELD.to_string(), Value::from(next));
        let guard = id_filter(id)
            .and(scope_filter(scope))
            .and(Filter::eq(VERSION_FIELD, current));

        self.check_cancelled()?;
        let matched = self
            .engine
            .update_fields(T::COLLECTION, &guard, Document::from(fields))
            .await?;
        if matched == 0 {
            return Err(self.missed_write::<T>(scope, id, current).await);
        }
        debug!(
            collection = T::COLLECTION,
            scope = ?scope,
            id = %id,
            fields = item.changes().len(),
            "applied changes"
        );
        let meta = item.meta_mut();
        meta.set_version(Some(next));
        meta.clear_changes();
        Ok(true)
    }

    async fn delete_by_id(&self, scope: Option<EntityId>, id: &str) -> CoreResult<bool> {
        let id = parse_id(id)?.ok_or_else(missing_id::<T>)?;
        self.check_cancelled()?;
        let deleted = self
            .engine
            .delete_many(T::COLLECTION, &id_filter(id).and(scope_filter(scope)))
            .await?;
        debug!(collection = T::COLLECTION, scope = ?scope, id = %id, deleted, "delete by id");
        Ok(deleted > 0)
    }

    async fn delete(&self, scope: Option<EntityId>, item: &T) -> CoreResult<bool> {
        let id = item.id().ok_or_else(missing_id::<T>)?;
        ScopedRepository::<T>::delete_by_id(self, scope, &id.to_hex()).await
    }

    async fn delete_where(&self, scope: Option<EntityId>, filter: Filter) -> CoreResult<u64> {
        self.check_cancelled()?;
        let deleted = self
            .engine
            .delete_many(T::COLLECTION, &scope_filter(scope).and(filter))
            .await?;
        debug!(collection = T::COLLECTION, scope = ?scope, deleted, "delete where");
        Ok(deleted)
    }

    async fn by_id(&self, scope: Option<EntityId>, id: &str) -> CoreResult<Option<T>> {
        let Some(id) = parse_id(id)? else {
            return Ok(None);
        };
        self.check_cancelled()?;
        self.find_doc(T::COLLECTION, id_filter(id).and(scope_filter(scope)))
            .await?
            .map(|doc| decode(&doc))
            .transpose()
    }

    async fn by_ids(&self, scope: Option<EntityId>, ids: &[&str]) -> CoreResult<Vec<T>> {
        let mut seen = HashSet::with_capacity(ids.len());
        let mut wanted = Vec::with_capacity(ids.len());
        for input in ids {
            if let Some(id) = parse_id(input)? {
                if seen.insert(id) {
                    wanted.push(id);
                }
            }
        }
        if wanted.is_empty() {
            return Ok(Vec::new());
        }
        self.check_cancelled()?;

        let filter = Filter::is_in(ID_FIELD, wanted.iter().copied()).and(scope_filter(scope));
        let docs = self.collect(T::COLLECTION, self.request(filter)).await?;
        let mut found: HashMap<EntityId, T> = HashMap::with_capacity(docs.len());
        for doc in &docs {
            found.insert(document_id(doc)?, decode(doc)?);
        }
        Ok(wanted.iter().filter_map(|id| found.remove(id)).collect())
    }

    async fn count(&self, scope: Option<EntityId>, filter: Filter) -> CoreResult<u64> {
        self.check_cancelled()?;
        self.engine
            .count(T::COLLECTION, &scope_filter(scope).and(filter))
            .await
    }

    async fn count_many(&self, scopes: &[EntityId], filter: Filter) -> CoreResult<u64> {
        if scopes.is_empty() {
            return Ok(0);
        }
        self.check_cancelled()?;
        let in_scopes = Filter::is_in(SCOPE_FIELD, scopes.iter().copied());
        self.engine.count(T::COLLECTION, &in_scopes.and(filter)).await
    }

    async fn all(&self, scope: Option<EntityId>) -> CoreResult<Vec<T>> {
        self.check_cancelled()?;
        let docs = self
            .collect(T::COLLECTION, self.request(scope_filter(scope)))
            .await?;
        docs.iter().map(decode).collect()
    }

    async fn many(&self, scope: Option<EntityId>, filter: Filter, options: FindOptions) -> CoreResult<Page<T>> {
        let page_size = self.config.effective_page_size(options.page_size);
        let sort = with_tiebreaker(options.sort);
        let token = match options.continue_from.as_deref() {
            None => None,
            Some(input) => match try_parse_id(input)? {
                ParsedId::Id(id) => Some(id),
                ParsedId::Empty => None,
                ParsedId::Rejected => return Err(CoreError::invalid_id(input)),
            },
        };
        self.check_cancelled()?;

        let mut query = scope_filter(scope).and(filter);
        let skip = match token {
            Some(token) => {
                query = query.and(self.resume_after::<T>(scope, token, &sort).await?);
                0
            }
            None => options
                .page_number
                .unwrap_or(1)
                .saturating_sub(1)
                .saturating_mul(page_size),
        };

        let request = self.request(query).sorted(sort).window(skip, Some(page_size));
        let docs = self.collect(T::COLLECTION, request).await?;
        let items = docs.iter().map(decode).collect::<CoreResult<Vec<T>>>()?;
        let continuation = if items.len() == page_size {
            items.last().and_then(|item| item.id()).map(|id| id.to_hex())
        } else {
            None
        };
        debug!(
            collection = T::COLLECTION,
            scope = ?scope,
            items = items.len(),
            more = continuation.is_some(),
            "page"
        );
        Ok(Page { items, continuation })
    }

    async fn random(&self, scope: Option<EntityId>, filter: Filter, count: usize) -> CoreResult<Vec<T>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        self.check_cancelled()?;
        let mut docs = self
            .collect(T::COLLECTION, self.request(scope_filter(scope).and(filter)))
            .await?;
        docs.shuffle(&mut rand::thread_rng());
        docs.truncate(count);
        docs.iter().map(decode).collect()
    }

    async fn visible_in(&self, scope: EntityId, filter: Filter) -> CoreResult<Vec<T>> {
        self.check_cancelled()?;
        let filter = Filter::contains(SCOPES_FIELD, scope).and(filter);
        let docs = self.collect(T::COLLECTION, self.request(filter)).await?;
        docs.iter().map(decode).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryEngine;
    use crate::entity::{Entity, EntityMeta};
    use crate::scope::{Multiscope, Scope};

    #[derive(Debug, Clone, Default)]
    struct Tenant {
        meta: EntityMeta,
    }

    impl Entity for Tenant {
        fn meta(&self) -> &EntityMeta {
            &self.meta
        }
        fn meta_mut(&mut self) -> &mut EntityMeta {
            &mut self.meta
        }
    }

    #[derive(Debug, Clone, Default)]
    struct Note {
        meta: EntityMeta,
        scoping: Scope<Tenant>,
        title: String,
        rank: i64,
    }

    impl Note {
        fn new(title: &str, rank: i64) -> Self {
            Self {
                title: title.to_string(),
                rank,
                ..Self::default()
            }
        }

        fn set_title(&mut self, title: &str) -> bool {
            self.meta.track("title", &mut self.title, title.to_string())
        }
    }

    impl Entity for Note {
        fn meta(&self) -> &EntityMeta {
            &self.meta
        }
        fn meta_mut(&mut self) -> &mut EntityMeta {
            &mut self.meta
        }
    }

    impl ScopedEntity for Note {
        type Scoping = Scope<Tenant>;

        fn scoping(&self) -> &Self::Scoping {
            &self.scoping
        }
        fn scoping_parts_mut(&mut self) -> (&mut EntityMeta, &mut Self::Scoping) {
            (&mut self.meta, &mut self.scoping)
        }
    }

    impl DocumentCodec for Note {
        const COLLECTION: &'static str = "notes";

        fn to_document(&self) -> CoreResult<Document> {
            let mut doc = Document::new();
            doc.set("title", self.title.as_str());
            doc.set("rank", self.rank);
            Ok(doc)
        }

        fn from_document(doc: &Document) -> CoreResult<Self> {
            Ok(Self {
                title: doc.require_text("title")?.to_string(),
                rank: doc.require_integer("rank")?,
                ..Self::default()
            })
        }
    }

    #[derive(Debug, Clone, Default)]
    struct Shared {
        meta: EntityMeta,
        scoping: Multiscope<Tenant>,
    }

    impl Entity for Shared {
        fn meta(&self) -> &EntityMeta {
            &self.meta
        }
        fn meta_mut(&mut self) -> &mut EntityMeta {
            &mut self.meta
        }
    }

    impl ScopedEntity for Shared {
        type Scoping = Multiscope<Tenant>;

        fn scoping(&self) -> &Self::Scoping {
            &self.scoping
        }
        fn scoping_parts_mut(&mut self) -> (&mut EntityMeta, &mut Self::Scoping) {
            (&mut self.meta, &mut self.scoping)
        }
    }

    impl DocumentCodec for Shared {
        const COLLECTION: &'static str = "shared";

        fn to_document(&self) -> CoreResult<Document> {
            Ok(Document::new())
        }

        fn from_document(_doc: &Document) -> CoreResult<Self> {
            Ok(Self::default())
        }
    }

    fn tenant(n: u8) -> Option<EntityId> {
        Some(EntityId::from_bytes([n; 12]))
    }

    fn repo() -> Repository<MemoryEngine> {
        Repository::new(MemoryEngine::new(), RepositoryConfig::default())
    }

    #[tokio::test]
    async fn insert_assigns_id_version_and_scope() {
        let repo = repo();
        let mut note = Note::new("a", 1);
        note.set_change_tracking(true);
        note.set_title("b");
        repo.insert(tenant(1), &mut note).await.unwrap();

        assert!(note.id().is_some());
        assert_eq!(note.version(), Some(1));
        assert_eq!(note.scope_id(), tenant(1));
        assert!(note.changes().is_empty());

        let stored: Note = repo
            .by_id(tenant(1), &note.id().unwrap().to_compact())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.title, "b");
        assert_eq!(stored.scope_id(), tenant(1));
        assert_eq!(stored.version(), Some(1));
    }

    #[tokio::test]
    async fn failed_insert_leaves_entity_untouched() {
        let repo = repo();
        let mut first = Note::new("a", 1);
        repo.insert(tenant(1), &mut first).await.unwrap();

        let mut clash = Note::new("b", 2);
        clash.meta_mut().set_id(first.id());
        let err = repo.insert(tenant(2), &mut clash).await.unwrap_err();
        assert!(matches!(err, CoreError::DuplicateId { .. }));
        assert_eq!(clash.version(), None);
        assert_eq!(clash.scope_id(), None);
    }

    #[tokio::test]
    async fn update_checks_version() {
        let repo = repo();
        let mut note = Note::new("a", 1);
        repo.insert(tenant(1), &mut note).await.unwrap();
        let mut stale = note.clone();

        note.set_title("b");
        repo.update(tenant(1), &mut note).await.unwrap();
        assert_eq!(note.version(), Some(2));

        stale.set_title("c");
        let err = repo.update(tenant(1), &mut stale).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::VersionConflict { expected: 1, actual: 2, .. }
        ));
    }

    #[tokio::test]
    async fn update_without_version_check() {
        let repo = Repository::new(
            MemoryEngine::new(),
            RepositoryConfig::default().optimistic_concurrency(false),
        );
        let mut note = Note::new("a", 1);
        repo.insert(tenant(1), &mut note).await.unwrap();
        let mut stale = note.clone();
        repo.update(tenant(1), &mut note).await.unwrap();
        repo.update(tenant(1), &mut stale).await.unwrap();
        assert_eq!(stale.version(), Some(3));
    }

    #[tokio::test]
    async fn update_in_wrong_scope_is_not_found() {
        let repo = repo();
        let mut note = Note::new("a", 1);
        repo.insert(tenant(1), &mut note).await.unwrap();
        let err = repo.update(tenant(2), &mut note).await.unwrap_err();
        assert!(err.is_not_found());

        let mut unsaved = Note::new("x", 0);
        assert!(matches!(
            repo.update(tenant(1), &mut unsaved).await,
            Err(CoreError::MissingId { .. })
        ));
    }

    #[tokio::test]
    async fn apply_changes_writes_only_tracked_fields() {
        let repo = repo();
        let mut note = Note::new("a", 7);
        repo.insert(tenant(1), &mut note).await.unwrap();
        assert!(!repo.apply_changes(tenant(1), &mut note).await.unwrap());

        note.set_change_tracking(true);
        note.set_title("b");
        note.rank = 99;
        assert!(repo.apply_changes(tenant(1), &mut note).await.unwrap());
        assert_eq!(note.version(), Some(2));
        assert!(note.changes().is_empty());

        let stored: Note = repo
            .by_id(tenant(1), &note.id().unwrap().to_hex())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.title, "b");
        assert_eq!(stored.rank, 7);
        assert_eq!(stored.version(), Some(2));
    }

    #[tokio::test]
    async fn by_ids_keeps_request_order() {
        let repo = repo();
        let mut notes: Vec<Note> = (0..3).map(|n| Note::new("n", n)).collect();
        repo.insert_many(tenant(1), &mut notes).await.unwrap();
        let ids: Vec<String> = notes.iter().map(|n| n.id().unwrap().to_hex()).collect();
        let foreign = EntityId::generate().to_hex();
        let request = [ids[2].as_str(), foreign.as_str(), "", ids[0].as_str(), ids[2].as_str()];

        let found: Vec<Note> = repo.by_ids(tenant(1), &request).await.unwrap();
        let ranks: Vec<i64> = found.iter().map(|n| n.rank).collect();
        assert_eq!(ranks, vec![2, 0]);
    }

    #[tokio::test]
    async fn malformed_ids_fail_before_io() {
        let repo = repo();
        let by_id: CoreResult<Option<Note>> = repo.by_id(tenant(1), "nope").await;
        assert!(matches!(by_id, Err(CoreError::InvalidId { .. })));
        let empty: Option<Note> = repo.by_id(tenant(1), "  ").await.unwrap();
        assert!(empty.is_none());

        let page: CoreResult<Page<Note>> = repo
            .many(tenant(1), Filter::All, FindOptions::new().continue_from("zz"))
            .await;
        assert!(matches!(page, Err(CoreError::InvalidId { .. })));

        let deleted = ScopedRepository::<Note>::delete_by_id(&repo, tenant(1), "").await;
        assert!(matches!(deleted, Err(CoreError::MissingId { .. })));
    }

    #[tokio::test]
    async fn continuation_follows_custom_sort() {
        let repo = repo();
        let mut notes: Vec<Note> = [3, 1, 2, 1, 3, 2]
            .iter()
            .map(|rank| Note::new("n", *rank))
            .collect();
        repo.insert_many(tenant(1), &mut notes).await.unwrap();

        let options = FindOptions::new()
            .page_size(4)
            .sort_by(SortOrder::desc("rank"));
        let first: Page<Note> = repo
            .many(tenant(1), Filter::All, options.clone())
            .await
            .unwrap();
        assert_eq!(first.len(), 4);
        let token = first.continuation.clone().unwrap();

        let second: Page<Note> = repo
            .many(tenant(1), Filter::All, options.continue_from(token))
            .await
            .unwrap();
        assert_eq!(second.len(), 2);
        assert!(!second.has_more());

        let ranks: Vec<i64> = first.items.iter().chain(&second.items).map(|n| n.rank).collect();
        assert_eq!(ranks, vec![3, 3, 2, 2, 1, 1]);
        let ids: HashSet<EntityId> = first
            .items
            .iter()
            .chain(&second.items)
            .filter_map(|n| n.id())
            .collect();
        assert_eq!(ids.len(), 6);
    }

    #[tokio::test]
    async fn page_numbers_skip() {
        let repo = repo();
        let mut notes: Vec<Note> = (0..5).map(|n| Note::new("n", n)).collect();
        repo.insert_many(None, &mut notes).await.unwrap();

        let options = FindOptions::new().page_size(2).page(3).sort_by(SortOrder::asc("rank"));
        let page: Page<Note> = repo.many(None, Filter::All, options).await.unwrap();
        assert_eq!(page.items.iter().map(|n| n.rank).collect::<Vec<_>>(), vec![4]);
        assert!(!page.has_more());

        let one: Option<Note> = repo
            .one(
                None,
                Filter::gt("rank", 1i64),
                FindOptions::new().page(3).sort_by(SortOrder::asc("rank")),
            )
            .await
            .unwrap();
        assert_eq!(one.map(|n| n.rank), Some(2));
    }

    #[tokio::test]
    async fn cancelled_handle_writes_nothing() {
        let repo = repo();
        let token = CancelToken::new();
        let cancellable = repo.with_cancellation(token.clone());
        token.cancel();

        let mut note = Note::new("a", 1);
        let err = cancellable.insert(tenant(1), &mut note).await.unwrap_err();
        assert!(matches!(err, CoreError::Cancelled));
        assert!(note.id().is_none());
        assert_eq!(ScopedRepository::<Note>::count(&repo, tenant(1), Filter::All).await.unwrap(), 0);

        let read: CoreResult<Vec<Note>> = cancellable.all(tenant(1)).await;
        assert!(matches!(read, Err(CoreError::Cancelled)));
    }

    #[tokio::test]
    async fn random_stays_in_scope() {
        let repo = repo();
        let mut mine: Vec<Note> = (0..4).map(|n| Note::new("mine", n)).collect();
        let mut theirs: Vec<Note> = (0..4).map(|n| Note::new("theirs", n)).collect();
        repo.insert_many(tenant(1), &mut mine).await.unwrap();
        repo.insert_many(tenant(2), &mut theirs).await.unwrap();

        let picked: Vec<Note> = repo.random(tenant(1), Filter::All, 3).await.unwrap();
        assert_eq!(picked.len(), 3);
        assert!(picked.iter().all(|n| n.title == "mine"));
        let all: Vec<Note> = repo.random(tenant(1), Filter::All, 10).await.unwrap();
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn shared_entities_are_visible_in_every_membership() {
        let repo = repo();
        let mut item = Shared::default();
        item.scoping.share_with(EntityId::from_bytes([9; 12]));
        repo.insert(tenant(1), &mut item).await.unwrap();

        let owner = tenant(1).unwrap();
        let guest = EntityId::from_bytes([9; 12]);
        let in_guest: Vec<Shared> = repo.visible_in(guest, Filter::All).await.unwrap();
        let in_owner: Vec<Shared> = repo.visible_in(owner, Filter::All).await.unwrap();
        assert_eq!(in_guest.len(), 1);
        assert_eq!(in_owner.len(), 1);

        let restored = &in_guest[0];
        assert_eq!(restored.scope_id(), Some(owner));
        assert!(restored.is_visible_in(guest));
        assert_eq!(
            ScopedRepository::<Shared>::count(&repo, Some(guest), Filter::All)
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn count_many_spans_scopes() {
        let repo = repo();
        for n in 1..=3u8 {
            let mut note = Note::new("n", i64::from(n));
            repo.insert(tenant(n), &mut note).await.unwrap();
        }
        let scopes = [tenant(1).unwrap(), tenant(3).unwrap()];
        let counted = ScopedRepository::<Note>::count_many(&repo, &scopes, Filter::All)
            .await
            .unwrap();
        assert_eq!(counted, 2);
        assert_eq!(
            ScopedRepository::<Note>::count_many(&repo, &[], Filter::All).await.unwrap(),
            0
        );
    }
}
