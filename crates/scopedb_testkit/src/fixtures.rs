//! Fixture entities and repository helpers.
//!
//! [`ChildEntity`] lives in a single [`ParentScope`]; [`SharedNote`] is
//! multiscoped with a second scope. Both carry a [`DocumentCodec`] so they
//! can go through any repository.

use scopedb_codec::Document;
use scopedb_core::scope::{Scope, SecondScope};
use scopedb_core::{
    entity_identity, CoreResult, DocumentCodec, EngineConfig, Entity, EntityId, EntityMeta, LogEngine,
    MemoryEngine, Ref, Repository, RepositoryConfig, ScopedEntity,
};
use std::path::Path;
use tempfile::TempDir;

/// The entity type used as a scope.
#[derive(Debug, Clone, Default)]
pub struct ParentScope {
    meta: EntityMeta,
    /// Display name.
    pub name: String,
}

impl ParentScope {
    /// A scope entity with a fresh id.
    pub fn named(name: &str) -> Self {
        Self {
            meta: EntityMeta::with_id(EntityId::generate()),
            name: name.to_string(),
        }
    }

    /// The id to pass as a repository scope.
    pub fn scope(&self) -> Option<EntityId> {
        self.meta.id()
    }
}

impl Entity for ParentScope {
    fn meta(&self) -> &EntityMeta {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }
}

/// A singly scoped entity.
#[derive(Debug, Clone, Default)]
pub struct ChildEntity {
    meta: EntityMeta,
    scoping: Scope<ParentScope>,
    name: String,
    rank: i64,
    owner: Ref<ParentScope>,
}

impl ChildEntity {
    /// An unsaved child.
    pub fn new(name: &str, rank: i64) -> Self {
        Self {
            name: name.to_string(),
            rank,
            ..Self::default()
        }
    }

    /// An unsaved child with a caller-assigned id.
    pub fn with_id(id: EntityId, name: &str) -> Self {
        Self {
            meta: EntityMeta::with_id(id),
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// The name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets the name. Returns whether it changed.
    pub fn set_name(&mut self, name: &str) -> bool {
        self.meta.track("name", &mut self.name, name.to_string())
    }

    /// The rank.
    pub fn rank(&self) -> i64 {
        self.rank
    }

    /// Sets the rank. Returns whether it changed.
    pub fn set_rank(&mut self, rank: i64) -> bool {
        self.meta.track("rank", &mut self.rank, rank)
    }

    /// The owning scope entity.
    pub fn owner(&self) -> &Ref<ParentScope> {
        &self.owner
    }

    /// Sets the owner. Returns whether it changed.
    pub fn set_owner(&mut self, owner: Ref<ParentScope>) -> bool {
        self.meta.track("owner", &mut self.owner, owner)
    }
}

impl Entity for ChildEntity {
    fn meta(&self) -> &EntityMeta {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }
}

impl ScopedEntity for ChildEntity {
    type Scoping = Scope<ParentScope>;

    fn scoping(&self) -> &Self::Scoping {
        &self.scoping
    }
    fn scoping_parts_mut(&mut self) -> (&mut EntityMeta, &mut Self::Scoping) {
        (&mut self.meta, &mut self.scoping)
    }
}

impl DocumentCodec for ChildEntity {
    const COLLECTION: &'static str = "children";

    fn to_document(&self) -> CoreResult<Document> {
        let mut doc = Document::new();
        doc.set("name", self.name.as_str());
        doc.set("rank", self.rank);
        doc.set("owner", self.owner.to_value());
        Ok(doc)
    }

    fn from_document(doc: &Document) -> CoreResult<Self> {
        let owner = match doc.get("owner") {
            Some(value) => Ref::from_value(value)?,
            None => Ref::empty(),
        };
        Ok(Self {
            name: doc.require_text("name")?.to_string(),
            rank: doc.require_integer("rank")?,
            owner,
            ..Self::default()
        })
    }
}

/// A multiscoped entity with an independent second scope.
#[derive(Debug, Clone, Default)]
pub struct SharedNote {
    meta: EntityMeta,
    scoping: SecondScope<ParentScope, ParentScope>,
    /// Note body.
    pub title: String,
}

impl SharedNote {
    /// An unsaved note.
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Self::default()
        }
    }

    /// Adds a read-only membership.
    pub fn share_with(&mut self, scope: EntityId) -> bool {
        self.scoping.primary_mut().share_with(scope)
    }
}

impl Entity for SharedNote {
    fn meta(&self) -> &EntityMeta {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }
}

impl ScopedEntity for SharedNote {
    type Scoping = SecondScope<ParentScope, ParentScope>;

    fn scoping(&self) -> &Self::Scoping {
        &self.scoping
    }
    fn scoping_parts_mut(&mut self) -> (&mut EntityMeta, &mut Self::Scoping) {
        (&mut self.meta, &mut self.scoping)
    }
}

impl DocumentCodec for SharedNote {
    const COLLECTION: &'static str = "shared_notes";

    fn to_document(&self) -> CoreResult<Document> {
        let mut doc = Document::new();
        doc.set("title", self.title.as_str());
        Ok(doc)
    }

    fn from_document(doc: &Document) -> CoreResult<Self> {
        Ok(Self::new(doc.require_text("title")?))
    }
}

entity_identity!(ParentScope, ChildEntity, SharedNote);

/// A repository over a fresh [`MemoryEngine`].
pub fn memory_repository() -> Repository<MemoryEngine> {
    Repository::new(MemoryEngine::new(), RepositoryConfig::default())
}

/// A repository over a [`LogEngine`] in a temporary directory.
pub struct TestLogRepository {
    /// The repository.
    pub repo: Repository<LogEngine>,
    dir: TempDir,
}

impl TestLogRepository {
    /// Opens an engine in a new temporary directory.
    pub fn open() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let engine = LogEngine::open(dir.path(), EngineConfig::default()).expect("Failed to open log engine");
        Self {
            repo: Repository::new(engine, RepositoryConfig::default()),
            dir,
        }
    }

    /// Closes the engine and opens the same directory again.
    pub fn reopen(self) -> Self {
        let Self { repo, dir } = self;
        drop(repo);
        let engine = LogEngine::open(dir.path(), EngineConfig::default()).expect("Failed to reopen log engine");
        Self {
            repo: Repository::new(engine, RepositoryConfig::default()),
            dir,
        }
    }

    /// The database directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

impl std::ops::Deref for TestLogRepository {
    type Target = Repository<LogEngine>;

    fn deref(&self) -> &Self::Target {
        &self.repo
    }
}

/// Installs a test log subscriber honoring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use scopedb_core::scope::ScopeComponent;

    #[test]
    fn child_round_trips_through_codec() {
        let parent = ParentScope::named("acme");
        let mut child = ChildEntity::new("a", 3);
        child.set_owner(Ref::from_entity(parent.clone()));

        let doc = child.to_document().unwrap();
        let back = ChildEntity::from_document(&doc).unwrap();
        assert_eq!(back.name(), "a");
        assert_eq!(back.rank(), 3);
        assert_eq!(back.owner().id(), parent.id());
        assert!(!back.owner().is_resolved());
    }

    #[test]
    fn setters_track_changes() {
        let mut child = ChildEntity::new("a", 1);
        child.set_change_tracking(true);
        assert!(child.set_name("b"));
        assert!(!child.set_name("b"));
        assert!(child.set_rank(2));
        assert_eq!(child.changes().len(), 2);
    }

    #[test]
    fn shared_note_memberships() {
        let guest = EntityId::generate();
        let mut note = SharedNote::new("n");
        note.share_with(guest);
        assert!(note.scoping().is_visible_in(guest));
    }
}
