//! Runs the repository conformance suite against every engine.

use scopedb_codec::Document;
use scopedb_core::{
    CancelToken, CoreError, DocumentEngine, EngineConfig, Entity, Filter, LogEngine,
    Repository, RepositoryConfig, ScopedRepository,
};
use scopedb_storage::InMemoryBackend;
use scopedb_testkit::prelude::*;

#[tokio::test]
async fn memory_engine_conforms() {
    init_tracing();
    run_conformance(&memory_repository()).await;
}

#[tokio::test]
async fn log_engine_in_memory_conforms() {
    init_tracing();
    let engine = LogEngine::with_backend(Box::new(InMemoryBackend::new()), EngineConfig::default()).unwrap();
    run_conformance(&Repository::new(engine, RepositoryConfig::default())).await;
}

#[tokio::test]
async fn log_engine_on_disk_conforms() {
    init_tracing();
    let fixture = TestLogRepository::open();
    run_conformance(&*fixture).await;
}

#[tokio::test]
async fn small_cursor_batches_conform() {
    let repo = Repository::new(
        scopedb_core::MemoryEngine::new(),
        RepositoryConfig::default().scan_batch_size(1),
    );
    run_conformance(&repo).await;
}

#[tokio::test]
async fn log_engine_survives_reopen() {
    let fixture = TestLogRepository::open();
    let home = ParentScope::named("home").scope();
    let away = ParentScope::named("away").scope();

    let mut kept = ChildEntity::new("kept", 1);
    let mut moved = ChildEntity::new("moved", 2);
    let mut dropped = ChildEntity::new("dropped", 3);
    fixture.insert(home, &mut kept).await.unwrap();
    fixture.insert(home, &mut moved).await.unwrap();
    fixture.insert(home, &mut dropped).await.unwrap();
    fixture.upsert(away, &mut moved).await.unwrap();
    assert!(fixture.delete(home, &dropped).await.unwrap());
    kept.set_change_tracking(true);
    kept.set_rank(10);
    assert!(fixture.apply_changes(home, &mut kept).await.unwrap());

    let fixture = fixture.reopen();
    let at_home: Vec<ChildEntity> = fixture.all(home).await.unwrap();
    assert_eq!(at_home.len(), 1);
    assert_eq!(at_home[0].rank(), 10);
    assert_eq!(at_home[0].version(), Some(2));

    let away_items: Vec<ChildEntity> = fixture.all(away).await.unwrap();
    assert_eq!(away_items.len(), 1);
    assert_eq!(away_items[0].name(), "moved");
}

#[tokio::test]
async fn compaction_preserves_scopes() {
    let fixture = TestLogRepository::open();
    let scope = ParentScope::named("compact").scope();
    for rank in 0..10 {
        let mut child = ChildEntity::new("c", rank);
        fixture.insert(scope, &mut child).await.unwrap();
    }
    let removed = ScopedRepository::<ChildEntity>::delete_where(&*fixture, scope, Filter::lt("rank", 5i64))
        .await
        .unwrap();
    assert_eq!(removed, 5);

    let stats = fixture.engine().compact().unwrap();
    assert_eq!(stats.documents, 5);

    let fixture = fixture.reopen();
    let count = ScopedRepository::<ChildEntity>::count(&*fixture, scope, Filter::All).await.unwrap();
    assert_eq!(count, 5);
}

#[tokio::test]
async fn second_engine_on_same_directory_is_locked() {
    let fixture = TestLogRepository::open();
    let second = LogEngine::open(fixture.path(), EngineConfig::default());
    assert!(matches!(second, Err(CoreError::DatabaseLocked)));
}

#[tokio::test]
async fn cancellation_stops_reads_and_writes() {
    let repo = memory_repository();
    let scope = ParentScope::named("cancel").scope();
    let mut child = ChildEntity::new("before", 0);
    repo.insert(scope, &mut child).await.unwrap();

    let token = CancelToken::new();
    let handle = repo.with_cancellation(token.clone());
    let mut late = ChildEntity::new("late", 1);
    token.cancel();

    assert!(matches!(handle.insert(scope, &mut late).await, Err(CoreError::Cancelled)));
    let read: Result<Vec<ChildEntity>, _> = handle.all(scope).await;
    assert!(matches!(read, Err(CoreError::Cancelled)));
    assert_eq!(
        ScopedRepository::<ChildEntity>::count(&repo, scope, Filter::All).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn stored_documents_carry_scope_fields() {
    let repo = memory_repository();
    let owner = ParentScope::named("owner");
    let mut child = ChildEntity::new("doc", 0);
    repo.insert(owner.scope(), &mut child).await.unwrap();

    let filter = Filter::eq("_id", child.id().unwrap());
    let mut cursor = repo
        .engine()
        .scan("children", scopedb_core::engine::ScanRequest::new(filter))
        .await
        .unwrap();
    let docs: Vec<Document> = cursor.next_batch().await.unwrap().unwrap();
    let doc = &docs[0];
    let owner_hex = owner.id().unwrap().to_hex();
    assert_eq!(doc.get("scope").and_then(|v| v.as_text()), Some(owner_hex.as_str()));
    assert_eq!(doc.get("_v").and_then(|v| v.as_integer()), Some(1));
    assert_eq!(doc.get("scopes").and_then(|v| v.as_array()).map(<[_]>::len), Some(1));
}
