//! Backend-agnostic conformance checks for [`ScopedRepository`].
//!
//! Every check creates its own scopes, so all checks can run against one
//! shared repository. A failing check panics with the property it broke.

use crate::fixtures::{ChildEntity, ParentScope, SharedNote};
use scopedb_core::{
    CoreError, Entity, EntityId, Filter, FindOptions, Ref, ScopedEntity, ScopedRepository, SortOrder,
};
use std::collections::HashSet;

/// Runs every check against `repo`.
pub async fn run_conformance<R>(repo: &R)
where
    R: ScopedRepository<ChildEntity> + ScopedRepository<SharedNote>,
{
    concrete_scenario(repo).await;
    scope_isolation(repo).await;
    upsert_moves_between_scopes(repo).await;
    batch_insert_is_atomic(repo).await;
    continuation_stays_in_scope(repo).await;
    continuation_pages_do_not_overlap(repo).await;
    foreign_continuation_degrades(repo).await;
    page_numbers_and_one(repo).await;
    references_resolve_within_scope(repo).await;
    second_scope_memberships(repo).await;
}

async fn seed<R>(repo: &R, scope: Option<EntityId>, ranks: &[i64]) -> Vec<ChildEntity>
where
    R: ScopedRepository<ChildEntity>,
{
    let mut children: Vec<ChildEntity> = ranks
        .iter()
        .enumerate()
        .map(|(i, rank)| ChildEntity::new(&format!("child-{i}"), *rank))
        .collect();
    repo.insert_many(scope, &mut children)
        .await
        .expect("Failed to seed children");
    children
}

fn hex(item: &impl Entity) -> String {
    item.id().expect("entity should be saved").to_hex()
}

/// Two children in two scopes: each is counted and found only in its own.
pub async fn concrete_scenario<R>(repo: &R)
where
    R: ScopedRepository<ChildEntity>,
{
    let s1 = ParentScope::named("S1").scope();
    let s2 = ParentScope::named("S2").scope();
    let mut a = ChildEntity::with_id(EntityId::generate(), "A");
    let mut b = ChildEntity::with_id(EntityId::generate(), "B");
    repo.insert(s1, &mut a).await.expect("insert A");
    repo.insert(s2, &mut b).await.expect("insert B");

    assert_eq!(repo.count(s1, Filter::All).await.unwrap(), 1, "count in S1");
    assert_eq!(repo.count(s2, Filter::All).await.unwrap(), 1, "count in S2");
    assert!(
        repo.by_id(s2, &hex(&a)).await.unwrap().is_none(),
        "A must not be visible in S2"
    );
    let found = repo.by_id(s1, &hex(&a)).await.unwrap().expect("A in S1");
    assert_eq!(found.name(), "A");
    assert_eq!(found.scope_id(), s1);
}

/// No operation addressed to one scope touches an entity in another.
pub async fn scope_isolation<R>(repo: &R)
where
    R: ScopedRepository<ChildEntity>,
{
    let home = ParentScope::named("home").scope();
    let other = ParentScope::named("other").scope();
    let mut child = ChildEntity::new("kept", 1);
    repo.insert(home, &mut child).await.expect("insert");
    let id = hex(&child);

    assert!(repo.by_id(other, &id).await.unwrap().is_none());
    assert!(repo.by_ids(other, &[id.as_str()]).await.unwrap().is_empty());
    assert_eq!(repo.count(other, Filter::All).await.unwrap(), 0);
    assert!(repo.all(other).await.unwrap().is_empty());
    assert!(repo
        .many(other, Filter::All, FindOptions::new())
        .await
        .unwrap()
        .is_empty());
    assert!(repo
        .one(other, Filter::All, FindOptions::new())
        .await
        .unwrap()
        .is_none());
    assert!(repo.random(other, Filter::All, 5).await.unwrap().is_empty());

    let mut intruder = child.clone();
    intruder.set_name("leaked");
    let err = repo.update(other, &mut intruder).await.unwrap_err();
    assert!(err.is_not_found(), "cross-scope update must miss, got {err}");

    let mut patch = child.clone();
    patch.set_change_tracking(true);
    patch.set_name("patched");
    let err = repo.apply_changes(other, &mut patch).await.unwrap_err();
    assert!(err.is_not_found(), "cross-scope patch must miss, got {err}");

    assert!(!repo.delete_by_id(other, &id).await.unwrap());
    assert!(!repo.delete(other, &child).await.unwrap());
    assert_eq!(repo.delete_where(other, Filter::All).await.unwrap(), 0);

    let stored = repo.by_id(home, &id).await.unwrap().expect("still at home");
    assert_eq!(stored.name(), "kept");
    assert_eq!(stored.version(), Some(1));

    assert!(repo.delete(home, &child).await.unwrap());
    assert!(repo.by_id(home, &id).await.unwrap().is_none());
}

/// Upsert and both saves relocate an entity without duplicating it.
pub async fn upsert_moves_between_scopes<R>(repo: &R)
where
    R: ScopedRepository<ChildEntity>,
{
    let s1 = ParentScope::named("from").scope();
    let s2 = ParentScope::named("to").scope();
    let both: Vec<EntityId> = [s1, s2].into_iter().flatten().collect();

    let mut child = ChildEntity::new("mover", 0);
    repo.upsert(s1, &mut child).await.expect("upsert new");
    assert_eq!(repo.count_many(&both, Filter::All).await.unwrap(), 1);
    let id = hex(&child);

    repo.upsert(s2, &mut child).await.expect("upsert move");
    assert!(repo.by_id(s1, &id).await.unwrap().is_none(), "old scope keeps a copy");
    assert!(repo.by_id(s2, &id).await.unwrap().is_some());
    assert_eq!(child.scope_id(), s2);
    assert_eq!(repo.count_many(&both, Filter::All).await.unwrap(), 1, "move duplicated");

    repo.save(s1, &mut child).await.expect("save move");
    assert!(repo.by_id(s2, &id).await.unwrap().is_none());
    assert_eq!(repo.count_many(&both, Filter::All).await.unwrap(), 1);

    child.set_scope(s2);
    repo.save_unscoped(&mut child).await.expect("save under own scope");
    let stored = repo.by_id(s2, &id).await.unwrap().expect("moved by save_unscoped");
    assert_eq!(stored.scope_id(), s2);
    assert_eq!(repo.count_many(&both, Filter::All).await.unwrap(), 1);
    assert_eq!(stored.version(), Some(4));
}

/// A batch with a taken id writes nothing.
pub async fn batch_insert_is_atomic<R>(repo: &R)
where
    R: ScopedRepository<ChildEntity>,
{
    let scope = ParentScope::named("batch").scope();
    let mut first = ChildEntity::new("first", 0);
    repo.insert(scope, &mut first).await.expect("insert");

    let mut batch = vec![
        ChildEntity::new("new", 1),
        ChildEntity::with_id(first.id().expect("saved"), "clash"),
        ChildEntity::new("newer", 2),
    ];
    let err = repo.insert_many(scope, &mut batch).await.unwrap_err();
    assert!(matches!(err, CoreError::DuplicateId { .. }), "got {err}");
    assert_eq!(repo.count(scope, Filter::All).await.unwrap(), 1);
    assert!(batch[0].id().is_none(), "failed batch must not assign ids");
}

/// A token from one scope never yields another scope's entities.
pub async fn continuation_stays_in_scope<R>(repo: &R)
where
    R: ScopedRepository<ChildEntity>,
{
    let a = ParentScope::named("A").scope();
    let b = ParentScope::named("B").scope();
    let in_a = seed(repo, a, &[0, 1, 2, 3, 4]).await;
    seed(repo, b, &[0, 1, 2]).await;
    let a_ids: HashSet<String> = in_a.iter().map(hex).collect();

    for sort in [Vec::new(), vec![SortOrder::asc("rank")]] {
        let options = FindOptions { page_size: Some(2), sort, ..FindOptions::new() };
        let page = repo.many(a, Filter::All, options.clone()).await.unwrap();
        let token = page.continuation.clone().expect("full page has a token");

        let foreign = repo
            .many(b, Filter::All, options.continue_from(token))
            .await
            .unwrap();
        for item in &foreign.items {
            assert_eq!(item.scope_id(), b, "token unlocked a foreign scope");
            assert!(!a_ids.contains(&hex(item)));
        }
    }
}

/// Pages chained by tokens cover the result once, in strictly increasing order.
pub async fn continuation_pages_do_not_overlap<R>(repo: &R)
where
    R: ScopedRepository<ChildEntity>,
{
    let scope = ParentScope::named("pages").scope();
    seed(repo, scope, &[2, 0, 3, 1, 2, 0, 3, 1, 2, 0, 3]).await;
    let filter = Filter::gte("rank", 1i64);
    let expected = repo.count(scope, filter.clone()).await.unwrap() as usize;

    for descending in [false, true] {
        let order = if descending { SortOrder::desc("rank") } else { SortOrder::asc("rank") };
        let key = |item: &ChildEntity| {
            let rank = if descending { -item.rank() } else { item.rank() };
            (rank, item.id())
        };

        let mut options = FindOptions::new().page_size(3).sort_by(order);
        let mut seen = HashSet::new();
        let mut last = None;
        for _ in 0..=expected {
            let page = repo.many(scope, filter.clone(), options.clone()).await.unwrap();
            if let (Some(prev), Some(first)) = (last, page.items.first()) {
                assert!(key(first) > prev, "page starts at or before the previous token");
            }
            for item in &page.items {
                assert!(seen.insert(hex(item)), "item repeated across pages");
            }
            last = page.items.last().map(key).or(last);
            match page.continuation {
                Some(token) => options = options.continue_from(token),
                None => break,
            }
        }
        assert_eq!(seen.len(), expected, "pagination lost items");
    }
}

/// Unknown tokens, in either text form, never fail.
pub async fn foreign_continuation_degrades<R>(repo: &R)
where
    R: ScopedRepository<ChildEntity>,
{
    let scope = ParentScope::named("degrade").scope();
    seed(repo, scope, &[0, 1, 2]).await;
    let unknown = EntityId::generate();

    for token in [unknown.to_hex(), unknown.to_compact()] {
        let page = repo
            .many(scope, Filter::All, FindOptions::new().continue_from(token))
            .await
            .expect("unknown token must not fail");
        assert!(page.items.iter().all(|item| item.id() > Some(unknown)));
    }

    let sorted = FindOptions::new()
        .sort_by(SortOrder::asc("rank"))
        .continue_from(unknown.to_hex());
    let page = repo.many(scope, Filter::All, sorted).await.expect("sorted unknown token");
    assert!(page.items.iter().all(|item| item.scope_id() == scope));

    let blank = repo
        .many(scope, Filter::All, FindOptions::new().continue_from("  "))
        .await
        .unwrap();
    assert_eq!(blank.len(), 3, "blank token starts from the beginning");
}

/// Page numbers skip whole pages; `one` returns the first match in order.
pub async fn page_numbers_and_one<R>(repo: &R)
where
    R: ScopedRepository<ChildEntity>,
{
    let scope = ParentScope::named("numbers").scope();
    seed(repo, scope, &[4, 2, 0, 3, 1]).await;
    let by_rank = FindOptions::new().sort_by(SortOrder::asc("rank"));

    let second = repo
        .many(scope, Filter::All, by_rank.clone().page_size(2).page(2))
        .await
        .unwrap();
    let ranks: Vec<i64> = second.items.iter().map(ChildEntity::rank).collect();
    assert_eq!(ranks, vec![2, 3]);
    assert!(second.has_more());

    let beyond = repo
        .many(scope, Filter::All, by_rank.clone().page_size(2).page(9))
        .await
        .unwrap();
    assert!(beyond.is_empty() && !beyond.has_more());

    let top = repo
        .one(scope, Filter::gt("rank", 2i64), by_rank)
        .await
        .unwrap()
        .expect("one match");
    assert_eq!(top.rank(), 3);
}

/// `Ref::fetch_scoped` resolves only inside the given scope.
pub async fn references_resolve_within_scope<R>(repo: &R)
where
    R: ScopedRepository<ChildEntity>,
{
    let home = ParentScope::named("home").scope();
    let away = ParentScope::named("away").scope();
    let mut child = ChildEntity::new("target", 0);
    repo.insert(home, &mut child).await.expect("insert");

    let mut reference: Ref<ChildEntity> = Ref::from_id(&hex(&child)).unwrap();
    assert!(!reference.fetch_scoped(repo, away).await.unwrap());
    assert!(!reference.is_resolved());
    assert!(reference.fetch_scoped(repo, home).await.unwrap());
    assert_eq!(reference.item().map(ChildEntity::name), Some("target"));
    assert_eq!(reference, Ref::from_entity(child));
}

/// Shared and second-scope memberships survive storage and drive `visible_in`.
pub async fn second_scope_memberships<R>(repo: &R)
where
    R: ScopedRepository<SharedNote>,
{
    let owner = ParentScope::named("owner").scope().expect("id");
    let guest = ParentScope::named("guest").scope().expect("id");
    let second = ParentScope::named("second").scope().expect("id");

    let mut note = SharedNote::new("memo");
    note.share_with(guest);
    note.set_second_scope(Some(second));
    repo.insert(Some(owner), &mut note).await.expect("insert");

    for scope in [owner, guest, second] {
        let visible = repo.visible_in(scope, Filter::All).await.unwrap();
        assert_eq!(visible.len(), 1, "note should be visible in {scope}");
    }
    assert_eq!(repo.count(Some(guest), Filter::All).await.unwrap(), 0);

    let mut stored = repo
        .by_id(Some(owner), &hex(&note))
        .await
        .unwrap()
        .expect("stored note");
    assert_eq!(stored.scoping().second_scope().id(), Some(second));
    assert!(stored.is_visible_in(guest));

    stored.set_second_scope(None);
    repo.save(Some(owner), &mut stored).await.expect("save");
    assert!(repo.visible_in(second, Filter::All).await.unwrap().is_empty());
    assert_eq!(repo.visible_in(guest, Filter::All).await.unwrap().len(), 1);
}
