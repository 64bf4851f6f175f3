//! Custom in-process engine.

use super::store::Collections;
use super::{DocumentCursor, DocumentEngine, ReplaceOutcome, ScanRequest, SnapshotCursor};
use crate::error::CoreResult;
use crate::query::Filter;
use async_trait::async_trait;
use parking_lot::RwLock;
use scopedb_codec::Document;

/// Engine that keeps every collection in memory.
///
/// Writers take a short exclusive lock; readers share. Scans materialize
/// their result under the read lock, so a cursor never observes a write
/// issued after it was opened.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    state: RwLock<Collections>,
}

impl MemoryEngine {
    /// Creates an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of documents across collections.
    pub fn len(&self) -> usize {
        self.state.read().len()
    }

    /// Returns true if no documents are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DocumentEngine for MemoryEngine {
    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> CoreResult<()> {
        let mut state = self.state.write();
        let plan = state.plan_insert(collection, docs)?;
        state.apply(plan)
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: &Filter,
        doc: Document,
        upsert: bool,
    ) -> CoreResult<ReplaceOutcome> {
        let mut state = self.state.write();
        let (outcome, plan) = state.plan_replace(collection, filter, doc, upsert)?;
        state.apply(plan)?;
        Ok(outcome)
    }

    async fn update_fields(&self, collection: &str, filter: &Filter, set: Document) -> CoreResult<u64> {
        let mut state = self.state.write();
        let plan = state.plan_update_fields(collection, filter, &set)?;
        let matched = plan.len() as u64;
        state.apply(plan)?;
        Ok(matched)
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> CoreResult<u64> {
        let mut state = self.state.write();
        let plan = state.plan_delete(collection, filter);
        let deleted = plan.len() as u64;
        state.apply(plan)?;
        Ok(deleted)
    }

    async fn count(&self, collection: &str, filter: &Filter) -> CoreResult<u64> {
        Ok(self.state.read().count(collection, filter))
    }

    async fn scan(&self, collection: &str, request: ScanRequest) -> CoreResult<Box<dyn DocumentCursor>> {
        let docs = self.state.read().select(collection, &request);
        Ok(Box::new(SnapshotCursor::new(docs, request.batch_size)))
    }
}
