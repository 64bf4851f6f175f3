//! Document engine primitives.
//!
//! A [`DocumentEngine`] stores documents per collection and knows nothing
//! about entities or scopes. The repository layer builds the scoped
//! contract on top of these primitives by injecting filters.
//!
//! Engines key documents by their `_id` field, which must hold a hex
//! [`EntityId`](crate::EntityId). They never assign ids or versions.

mod log_engine;
mod memory;
mod store;

pub use log_engine::{CompactionStats, LogEngine};
pub use memory::MemoryEngine;
pub(crate) use store::document_id;

use crate::error::CoreResult;
use crate::query::{Filter, SortOrder};
use async_trait::async_trait;
use scopedb_codec::Document;

/// Document field holding the id.
pub const ID_FIELD: &str = "_id";
/// Document field holding the version.
pub const VERSION_FIELD: &str = "_v";

/// Parameters of an ordered scan.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    /// Documents must match this filter.
    pub filter: Filter,
    /// Sort keys. Ties keep `_id` order.
    pub sort: Vec<SortOrder>,
    /// Number of matching documents to skip.
    pub skip: usize,
    /// Maximum number of documents to return.
    pub limit: Option<usize>,
    /// Documents per cursor batch.
    pub batch_size: usize,
}

impl ScanRequest {
    /// Scans everything matching `filter`, in `_id` order.
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            sort: Vec::new(),
            skip: 0,
            limit: None,
            batch_size: 256,
        }
    }

    /// Sets the sort keys.
    #[must_use]
    pub fn sorted(mut self, sort: Vec<SortOrder>) -> Self {
        self.sort = sort;
        self
    }

    /// Sets skip and limit.
    #[must_use]
    pub fn window(mut self, skip: usize, limit: Option<usize>) -> Self {
        self.skip = skip;
        self.limit = limit;
        self
    }

    /// Sets the batch size. Zero is treated as one.
    #[must_use]
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }
}

/// What [`DocumentEngine::replace_one`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// A matching document was replaced.
    Replaced,
    /// Nothing matched and the document was inserted.
    Inserted,
    /// Nothing matched and upsert was off.
    Missed,
}

/// A batched cursor over scan results.
#[async_trait]
pub trait DocumentCursor: Send {
    /// Returns the next batch, or `None` once exhausted.
    async fn next_batch(&mut self) -> CoreResult<Option<Vec<Document>>>;
}

/// Collection-scoped storage primitives.
#[async_trait]
pub trait DocumentEngine: Send + Sync {
    /// Inserts documents as one atomic write.
    ///
    /// Fails with `DuplicateId` without writing anything if any id already
    /// exists or repeats within the batch.
    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> CoreResult<()>;

    /// Replaces the first document (in `_id` order) matching `filter`.
    ///
    /// With `upsert`, a miss inserts `doc`. The new document may carry a
    /// different `_id` only if that id is free.
    async fn replace_one(
        &self,
        collection: &str,
        filter: &Filter,
        doc: Document,
        upsert: bool,
    ) -> CoreResult<ReplaceOutcome>;

    /// Sets fields on every document matching `filter`. Returns the match count.
    async fn update_fields(&self, collection: &str, filter: &Filter, set: Document) -> CoreResult<u64>;

    /// Deletes every document matching `filter`. Returns the deleted count.
    async fn delete_many(&self, collection: &str, filter: &Filter) -> CoreResult<u64>;

    /// Counts documents matching `filter`.
    async fn count(&self, collection: &str, filter: &Filter) -> CoreResult<u64>;

    /// Opens an ordered cursor.
    async fn scan(&self, collection: &str, request: ScanRequest) -> CoreResult<Box<dyn DocumentCursor>>;
}

/// Cursor over a materialized result set.
#[derive(Debug)]
pub struct SnapshotCursor {
    docs: std::vec::IntoIter<Document>,
    batch_size: usize,
}

impl SnapshotCursor {
    /// Wraps `docs`, yielding `batch_size` at a time.
    pub fn new(docs: Vec<Document>, batch_size: usize) -> Self {
        Self {
            docs: docs.into_iter(),
            batch_size: batch_size.max(1),
        }
    }
}

#[async_trait]
impl DocumentCursor for SnapshotCursor {
    async fn next_batch(&mut self) -> CoreResult<Option<Vec<Document>>> {
        let batch: Vec<Document> = self.docs.by_ref().take(self.batch_size).collect();
        Ok(if batch.is_empty() { None } else { Some(batch) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn snapshot_cursor_batches() {
        let docs: Vec<Document> = (0..5i64)
            .map(|n| [("n", n)].into_iter().collect())
            .collect();
        let mut cursor = SnapshotCursor::new(docs, 2);
        let mut sizes = Vec::new();
        while let Some(batch) = cursor.next_batch().await.unwrap() {
            sizes.push(batch.len());
        }
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn zero_batch_size_is_clamped() {
        assert_eq!(ScanRequest::new(Filter::All).batch_size(0).batch_size, 1);
    }
}
