//! Embedded single-file engine backed by a record log.
//!
//! ## Directory layout
//!
//! ```text
//! <dir>/
//! ├─ LOCK            # Advisory lock for single-writer
//! └─ scopedb.log     # Framed CBOR write records
//! ```
//!
//! Every write call appends exactly one record holding all of its
//! mutations, then applies them to the in-memory state. A write whose
//! append or sync fails is cut back out of the log. Opening replays
//! the log; a torn final record is cut off.

use super::store::{Collections, Mutation};
use super::{DocumentCursor, DocumentEngine, ReplaceOutcome, ScanRequest, SnapshotCursor};
use crate::config::EngineConfig;
use crate::error::{CoreError, CoreResult};
use crate::query::Filter;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use scopedb_codec::{from_cbor, to_cbor, Document, Value};
use scopedb_storage::{RecordLog, StorageBackend};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::spawn_blocking;
use tracing::{debug, info, warn};

#[cfg(feature = "std")]
use {
    fs2::FileExt,
    scopedb_storage::FileBackend,
    std::fs::{File, OpenOptions},
    std::path::{Path, PathBuf},
};

/// Name of the lock file.
pub const LOCK_FILE: &str = "LOCK";
/// Name of the log file.
pub const LOG_FILE: &str = "scopedb.log";
#[cfg(feature = "std")]
const COMPACT_FILE: &str = "scopedb.log.compact";

/// Documents per record when rewriting the log.
const COMPACTION_CHUNK: usize = 512;

/// Result of [`LogEngine::compact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionStats {
    /// Log size before compaction, in bytes.
    pub bytes_before: u64,
    /// Log size after compaction, in bytes.
    pub bytes_after: u64,
    /// Live documents written.
    pub documents: usize,
}

#[cfg(feature = "std")]
#[derive(Debug)]
struct Location {
    dir: PathBuf,
    _lock_file: File,
}

/// State shared with blocking write tasks.
struct Shared {
    state: RwLock<Collections>,
    log: Mutex<RecordLog>,
    config: EngineConfig,
}

impl Shared {
    /// Logs `plan` as one record and applies it. An empty plan writes nothing.
    ///
    /// A failed append or sync cuts the log back to its previous length, so
    /// the record cannot come back on replay.
    fn commit(&self, state: &mut Collections, plan: Vec<Mutation>) -> CoreResult<()> {
        if plan.is_empty() {
            return Ok(());
        }
        let record = encode_record(&plan)?;
        {
            let mut log = self.log.lock();
            let before = log.size()?;
            let written = log.append(&record).and_then(|_| {
                if self.config.sync_on_commit {
                    log.sync()
                } else {
                    Ok(())
                }
            });
            if let Err(err) = written {
                if let Err(rollback) = log.truncate(before) {
                    warn!(error = %rollback, len = before, "failed to roll back unwritten record");
                }
                return Err(err.into());
            }
        }
        state.apply(plan)
    }
}

/// Embedded engine persisting every write to a record log.
///
/// Writers are serialized by the state lock, so log order equals apply
/// order. Writes run on tokio's blocking thread pool, so they must be
/// awaited inside a tokio runtime. Across processes, the `LOCK` file admits
/// a single engine per directory.
pub struct LogEngine {
    shared: Arc<Shared>,
    #[cfg(feature = "std")]
    location: Option<Location>,
}

impl LogEngine {
    /// Opens or creates an engine in `dir`.
    ///
    /// # Errors
    ///
    /// - `DatabaseLocked` if another engine holds the directory
    /// - `InvalidOperation` if the directory is missing and
    ///   `create_if_missing` is off
    /// - storage or format errors while replaying the log
    #[cfg(feature = "std")]
    pub fn open(dir: impl AsRef<Path>, config: EngineConfig) -> CoreResult<Self> {
        let dir = dir.as_ref();
        if !dir.exists() {
            if !config.create_if_missing {
                return Err(CoreError::invalid_operation(format!(
                    "database directory does not exist: {}",
                    dir.display()
                )));
            }
            std::fs::create_dir_all(dir)?;
        }
        if !dir.is_dir() {
            return Err(CoreError::invalid_format(format!(
                "path is not a directory: {}",
                dir.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            warn!(path = %dir.display(), "database directory is locked by another engine");
            return Err(CoreError::DatabaseLocked);
        }

        let backend = FileBackend::open(&dir.join(LOG_FILE))?;
        let mut engine = Self::with_backend(Box::new(backend), config)?;
        engine.location = Some(Location {
            dir: dir.to_path_buf(),
            _lock_file: lock_file,
        });
        info!(path = %dir.display(), documents = engine.len(), "opened log engine");
        Ok(engine)
    }

    /// Builds an engine over any backend, replaying its contents.
    ///
    /// # Errors
    ///
    /// Returns storage errors and `InvalidFormat` for undecodable records.
    pub fn with_backend(backend: Box<dyn StorageBackend>, config: EngineConfig) -> CoreResult<Self> {
        let mut log = RecordLog::new(backend);
        let scan = log.scan()?;
        if scan.torn_tail {
            warn!(valid_len = scan.valid_len, "truncating torn record at end of log");
            log.truncate(scan.valid_len)?;
        }

        let mut state = Collections::default();
        for record in &scan.records {
            state.apply(decode_record(record)?)?;
        }
        debug!(records = scan.records.len(), documents = state.len(), "replayed log");

        Ok(Self {
            shared: Arc::new(Shared {
                state: RwLock::new(state),
                log: Mutex::new(log),
                config,
            }),
            #[cfg(feature = "std")]
            location: None,
        })
    }

    /// Total number of documents across collections.
    pub fn len(&self) -> usize {
        self.shared.state.read().len()
    }

    /// Returns true if no documents are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current log size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot report its size.
    pub fn log_size(&self) -> CoreResult<u64> {
        Ok(self.shared.log.lock().size()?)
    }

    /// Rewrites the log so it holds only live documents.
    ///
    /// Writers are blocked for the duration. In a directory, the new log is
    /// written beside the old one and renamed over it.
    ///
    /// # Errors
    ///
    /// Returns storage or I/O errors. On error the previous log stays in place.
    pub fn compact(&self) -> CoreResult<CompactionStats> {
        let state = self.shared.state.write();
        let mut log = self.shared.log.lock();
        let bytes_before = log.size()?;
        let snapshot = state.snapshot();
        let documents = snapshot.len();
        let records = snapshot
            .chunks(COMPACTION_CHUNK)
            .map(encode_record)
            .collect::<CoreResult<Vec<_>>>()?;

        #[cfg(feature = "std")]
        if let Some(location) = &self.location {
            let tmp_path = location.dir.join(COMPACT_FILE);
            let log_path = location.dir.join(LOG_FILE);
            if tmp_path.exists() {
                std::fs::remove_file(&tmp_path)?;
            }
            let mut fresh = RecordLog::new(Box::new(FileBackend::open(&tmp_path)?));
            for record in &records {
                fresh.append(record)?;
            }
            fresh.sync()?;
            drop(fresh);
            std::fs::rename(&tmp_path, &log_path)?;
            *log = RecordLog::new(Box::new(FileBackend::open(&log_path)?));
            let bytes_after = log.size()?;
            info!(bytes_before, bytes_after, documents, "compacted log");
            return Ok(CompactionStats {
                bytes_before,
                bytes_after,
                documents,
            });
        }

        log.truncate(0)?;
        for record in &records {
            log.append(record)?;
        }
        log.sync()?;
        let bytes_after = log.size()?;
        info!(bytes_before, bytes_after, documents, "compacted log");
        Ok(CompactionStats {
            bytes_before,
            bytes_after,
            documents,
        })
    }

    /// Plans a write against the current state and commits it on the
    /// blocking pool, keeping log I/O off the async workers.
    async fn write<R, F>(&self, plan: F) -> CoreResult<R>
    where
        F: FnOnce(&Collections) -> CoreResult<(R, Vec<Mutation>)> + Send + 'static,
        R: Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        spawn_blocking(move || {
            let mut state = shared.state.write();
            let (result, mutations) = plan(&state)?;
            shared.commit(&mut state, mutations)?;
            Ok(result)
        })
        .await
        .map_err(|err| CoreError::TaskFailed {
            message: format!("log write: {err}"),
        })?
    }
}

impl std::fmt::Debug for LogEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogEngine")
            .field("documents", &self.len())
            .field("config", &self.shared.config)
            .finish()
    }
}

fn encode_record(plan: &[Mutation]) -> CoreResult<Vec<u8>> {
    let ops = Value::Array(plan.iter().map(Mutation::to_value).collect());
    let doc = Document::from(BTreeMap::from([("ops".to_string(), ops)]));
    Ok(to_cbor(&doc)?)
}

fn decode_record(bytes: &[u8]) -> CoreResult<Vec<Mutation>> {
    let doc = from_cbor(bytes)?;
    doc.get("ops")
        .and_then(Value::as_array)
        .ok_or_else(|| CoreError::invalid_format("log record without operations"))?
        .iter()
        .map(Mutation::from_value)
        .collect()
}

#[async_trait]
impl DocumentEngine for LogEngine {
    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> CoreResult<()> {
        let collection = collection.to_string();
        self.write(move |state| Ok(((), state.plan_insert(&collection, docs)?)))
            .await
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: &Filter,
        doc: Document,
        upsert: bool,
    ) -> CoreResult<ReplaceOutcome> {
        let collection = collection.to_string();
        let filter = filter.clone();
        self.write(move |state| state.plan_replace(&collection, &filter, doc, upsert))
            .await
    }

    async fn update_fields(&self, collection: &str, filter: &Filter, set: Document) -> CoreResult<u64> {
        let collection = collection.to_string();
        let filter = filter.clone();
        self.write(move |state| {
            let plan = state.plan_update_fields(&collection, &filter, &set)?;
            Ok((plan.len() as u64, plan))
        })
        .await
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> CoreResult<u64> {
        let collection = collection.to_string();
        let filter = filter.clone();
        self.write(move |state| {
            let plan = state.plan_delete(&collection, &filter);
            Ok((plan.len() as u64, plan))
        })
        .await
    }

    async fn count(&self, collection: &str, filter: &Filter) -> CoreResult<u64> {
        Ok(self.shared.state.read().count(collection, filter))
    }

    async fn scan(&self, collection: &str, request: ScanRequest) -> CoreResult<Box<dyn DocumentCursor>> {
        let docs = self.shared.state.read().select(collection, &request);
        Ok(Box::new(SnapshotCursor::new(docs, request.batch_size)))
    }
}
