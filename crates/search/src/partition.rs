//! Per-partition text index
//!
//! A [`PartitionIndex`] owns the local index of one storage partition: an
//! [`IndexWriter`], a [`SearcherManager`] and, in inverse-map mode, a
//! [`ForwardIndex`]. It is shared by mutation threads, search threads and the
//! partition lifecycle.
//!
//! ## Locking
//!
//! - Mutations (`insert`, `update`, `delete`, `commit`, `force_merge`) hold a
//!   shared [`MutationPermit`](crate::gate::MutationPermit).
//! - `close`, `destroy` and batch transitions hold the
//!   [`ExclusivePermit`](crate::gate::ExclusivePermit).
//! - `search` takes no permit; it works on a point-in-time searcher.
//! - A writer change and its forward-index change are made under the shared
//!   side of `pairing`; `commit` takes the exclusive side, so the forward
//!   snapshot it saves for `abort_batch` matches what it made durable.
//!
//! ## Batch mode
//!
//! `begin_batch` commits, saves the writer tuning and switches to bulk-load
//! tuning; mutations then skip the per-call flush and refresh. `end_batch`
//! commits and restores the tuning. `abort_batch` rolls back to the commit
//! taken by `begin_batch`.

use crate::config::IndexConfig;
use crate::extractor::SharedExtractor;
use crate::forward::{ForwardIndex, ForwardSnapshot};
use crate::gate::MutationGate;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tessera_core::{EntryKey, EntryValue, Error, PartitionId, Result};
use tessera_engine::{Document, IndexWriter, Query, SearcherManager, WriterTuning};
use tracing::{debug, info};

/// State saved by `begin_batch`
struct SavedBatch {
    tuning: WriterTuning,
    forward: Option<ForwardSnapshot>,
}

/// Local text index of one partition
pub struct PartitionIndex {
    partition_id: PartitionId,
    field: String,
    extractor: SharedExtractor,
    config: IndexConfig,
    writer: IndexWriter,
    searchers: SearcherManager,
    forward: Option<ForwardIndex>,
    gate: MutationGate,
    pairing: RwLock<()>,
    closed: AtomicBool,
    batch: AtomicBool,
    saved: Mutex<Option<SavedBatch>>,
}

impl std::fmt::Debug for PartitionIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionIndex")
            .field("partition_id", &self.partition_id)
            .field("field", &self.field)
            .field("closed", &self.is_closed())
            .field("batch", &self.is_batch_mode())
            .finish()
    }
}

impl PartitionIndex {
    /// Open the local index of `partition_id`
    ///
    /// # Errors
    ///
    /// Configuration errors for invalid descriptors; I/O or corruption errors
    /// when an existing backend cannot be loaded.
    pub fn open(
        partition_id: PartitionId,
        field: impl Into<String>,
        extractor: SharedExtractor,
        config: IndexConfig,
        inverse_map: bool,
    ) -> Result<Self> {
        config.validate()?;
        let field = field.into();
        let analyzer = config.analyzer.build()?;
        let backend = config.backend.open(partition_id)?;
        let writer = IndexWriter::open(backend, analyzer, config.writer)?;
        let searchers = SearcherManager::new(&writer, config.searcher.clone());

        info!(
            target: "tessera::index",
            partition = %partition_id,
            field = %field,
            docs = searchers.acquire().reader().num_docs(),
            inverse_map,
            "Opened partition index"
        );

        Ok(PartitionIndex {
            partition_id,
            field,
            extractor,
            config,
            writer,
            searchers,
            forward: inverse_map.then(ForwardIndex::new),
            gate: MutationGate::new(),
            pairing: RwLock::new(()),
            closed: AtomicBool::new(false),
            batch: AtomicBool::new(false),
            saved: Mutex::new(None),
        })
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(Error::IndexClosed(self.partition_id))
        } else {
            Ok(())
        }
    }

    fn document(&self, key: &EntryKey, text: String) -> Document {
        Document::new(key.clone()).with_field(self.field.clone(), text)
    }

    /// Flush and refresh unless batch mode defers it
    fn publish(&self) -> Result<()> {
        if !self.batch.load(Ordering::Acquire) {
            self.writer.flush()?;
            self.searchers.maybe_refresh(&self.writer);
        }
        Ok(())
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Index a new entry
    pub fn insert(&self, key: &EntryKey, value: &EntryValue) -> Result<()> {
        let text = self.extractor.extract(value)?;
        let _permit = self.gate.permit();
        self.check_open()?;
        {
            let _pair = self.pairing.read();
            self.writer.add_document(self.document(key, text.clone()))?;
            if let Some(forward) = &self.forward {
                forward.insert(key.clone(), text);
            }
        }
        self.publish()
    }

    /// Atomically replace the document of an entry
    pub fn update(&self, key: &EntryKey, value: &EntryValue) -> Result<()> {
        let text = self.extractor.extract(value)?;
        let _permit = self.gate.permit();
        self.check_open()?;
        {
            let _pair = self.pairing.read();
            self.writer.update_document(self.document(key, text.clone()))?;
            if let Some(forward) = &self.forward {
                forward.insert(key.clone(), text);
            }
        }
        self.publish()
    }

    /// Remove the document of an entry
    pub fn delete(&self, key: &EntryKey) -> Result<()> {
        let _permit = self.gate.permit();
        self.check_open()?;
        {
            let _pair = self.pairing.read();
            self.writer.delete_key(key)?;
            if let Some(forward) = &self.forward {
                forward.remove(key);
            }
        }
        self.publish()
    }

    /// Make all changes durable and visible
    pub fn commit(&self) -> Result<()> {
        let _permit = self.gate.permit();
        self.check_open()?;
        self.commit_locked()
    }

    fn commit_locked(&self) -> Result<()> {
        {
            let _pairs = self.pairing.write();
            self.writer.commit()?;
            // A commit inside a batch moves the point abort returns to
            if let Some(saved) = self.saved.lock().as_mut() {
                saved.forward = self.forward.as_ref().map(ForwardIndex::snapshot);
            }
        }
        self.searchers.maybe_refresh(&self.writer);
        Ok(())
    }

    /// Compact to at most `max_segments` segments, then commit
    pub fn force_merge(&self, max_segments: usize) -> Result<()> {
        let _permit = self.gate.permit();
        self.check_open()?;
        self.writer.force_merge(max_segments)?;
        self.commit_locked()
    }

    // ========================================================================
    // Search
    // ========================================================================

    /// Run a query, returning at most `max_results` keys with unnormalized
    /// scores, best first
    pub fn search(&self, query: &Query, max_results: usize) -> Result<Vec<(EntryKey, f32)>> {
        self.check_open()?;
        let searcher = self.searchers.acquire();
        let top = searcher.search(query, max_results)?;

        let mut seen: HashSet<&EntryKey> = HashSet::with_capacity(top.score_docs.len());
        let mut hits = Vec::with_capacity(top.score_docs.len());
        for sd in &top.score_docs {
            if let Some(key) = searcher.stored_key(sd.address) {
                if seen.insert(key) {
                    hits.push((key.clone(), sd.score));
                }
            }
        }
        debug!(
            target: "tessera::index",
            partition = %self.partition_id,
            total_hits = top.total_hits,
            returned = hits.len(),
            "Local search"
        );
        Ok(hits)
    }

    // ========================================================================
    // Batch mode
    // ========================================================================

    /// Switch to bulk-load tuning. No-op if already in batch mode.
    pub fn begin_batch(&self) -> Result<()> {
        if self.batch.load(Ordering::Acquire) {
            return Ok(());
        }
        let _exclusive = self.gate.exclusive();
        self.check_open()?;
        if self.batch.load(Ordering::Acquire) {
            return Ok(());
        }

        self.writer.commit()?;
        self.searchers.maybe_refresh(&self.writer);
        let saved = SavedBatch {
            tuning: self.writer.tuning(),
            forward: self.forward.as_ref().map(ForwardIndex::snapshot),
        };
        self.writer.set_tuning(WriterTuning::batch())?;
        *self.saved.lock() = Some(saved);
        self.batch.store(true, Ordering::Release);

        info!(target: "tessera::index", partition = %self.partition_id, "Entered batch mode");
        Ok(())
    }

    /// Commit batch writes and restore normal tuning. No-op outside batch mode.
    pub fn end_batch(&self) -> Result<()> {
        if !self.batch.load(Ordering::Acquire) {
            return Ok(());
        }
        let _exclusive = self.gate.exclusive();
        if !self.batch.load(Ordering::Acquire) {
            return Ok(());
        }

        let result = self.writer.commit().map(|_| ());
        let saved = self.saved.lock().take();
        let restored = self.restore_tuning(saved.as_ref());
        self.batch.store(false, Ordering::Release);
        self.searchers.maybe_refresh(&self.writer);

        info!(
            target: "tessera::index",
            partition = %self.partition_id,
            docs = self.searchers.acquire().reader().num_docs(),
            "Ended batch mode"
        );
        result.and(restored)
    }

    /// Discard batch writes and restore normal tuning. No-op outside batch mode.
    pub fn abort_batch(&self) -> Result<()> {
        if !self.batch.load(Ordering::Acquire) {
            return Ok(());
        }
        let _exclusive = self.gate.exclusive();
        if !self.batch.load(Ordering::Acquire) {
            return Ok(());
        }

        let result = self.abort_locked();
        info!(target: "tessera::index", partition = %self.partition_id, "Aborted batch mode");
        result
    }

    /// Roll back and leave batch mode; state is restored even on error
    fn abort_locked(&self) -> Result<()> {
        let saved = self.saved.lock().take();
        let result = self.writer.rollback();
        if let (Some(forward), Some(snapshot)) =
            (&self.forward, saved.as_ref().and_then(|s| s.forward.clone()))
        {
            forward.restore(snapshot);
        }
        let restored = self.restore_tuning(saved.as_ref());
        self.batch.store(false, Ordering::Release);
        self.searchers.maybe_refresh(&self.writer);
        result.and(restored)
    }

    fn restore_tuning(&self, saved: Option<&SavedBatch>) -> Result<()> {
        let tuning = saved.map_or(self.config.writer, |s| s.tuning);
        self.writer.set_tuning(tuning)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Release the index, waiting for in-flight mutations to finish.
    ///
    /// Uncommitted changes are discarded; an open batch is rolled back first.
    /// Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        let _exclusive = self.gate.exclusive();
        self.close_locked()
    }

    fn close_locked(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        let result = if self.batch.load(Ordering::Acquire) {
            self.abort_locked()
        } else {
            Ok(())
        };
        self.closed.store(true, Ordering::Release);
        self.writer.close();
        info!(target: "tessera::index", partition = %self.partition_id, "Closed partition index");
        result
    }

    /// Delete every document, commit, then close
    pub fn destroy(&self) -> Result<()> {
        let _exclusive = self.gate.exclusive();
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        if self.batch.load(Ordering::Acquire) {
            self.abort_locked()?;
        }
        let cleared = self
            .writer
            .delete_all()
            .and_then(|_| self.writer.commit())
            .map(|_| ());
        if let Some(forward) = &self.forward {
            forward.clear();
        }
        let closed = self.close_locked();
        info!(target: "tessera::index", partition = %self.partition_id, "Destroyed partition index");
        cleared.and(closed)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Backend file bytes plus in-memory segment bytes plus forward-map units.
    ///
    /// Backend errors while sizing are logged and skipped.
    pub fn size_in_bytes(&self) -> u64 {
        let mut units = self.forward.as_ref().map_or(0, ForwardIndex::units);
        units += self.writer.unpersisted_bytes();
        let backend = self.writer.backend();
        match backend.list_files() {
            Ok(files) => {
                for file in files {
                    match backend.file_length(&file) {
                        Ok(len) => units += len,
                        Err(e) => debug!(
                            target: "tessera::index",
                            partition = %self.partition_id,
                            file = %file,
                            error = %e,
                            "Ignoring unreadable index file while sizing"
                        ),
                    }
                }
            }
            Err(e) => debug!(
                target: "tessera::index",
                partition = %self.partition_id,
                error = %e,
                "Ignoring backend listing failure while sizing"
            ),
        }
        units
    }

    /// Extracted text of a key (inverse-map mode only)
    pub fn forward_value(&self, key: &EntryKey) -> Option<String> {
        self.forward.as_ref().and_then(|f| f.get(key))
    }

    /// Inverse map: text → keys (inverse-map mode only)
    pub fn index_contents(&self) -> Option<BTreeMap<String, HashSet<EntryKey>>> {
        self.forward.as_ref().map(ForwardIndex::index_contents)
    }

    /// Live documents in the current searcher
    pub fn doc_count(&self) -> usize {
        self.searchers.acquire().reader().num_docs()
    }

    /// Segments currently held by the writer
    pub fn segment_count(&self) -> usize {
        self.writer.segment_count()
    }

    /// Whether batch mode is active
    pub fn is_batch_mode(&self) -> bool {
        self.batch.load(Ordering::Acquire)
    }

    /// Whether the index was closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Owning partition
    pub fn partition_id(&self) -> PartitionId {
        self.partition_id
    }

    /// Indexed field name
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Extractor producing the indexed text
    pub fn extractor(&self) -> &SharedExtractor {
        &self.extractor
    }

    /// Configuration the index was opened with
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }
}
