//! Index writer
//!
//! The single mutator of a local index. Callers on many threads may add,
//! delete and update documents concurrently; the writer serializes its own
//! state under one short-lived mutex and does analysis outside of it.
//!
//! Lifecycle of a change:
//! 1. `add_document` / `delete_key` / `update_document` buffer the change.
//! 2. `flush` turns the buffer into a new in-memory segment and applies
//!    buffered deletes; the result becomes visible to the next reader.
//! 3. `commit` writes new segments and a commit point to the backend.
//! 4. `rollback` returns to the last commit point.
//!
//! Deletes are buffered with a sequence number so that a delete only removes
//! buffered documents added *before* it. This makes `update_document`
//! (delete + add) atomic from a reader's point of view: both halves become
//! visible in the same flush.

use crate::analyzer::Analyzer;
use crate::backend::StorageBackend;
use crate::commit::{latest_commit, CommitPoint, CommittedSegment};
use crate::searcher::{IndexReader, SegmentReader};
use crate::segment::{AnalyzedDocument, Segment};
use crate::tuning::WriterTuning;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tessera_core::{EntryKey, Error, Result};
use tracing::{debug, info, warn};

/// A document to be indexed: an entry key plus named text fields
#[derive(Debug, Clone)]
pub struct Document {
    key: EntryKey,
    fields: Vec<(String, String)>,
}

impl Document {
    /// Create a document for an entry key
    pub fn new(key: EntryKey) -> Self {
        Document {
            key,
            fields: Vec::new(),
        }
    }

    /// Add a text field
    pub fn with_field(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.fields.push((name.into(), text.into()));
        self
    }

    /// Entry key
    pub fn key(&self) -> &EntryKey {
        &self.key
    }
}

/// A segment together with its current tombstones
#[derive(Clone)]
struct SegmentEntry {
    segment: Arc<Segment>,
    deletes: Arc<HashSet<u32>>,
    /// Segment file exists on the backend
    persisted: bool,
}

impl SegmentEntry {
    fn live_docs(&self) -> usize {
        self.segment.doc_count() - self.deletes.len()
    }

    fn live_size(&self) -> u64 {
        let total = self.segment.doc_count().max(1) as u64;
        self.segment.size_bytes() * self.live_docs() as u64 / total
    }
}

struct WriterState {
    /// (sequence, document)
    buffer: Vec<(u64, AnalyzedDocument)>,
    buffer_bytes: usize,
    /// key term -> sequence of the latest buffered delete
    pending_deletes: HashMap<String, u64>,
    seq: u64,
    segments: Vec<SegmentEntry>,
    /// Segment list as of the last commit
    committed: Vec<SegmentEntry>,
    next_segment_id: u64,
    generation: u64,
    tuning: WriterTuning,
    /// Bumped whenever the visible segment set changes
    version: u64,
    /// Uncommitted changes exist
    dirty: bool,
    closed: bool,
}

impl WriterState {
    fn check_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::invalid_state("index writer is closed"))
        } else {
            Ok(())
        }
    }

    fn has_pending(&self) -> bool {
        !self.buffer.is_empty() || !self.pending_deletes.is_empty()
    }

    fn alloc_segment_id(&mut self) -> u64 {
        let id = self.next_segment_id;
        self.next_segment_id += 1;
        id
    }
}

/// Exclusive mutator of one local index
pub struct IndexWriter {
    backend: Arc<dyn StorageBackend>,
    analyzer: Arc<dyn Analyzer>,
    state: Mutex<WriterState>,
}

impl IndexWriter {
    /// Open a writer on a backend, loading its newest commit point if any
    pub fn open(
        backend: Arc<dyn StorageBackend>,
        analyzer: Arc<dyn Analyzer>,
        tuning: WriterTuning,
    ) -> Result<Self> {
        tuning.validate()?;

        let commit = latest_commit(backend.as_ref())?.unwrap_or_default();
        let mut segments = Vec::with_capacity(commit.segments.len());
        for entry in &commit.segments {
            let bytes = backend.read_file(&Segment::file_name(entry.segment_id))?;
            let segment = Segment::decode(&bytes)?;
            if segment.id() != entry.segment_id {
                return Err(Error::corruption(format!(
                    "segment file {} holds segment {}",
                    entry.segment_id,
                    segment.id()
                )));
            }
            segments.push(SegmentEntry {
                segment: Arc::new(segment),
                deletes: Arc::new(entry.tombstones.iter().copied().collect()),
                persisted: true,
            });
        }

        // Never reuse the id of a segment left behind by a failed commit
        let max_file_id = backend
            .list_files()?
            .iter()
            .filter_map(|name| Segment::parse_file_name(name))
            .max();
        let next_segment_id = commit
            .next_segment_id
            .max(max_file_id.map_or(0, |id| id + 1));

        let writer = IndexWriter {
            backend,
            analyzer,
            state: Mutex::new(WriterState {
                buffer: Vec::new(),
                buffer_bytes: 0,
                pending_deletes: HashMap::new(),
                seq: 0,
                committed: segments.clone(),
                segments,
                next_segment_id,
                generation: commit.generation,
                tuning,
                version: 0,
                dirty: false,
                closed: false,
            }),
        };
        writer.delete_unreferenced(commit.generation, &writer.state.lock().segments);

        info!(
            target: "tessera::engine",
            generation = commit.generation,
            segments = commit.segments.len(),
            analyzer = writer.analyzer.name(),
            "Opened index writer"
        );
        Ok(writer)
    }

    fn analyze(&self, doc: Document) -> AnalyzedDocument {
        let fields = doc
            .fields
            .into_iter()
            .map(|(name, text)| {
                let terms = self.analyzer.analyze(&text);
                (name, terms)
            })
            .collect();
        AnalyzedDocument {
            key_term: doc.key.key_term(),
            key: doc.key,
            fields,
        }
    }

    /// Buffer a new document
    pub fn add_document(&self, doc: Document) -> Result<()> {
        let analyzed = self.analyze(doc);
        let mut state = self.state.lock();
        state.check_open()?;
        self.buffer_locked(&mut state, analyzed);
        self.maybe_auto_flush(&mut state)
    }

    /// Buffer a delete of every document carrying `key`
    pub fn delete_key(&self, key: &EntryKey) -> Result<()> {
        let mut state = self.state.lock();
        state.check_open()?;
        Self::delete_locked(&mut state, key.key_term());
        Ok(())
    }

    /// Atomically replace every document carrying the key with `doc`
    pub fn update_document(&self, doc: Document) -> Result<()> {
        let analyzed = self.analyze(doc);
        let mut state = self.state.lock();
        state.check_open()?;
        Self::delete_locked(&mut state, analyzed.key_term.clone());
        self.buffer_locked(&mut state, analyzed);
        self.maybe_auto_flush(&mut state)
    }

    fn delete_locked(state: &mut WriterState, key_term: String) {
        let seq = state.seq;
        state.seq += 1;
        state.pending_deletes.insert(key_term, seq);
    }

    fn buffer_locked(&self, state: &mut WriterState, doc: AnalyzedDocument) {
        let seq = state.seq;
        state.seq += 1;
        state.buffer_bytes += doc.estimated_bytes();
        state.buffer.push((seq, doc));
    }

    fn maybe_auto_flush(&self, state: &mut WriterState) -> Result<()> {
        let by_ram = state.buffer_bytes >= state.tuning.ram_buffer_bytes();
        let by_count = state
            .tuning
            .max_buffered_docs
            .is_some_and(|max| state.buffer.len() >= max);
        if by_ram || by_count {
            debug!(
                target: "tessera::engine",
                docs = state.buffer.len(),
                bytes = state.buffer_bytes,
                "Buffer threshold reached"
            );
            self.flush_locked(state)?;
        }
        Ok(())
    }

    /// Make buffered changes visible to new readers.
    ///
    /// Returns `true` if the visible index changed.
    pub fn flush(&self) -> Result<bool> {
        let mut state = self.state.lock();
        state.check_open()?;
        self.flush_locked(&mut state)
    }

    fn flush_locked(&self, state: &mut WriterState) -> Result<bool> {
        if !state.has_pending() {
            return Ok(false);
        }
        let buffer = std::mem::take(&mut state.buffer);
        let pending = std::mem::take(&mut state.pending_deletes);
        state.buffer_bytes = 0;

        // Apply deletes to existing segments
        let mut deleted = 0usize;
        for entry in state.segments.iter_mut() {
            let mut hits: Vec<u32> = Vec::new();
            for term in pending.keys() {
                hits.extend(
                    entry
                        .segment
                        .docs_for_key_term(term)
                        .iter()
                        .filter(|doc| !entry.deletes.contains(*doc)),
                );
            }
            if !hits.is_empty() {
                deleted += hits.len();
                Arc::make_mut(&mut entry.deletes).extend(hits);
            }
        }
        state.segments.retain(|entry| entry.live_docs() > 0);

        // Drop buffered docs superseded by a later delete
        let docs: Vec<AnalyzedDocument> = buffer
            .into_iter()
            .filter(|(seq, doc)| pending.get(&doc.key_term).map_or(true, |del| seq > del))
            .map(|(_, doc)| doc)
            .collect();
        let added = docs.len();
        if !docs.is_empty() {
            let id = state.alloc_segment_id();
            state.segments.push(SegmentEntry {
                segment: Arc::new(Segment::build(id, docs)),
                deletes: Arc::new(HashSet::new()),
                persisted: false,
            });
        }

        let changed = added > 0 || deleted > 0;
        if changed {
            state.version += 1;
            state.dirty = true;
        }
        debug!(
            target: "tessera::engine",
            added,
            deleted,
            segments = state.segments.len(),
            "Flushed buffer"
        );

        self.apply_merge_policy(state);
        Ok(changed)
    }

    fn apply_merge_policy(&self, state: &mut WriterState) {
        loop {
            let sizes: Vec<u64> = state.segments.iter().map(SegmentEntry::live_size).collect();
            match state.tuning.merge_policy.find_merge(&sizes) {
                Some(picked) => Self::merge_locked(state, &picked),
                None => break,
            }
        }
    }

    /// Replace the segments at `picked` (ascending indices) with one merged segment
    fn merge_locked(state: &mut WriterState, picked: &[usize]) {
        let id = state.alloc_segment_id();
        let merged = {
            let sources: Vec<(&Segment, &HashSet<u32>)> = picked
                .iter()
                .map(|&i| {
                    let entry = &state.segments[i];
                    (entry.segment.as_ref(), entry.deletes.as_ref())
                })
                .collect();
            Segment::merge(id, &sources)
        };
        for &i in picked.iter().rev() {
            state.segments.remove(i);
        }
        debug!(
            target: "tessera::engine",
            merged = picked.len(),
            segment_id = id,
            docs = merged.doc_count(),
            "Merged segments"
        );
        if merged.doc_count() > 0 {
            state.segments.push(SegmentEntry {
                segment: Arc::new(merged),
                deletes: Arc::new(HashSet::new()),
                persisted: false,
            });
        }
        state.version += 1;
        state.dirty = true;
    }

    /// Flush, then merge until at most `max_segments` segments remain
    pub fn force_merge(&self, max_segments: usize) -> Result<()> {
        if max_segments == 0 {
            return Err(Error::config("max_segments must be at least 1"));
        }
        let mut state = self.state.lock();
        state.check_open()?;
        self.flush_locked(&mut state)?;

        let count = state.segments.len();
        if count > max_segments {
            // Merge the smallest segments into one
            let mut order: Vec<usize> = (0..count).collect();
            order.sort_by_key(|&i| (state.segments[i].live_size(), i));
            let mut picked: Vec<usize> = order.into_iter().take(count - max_segments + 1).collect();
            picked.sort_unstable();
            Self::merge_locked(&mut state, &picked);
        }
        info!(
            target: "tessera::engine",
            max_segments,
            segments = state.segments.len(),
            "Force merge complete"
        );
        Ok(())
    }

    /// Flush and durably record the current state.
    ///
    /// Returns `false` if there was nothing to commit.
    pub fn commit(&self) -> Result<bool> {
        let mut state = self.state.lock();
        state.check_open()?;
        self.flush_locked(&mut state)?;
        if !state.dirty {
            return Ok(false);
        }

        for entry in state.segments.iter_mut().filter(|e| !e.persisted) {
            self.backend
                .write_file(&Segment::file_name(entry.segment.id()), &entry.segment.encode()?)?;
            entry.persisted = true;
        }

        let generation = state.generation + 1;
        let point = CommitPoint {
            generation,
            next_segment_id: state.next_segment_id,
            segments: state
                .segments
                .iter()
                .map(|entry| {
                    let mut tombstones: Vec<u32> = entry.deletes.iter().copied().collect();
                    tombstones.sort_unstable();
                    CommittedSegment {
                        segment_id: entry.segment.id(),
                        tombstones,
                    }
                })
                .collect(),
        };
        point.write(self.backend.as_ref())?;

        state.generation = generation;
        state.committed = state.segments.clone();
        state.dirty = false;
        self.delete_unreferenced(generation, &state.segments);

        info!(
            target: "tessera::engine",
            generation,
            segments = state.segments.len(),
            "Committed index"
        );
        Ok(true)
    }

    /// Remove old commit points and segment files not in `live`.
    ///
    /// Failures are tolerated: a leftover file is cleaned up on a later commit.
    fn delete_unreferenced(&self, generation: u64, live: &[SegmentEntry]) {
        let files = match self.backend.list_files() {
            Ok(files) => files,
            Err(e) => {
                warn!(target: "tessera::engine", error = %e, "Failed to list index files");
                return;
            }
        };
        let live_ids: HashSet<u64> = live
            .iter()
            .filter(|e| e.persisted)
            .map(|e| e.segment.id())
            .collect();
        for name in files {
            let stale = match (
                CommitPoint::parse_file_name(&name),
                Segment::parse_file_name(&name),
            ) {
                (Some(gen), _) => gen < generation,
                (_, Some(id)) => !live_ids.contains(&id),
                _ => false,
            };
            if stale {
                if let Err(e) = self.backend.delete_file(&name) {
                    warn!(target: "tessera::engine", file = %name, error = %e, "Failed to delete stale index file");
                }
            }
        }
    }

    /// Discard every change since the last commit. The writer stays open.
    pub fn rollback(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.check_open()?;
        state.buffer.clear();
        state.buffer_bytes = 0;
        state.pending_deletes.clear();
        state.segments = state.committed.clone();
        state.dirty = false;
        state.version += 1;
        info!(
            target: "tessera::engine",
            generation = state.generation,
            "Rolled back to last commit"
        );
        Ok(())
    }

    /// Delete every document, buffered or flushed
    pub fn delete_all(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.check_open()?;
        state.buffer.clear();
        state.buffer_bytes = 0;
        state.pending_deletes.clear();
        state.segments.clear();
        state.dirty = true;
        state.version += 1;
        debug!(target: "tessera::engine", "Deleted all documents");
        Ok(())
    }

    /// Current tuning
    pub fn tuning(&self) -> WriterTuning {
        self.state.lock().tuning
    }

    /// Replace the tuning; takes effect on the next buffered change
    pub fn set_tuning(&self, tuning: WriterTuning) -> Result<()> {
        tuning.validate()?;
        self.state.lock().tuning = tuning;
        Ok(())
    }

    /// Point-in-time reader over the flushed segments
    pub fn reader(&self) -> IndexReader {
        let state = self.state.lock();
        let segments = state
            .segments
            .iter()
            .map(|entry| SegmentReader::new(Arc::clone(&entry.segment), Arc::clone(&entry.deletes)))
            .collect();
        IndexReader::new(segments, state.version)
    }

    /// Version of the visible segment set
    pub fn version(&self) -> u64 {
        self.state.lock().version
    }

    /// Number of flushed segments
    pub fn segment_count(&self) -> usize {
        self.state.lock().segments.len()
    }

    /// Generation of the last commit (0 before the first)
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Whether uncommitted changes exist
    pub fn has_uncommitted_changes(&self) -> bool {
        let state = self.state.lock();
        state.dirty || state.has_pending()
    }

    /// Bytes held in memory and not yet on the backend
    pub fn unpersisted_bytes(&self) -> u64 {
        let state = self.state.lock();
        let segments: u64 = state
            .segments
            .iter()
            .filter(|e| !e.persisted)
            .map(|e| e.segment.size_bytes())
            .sum();
        segments + state.buffer_bytes as u64
    }

    /// Backend this writer stores its files in
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Analyzer used for documents
    pub fn analyzer(&self) -> &Arc<dyn Analyzer> {
        &self.analyzer
    }

    /// Close the writer, discarding uncommitted changes.
    ///
    /// Readers already handed out stay usable. Closing twice is a no-op.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        if state.dirty || state.has_pending() {
            debug!(target: "tessera::engine", "Closing with uncommitted changes");
        }
        state.closed = true;
        state.buffer.clear();
        state.buffer_bytes = 0;
        state.pending_deletes.clear();
        info!(target: "tessera::engine", generation = state.generation, "Closed index writer");
    }

    /// Whether [`close`](Self::close) was called
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}
