//! Point-in-time search
//!
//! An [`IndexReader`] is an immutable snapshot of the writer's flushed
//! segments and their tombstones. An [`IndexSearcher`] executes [`Query`]
//! trees against one reader and collects the top-N hits. A
//! [`SearcherManager`] hands out the current searcher and swaps in a newer
//! one on refresh.
//!
//! ## Scoring
//!
//! BM25 uses index-wide statistics (over live documents of all segments):
//!
//! ```text
//! idf   = ln(1 + (N - df + 0.5) / (df + 0.5))
//! score = idf * tf * (k1 + 1) / (tf + k1 * (1 - b + b * dl / avgdl))
//! ```

use crate::query::{BooleanQuery, Occur, Query};
use crate::segment::Segment;
use crate::writer::IndexWriter;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tessera_core::{EntryKey, Error, Result};
use tracing::debug;

// ============================================================================
// Readers
// ============================================================================

/// One segment as seen by a reader
#[derive(Clone)]
pub struct SegmentReader {
    segment: Arc<Segment>,
    deletes: Arc<HashSet<u32>>,
}

impl SegmentReader {
    pub(crate) fn new(segment: Arc<Segment>, deletes: Arc<HashSet<u32>>) -> Self {
        SegmentReader { segment, deletes }
    }

    /// Underlying segment
    pub fn segment(&self) -> &Segment {
        &self.segment
    }

    /// Whether a document is deleted in this snapshot
    pub fn is_deleted(&self, doc: u32) -> bool {
        self.deletes.contains(&doc)
    }

    /// Live document count
    pub fn num_docs(&self) -> usize {
        self.segment.doc_count() - self.deletes.len()
    }
}

/// Immutable snapshot of an index
#[derive(Clone)]
pub struct IndexReader {
    segments: Vec<SegmentReader>,
    version: u64,
}

impl IndexReader {
    pub(crate) fn new(segments: Vec<SegmentReader>, version: u64) -> Self {
        IndexReader { segments, version }
    }

    /// Empty reader, older than any writer state
    pub fn empty() -> Self {
        IndexReader {
            segments: Vec::new(),
            version: 0,
        }
    }

    /// Writer version this snapshot was taken at
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Segment readers in index order
    pub fn segments(&self) -> &[SegmentReader] {
        &self.segments
    }

    /// Live documents
    pub fn num_docs(&self) -> usize {
        self.segments.iter().map(SegmentReader::num_docs).sum()
    }

    /// Live documents containing `term` in `field`
    pub fn doc_freq(&self, field: &str, term: &str) -> usize {
        self.segments
            .iter()
            .map(|seg| {
                seg.segment
                    .postings(field, term)
                    .map_or(0, |list| list.iter().filter(|p| !seg.is_deleted(p.doc)).count())
            })
            .sum()
    }

    /// Sum of `field` lengths over live documents
    pub fn total_field_length(&self, field: &str) -> u64 {
        self.segments
            .iter()
            .map(|seg| seg.segment.live_field_length(field, &seg.deletes))
            .sum()
    }

    /// Stored key at an address, if the address is valid
    pub fn stored_key(&self, address: DocAddress) -> Option<&EntryKey> {
        self.segments
            .get(address.segment)
            .and_then(|seg| seg.segment.key(address.doc))
    }

    /// Keys of all live documents, in index order
    pub fn live_keys(&self) -> Vec<EntryKey> {
        let mut keys = Vec::with_capacity(self.num_docs());
        for seg in &self.segments {
            for doc in 0..seg.segment.doc_count() as u32 {
                if !seg.is_deleted(doc) {
                    if let Some(key) = seg.segment.key(doc) {
                        keys.push(key.clone());
                    }
                }
            }
        }
        keys
    }
}

// ============================================================================
// Similarity
// ============================================================================

/// Scoring model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Similarity {
    /// Okapi BM25
    Bm25 {
        /// Term frequency saturation
        k1: f32,
        /// Length normalization
        b: f32,
    },
    /// Every matching term scores its boost (1.0 by default)
    Boolean,
}

impl Default for Similarity {
    fn default() -> Self {
        Similarity::Bm25 { k1: 1.2, b: 0.75 }
    }
}

/// Serializable searcher description
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearcherSpec {
    /// Scoring model
    pub similarity: Similarity,
}

impl SearcherSpec {
    /// Reject parameters that would produce non-finite scores
    pub fn validate(&self) -> Result<()> {
        if let Similarity::Bm25 { k1, b } = self.similarity {
            if !k1.is_finite() || k1 < 0.0 {
                return Err(Error::config("bm25 k1 must be finite and non-negative"));
            }
            if !(0.0..=1.0).contains(&b) {
                return Err(Error::config("bm25 b must be within [0, 1]"));
            }
        }
        Ok(())
    }
}

/// Index-wide statistics of one (field, term)
#[derive(Debug, Clone, Copy)]
struct TermStats {
    idf: f32,
    avg_field_length: f32,
}

// ============================================================================
// Results
// ============================================================================

/// Location of a document within a reader
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocAddress {
    /// Segment ordinal in the reader
    pub segment: usize,
    /// Segment-local doc number
    pub doc: u32,
}

/// A scored hit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreDoc {
    /// Where the document lives
    pub address: DocAddress,
    /// Unnormalized score
    pub score: f32,
}

/// Top-N hits plus the total match count
#[derive(Debug, Clone, Default)]
pub struct TopDocs {
    /// Number of matching documents (not bounded by N)
    pub total_hits: usize,
    /// Best hits, score descending then address ascending
    pub score_docs: Vec<ScoreDoc>,
}

// ============================================================================
// IndexSearcher
// ============================================================================

/// Executes queries against one reader snapshot
pub struct IndexSearcher {
    reader: IndexReader,
    similarity: Similarity,
}

impl IndexSearcher {
    /// Create a searcher over a reader
    pub fn new(reader: IndexReader, spec: &SearcherSpec) -> Self {
        IndexSearcher {
            reader,
            similarity: spec.similarity,
        }
    }

    /// Snapshot being searched
    pub fn reader(&self) -> &IndexReader {
        &self.reader
    }

    /// Stored key of a hit
    pub fn stored_key(&self, address: DocAddress) -> Option<&EntryKey> {
        self.reader.stored_key(address)
    }

    /// Run `query`, keeping the best `n` hits
    pub fn search(&self, query: &Query, n: usize) -> Result<TopDocs> {
        validate_boosts(query)?;

        let stats = self.term_stats(query);
        let mut hits: Vec<ScoreDoc> = Vec::new();
        for (ordinal, seg) in self.reader.segments.iter().enumerate() {
            for (doc, score) in self.eval(seg, query, &stats) {
                hits.push(ScoreDoc {
                    address: DocAddress {
                        segment: ordinal,
                        doc,
                    },
                    score,
                });
            }
        }

        let total_hits = hits.len();
        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.address.cmp(&b.address))
        });
        hits.truncate(n);
        debug!(
            target: "tessera::engine",
            total_hits,
            returned = hits.len(),
            "Search executed"
        );
        Ok(TopDocs {
            total_hits,
            score_docs: hits,
        })
    }

    /// Number of documents matching `query`
    pub fn count(&self, query: &Query) -> Result<usize> {
        Ok(self.search(query, 0)?.total_hits)
    }

    fn term_stats<'q>(&self, query: &'q Query) -> HashMap<(&'q str, &'q str), TermStats> {
        let n = self.reader.num_docs() as f32;
        let mut stats = HashMap::new();
        for (field, term) in query.terms() {
            stats.entry((field, term)).or_insert_with(|| {
                let df = self.reader.doc_freq(field, term) as f32;
                let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
                let avg = if n > 0.0 {
                    self.reader.total_field_length(field) as f32 / n
                } else {
                    0.0
                };
                TermStats {
                    idf,
                    avg_field_length: avg,
                }
            });
        }
        stats
    }

    fn eval<'q>(
        &self,
        seg: &SegmentReader,
        query: &'q Query,
        stats: &HashMap<(&'q str, &'q str), TermStats>,
    ) -> HashMap<u32, f32> {
        match query {
            Query::Term { field, term } => {
                let mut out = HashMap::new();
                let Some(postings) = seg.segment.postings(field, term) else {
                    return out;
                };
                let Some(ts) = stats.get(&(field.as_str(), term.as_str())) else {
                    return out;
                };
                for p in postings.iter().filter(|p| !seg.is_deleted(p.doc)) {
                    let score = match self.similarity {
                        Similarity::Bm25 { k1, b } => {
                            let tf = p.tf as f32;
                            let dl = seg.segment.field_length(field, p.doc) as f32;
                            let norm = if ts.avg_field_length > 0.0 {
                                1.0 - b + b * dl / ts.avg_field_length
                            } else {
                                1.0
                            };
                            ts.idf * tf * (k1 + 1.0) / (tf + k1 * norm)
                        }
                        Similarity::Boolean => 1.0,
                    };
                    out.insert(p.doc, score);
                }
                out
            }
            Query::Boost { query, boost } => {
                let mut out = self.eval(seg, query, stats);
                for score in out.values_mut() {
                    *score *= *boost;
                }
                out
            }
            Query::Boolean(b) => self.eval_boolean(seg, b, stats),
        }
    }

    fn eval_boolean<'q>(
        &self,
        seg: &SegmentReader,
        query: &'q BooleanQuery,
        stats: &HashMap<(&'q str, &'q str), TermStats>,
    ) -> HashMap<u32, f32> {
        let mut musts: Vec<HashMap<u32, f32>> = Vec::new();
        let mut shoulds: Vec<HashMap<u32, f32>> = Vec::new();
        let mut excluded: HashSet<u32> = HashSet::new();
        for clause in &query.clauses {
            let matches = self.eval(seg, &clause.query, stats);
            match clause.occur {
                Occur::Must => musts.push(matches),
                Occur::Should => shoulds.push(matches),
                Occur::MustNot => excluded.extend(matches.into_keys()),
            }
        }

        let mut out: HashMap<u32, f32> = if musts.is_empty() {
            // At least one should clause must match
            let mut union = HashMap::new();
            for matches in &shoulds {
                for (&doc, &score) in matches {
                    *union.entry(doc).or_insert(0.0) += score;
                }
            }
            union
        } else {
            let mut iter = musts.into_iter();
            let mut acc = iter.next().unwrap_or_default();
            for matches in iter {
                acc = acc
                    .into_iter()
                    .filter_map(|(doc, score)| matches.get(&doc).map(|s| (doc, score + s)))
                    .collect();
            }
            for matches in &shoulds {
                for (doc, score) in acc.iter_mut() {
                    if let Some(s) = matches.get(doc) {
                        *score += s;
                    }
                }
            }
            acc
        };
        out.retain(|doc, _| !excluded.contains(doc));
        out
    }
}

fn validate_boosts(query: &Query) -> Result<()> {
    match query {
        Query::Term { .. } => Ok(()),
        Query::Boost { query, boost } => {
            if !boost.is_finite() || *boost < 0.0 {
                return Err(Error::config(format!("invalid boost {}", boost)));
            }
            validate_boosts(query)
        }
        Query::Boolean(b) => b.clauses.iter().try_for_each(|c| validate_boosts(&c.query)),
    }
}

// ============================================================================
// SearcherManager
// ============================================================================

/// Hands out the current searcher and refreshes it from a writer
pub struct SearcherManager {
    current: RwLock<Arc<IndexSearcher>>,
    spec: SearcherSpec,
}

impl SearcherManager {
    /// Create a manager with a searcher over the writer's current state
    pub fn new(writer: &IndexWriter, spec: SearcherSpec) -> Self {
        let searcher = IndexSearcher::new(writer.reader(), &spec);
        SearcherManager {
            current: RwLock::new(Arc::new(searcher)),
            spec,
        }
    }

    /// Current searcher; stays valid however long it is held
    pub fn acquire(&self) -> Arc<IndexSearcher> {
        Arc::clone(&self.current.read())
    }

    /// Swap in a searcher over the writer's latest flushed state.
    ///
    /// Returns `true` if a newer snapshot was installed. A refresh never
    /// replaces a snapshot with an older one, even when racing.
    pub fn maybe_refresh(&self, writer: &IndexWriter) -> bool {
        if writer.version() <= self.current.read().reader.version() {
            return false;
        }
        let reader = writer.reader();
        let version = reader.version();
        let searcher = Arc::new(IndexSearcher::new(reader, &self.spec));
        let mut current = self.current.write();
        if version > current.reader.version() {
            *current = searcher;
            debug!(target: "tessera::engine", version, "Refreshed searcher");
            true
        } else {
            false
        }
    }

    /// Searcher description
    pub fn spec(&self) -> &SearcherSpec {
        &self.spec
    }
}
