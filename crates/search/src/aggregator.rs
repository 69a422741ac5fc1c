//! Distributed search aggregation
//!
//! Scores computed on different partitions are not comparable: each local
//! index has its own term statistics. The aggregator therefore collects
//! *candidates* (keys and values) from every partition, and the coordinator
//! re-scores the union in one ephemeral in-memory index built with the same
//! [`IndexConfig`].
//!
//! ```text
//! worker:      supply() → accumulate(partition)* → partial_result()
//! coordinator: combine(partial)* → finalize(convert)
//! ```
//!
//! Final scores are squashed into `[0, 1]` with a sigmoid centered between the
//! lowest and highest raw score.

use crate::config::IndexConfig;
use crate::extractor::SharedExtractor;
use crate::host::{PartitionView, Predicate, SharedPredicate};
use crate::partition::PartitionIndex;
use crate::text_index::TextIndex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use tessera_core::{EntryKey, EntryValue, Error, PartitionId, Result};
use tessera_engine::Query;
use tracing::{debug, warn};

/// Upper bound on the sigmoid steepness
pub const SIGMOID_MAX_ALPHA: f32 = 5.0;
/// Floor on the half-spread so near-equal scores do not explode alpha
pub const SIGMOID_MIN_SPREAD: f32 = 1e-3;
/// Steepness target: the top score maps to about 0.95 (ln 19)
pub const SIGMOID_TARGET: f32 = 2.944;

/// Partition id of the ephemeral re-scoring index
const RESCORE_PARTITION: PartitionId = PartitionId(u32::MAX);

const PARTIAL_MAGIC: &[u8; 4] = b"TPRT";
const PARTIAL_VERSION: u32 = 1;

/// Map raw scores into `[0, 1]`, preserving order
///
/// One score maps to 1.0, as do all scores when they are equal.
pub fn normalize_scores(scores: &[f32]) -> Vec<f32> {
    match scores.len() {
        0 => return Vec::new(),
        1 => return vec![1.0],
        _ => {}
    }
    let min = scores.iter().copied().fold(f32::INFINITY, f32::min);
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if min == max {
        return vec![1.0; scores.len()];
    }
    let shift = (min + max) / 2.0;
    let alpha = SIGMOID_MAX_ALPHA.min(SIGMOID_TARGET / SIGMOID_MIN_SPREAD.max(max - shift));
    scores
        .iter()
        .map(|s| 1.0 / (1.0 + (-alpha * (s - shift)).exp()))
        .collect()
}

// ============================================================================
// PartialResult
// ============================================================================

/// Transferable candidate set; carries keys and values, never scores
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialResult {
    /// Config of the first partition index that contributed
    pub config: Option<IndexConfig>,
    /// Candidates by key
    pub matches: BTreeMap<EntryKey, EntryValue>,
}

impl PartialResult {
    /// Number of candidates
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    /// Whether there are no candidates
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Encode for transport
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let payload = rmp_serde::to_vec_named(self)?;
        let mut buf = Vec::with_capacity(8 + payload.len());
        buf.extend_from_slice(PARTIAL_MAGIC);
        buf.extend_from_slice(&PARTIAL_VERSION.to_le_bytes());
        buf.extend_from_slice(&payload);
        Ok(buf)
    }

    /// Decode bytes produced by [`to_bytes`](Self::to_bytes)
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < 8 || &buf[0..4] != PARTIAL_MAGIC {
            return Err(Error::corruption("not a partial result"));
        }
        let version = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        if version != PARTIAL_VERSION {
            return Err(Error::corruption(format!(
                "unsupported partial result version {}",
                version
            )));
        }
        Ok(rmp_serde::from_slice(&buf[8..])?)
    }
}

/// One globally ranked hit
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult<T> {
    /// Entry key
    pub key: EntryKey,
    /// Converted entry value
    pub value: T,
    /// Normalized score in `[0, 1]`
    pub score: f32,
}

// ============================================================================
// SearchAggregator
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Fresh,
    Accumulating,
    Combined,
}

/// Distributed query driver
#[derive(Debug)]
pub struct SearchAggregator {
    field: String,
    extractor: SharedExtractor,
    query: Query,
    max_results: usize,
    filter: Option<SharedPredicate>,
    partial: PartialResult,
    phase: Phase,
}

impl SearchAggregator {
    /// Aggregate `query` over the index of `field`, keeping at most
    /// `max_results` candidates per partition and in the final ranking
    pub fn new(
        field: impl Into<String>,
        extractor: SharedExtractor,
        query: Query,
        max_results: usize,
    ) -> Self {
        SearchAggregator {
            field: field.into(),
            extractor,
            query,
            max_results,
            filter: None,
            partial: PartialResult::default(),
            phase: Phase::Fresh,
        }
    }

    /// Aggregator over a text index definition
    pub fn for_index(index: &TextIndex, query: Query, max_results: usize) -> Self {
        Self::new(
            index.field(),
            Arc::clone(index.extractor()),
            query,
            max_results,
        )
    }

    /// Drop candidates rejected by `filter` during accumulation
    pub fn with_filter(mut self, filter: SharedPredicate) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Fresh aggregator with the same query, extractor, filter and bound
    pub fn supply(&self) -> Self {
        SearchAggregator {
            field: self.field.clone(),
            extractor: Arc::clone(&self.extractor),
            query: self.query.clone(),
            max_results: self.max_results,
            filter: self.filter.clone(),
            partial: PartialResult::default(),
            phase: Phase::Fresh,
        }
    }

    /// Queried field
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Query being aggregated
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Result bound
    pub fn max_results(&self) -> usize {
        self.max_results
    }

    /// Collect the candidates of one partition
    ///
    /// # Errors
    ///
    /// `IndexNotFound` when the partition has no index for the field or the
    /// query only names other fields, `InvalidState` after a `combine`, and
    /// any local search error.
    pub fn accumulate(&mut self, partition: &dyn PartitionView) -> Result<()> {
        if self.phase == Phase::Combined {
            return Err(Error::invalid_state(
                "accumulate is not allowed after combine",
            ));
        }
        let partition_id = partition.partition_id();
        let terms = self.query.terms();
        if let Some((field, _)) = terms.first() {
            if terms.iter().all(|(f, _)| *f != self.field) {
                return Err(Error::IndexNotFound {
                    field: (*field).to_string(),
                    partition: partition_id,
                });
            }
        }
        let index = partition
            .index(&self.field)
            .ok_or_else(|| Error::IndexNotFound {
                field: self.field.clone(),
                partition: partition_id,
            })?;

        let hits = index.search(&self.query, self.max_results)?;
        if self.partial.config.is_none() {
            self.partial.config = Some(index.config().clone());
        }

        let mut kept = 0usize;
        let mut vanished = 0usize;
        for (key, _) in hits {
            let Some(value) = partition.get(&key) else {
                vanished += 1;
                continue;
            };
            if let Some(filter) = &self.filter {
                if !filter.evaluate(&key, &value) {
                    continue;
                }
            }
            self.partial.matches.insert(key, value);
            kept += 1;
        }
        self.phase = Phase::Accumulating;

        debug!(
            target: "tessera::aggregate",
            partition = %partition_id,
            field = %self.field,
            kept,
            vanished,
            "Accumulated partition candidates"
        );
        Ok(())
    }

    /// Snapshot of the candidates collected so far
    pub fn partial_result(&self) -> PartialResult {
        self.partial.clone()
    }

    /// Merge a partial result from another worker
    pub fn combine(&mut self, partial: PartialResult) {
        if self.partial.config.is_none() {
            self.partial.config = partial.config;
        }
        for (key, value) in partial.matches {
            self.partial.matches.entry(key).or_insert(value);
        }
        self.phase = Phase::Combined;
    }

    /// Re-score every candidate together and return the global top hits
    ///
    /// Values are handed to `convert` in rank order. The filter is not
    /// re-applied.
    pub fn finalize<T, F>(self, mut convert: F) -> Result<Vec<SearchResult<T>>>
    where
        F: FnMut(EntryValue) -> Result<T>,
    {
        let SearchAggregator {
            field,
            extractor,
            query,
            max_results,
            partial,
            ..
        } = self;
        let PartialResult {
            config,
            mut matches,
        } = partial;
        if matches.is_empty() {
            return Ok(Vec::new());
        }

        let config = config.unwrap_or_default().in_memory();
        let index = PartitionIndex::open(RESCORE_PARTITION, field.as_str(), extractor, config, false)?;
        let hits = rescore(&index, &query, max_results, &matches);
        let closed = index.close();
        let mut hits = hits?;
        closed?;

        hits.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        let raw: Vec<f32> = hits.iter().map(|(_, s)| *s).collect();
        let normalized = normalize_scores(&raw);

        let mut results = Vec::with_capacity(hits.len());
        for ((key, _), score) in hits.into_iter().zip(normalized) {
            let Some(value) = matches.remove(&key) else {
                continue;
            };
            results.push(SearchResult {
                key,
                value: convert(value)?,
                score,
            });
        }

        debug!(
            target: "tessera::aggregate",
            field = %field,
            results = results.len(),
            top = raw.first().copied().unwrap_or(0.0),
            "Finalized global ranking"
        );
        Ok(results)
    }

    /// [`finalize`](Self::finalize) returning raw values
    pub fn finalize_values(self) -> Result<Vec<SearchResult<EntryValue>>> {
        self.finalize(Ok)
    }
}

/// Bulk-load candidates into `index` and run the query
fn rescore(
    index: &PartitionIndex,
    query: &Query,
    max_results: usize,
    matches: &BTreeMap<EntryKey, EntryValue>,
) -> Result<Vec<(EntryKey, f32)>> {
    index.begin_batch()?;
    for (key, value) in matches {
        match index.insert(key, value) {
            Ok(()) => {}
            Err(Error::Extraction(msg)) => {
                warn!(
                    target: "tessera::aggregate",
                    key = ?key,
                    error = %msg,
                    "Skipping candidate whose text cannot be extracted"
                );
            }
            Err(e) => {
                if let Err(abort) = index.abort_batch() {
                    warn!(
                        target: "tessera::aggregate",
                        error = %abort,
                        "Failed to roll back rescoring batch"
                    );
                }
                return Err(e);
            }
        }
    }
    index.end_batch()?;
    index.search(query, max_results)
}
