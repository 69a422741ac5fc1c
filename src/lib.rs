//! Tessera - partitioned full-text search
//!
//! Tessera adds full-text search to a partitioned key/value store. Each
//! partition keeps a local inverted index next to its entries; a query fans
//! out to every partition, and the coordinator re-scores the union of
//! candidates so scores are comparable across partitions.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use tessera::{LocalStore, QueryBuilder, SearchAggregator, TextIndex, Utf8Extractor};
//!
//! let store = LocalStore::new(4)?;
//! store.create_index(TextIndex::new(Arc::new(Utf8Extractor)))?;
//! store.put("doc1", "machine learning and AI")?;
//!
//! let query = QueryBuilder::for_field("text")?.parse("machine learning")?;
//! let hits = store.search(&SearchAggregator::new("text", Arc::new(Utf8Extractor), query, 10))?;
//! ```
//!
//! # Architecture
//!
//! - `tessera-core`: keys, values, partition ids, errors
//! - `tessera-engine`: analyzers, segments, writer, searcher, storage backends
//! - `tessera-search`: partition indexes, query building, aggregation

pub use tessera_core::{EntryKey, EntryValue, Error, PartitionId, Result};
pub use tessera_engine::{
    Analyzer, AnalyzerSpec, BackendSpec, BooleanQuery, Occur, Query, SearcherSpec, Similarity,
    WriterTuning,
};
pub use tessera_search::*;
