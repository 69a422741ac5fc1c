//! Partitioned full-text search for Tessera
//!
//! This crate provides:
//! - QueryBuilder: free text to a boosted term/boolean query tree
//! - SynonymMap: query-time synonym expansion (programmatic or Solr format)
//! - PartitionIndex: the local index of one storage partition
//! - TextIndex: index definition creating one PartitionIndex per partition
//! - SearchAggregator: distributed accumulate/combine/finalize with global
//!   re-scoring and sigmoid score normalization
//! - PartitionView / Predicate: the seams to the host store
//! - LocalStore: a reference in-process host
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use tessera_search::{LocalStore, QueryBuilder, SearchAggregator, TextIndex, Utf8Extractor};
//!
//! let store = LocalStore::new(4)?;
//! store.create_index(TextIndex::new(Arc::new(Utf8Extractor)))?;
//! store.put("doc1", "machine learning")?;
//!
//! let query = QueryBuilder::for_field("text")?.parse("learning")?;
//! let agg = SearchAggregator::new("text", Arc::new(Utf8Extractor), query, 10);
//! let hits = store.search(&agg)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aggregator;
pub mod config;
pub mod extractor;
pub mod forward;
pub mod gate;
pub mod host;
pub mod local;
pub mod partition;
pub mod query_builder;
pub mod synonyms;
pub mod text_index;

pub use aggregator::{normalize_scores, PartialResult, SearchAggregator, SearchResult};
pub use config::{IndexConfig, CONFIG_FILE_NAME};
pub use extractor::{JsonFieldExtractor, SharedExtractor, TextExtractor, Utf8Extractor};
pub use forward::{ForwardIndex, ForwardSnapshot};
pub use gate::{ExclusivePermit, MutationGate, MutationPermit};
pub use host::{PartitionView, Predicate, SharedPredicate};
pub use local::{LocalPartition, LocalStore};
pub use partition::PartitionIndex;
pub use query_builder::{
    Preprocessor, QueryBuilder, QueryBuilderOptions, QueryFactory, SynonymSource,
};
pub use synonyms::SynonymMap;
pub use text_index::TextIndex;
