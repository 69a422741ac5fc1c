//! Local text index engine for Tessera
//!
//! This crate provides the per-partition index capability:
//! - Analyzer: text to terms (standard, whitespace, keyword, custom)
//! - StorageBackend: where segment files and commit points live
//! - IndexWriter: buffered mutation, flush, commit, rollback, merge
//! - IndexSearcher / SearcherManager: point-in-time BM25 search
//!
//! The engine knows nothing about partitions beyond the id used to open a
//! backend; the search crate layers partition lifecycle on top.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod analyzer;
pub mod backend;
mod commit;
pub mod query;
pub mod searcher;
pub mod segment;
pub mod tokenizer;
pub mod tuning;
pub mod writer;

pub use analyzer::{register_analyzer, Analyzer, AnalyzerFactory, AnalyzerSpec};
pub use backend::{
    register_backend, BackendFactory, BackendSpec, FsBackend, MemoryBackend, StorageBackend,
};
pub use query::{BooleanQuery, Clause, Occur, Query};
pub use searcher::{
    DocAddress, IndexReader, IndexSearcher, ScoreDoc, SearcherManager, SearcherSpec, Similarity,
    TopDocs,
};
pub use tuning::{MergePolicy, WriterTuning};
pub use writer::{Document, IndexWriter};
