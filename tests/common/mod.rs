//! Shared test utilities for the integration suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

use std::path::Path;
use std::sync::{Arc, Once};

pub use tessera::{
    AnalyzerSpec, BackendSpec, EntryKey, EntryValue, Error, IndexConfig, LocalStore, Occur,
    PartitionId, PartitionIndex, PartitionView, Query, QueryBuilder, SearchAggregator,
    SearchResult, SharedPredicate, TextIndex, Utf8Extractor, WriterTuning,
};

// ============================================================================
// Initialization
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Install a test-writer fmt subscriber once per process
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

// ============================================================================
// Keys, values, queries
// ============================================================================

pub fn key(s: &str) -> EntryKey {
    EntryKey::from(s)
}

pub fn val(s: &str) -> EntryValue {
    EntryValue::from(s)
}

/// Standard-analyzer query over the `text` field
pub fn parse(text: &str) -> Query {
    QueryBuilder::for_field("text")
        .expect("valid builder")
        .parse(text)
        .expect("query parses")
}

/// Keys of local hits, in rank order
pub fn hit_keys(hits: &[(EntryKey, f32)]) -> Vec<EntryKey> {
    hits.iter().map(|(k, _)| k.clone()).collect()
}

/// Keys of global results, in rank order
pub fn result_keys<T>(results: &[SearchResult<T>]) -> Vec<EntryKey> {
    results.iter().map(|r| r.key.clone()).collect()
}

// ============================================================================
// Index construction
// ============================================================================

/// In-memory partition index on the `text` field
pub fn mem_index(inverse_map: bool) -> PartitionIndex {
    init_tracing();
    PartitionIndex::open(
        PartitionId::new(0),
        "text",
        Arc::new(Utf8Extractor),
        IndexConfig::default(),
        inverse_map,
    )
    .expect("in-memory index opens")
}

/// Config rooted at `dir` on the filesystem backend
pub fn fs_config(dir: &Path) -> IndexConfig {
    IndexConfig::default().with_backend(BackendSpec::Filesystem {
        root: dir.to_path_buf(),
    })
}

/// Filesystem partition index on the `text` field
pub fn fs_index(dir: &Path, partition: u32) -> PartitionIndex {
    init_tracing();
    PartitionIndex::open(
        PartitionId::new(partition),
        "text",
        Arc::new(Utf8Extractor),
        fs_config(dir),
        false,
    )
    .expect("filesystem index opens")
}

/// Store with a `text` index over UTF-8 values
pub fn text_store(partitions: u32) -> LocalStore {
    init_tracing();
    let store = LocalStore::new(partitions).expect("store");
    store
        .create_index(TextIndex::new(Arc::new(Utf8Extractor)))
        .expect("index created");
    store
}

/// Aggregator for `text` over the `text` field
pub fn text_aggregator(text: &str, max_results: usize) -> SearchAggregator {
    SearchAggregator::new("text", Arc::new(Utf8Extractor), parse(text), max_results)
}

/// Keys that route to pairwise distinct partitions of `store`
pub fn keys_on_distinct_partitions(store: &LocalStore, count: usize) -> Vec<EntryKey> {
    assert!(count <= store.partition_count());
    let mut seen = Vec::new();
    let mut keys = Vec::new();
    for i in 0.. {
        let k = key(&format!("doc-{}", i));
        let p = store.partition_for(&k);
        if !seen.contains(&p) {
            seen.push(p);
            keys.push(k);
            if keys.len() == count {
                break;
            }
        }
    }
    keys
}
