//! Partition Index Tests
//!
//! - Insert then search finds the key; delete then search does not
//! - Update never exposes two versions of one key
//! - Batch loads end up identical to per-document loads
//! - Abort restores the pre-batch index
//! - Force merge keeps results while shrinking the segment count

use crate::common::*;
use std::collections::BTreeSet;
use std::sync::Arc;

fn all_keys(index: &PartitionIndex, text: &str) -> BTreeSet<EntryKey> {
    index
        .search(&parse(text), 1000)
        .unwrap()
        .into_iter()
        .map(|(k, _)| k)
        .collect()
}

const CORPUS: &[(&str, &str)] = &[
    ("d1", "distributed systems and consensus"),
    ("d2", "full text search with inverted indexes"),
    ("d3", "search ranking with bm25"),
    ("d4", "consensus protocols for distributed search"),
    ("d5", "caching in partitioned stores"),
];

// =============================================================================
// ROUND TRIP
// =============================================================================

#[test]
fn test_insert_search_delete_round_trip() {
    let index = mem_index(false);
    for (k, v) in CORPUS {
        index.insert(&key(k), &val(v)).unwrap();
    }
    assert!(all_keys(&index, "consensus").contains(&key("d1")));

    index.delete(&key("d1")).unwrap();
    let hits = all_keys(&index, "consensus");
    assert!(!hits.contains(&key("d1")));
    assert!(hits.contains(&key("d4")));
}

#[test]
fn test_results_bounded_and_descending() {
    let index = mem_index(false);
    for (k, v) in CORPUS {
        index.insert(&key(k), &val(v)).unwrap();
    }
    let hits = index.search(&parse("distributed search"), 2).unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].0, key("d4"));
    assert!(hits[0].1 >= hits[1].1);
}

#[test]
fn test_binary_keys_returned_verbatim() {
    let index = mem_index(false);
    let raw = EntryKey::new(vec![0u8, 255, 10, 13, 0]);
    index.insert(&raw, &val("opaque key")).unwrap();
    let hits = index.search(&parse("opaque"), 10).unwrap();
    assert_eq!(hits[0].0.as_bytes(), &[0u8, 255, 10, 13, 0]);
}

// =============================================================================
// UPDATE ATOMICITY
// =============================================================================

#[test]
fn test_update_replaces_old_version() {
    let index = mem_index(false);
    index.insert(&key("k"), &val("alpha original")).unwrap();
    index.update(&key("k"), &val("beta replacement")).unwrap();

    assert!(all_keys(&index, "alpha").is_empty());
    let hits = index.search(&parse("beta"), 10).unwrap();
    assert_eq!(hit_keys(&hits), vec![key("k")]);
    assert_eq!(index.doc_count(), 1);
}

#[test]
fn test_repeated_updates_leave_one_document() {
    let index = mem_index(true);
    for gen in 0..25 {
        index.update(&key("k"), &val(&format!("shared generation{}", gen))).unwrap();
    }
    assert_eq!(index.doc_count(), 1);
    assert_eq!(index.search(&parse("shared"), 10).unwrap().len(), 1);
    assert_eq!(
        index.forward_value(&key("k")).as_deref(),
        Some("shared generation24")
    );
}

// =============================================================================
// BATCH MODE
// =============================================================================

#[test]
fn test_batch_load_equals_incremental_load() {
    let incremental = mem_index(false);
    let batched = mem_index(false);
    batched.begin_batch().unwrap();
    for (k, v) in CORPUS {
        incremental.insert(&key(k), &val(v)).unwrap();
        batched.insert(&key(k), &val(v)).unwrap();
    }
    batched.end_batch().unwrap();

    for text in ["search", "consensus", "distributed stores", "bm25 ranking"] {
        assert_eq!(all_keys(&incremental, text), all_keys(&batched, text), "{}", text);
    }
    assert_eq!(incremental.doc_count(), batched.doc_count());
}

#[test]
fn test_abort_restores_pre_batch_state() {
    let index = mem_index(true);
    index.insert(&key("keep"), &val("stable content")).unwrap();
    let before = index.index_contents();

    index.begin_batch().unwrap();
    index.insert(&key("temp"), &val("temporary content")).unwrap();
    index.update(&key("keep"), &val("rewritten")).unwrap();
    index.delete(&key("keep")).unwrap();
    index.abort_batch().unwrap();

    assert!(!index.is_batch_mode());
    assert_eq!(all_keys(&index, "content"), BTreeSet::from([key("keep")]));
    assert!(all_keys(&index, "temporary").is_empty());
    assert_eq!(index.index_contents(), before);
    assert_eq!(index.doc_count(), 1);
}

#[test]
fn test_force_merge_keeps_results() {
    // Keep the merge policy out of the way so every flush leaves a segment
    let mut tuning = WriterTuning::default();
    tuning.merge_policy.merge_factor = 100;
    let index = PartitionIndex::open(
        PartitionId::new(0),
        "text",
        Arc::new(Utf8Extractor),
        IndexConfig::default().with_writer(tuning),
        false,
    )
    .unwrap();
    for i in 0..40 {
        index
            .insert(&key(&format!("k{}", i)), &val(&format!("common word{}", i % 7)))
            .unwrap();
        if i % 5 == 0 {
            index.delete(&key(&format!("k{}", i))).unwrap();
        }
    }
    let before = all_keys(&index, "common");
    assert_eq!(index.segment_count(), 32);

    index.force_merge(1).unwrap();
    assert!(index.segment_count() <= 1);
    assert_eq!(all_keys(&index, "common"), before);
    assert_eq!(before.len(), 32);
}

#[test]
fn test_force_merge_zero_rejected() {
    let index = mem_index(false);
    assert!(matches!(index.force_merge(0), Err(Error::Config(_))));
}

#[test]
fn test_closed_index_rejects_everything() {
    let index = mem_index(false);
    index.insert(&key("a"), &val("text")).unwrap();
    index.close().unwrap();
    assert!(index.is_closed());

    assert!(matches!(index.insert(&key("b"), &val("x")), Err(Error::IndexClosed(_))));
    assert!(matches!(index.delete(&key("a")), Err(Error::IndexClosed(_))));
    assert!(matches!(index.search(&parse("text"), 10), Err(Error::IndexClosed(_))));
    assert!(matches!(index.commit(), Err(Error::IndexClosed(_))));
    // Closing again is a no-op
    index.close().unwrap();
}
