//! Aggregation Tests
//!
//! - Candidates from every partition are re-scored together
//! - A document matching every term ranks first regardless of its partition
//! - Post-filters drop candidates before the global ranking
//! - Normalized scores stay in [0, 1] and keep the raw order

use crate::common::*;
use proptest::prelude::*;
use std::sync::Arc;
use tessera::{normalize_scores, JsonFieldExtractor, PartialResult};

// =============================================================================
// GLOBAL RANKING
// =============================================================================

#[test]
fn test_full_match_ranks_first_across_partitions() {
    let store = text_store(3);
    let keys = keys_on_distinct_partitions(&store, 3);
    let (p, q, r) = (&keys[0], &keys[1], &keys[2]);
    store.put(p.clone(), "vector database").unwrap();
    store.put(q.clone(), "vector graphics").unwrap();
    store.put(r.clone(), "database administration").unwrap();

    let results = store.search(&text_aggregator("vector database", 10)).unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(&results[0].key, p);
    assert!(results[0].score > results[1].score);
    assert!(results[0].score <= 1.0 && results[2].score >= 0.0);
}

#[test]
fn test_full_match_ranks_first_despite_lower_local_score() {
    let store = text_store(3);
    let keys = keys_on_distinct_partitions(&store, 3);
    let (p, q, r) = (&keys[0], &keys[1], &keys[2]);
    store.put(p.clone(), "vector database").unwrap();
    store.put(q.clone(), "vector graphics").unwrap();
    store.put(r.clone(), "database administration").unwrap();

    // Fillers drive down the local idf of both terms in P's partition
    let home = store.partition_for(p);
    let mut fillers = 0;
    for i in 0.. {
        let filler = key(&format!("filler-{}", i));
        if store.partition_for(&filler) == home {
            store.put(filler, "vector database vector database notes").unwrap();
            fillers += 1;
            if fillers == 20 {
                break;
            }
        }
    }

    let query = parse("vector database");
    let local_score = |k: &EntryKey| -> f32 {
        let partition = store.partition(store.partition_for(k)).unwrap();
        let index = partition.index("text").unwrap();
        let hits = index.search(&query, 100).unwrap();
        hits.iter().find(|(hit, _)| hit == k).map(|(_, s)| *s).unwrap()
    };
    assert!(local_score(p) < local_score(q));

    let no_fillers = SharedPredicate::new(|k: &EntryKey, _: &EntryValue| {
        !k.as_bytes().starts_with(b"filler-")
    });
    let agg = text_aggregator("vector database", 10).with_filter(no_fillers);
    let results = store.search(&agg).unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(&results[0].key, p);
    assert!(results[0].score > results[1].score);
    assert!(result_keys(&results[1..]).contains(q));
    assert!(result_keys(&results[1..]).contains(r));
}

#[test]
fn test_manual_fan_out_through_bytes() {
    let store = text_store(4);
    for i in 0..40 {
        let text = if i % 4 == 0 { "rare term here" } else { "common filler" };
        store.put(format!("k{}", i).as_str(), text).unwrap();
    }

    let coordinator = text_aggregator("rare", 100);
    let mut merged = coordinator.supply();
    for id in 0..4 {
        let partition = store.partition(PartitionId::new(id)).unwrap();
        let mut worker = coordinator.supply();
        worker.accumulate(partition.as_ref()).unwrap();
        let wire = worker.partial_result().to_bytes().unwrap();
        merged.combine(PartialResult::from_bytes(&wire).unwrap());
    }
    let results = merged.finalize_values().unwrap();
    assert_eq!(results.len(), 10);
    assert!(results.iter().all(|r| r.value == val("rare term here")));
}

#[test]
fn test_global_bound_applies_after_rescoring() {
    let store = text_store(3);
    for i in 0..30 {
        store
            .put(format!("k{:02}", i).as_str(), format!("topic {}", "topic ".repeat(i % 3)))
            .unwrap();
    }
    let results = store.search(&text_aggregator("topic", 5)).unwrap();
    assert_eq!(results.len(), 5);
    for pair in results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[test]
fn test_no_candidates_is_empty() {
    let store = text_store(2);
    store.put("a", "nothing relevant").unwrap();
    assert!(store.search(&text_aggregator("absent", 10)).unwrap().is_empty());
}

#[test]
fn test_converter_receives_values() {
    let store = text_store(2);
    store.put("a", "convert me please").unwrap();
    let coordinator = store.aggregate(&text_aggregator("convert", 10)).unwrap();
    let results = coordinator
        .finalize(|v| Ok(v.as_str().unwrap_or_default().len()))
        .unwrap();
    assert_eq!(results[0].value, "convert me please".len());
    assert_eq!(results[0].score, 1.0);
}

// =============================================================================
// FILTERING
// =============================================================================

#[test]
fn test_filter_scenario() {
    let store = text_store(3);
    store.put("doc1", "machine learning").unwrap();
    store.put("doc2", "AI").unwrap();
    store.put("doc3", "machine learning and AI").unwrap();

    let ends_with_ai = SharedPredicate::new(|_: &EntryKey, v: &EntryValue| {
        v.as_str().is_some_and(|s| s.ends_with("AI"))
    });
    let agg = text_aggregator("machine learning", 10).with_filter(ends_with_ai);
    let results = store.search(&agg).unwrap();
    assert_eq!(result_keys(&results), vec![key("doc3")]);
    assert_eq!(results[0].score, 1.0);
}

#[test]
fn test_json_field_index() {
    let store = LocalStore::new(2).unwrap();
    let extractor = Arc::new(JsonFieldExtractor::new("/body").unwrap());
    store
        .create_index(TextIndex::new(extractor.clone()))
        .unwrap();
    store
        .put("j1", r#"{"title":"ignored","body":"partitioned search"}"#)
        .unwrap();
    store.put("j2", r#"{"title":"search","body":"other"}"#).unwrap();

    let query = QueryBuilder::for_field("body").unwrap().parse("search").unwrap();
    let agg = SearchAggregator::new("body", extractor, query, 10);
    let results = store.search(&agg).unwrap();
    assert_eq!(result_keys(&results), vec![key("j1")]);
}

#[test]
fn test_query_on_unindexed_field_fails() {
    let store = text_store(2);
    let query = Query::term("title", "x");
    let agg = SearchAggregator::new("title", Arc::new(Utf8Extractor), query, 10);
    assert!(matches!(store.search(&agg), Err(Error::IndexNotFound { .. })));
}

#[test]
fn test_query_naming_only_other_fields_fails() {
    let store = text_store(2);
    store.put("a", "search engine").unwrap();
    let query = QueryBuilder::for_field("body").unwrap().parse("search").unwrap();
    let agg = SearchAggregator::new("text", Arc::new(Utf8Extractor), query, 10);
    match store.search(&agg) {
        Err(Error::IndexNotFound { field, .. }) => assert_eq!(field, "body"),
        other => panic!("expected IndexNotFound, got {:?}", other.map(|r| r.len())),
    }
}

// =============================================================================
// NORMALIZATION
// =============================================================================

proptest! {
    #[test]
    fn prop_normalized_scores_in_unit_range(scores in prop::collection::vec(-1000.0f32..1000.0, 0..40)) {
        let out = normalize_scores(&scores);
        prop_assert_eq!(out.len(), scores.len());
        for s in &out {
            prop_assert!((0.0..=1.0).contains(s), "score {} out of range", s);
        }
    }

    #[test]
    fn prop_normalization_keeps_order(scores in prop::collection::vec(0.0f32..50.0, 2..40)) {
        let out = normalize_scores(&scores);
        for i in 0..scores.len() {
            for j in 0..scores.len() {
                if scores[i] > scores[j] {
                    prop_assert!(out[i] >= out[j]);
                }
            }
        }
    }

    #[test]
    fn prop_single_or_equal_scores_are_one(score in 0.0f32..100.0, n in 1usize..10) {
        let out = normalize_scores(&vec![score; n]);
        prop_assert!(out.iter().all(|s| *s == 1.0));
    }
}
