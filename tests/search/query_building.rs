//! Query Building Tests
//!
//! Free-text queries through a whole store search: synonyms loaded from a
//! Solr-format file, caller stop words, preprocessors and operators.

use crate::common::*;
use std::sync::Arc;
use tempfile::TempDir;
use tessera::{Analyzer, Preprocessor, SynonymMap, SynonymSource};

fn store_with(docs: &[(&str, &str)]) -> LocalStore {
    let store = text_store(2);
    for (k, v) in docs {
        store.put(*k, *v).unwrap();
    }
    store
}

fn run(store: &LocalStore, builder: &QueryBuilder, text: &str) -> Vec<EntryKey> {
    let query = builder.parse(text).unwrap();
    let agg = SearchAggregator::new("text", Arc::new(Utf8Extractor), query, 10);
    let mut keys = result_keys(&store.search(&agg).unwrap());
    keys.sort();
    keys
}

#[test]
fn test_synonym_file_expands_query() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("synonyms.txt");
    std::fs::write(
        &path,
        "# furniture\ncouch, sofa, settee\n\nlaptop => notebook computer\n",
    )
    .unwrap();

    let store = store_with(&[
        ("a", "leather sofa for sale"),
        ("b", "notebook computer repair"),
        ("c", "paper notebook"),
        ("d", "garden chairs"),
    ]);
    let source: SynonymSource =
        Arc::new(move |analyzer: &dyn Analyzer| SynonymMap::from_file(&path, analyzer));
    let builder = QueryBuilder::builder()
        .field("text")
        .synonym_source(source)
        .build()
        .unwrap();

    assert_eq!(run(&store, &builder, "couch"), vec![key("a")]);
    // Multi-term alternatives need every term
    assert_eq!(run(&store, &builder, "laptop"), vec![key("b")]);
}

#[test]
fn test_static_synonyms_are_normalized() {
    let store = store_with(&[("a", "jogging shoes"), ("b", "dress shoes")]);
    let mut map = SynonymMap::new();
    map.insert("Running", "Jogging");
    let builder = QueryBuilder::builder()
        .field("text")
        .synonyms(map)
        .build()
        .unwrap();
    assert_eq!(run(&store, &builder, "runs"), vec![key("a")]);
}

#[test]
fn test_stop_words_and_operator() {
    let store = store_with(&[
        ("a", "distributed cache"),
        ("b", "distributed search"),
        ("c", "search cache"),
    ]);
    let or = QueryBuilder::builder().field("text").build().unwrap();
    assert_eq!(run(&store, &or, "distributed cache"), vec![key("a"), key("b"), key("c")]);

    let and = QueryBuilder::builder()
        .field("text")
        .default_operator(Occur::Must)
        .build()
        .unwrap();
    assert_eq!(run(&store, &and, "distributed cache"), vec![key("a")]);

    let stopped = QueryBuilder::builder()
        .field("text")
        .stop_words(["cache"])
        .build()
        .unwrap();
    assert_eq!(run(&store, &stopped, "distributed cache"), vec![key("a"), key("b")]);
    assert!(run(&store, &stopped, "caches").is_empty());
}

#[test]
fn test_preprocessor_and_empty_text() {
    let store = store_with(&[("a", "snake case identifiers")]);
    let pre: Preprocessor = Arc::new(|t: &str| t.replace('_', " "));
    let builder = QueryBuilder::builder()
        .field("text")
        .preprocessor(pre)
        .build()
        .unwrap();
    assert_eq!(run(&store, &builder, "snake_case"), vec![key("a")]);
    assert!(run(&store, &builder, "").is_empty());
    assert!(run(&store, &builder, "the of and").is_empty());
}

#[test]
fn test_boosts_on_missing_fields_are_harmless() {
    let store = store_with(&[("a", "boosted text")]);
    let builder = QueryBuilder::builder()
        .boosted_field("title", 3.0)
        .field("text")
        .build()
        .unwrap();
    assert_eq!(run(&store, &builder, "boosted"), vec![key("a")]);
}
