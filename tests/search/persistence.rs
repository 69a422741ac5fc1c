//! Persistence Tests
//!
//! Filesystem-backed partition indexes across close and reopen:
//! - Committed documents survive, uncommitted ones do not
//! - Batch loads are durable after end_batch
//! - Destroy leaves an empty index behind
//! - Partitions share a root without sharing files

use crate::common::*;
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn test_reopen_sees_only_committed() {
    let dir = TempDir::new().unwrap();
    {
        let index = fs_index(dir.path(), 1);
        index.insert(&key("a"), &val("durable words")).unwrap();
        index.commit().unwrap();
        index.insert(&key("b"), &val("volatile words")).unwrap();
        // Visible before close, never committed
        assert_eq!(index.search(&parse("volatile"), 10).unwrap().len(), 1);
        index.close().unwrap();
    }

    let index = fs_index(dir.path(), 1);
    assert_eq!(hit_keys(&index.search(&parse("words"), 10).unwrap()), vec![key("a")]);
    assert_eq!(index.doc_count(), 1);
}

#[test]
fn test_committed_delete_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let index = fs_index(dir.path(), 0);
        index.insert(&key("a"), &val("first")).unwrap();
        index.insert(&key("b"), &val("second")).unwrap();
        index.commit().unwrap();
        index.delete(&key("a")).unwrap();
        index.update(&key("b"), &val("replaced")).unwrap();
        index.commit().unwrap();
        index.close().unwrap();
    }
    let index = fs_index(dir.path(), 0);
    assert!(index.search(&parse("first"), 10).unwrap().is_empty());
    assert!(index.search(&parse("second"), 10).unwrap().is_empty());
    assert_eq!(index.search(&parse("replaced"), 10).unwrap().len(), 1);
}

#[test]
fn test_end_batch_is_durable() {
    let dir = TempDir::new().unwrap();
    {
        let index = fs_index(dir.path(), 2);
        index.begin_batch().unwrap();
        for i in 0..50 {
            index
                .insert(&key(&format!("k{}", i)), &val("bulk loaded"))
                .unwrap();
        }
        index.end_batch().unwrap();
        index.close().unwrap();
    }
    let index = fs_index(dir.path(), 2);
    assert_eq!(index.doc_count(), 50);
}

#[test]
fn test_aborted_batch_leaves_nothing_on_disk() {
    let dir = TempDir::new().unwrap();
    {
        let index = fs_index(dir.path(), 0);
        index.insert(&key("base"), &val("baseline")).unwrap();
        index.begin_batch().unwrap();
        index.insert(&key("x"), &val("aborted")).unwrap();
        index.abort_batch().unwrap();
        index.close().unwrap();
    }
    let index = fs_index(dir.path(), 0);
    assert_eq!(index.search(&parse("baseline"), 10).unwrap().len(), 1);
    assert!(index.search(&parse("aborted"), 10).unwrap().is_empty());
}

#[test]
fn test_destroy_then_reopen_is_empty() {
    let dir = TempDir::new().unwrap();
    {
        let index = fs_index(dir.path(), 5);
        index.insert(&key("a"), &val("gone soon")).unwrap();
        index.commit().unwrap();
        index.destroy().unwrap();
        assert!(index.is_closed());
    }
    let index = fs_index(dir.path(), 5);
    assert_eq!(index.doc_count(), 0);
}

#[test]
fn test_partitions_are_isolated_on_disk() {
    let dir = TempDir::new().unwrap();
    let p0 = fs_index(dir.path(), 0);
    let p1 = fs_index(dir.path(), 1);
    p0.insert(&key("a"), &val("left side")).unwrap();
    p1.insert(&key("b"), &val("right side")).unwrap();
    p0.commit().unwrap();
    p1.commit().unwrap();

    assert!(dir.path().join("partition-0").is_dir());
    assert!(dir.path().join("partition-1").is_dir());
    assert_eq!(hit_keys(&p0.search(&parse("side"), 10).unwrap()), vec![key("a")]);
    assert_eq!(hit_keys(&p1.search(&parse("side"), 10).unwrap()), vec![key("b")]);
    assert!(p0.size_in_bytes() > 0);
}

#[test]
fn test_config_file_drives_index() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join(tessera::CONFIG_FILE_NAME);
    fs_config(&dir.path().join("data"))
        .with_analyzer(AnalyzerSpec::Whitespace)
        .write_to_file(&config_path)
        .unwrap();

    let config = IndexConfig::from_file(&config_path).unwrap();
    let def = TextIndex::new(Arc::new(Utf8Extractor)).with_config(config);
    let index = def.create_index(PartitionId::new(9)).unwrap();
    index.insert(&key("a"), &val("Running Fast")).unwrap();
    index.commit().unwrap();

    // Whitespace analysis lowercases without stemming
    assert_eq!(index.search(&Query::term("text", "running"), 10).unwrap().len(), 1);
    assert!(index.search(&Query::term("text", "run"), 10).unwrap().is_empty());
    assert!(dir.path().join("data").join("partition-9").is_dir());
}
