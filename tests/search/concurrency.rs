//! Concurrency Tests
//!
//! - Parallel inserts are all searchable
//! - Parallel updates leave only the latest value of each key
//! - Parallel deletes leave nothing behind
//! - Searches and batch transitions run alongside mutations
//! - Commits inside a batch keep the inverse map in step with the index

use crate::common::*;
use rand::Rng;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

const THREADS: usize = 8;
const PER_THREAD: usize = 40;

fn spawn_workers<F>(index: &Arc<PartitionIndex>, work: F)
where
    F: Fn(&PartitionIndex, usize) + Send + Sync + 'static,
{
    let work = Arc::new(work);
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let index = Arc::clone(index);
            let barrier = Arc::clone(&barrier);
            let work = Arc::clone(&work);
            thread::spawn(move || {
                barrier.wait();
                work(&index, t);
            })
        })
        .collect();
    for h in handles {
        h.join().expect("worker panicked");
    }
}

fn k(t: usize, i: usize) -> EntryKey {
    key(&format!("t{}-{}", t, i))
}

// =============================================================================
// PARALLEL MUTATIONS
// =============================================================================

#[test]
fn test_parallel_inserts_all_searchable() {
    let index = Arc::new(mem_index(false));
    spawn_workers(&index, |index, t| {
        for i in 0..PER_THREAD {
            index.insert(&k(t, i), &val("concurrent payload")).unwrap();
        }
    });

    assert_eq!(index.doc_count(), THREADS * PER_THREAD);
    let hits = index.search(&parse("payload"), THREADS * PER_THREAD * 2).unwrap();
    assert_eq!(hits.len(), THREADS * PER_THREAD);
}

#[test]
fn test_parallel_updates_keep_latest() {
    let index = Arc::new(mem_index(true));
    for t in 0..THREADS {
        for i in 0..PER_THREAD {
            index.insert(&k(t, i), &val("round0")).unwrap();
        }
    }
    spawn_workers(&index, |index, t| {
        for round in 1..=3 {
            for i in 0..PER_THREAD {
                index.update(&k(t, i), &val(&format!("round{}", round))).unwrap();
            }
        }
    });

    assert_eq!(index.doc_count(), THREADS * PER_THREAD);
    for stale in ["round0", "round1", "round2"] {
        assert!(index.search(&parse(stale), 1000).unwrap().is_empty(), "{}", stale);
    }
    assert_eq!(index.search(&parse("round3"), 1000).unwrap().len(), THREADS * PER_THREAD);
    assert_eq!(index.forward_value(&k(3, 7)).as_deref(), Some("round3"));
}

#[test]
fn test_parallel_deletes_all_absent() {
    let index = Arc::new(mem_index(false));
    for t in 0..THREADS {
        for i in 0..PER_THREAD {
            index.insert(&k(t, i), &val("doomed entry")).unwrap();
        }
    }
    spawn_workers(&index, |index, t| {
        for i in 0..PER_THREAD {
            index.delete(&k(t, i)).unwrap();
        }
    });

    assert_eq!(index.doc_count(), 0);
    assert!(index.search(&parse("doomed"), 1000).unwrap().is_empty());
}

// =============================================================================
// MIXED WORKLOADS
// =============================================================================

#[test]
fn test_search_alongside_mutations() {
    let index = Arc::new(mem_index(false));
    let done = Arc::new(AtomicBool::new(false));

    let reader = {
        let index = Arc::clone(&index);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut last = 0;
            while !done.load(Ordering::Acquire) {
                let n = index.search(&parse("steady"), 10_000).unwrap().len();
                // Inserts only, so visible results never shrink
                assert!(n >= last);
                last = n;
            }
        })
    };
    spawn_workers(&index, |index, t| {
        for i in 0..PER_THREAD {
            index.insert(&k(t, i), &val("steady growth")).unwrap();
        }
    });
    done.store(true, Ordering::Release);
    reader.join().unwrap();
    assert_eq!(index.doc_count(), THREADS * PER_THREAD);
}

#[test]
fn test_batch_transitions_alongside_mutations() {
    let index = Arc::new(mem_index(false));
    let done = Arc::new(AtomicBool::new(false));

    let toggler = {
        let index = Arc::clone(&index);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            while !done.load(Ordering::Acquire) {
                index.begin_batch().unwrap();
                index.end_batch().unwrap();
            }
        })
    };
    spawn_workers(&index, |index, t| {
        for i in 0..PER_THREAD {
            index.update(&k(t, i), &val("toggled load")).unwrap();
        }
    });
    done.store(true, Ordering::Release);
    toggler.join().unwrap();

    index.end_batch().unwrap();
    index.commit().unwrap();
    assert_eq!(index.doc_count(), THREADS * PER_THREAD);
}

#[test]
fn test_commits_in_batch_keep_inverse_map_aligned_after_abort() {
    let index = Arc::new(mem_index(true));
    index.begin_batch().unwrap();
    let done = Arc::new(AtomicBool::new(false));

    let committer = {
        let index = Arc::clone(&index);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            while !done.load(Ordering::Acquire) {
                index.commit().unwrap();
            }
        })
    };
    spawn_workers(&index, |index, t| {
        for i in 0..PER_THREAD {
            index.insert(&k(t, i), &val("batched payload")).unwrap();
        }
    });
    done.store(true, Ordering::Release);
    committer.join().unwrap();
    index.abort_batch().unwrap();

    let indexed: HashSet<EntryKey> = hit_keys(&index.search(&parse("payload"), 10_000).unwrap())
        .into_iter()
        .collect();
    assert_eq!(index.doc_count(), indexed.len());
    for t in 0..THREADS {
        for i in 0..PER_THREAD {
            let key = k(t, i);
            assert_eq!(
                index.forward_value(&key).is_some(),
                indexed.contains(&key),
                "{:?}",
                key
            );
        }
    }
}

#[test]
fn test_close_waits_for_mutations() {
    let index = Arc::new(mem_index(false));
    let writers: Vec<_> = (0..4)
        .map(|t| {
            let index = Arc::clone(&index);
            thread::spawn(move || {
                for i in 0..PER_THREAD {
                    match index.insert(&k(t, i), &val("racing close")) {
                        Ok(()) => {}
                        Err(Error::IndexClosed(_)) => return,
                        Err(e) => panic!("unexpected error: {}", e),
                    }
                }
            })
        })
        .collect();
    index.close().unwrap();
    for w in writers {
        w.join().unwrap();
    }
    assert!(index.is_closed());
}

// =============================================================================
// STRESS
// =============================================================================

#[test]
#[ignore]
fn stress_store_consistency_under_random_load() {
    const KEYS: usize = 500;
    const OPS: usize = 5_000;

    let store = Arc::new(text_store(4));
    let barrier = Arc::new(Barrier::new(16));
    let handles: Vec<_> = (0..16)
        .map(|_| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                barrier.wait();
                for _ in 0..OPS {
                    let id = rng.gen_range(0..KEYS);
                    let k = key(&format!("key{}", id));
                    if rng.gen_bool(0.2) {
                        store.remove(&k).unwrap();
                    } else {
                        let word = format!("marker{}", id);
                        store.put(k, format!("{} stress", word)).unwrap();
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    // Every stored entry is found by its marker and nothing else is indexed
    let results = store.search(&text_aggregator("stress", KEYS * 2)).unwrap();
    assert_eq!(results.len(), store.len());
    for r in &results {
        assert_eq!(store.get(&r.key).as_ref(), Some(&r.value));
    }
}
