//! Host store interface
//!
//! The search layer never owns entries. A host store exposes each of its
//! partitions through [`PartitionView`], and post-filters arrive as
//! [`Predicate`]s. Keys and values are opaque bytes on both seams.

use crate::partition::PartitionIndex;
use std::fmt;
use std::sync::Arc;
use tessera_core::{EntryKey, EntryValue, PartitionId};

/// One partition of a host store, as seen by a search worker
pub trait PartitionView: Send + Sync {
    /// Partition id
    fn partition_id(&self) -> PartitionId;

    /// Local text index of `field`, if the store defines one
    fn index(&self, field: &str) -> Option<Arc<PartitionIndex>>;

    /// Current value of `key`, `None` if the entry is gone
    fn get(&self, key: &EntryKey) -> Option<EntryValue>;

    /// Snapshot of every entry in the partition
    fn entries(&self) -> Vec<(EntryKey, EntryValue)>;
}

/// Post-filter over candidate entries
pub trait Predicate: Send + Sync {
    /// Whether the entry survives the filter
    fn evaluate(&self, key: &EntryKey, value: &EntryValue) -> bool;
}

impl<F> Predicate for F
where
    F: Fn(&EntryKey, &EntryValue) -> bool + Send + Sync,
{
    fn evaluate(&self, key: &EntryKey, value: &EntryValue) -> bool {
        self(key, value)
    }
}

/// Shareable predicate handle
#[derive(Clone)]
pub struct SharedPredicate(Arc<dyn Predicate>);

impl SharedPredicate {
    /// Wrap a predicate
    pub fn new(predicate: impl Predicate + 'static) -> Self {
        SharedPredicate(Arc::new(predicate))
    }
}

impl Predicate for SharedPredicate {
    fn evaluate(&self, key: &EntryKey, value: &EntryValue) -> bool {
        self.0.evaluate(key, value)
    }
}

impl fmt::Debug for SharedPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedPredicate(..)")
    }
}
