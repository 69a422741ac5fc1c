//! Reference in-process host store
//!
//! [`LocalStore`] is a hash-partitioned key/value map that keeps its text
//! indexes in step with every `put` and `remove`, and runs distributed
//! searches by fanning a [`SearchAggregator`] out over its partitions with
//! rayon. It is what tests and embedders use when there is no real cluster.

use crate::aggregator::{PartialResult, SearchAggregator, SearchResult};
use crate::host::PartitionView;
use crate::partition::PartitionIndex;
use crate::text_index::TextIndex;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use tessera_core::{EntryKey, EntryValue, Error, PartitionId, Result};
use tracing::{info, warn};

/// One partition of a [`LocalStore`]
#[derive(Debug)]
pub struct LocalPartition {
    id: PartitionId,
    entries: DashMap<EntryKey, EntryValue>,
    indexes: DashMap<String, Arc<PartitionIndex>>,
}

impl LocalPartition {
    fn new(id: PartitionId) -> Self {
        LocalPartition {
            id,
            entries: DashMap::new(),
            indexes: DashMap::new(),
        }
    }

    fn put(&self, key: EntryKey, value: EntryValue) -> Result<Option<EntryValue>> {
        let indexes = self.index_handles();
        // The entry guard is held across index maintenance so the stored value
        // and the indexed text of one key never diverge
        match self.entries.entry(key) {
            Entry::Occupied(mut slot) => {
                for index in &indexes {
                    index.update(slot.key(), &value)?;
                }
                Ok(Some(slot.insert(value)))
            }
            Entry::Vacant(slot) => {
                for index in &indexes {
                    index.insert(slot.key(), &value)?;
                }
                slot.insert(value);
                Ok(None)
            }
        }
    }

    fn remove(&self, key: &EntryKey) -> Result<Option<EntryValue>> {
        let indexes = self.index_handles();
        match self.entries.entry(key.clone()) {
            Entry::Occupied(slot) => {
                for index in &indexes {
                    index.delete(key)?;
                }
                Ok(Some(slot.remove()))
            }
            Entry::Vacant(_) => Ok(None),
        }
    }

    fn index_handles(&self) -> Vec<Arc<PartitionIndex>> {
        self.indexes.iter().map(|e| Arc::clone(e.value())).collect()
    }

    /// Bulk-load every current entry into `index`
    fn populate(&self, index: &PartitionIndex) -> Result<usize> {
        index.begin_batch()?;
        let mut loaded = 0usize;
        for entry in self.entries.iter() {
            if let Err(e) = index.update(entry.key(), entry.value()) {
                if let Err(abort) = index.abort_batch() {
                    warn!(
                        target: "tessera::index",
                        partition = %self.id,
                        error = %abort,
                        "Failed to roll back index population"
                    );
                }
                return Err(e);
            }
            loaded += 1;
        }
        index.end_batch()?;
        Ok(loaded)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the partition holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PartitionView for LocalPartition {
    fn partition_id(&self) -> PartitionId {
        self.id
    }

    fn index(&self, field: &str) -> Option<Arc<PartitionIndex>> {
        self.indexes.get(field).map(|e| Arc::clone(e.value()))
    }

    fn get(&self, key: &EntryKey) -> Option<EntryValue> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    fn entries(&self) -> Vec<(EntryKey, EntryValue)> {
        self.entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }
}

/// Hash-partitioned in-process store with full-text indexes
#[derive(Debug)]
pub struct LocalStore {
    partitions: Vec<Arc<LocalPartition>>,
    definitions: RwLock<HashMap<String, TextIndex>>,
}

impl LocalStore {
    /// Create a store with `partitions` partitions
    ///
    /// # Errors
    ///
    /// Returns a configuration error for zero partitions.
    pub fn new(partitions: u32) -> Result<Self> {
        if partitions == 0 {
            return Err(Error::config("a store needs at least one partition"));
        }
        Ok(LocalStore {
            partitions: (0..partitions)
                .map(|id| Arc::new(LocalPartition::new(PartitionId::new(id))))
                .collect(),
            definitions: RwLock::new(HashMap::new()),
        })
    }

    /// Partition owning `key`
    pub fn partition_for(&self, key: &EntryKey) -> PartitionId {
        let n = self.partitions.len() as u32;
        PartitionId::new(crc32fast::hash(key.as_bytes()) % n)
    }

    fn owner(&self, key: &EntryKey) -> &LocalPartition {
        &self.partitions[self.partition_for(key).as_u32() as usize]
    }

    /// Partition by id
    pub fn partition(&self, id: PartitionId) -> Option<Arc<LocalPartition>> {
        self.partitions.get(id.as_u32() as usize).cloned()
    }

    /// Number of partitions
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Store a value, maintaining every index; returns the previous value
    pub fn put(
        &self,
        key: impl Into<EntryKey>,
        value: impl Into<EntryValue>,
    ) -> Result<Option<EntryValue>> {
        let key = key.into();
        self.owner(&key).put(key, value.into())
    }

    /// Remove an entry, maintaining every index; returns the removed value
    pub fn remove(&self, key: &EntryKey) -> Result<Option<EntryValue>> {
        self.owner(key).remove(key)
    }

    /// Current value of a key
    pub fn get(&self, key: &EntryKey) -> Option<EntryValue> {
        self.owner(key).get(key)
    }

    /// Total number of entries
    pub fn len(&self) -> usize {
        self.partitions.iter().map(|p| p.len()).sum()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.partitions.iter().all(|p| p.is_empty())
    }

    // ========================================================================
    // Index lifecycle
    // ========================================================================

    /// Create a text index on every partition and load existing entries
    ///
    /// # Errors
    ///
    /// Returns a configuration error when an index on the same field exists.
    pub fn create_index(&self, definition: TextIndex) -> Result<()> {
        let mut definitions = self.definitions.write();
        let field = definition.field().to_string();
        if definitions.contains_key(&field) {
            return Err(Error::config(format!(
                "a text index on field '{}' already exists",
                field
            )));
        }

        let mut created: Vec<Arc<PartitionIndex>> = Vec::with_capacity(self.partitions.len());
        let mut loaded = 0usize;
        for partition in &self.partitions {
            let index = match definition.create_index(partition.id) {
                Ok(index) => Arc::new(index),
                Err(e) => {
                    self.unregister(&field, &created);
                    return Err(e);
                }
            };
            partition.indexes.insert(field.clone(), Arc::clone(&index));
            created.push(Arc::clone(&index));
            match partition.populate(&index) {
                Ok(n) => loaded += n,
                Err(e) => {
                    self.unregister(&field, &created);
                    return Err(e);
                }
            }
        }
        definitions.insert(field.clone(), definition);

        info!(
            target: "tessera::index",
            field = %field,
            partitions = self.partitions.len(),
            loaded,
            "Created text index"
        );
        Ok(())
    }

    fn unregister(&self, field: &str, created: &[Arc<PartitionIndex>]) {
        for partition in &self.partitions {
            partition.indexes.remove(field);
        }
        for index in created {
            let _ = index.close();
        }
    }

    /// Remove a text index, destroying its local indexes
    ///
    /// Returns whether an index existed.
    pub fn drop_index(&self, field: &str) -> Result<bool> {
        let mut definitions = self.definitions.write();
        if definitions.remove(field).is_none() {
            return Ok(false);
        }
        let mut first_err = None;
        for partition in &self.partitions {
            if let Some((_, index)) = partition.indexes.remove(field) {
                if let Err(e) = index.destroy() {
                    first_err.get_or_insert(e);
                }
            }
        }
        info!(target: "tessera::index", field, "Dropped text index");
        first_err.map_or(Ok(true), Err)
    }

    /// Definition of the index on `field`
    pub fn text_index(&self, field: &str) -> Option<TextIndex> {
        self.definitions.read().get(field).cloned()
    }

    /// Commit every local index
    pub fn commit(&self) -> Result<()> {
        for partition in &self.partitions {
            for index in partition.index_handles() {
                index.commit()?;
            }
        }
        Ok(())
    }

    /// Close every local index; the store keeps its entries
    pub fn close(&self) -> Result<()> {
        let mut first_err = None;
        for partition in &self.partitions {
            for index in partition.index_handles() {
                if let Err(e) = index.close() {
                    first_err.get_or_insert(e);
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    // ========================================================================
    // Search
    // ========================================================================

    /// Run `aggregator` on every partition in parallel and combine the
    /// partials into a coordinator ready to finalize
    pub fn aggregate(&self, aggregator: &SearchAggregator) -> Result<SearchAggregator> {
        let partials: Vec<PartialResult> = self
            .partitions
            .par_iter()
            .map(|partition| -> Result<PartialResult> {
                let mut worker = aggregator.supply();
                worker.accumulate(partition.as_ref())?;
                Ok(worker.partial_result())
            })
            .collect::<Result<_>>()?;

        let mut coordinator = aggregator.supply();
        for partial in partials {
            coordinator.combine(partial);
        }
        Ok(coordinator)
    }

    /// Globally ranked search returning raw values
    pub fn search(&self, aggregator: &SearchAggregator) -> Result<Vec<SearchResult<EntryValue>>> {
        self.aggregate(aggregator)?.finalize_values()
    }
}
