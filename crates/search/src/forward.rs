//! Forward and inverse maps kept alongside a text index
//!
//! When a text index is created with `inverse_map` enabled, every mutation
//! also records key → extracted text (forward) and text → keys (inverse, in
//! text order). Both maps are updated together per key.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use tessera_core::EntryKey;

/// Fixed per-entry overhead used for unit accounting
const ENTRY_OVERHEAD: u64 = 32;

/// Key ↔ extracted-value maps
#[derive(Debug, Default)]
pub struct ForwardIndex {
    forward: DashMap<EntryKey, String>,
    inverse: RwLock<BTreeMap<String, HashSet<EntryKey>>>,
}

/// Point-in-time copy of a [`ForwardIndex`], used to undo a batch
#[derive(Debug, Clone, Default)]
pub struct ForwardSnapshot {
    forward: Vec<(EntryKey, String)>,
    inverse: BTreeMap<String, HashSet<EntryKey>>,
}

impl ForwardIndex {
    /// Create empty maps
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or replace) the value of a key
    pub fn insert(&self, key: EntryKey, value: String) {
        let mut inverse = self.inverse.write();
        if let Some(old) = self.forward.insert(key.clone(), value.clone()) {
            Self::unlink(&mut inverse, &old, &key);
        }
        inverse.entry(value).or_default().insert(key);
    }

    /// Remove a key; returns its previous value
    pub fn remove(&self, key: &EntryKey) -> Option<String> {
        let mut inverse = self.inverse.write();
        let (_, old) = self.forward.remove(key)?;
        Self::unlink(&mut inverse, &old, key);
        Some(old)
    }

    fn unlink(inverse: &mut BTreeMap<String, HashSet<EntryKey>>, value: &str, key: &EntryKey) {
        if let Some(keys) = inverse.get_mut(value) {
            keys.remove(key);
            if keys.is_empty() {
                inverse.remove(value);
            }
        }
    }

    /// Extracted value of a key
    pub fn get(&self, key: &EntryKey) -> Option<String> {
        self.forward.get(key).map(|v| v.value().clone())
    }

    /// Inverse map contents: value → keys, ordered by value
    pub fn index_contents(&self) -> BTreeMap<String, HashSet<EntryKey>> {
        self.inverse.read().clone()
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    /// Whether no key is recorded
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Approximate memory footprint in bytes
    pub fn units(&self) -> u64 {
        self.forward
            .iter()
            .map(|e| (e.key().len() * 2 + e.value().len()) as u64 + ENTRY_OVERHEAD)
            .sum()
    }

    /// Copy both maps
    pub fn snapshot(&self) -> ForwardSnapshot {
        let inverse = self.inverse.read();
        ForwardSnapshot {
            forward: self
                .forward
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
            inverse: inverse.clone(),
        }
    }

    /// Replace both maps with a snapshot
    pub fn restore(&self, snapshot: ForwardSnapshot) {
        let mut inverse = self.inverse.write();
        self.forward.clear();
        for (key, value) in snapshot.forward {
            self.forward.insert(key, value);
        }
        *inverse = snapshot.inverse;
    }

    /// Remove everything
    pub fn clear(&self) {
        let mut inverse = self.inverse.write();
        self.forward.clear();
        inverse.clear();
    }
}
