//! Writer buffering and merge tuning
//!
//! Two presets exist: [`WriterTuning::default`] for incremental updates, and
//! [`WriterTuning::batch`] for bulk loads (large RAM buffer, large merges).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tessera_core::{Error, Result};

const MB: f64 = 1024.0 * 1024.0;

/// Log-level merge policy parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergePolicy {
    /// Segments per level before they are merged together
    pub merge_factor: usize,
    /// Segments at or below this size share the lowest level
    pub min_merge_mb: f64,
    /// Segments above this size are never merged by the policy
    pub max_merge_mb: f64,
}

impl Default for MergePolicy {
    fn default() -> Self {
        MergePolicy {
            merge_factor: 10,
            min_merge_mb: 1.6,
            max_merge_mb: 2048.0,
        }
    }
}

impl MergePolicy {
    fn level(&self, size: u64) -> u32 {
        let floor = (self.min_merge_mb * MB).max(1.0);
        let size = size as f64;
        if size <= floor {
            0
        } else {
            ((size / floor).ln() / (self.merge_factor as f64).ln()).floor() as u32 + 1
        }
    }

    /// Pick one group of segments to merge, given their sizes in bytes.
    ///
    /// Returns indices into `sizes`, or `None` when no level is full.
    pub fn find_merge(&self, sizes: &[u64]) -> Option<Vec<usize>> {
        let factor = self.merge_factor.max(2);
        let ceiling = (self.max_merge_mb * MB) as u64;

        let mut levels: BTreeMap<u32, Vec<(usize, u64)>> = BTreeMap::new();
        for (idx, &size) in sizes.iter().enumerate() {
            if size <= ceiling {
                levels.entry(self.level(size)).or_default().push((idx, size));
            }
        }
        for (_, mut group) in levels {
            if group.len() >= factor {
                group.sort_by_key(|&(idx, size)| (size, idx));
                let mut picked: Vec<usize> =
                    group.into_iter().take(factor).map(|(idx, _)| idx).collect();
                picked.sort_unstable();
                return Some(picked);
            }
        }
        None
    }

    fn validate(&self) -> Result<()> {
        if self.merge_factor < 2 {
            return Err(Error::config("merge_factor must be at least 2"));
        }
        if !(self.min_merge_mb > 0.0) || self.max_merge_mb < self.min_merge_mb {
            return Err(Error::config(
                "merge sizes must satisfy 0 < min_merge_mb <= max_merge_mb",
            ));
        }
        Ok(())
    }
}

/// Buffering and merge settings of an index writer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterTuning {
    /// Flush the buffer once it holds this many megabytes
    pub ram_buffer_mb: f64,
    /// Flush the buffer once it holds this many documents (disabled when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_buffered_docs: Option<usize>,
    /// Background merge policy
    pub merge_policy: MergePolicy,
}

impl Default for WriterTuning {
    fn default() -> Self {
        WriterTuning {
            ram_buffer_mb: 16.0,
            max_buffered_docs: None,
            merge_policy: MergePolicy::default(),
        }
    }
}

impl WriterTuning {
    /// Bulk-load preset used while a partition index is in batch mode
    pub fn batch() -> Self {
        WriterTuning {
            ram_buffer_mb: 256.0,
            max_buffered_docs: None,
            merge_policy: MergePolicy {
                merge_factor: 10,
                min_merge_mb: 256.0,
                max_merge_mb: 512.0,
            },
        }
    }

    /// RAM buffer limit in bytes
    pub fn ram_buffer_bytes(&self) -> usize {
        (self.ram_buffer_mb * MB) as usize
    }

    /// Check that the buffer would ever flush and merges are well formed
    pub fn validate(&self) -> Result<()> {
        if !(self.ram_buffer_mb > 0.0) {
            return Err(Error::config("ram_buffer_mb must be positive"));
        }
        if self.max_buffered_docs == Some(0) {
            return Err(Error::config("max_buffered_docs must be at least 1"));
        }
        self.merge_policy.validate()
    }
}
