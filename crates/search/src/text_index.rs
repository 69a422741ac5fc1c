//! Text index definitions
//!
//! A [`TextIndex`] describes one full-text index on a store: which extractor
//! produces the text, which field it is indexed under, whether inverse-map
//! reads are maintained, and the [`IndexConfig`]. It creates one
//! [`PartitionIndex`] per partition it is asked for.

use crate::config::IndexConfig;
use crate::extractor::SharedExtractor;
use crate::partition::PartitionIndex;
use std::sync::Arc;
use tessera_core::{PartitionId, Result};

/// Definition of a full-text index
#[derive(Debug, Clone)]
pub struct TextIndex {
    field: String,
    extractor: SharedExtractor,
    inverse_map: bool,
    config: IndexConfig,
}

impl TextIndex {
    /// Index the text produced by `extractor`, under the extractor's name
    pub fn new(extractor: SharedExtractor) -> Self {
        TextIndex {
            field: extractor.name().to_string(),
            extractor,
            inverse_map: false,
            config: IndexConfig::default(),
        }
    }

    /// Index under a different field name
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }

    /// Maintain forward/inverse maps next to the text index
    pub fn enable_inverse_map(mut self) -> Self {
        self.inverse_map = true;
        self
    }

    /// Replace the index configuration
    pub fn with_config(mut self, config: IndexConfig) -> Self {
        self.config = config;
        self
    }

    /// Field name
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Extractor
    pub fn extractor(&self) -> &SharedExtractor {
        &self.extractor
    }

    /// Whether inverse-map mode is on
    pub fn inverse_map(&self) -> bool {
        self.inverse_map
    }

    /// Index configuration
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Create the local index of one partition
    pub fn create_index(&self, partition_id: PartitionId) -> Result<PartitionIndex> {
        PartitionIndex::open(
            partition_id,
            self.field.clone(),
            Arc::clone(&self.extractor),
            self.config.clone(),
            self.inverse_map,
        )
    }
}
