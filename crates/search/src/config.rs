//! Index configuration via `tessera.toml`
//!
//! An [`IndexConfig`] travels by value: every partition index of a text
//! index shares it, and it rides along in partial results so a coordinator
//! with no local partition can rebuild an identical analysis chain.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tessera_core::{Error, Result};
use tessera_engine::{AnalyzerSpec, BackendSpec, SearcherSpec, WriterTuning};

/// Conventional config file name
pub const CONFIG_FILE_NAME: &str = "tessera.toml";

/// Everything needed to build a local index for one partition
///
/// # Example
///
/// ```toml
/// [analyzer]
/// type = "standard"
///
/// [backend]
/// type = "filesystem"
/// root = "/var/lib/tessera"
///
/// [writer]
/// ram_buffer_mb = 16.0
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Analysis chain for documents and queries
    pub analyzer: AnalyzerSpec,
    /// Storage backend, opened per partition
    pub backend: BackendSpec,
    /// Writer buffering and merge tuning (outside batch mode)
    pub writer: WriterTuning,
    /// Scoring model
    pub searcher: SearcherSpec,
}

impl IndexConfig {
    /// Builder-style analyzer override
    pub fn with_analyzer(mut self, analyzer: AnalyzerSpec) -> Self {
        self.analyzer = analyzer;
        self
    }

    /// Builder-style backend override
    pub fn with_backend(mut self, backend: BackendSpec) -> Self {
        self.backend = backend;
        self
    }

    /// Builder-style writer tuning override
    pub fn with_writer(mut self, writer: WriterTuning) -> Self {
        self.writer = writer;
        self
    }

    /// Builder-style searcher override
    pub fn with_searcher(mut self, searcher: SearcherSpec) -> Self {
        self.searcher = searcher;
        self
    }

    /// Same settings with the backend forced to in-memory
    pub fn in_memory(&self) -> Self {
        self.clone().with_backend(BackendSpec::Memory)
    }

    /// Check every descriptor; unknown custom names are rejected
    pub fn validate(&self) -> Result<()> {
        self.analyzer.validate()?;
        self.backend.validate()?;
        self.writer.validate()?;
        self.searcher.validate()
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: IndexConfig = toml::from_str(content)
            .map_err(|e| Error::config(format!("Failed to parse index config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content).map_err(|e| match e {
            Error::Config(msg) => Error::config(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    /// Serialize to TOML and write to `path`
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Serialization(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Default config file content with comments
    pub fn default_toml() -> &'static str {
        r#"# Tessera index configuration

# Analyzer: "standard" (UAX#29 words, stopwords, English stemming),
# "whitespace", "keyword", or "custom" with a registered name.
[analyzer]
type = "standard"
stem = true
stopwords = true

# Storage backend: "memory" (default) or "filesystem".
# Filesystem indexes live in <root>/partition-<id>.
[backend]
type = "memory"
# type = "filesystem"
# root = "/var/lib/tessera"

# Writer buffering outside batch mode.
[writer]
ram_buffer_mb = 16.0
# max_buffered_docs = 1000

[writer.merge_policy]
merge_factor = 10
min_merge_mb = 1.6
max_merge_mb = 2048.0

# Scoring: "bm25" (default) or "boolean".
[searcher.similarity]
type = "bm25"
k1 = 1.2
b = 0.75
"#
    }
}
