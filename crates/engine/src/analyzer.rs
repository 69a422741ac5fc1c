//! Text analyzers
//!
//! An [`Analyzer`] turns a piece of text into the ordered list of terms that
//! are indexed (at write time) or looked up (at query time). Analyzers are
//! constructed from a serializable [`AnalyzerSpec`] so that the same analysis
//! chain can be rebuilt on any node, including nodes that hold no partition.
//!
//! Custom analyzers are plugged in by name through [`register_analyzer`];
//! the descriptor then only carries the name.

use crate::tokenizer::Tokenizer;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tessera_core::{Error, Result};

/// Opaque tokenizer/stemmer capability.
///
/// Implementations must be reentrant: `analyze` is called concurrently from
/// writer threads and query threads.
pub trait Analyzer: Send + Sync {
    /// Analyze text into terms, in document order
    fn analyze(&self, text: &str) -> Vec<String>;

    /// Name for debugging and logging
    fn name(&self) -> &str;
}

/// Factory for a registered custom analyzer
pub type AnalyzerFactory = Arc<dyn Fn() -> Arc<dyn Analyzer> + Send + Sync>;

static ANALYZERS: Lazy<RwLock<HashMap<String, AnalyzerFactory>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Register a custom analyzer under `name`.
///
/// Every node that may rebuild an index from an [`AnalyzerSpec::Custom`]
/// must register the same name. Re-registering replaces the factory.
pub fn register_analyzer(name: impl Into<String>, factory: AnalyzerFactory) {
    ANALYZERS.write().insert(name.into(), factory);
}

/// Check whether a custom analyzer is registered
pub fn is_analyzer_registered(name: &str) -> bool {
    ANALYZERS.read().contains_key(name)
}

// ============================================================================
// AnalyzerSpec
// ============================================================================

fn yes() -> bool {
    true
}

/// Serializable description of an analyzer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnalyzerSpec {
    /// UAX#29 words, lowercase, optional English stopwords and stemming
    Standard {
        /// Apply English Porter2 stemming
        #[serde(default = "yes")]
        stem: bool,
        /// Remove English stopwords
        #[serde(default = "yes")]
        stopwords: bool,
    },
    /// Lowercased whitespace-separated words
    Whitespace,
    /// Entire text as a single term
    Keyword,
    /// Analyzer registered with [`register_analyzer`]
    Custom {
        /// Registered name
        name: String,
    },
}

impl Default for AnalyzerSpec {
    fn default() -> Self {
        AnalyzerSpec::Standard {
            stem: true,
            stopwords: true,
        }
    }
}

impl AnalyzerSpec {
    /// Build the analyzer described by this spec
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unregistered custom name.
    pub fn build(&self) -> Result<Arc<dyn Analyzer>> {
        match self {
            AnalyzerSpec::Standard { stem, stopwords } => {
                Ok(Arc::new(StandardAnalyzer::new(*stopwords, *stem)))
            }
            AnalyzerSpec::Whitespace => Ok(Arc::new(WhitespaceAnalyzer)),
            AnalyzerSpec::Keyword => Ok(Arc::new(KeywordAnalyzer)),
            AnalyzerSpec::Custom { name } => {
                let factory = ANALYZERS.read().get(name).cloned().ok_or_else(|| {
                    Error::config(format!("analyzer '{}' is not registered", name))
                })?;
                Ok(factory())
            }
        }
    }

    /// Validate the descriptor without building it
    pub fn validate(&self) -> Result<()> {
        match self {
            AnalyzerSpec::Custom { name } if !is_analyzer_registered(name) => Err(Error::config(
                format!("analyzer '{}' is not registered", name),
            )),
            _ => Ok(()),
        }
    }
}

// ============================================================================
// Built-in analyzers
// ============================================================================

/// Standard analyzer: the Lucene-style analysis chain with stemming
pub struct StandardAnalyzer {
    tokenizer: Tokenizer,
}

impl StandardAnalyzer {
    /// Create a standard analyzer
    pub fn new(stopwords: bool, stem: bool) -> Self {
        StandardAnalyzer {
            tokenizer: Tokenizer::new(stopwords, stem),
        }
    }
}

impl Default for StandardAnalyzer {
    fn default() -> Self {
        Self::new(true, true)
    }
}

impl Analyzer for StandardAnalyzer {
    fn analyze(&self, text: &str) -> Vec<String> {
        self.tokenizer.tokenize(text)
    }

    fn name(&self) -> &str {
        "standard"
    }
}

/// Whitespace analyzer: splits on whitespace and lowercases
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceAnalyzer;

impl Analyzer for WhitespaceAnalyzer {
    fn analyze(&self, text: &str) -> Vec<String> {
        text.split_whitespace().map(|w| w.to_lowercase()).collect()
    }

    fn name(&self) -> &str {
        "whitespace"
    }
}

/// Keyword analyzer: the whole (trimmed) text is one term
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordAnalyzer;

impl Analyzer for KeywordAnalyzer {
    fn analyze(&self, text: &str) -> Vec<String> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            Vec::new()
        } else {
            vec![trimmed.to_string()]
        }
    }

    fn name(&self) -> &str {
        "keyword"
    }
}
