//! Synonym maps for query expansion
//!
//! A [`SynonymMap`] maps one analyzed term to alternative term sequences.
//! Maps are built programmatically or parsed from the Solr synonym format:
//!
//! ```text
//! # equivalence: every word expands to the others
//! couch, sofa, settee
//! # explicit mapping: left side expands to right side
//! tv, telly => television
//! ```

use std::collections::HashMap;
use std::path::Path;
use tessera_core::{Error, Result};
use tessera_engine::Analyzer;
use tracing::warn;

/// Term → alternative term sequences
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SynonymMap {
    map: HashMap<String, Vec<Vec<String>>>,
}

impl SynonymMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `to` as an alternative of `from`. Both are used as given; a
    /// whitespace-separated `to` becomes a multi-term alternative.
    pub fn insert(&mut self, from: impl Into<String>, to: &str) -> &mut Self {
        let alt: Vec<String> = to.split_whitespace().map(String::from).collect();
        self.add_alternative(from.into(), alt);
        self
    }

    /// Make every word an alternative of every other word
    pub fn insert_equivalent(&mut self, words: &[&str]) -> &mut Self {
        for from in words {
            for to in words {
                if from != to {
                    self.insert(*from, to);
                }
            }
        }
        self
    }

    fn add_alternative(&mut self, from: String, alt: Vec<String>) {
        if alt.is_empty() || (alt.len() == 1 && alt[0] == from) {
            return;
        }
        let alts = self.map.entry(from).or_default();
        if !alts.contains(&alt) {
            alts.push(alt);
        }
    }

    /// Alternatives of a term
    pub fn get(&self, term: &str) -> &[Vec<String>] {
        self.map.get(term).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Number of terms with alternatives
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the map is empty
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Re-key and re-spell every entry through `analyzer`.
    ///
    /// Keys that analyze to anything other than exactly one term are
    /// dropped with a warning.
    pub fn normalized(&self, analyzer: &dyn Analyzer) -> SynonymMap {
        let mut out = SynonymMap::new();
        for (from, alts) in &self.map {
            let Some(key) = single_term(analyzer, from) else {
                continue;
            };
            for alt in alts {
                let analyzed = analyzer.analyze(&alt.join(" "));
                out.add_alternative(key.clone(), analyzed);
            }
        }
        out
    }

    /// Parse Solr-format synonym rules, analyzing both sides
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a rule with an empty side.
    pub fn parse_solr(text: &str, analyzer: &dyn Analyzer) -> Result<Self> {
        let mut map = SynonymMap::new();
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let split = |side: &str| -> Vec<String> {
                side.split(',')
                    .map(str::trim)
                    .filter(|w| !w.is_empty())
                    .map(String::from)
                    .collect()
            };
            let (sources, targets) = match line.split_once("=>") {
                Some((lhs, rhs)) => (split(lhs), split(rhs)),
                None => {
                    let words = split(line);
                    (words.clone(), words)
                }
            };
            if sources.is_empty() || targets.is_empty() {
                return Err(Error::config(format!(
                    "synonym rule on line {} has an empty side",
                    lineno + 1
                )));
            }
            for source in &sources {
                let Some(key) = single_term(analyzer, source) else {
                    continue;
                };
                for target in &targets {
                    map.add_alternative(key.clone(), analyzer.analyze(target));
                }
            }
        }
        Ok(map)
    }

    /// Read and parse a Solr-format synonym file
    pub fn from_file(path: &Path, analyzer: &dyn Analyzer) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_solr(&content, analyzer)
    }
}

fn single_term(analyzer: &dyn Analyzer, word: &str) -> Option<String> {
    let mut terms = analyzer.analyze(word);
    if terms.len() == 1 {
        terms.pop()
    } else {
        if !terms.is_empty() {
            warn!(
                target: "tessera::index",
                word,
                "Skipping multi-term synonym source"
            );
        }
        None
    }
}
