//! Query tree evaluated by the searcher
//!
//! Queries are plain serializable values so they can be shipped to every
//! partition unchanged. Construction from text lives in the search crate's
//! query builder; this module only defines the shape.

use serde::{Deserialize, Serialize};

/// Boolean clause occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Occur {
    /// Document must match; contributes to score
    Must,
    /// Document may match; contributes to score
    Should,
    /// Document must not match
    MustNot,
}

/// One clause of a boolean query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    /// How the clause participates
    pub occur: Occur,
    /// Clause query
    pub query: Query,
}

/// Boolean combination of clauses
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BooleanQuery {
    /// Clauses in insertion order
    pub clauses: Vec<Clause>,
}

impl BooleanQuery {
    /// Create an empty boolean query (matches nothing)
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a clause
    pub fn add(&mut self, occur: Occur, query: Query) -> &mut Self {
        self.clauses.push(Clause { occur, query });
        self
    }

    /// Builder-style [`add`](Self::add)
    pub fn with(mut self, occur: Occur, query: Query) -> Self {
        self.add(occur, query);
        self
    }

    /// Whether the query has no clauses
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

/// A query over one or more fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Query {
    /// Exact analyzed term in a field
    Term {
        /// Field name
        field: String,
        /// Analyzed term
        term: String,
    },
    /// Boolean combination
    Boolean(BooleanQuery),
    /// Score multiplier on a sub-query
    Boost {
        /// Wrapped query
        query: Box<Query>,
        /// Multiplier applied to the wrapped score
        boost: f32,
    },
}

impl Query {
    /// Term query shorthand
    pub fn term(field: impl Into<String>, term: impl Into<String>) -> Self {
        Query::Term {
            field: field.into(),
            term: term.into(),
        }
    }

    /// Wrap in a boost; a boost of exactly 1.0 returns the query unchanged
    pub fn boosted(self, boost: f32) -> Self {
        if boost == 1.0 {
            self
        } else {
            Query::Boost {
                query: Box::new(self),
                boost,
            }
        }
    }

    /// Whether the query can never match anything
    pub fn is_empty(&self) -> bool {
        match self {
            Query::Term { .. } => false,
            Query::Boolean(b) => b
                .clauses
                .iter()
                .all(|c| c.occur == Occur::MustNot || c.query.is_empty()),
            Query::Boost { query, .. } => query.is_empty(),
        }
    }

    /// All (field, term) pairs mentioned by the query, in order
    pub fn terms(&self) -> Vec<(&str, &str)> {
        let mut out = Vec::new();
        self.collect_terms(&mut out);
        out
    }

    fn collect_terms<'a>(&'a self, out: &mut Vec<(&'a str, &'a str)>) {
        match self {
            Query::Term { field, term } => out.push((field, term)),
            Query::Boolean(b) => {
                for clause in &b.clauses {
                    clause.query.collect_terms(out);
                }
            }
            Query::Boost { query, .. } => query.collect_terms(out),
        }
    }
}

impl From<BooleanQuery> for Query {
    fn from(b: BooleanQuery) -> Self {
        Query::Boolean(b)
    }
}
