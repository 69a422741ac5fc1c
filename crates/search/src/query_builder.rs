//! Free-text query construction
//!
//! A [`QueryBuilder`] turns user text into a [`Query`] tree:
//!
//! ```text
//! text → preprocessor → analyzer → stop words dropped → per-token clauses
//!      → one sub-query per field, boosted → OR across fields
//! ```
//!
//! A token with synonyms becomes a should-group of the token and each
//! alternative; multi-term alternatives are must-groups. The builder is
//! immutable once built and can be shared freely across threads.

use crate::synonyms::SynonymMap;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tessera_core::{Error, Result};
use tessera_engine::analyzer::StandardAnalyzer;
use tessera_engine::{Analyzer, BooleanQuery, Occur, Query};

/// Text rewrite applied before analysis
pub type Preprocessor = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Fully custom text → query construction
pub type QueryFactory = Arc<dyn Fn(&str) -> Result<Query> + Send + Sync>;

/// Synonym map derived from the builder's analyzer
pub type SynonymSource = Arc<dyn Fn(&dyn Analyzer) -> Result<SynonymMap> + Send + Sync>;

/// Options collected before a [`QueryBuilder`] is built
pub struct QueryBuilderOptions {
    fields: Vec<(String, f32)>,
    analyzer: Option<Arc<dyn Analyzer>>,
    stop_words: Vec<String>,
    synonyms: Option<SynonymMap>,
    synonym_source: Option<SynonymSource>,
    preprocessor: Option<Preprocessor>,
    factory: Option<QueryFactory>,
    default_operator: Occur,
}

impl Default for QueryBuilderOptions {
    fn default() -> Self {
        QueryBuilderOptions {
            fields: Vec::new(),
            analyzer: None,
            stop_words: Vec::new(),
            synonyms: None,
            synonym_source: None,
            preprocessor: None,
            factory: None,
            default_operator: Occur::Should,
        }
    }
}

impl QueryBuilderOptions {
    /// Search `field` with boost 1.0
    pub fn field(self, field: impl Into<String>) -> Self {
        self.boosted_field(field, 1.0)
    }

    /// Search `field` with a score multiplier
    pub fn boosted_field(mut self, field: impl Into<String>, boost: f32) -> Self {
        self.fields.push((field.into(), boost));
        self
    }

    /// Analyzer for query text, stop words and synonyms
    pub fn analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Words dropped from the analyzed query
    pub fn stop_words<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stop_words.extend(words.into_iter().map(Into::into));
        self
    }

    /// Static synonym map, normalized through the analyzer at build time
    pub fn synonyms(mut self, map: SynonymMap) -> Self {
        self.synonyms = Some(map);
        self
    }

    /// Synonyms produced from the analyzer at build time, e.g. a file parsed
    /// with [`SynonymMap::from_file`]
    pub fn synonym_source(mut self, source: SynonymSource) -> Self {
        self.synonym_source = Some(source);
        self
    }

    /// Rewrite text before analysis
    pub fn preprocessor(mut self, preprocessor: Preprocessor) -> Self {
        self.preprocessor = Some(preprocessor);
        self
    }

    /// Bypass the whole pipeline with a custom factory
    pub fn query_factory(mut self, factory: QueryFactory) -> Self {
        self.factory = Some(factory);
        self
    }

    /// How per-token clauses combine (`Should` unless changed)
    pub fn default_operator(mut self, occur: Occur) -> Self {
        self.default_operator = occur;
        self
    }

    /// Validate the options and build the query builder
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no field and no factory is given,
    /// when both a static synonym map and a synonym source are given, when a
    /// boost is negative or not finite, or when the default operator is
    /// `MustNot`.
    pub fn build(self) -> Result<QueryBuilder> {
        if self.fields.is_empty() && self.factory.is_none() {
            return Err(Error::config(
                "query builder needs at least one field or a query factory",
            ));
        }
        if self.synonyms.is_some() && self.synonym_source.is_some() {
            return Err(Error::config(
                "query builder accepts a synonym map or a synonym source, not both",
            ));
        }
        for (field, boost) in &self.fields {
            if !boost.is_finite() || *boost < 0.0 {
                return Err(Error::config(format!(
                    "boost of field '{}' must be finite and non-negative, got {}",
                    field, boost
                )));
            }
        }
        if self.default_operator == Occur::MustNot {
            return Err(Error::config("default operator must be Must or Should"));
        }

        let analyzer = self
            .analyzer
            .unwrap_or_else(|| Arc::new(StandardAnalyzer::default()) as Arc<dyn Analyzer>);
        let stop_words: HashSet<String> = self
            .stop_words
            .iter()
            .flat_map(|w| analyzer.analyze(w))
            .collect();
        let synonyms = match (self.synonyms, self.synonym_source) {
            (Some(map), None) => map.normalized(analyzer.as_ref()),
            (None, Some(source)) => source(analyzer.as_ref())?,
            _ => SynonymMap::new(),
        };

        Ok(QueryBuilder {
            fields: self.fields,
            analyzer,
            stop_words,
            synonyms,
            preprocessor: self.preprocessor,
            factory: self.factory,
            default_operator: self.default_operator,
        })
    }
}

/// Immutable text → [`Query`] converter
pub struct QueryBuilder {
    fields: Vec<(String, f32)>,
    analyzer: Arc<dyn Analyzer>,
    stop_words: HashSet<String>,
    synonyms: SynonymMap,
    preprocessor: Option<Preprocessor>,
    factory: Option<QueryFactory>,
    default_operator: Occur,
}

impl fmt::Debug for QueryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("fields", &self.fields)
            .field("analyzer", &self.analyzer.name())
            .field("stop_words", &self.stop_words.len())
            .field("synonyms", &self.synonyms.len())
            .field("custom_factory", &self.factory.is_some())
            .field("default_operator", &self.default_operator)
            .finish()
    }
}

impl QueryBuilder {
    /// Start collecting options
    pub fn builder() -> QueryBuilderOptions {
        QueryBuilderOptions::default()
    }

    /// Single-field builder with the standard analyzer
    pub fn for_field(field: impl Into<String>) -> Result<Self> {
        Self::builder().field(field).build()
    }

    /// Fields and boosts searched
    pub fn fields(&self) -> &[(String, f32)] {
        &self.fields
    }

    /// Convert free text to a query
    ///
    /// Text that analyzes to nothing yields an empty boolean query, which
    /// matches no document.
    pub fn parse(&self, text: &str) -> Result<Query> {
        if let Some(factory) = &self.factory {
            return factory(text);
        }

        let text = match &self.preprocessor {
            Some(pre) => pre(text),
            None => text.to_string(),
        };
        let tokens: Vec<String> = self
            .analyzer
            .analyze(&text)
            .into_iter()
            .filter(|t| !self.stop_words.contains(t))
            .collect();
        if tokens.is_empty() {
            return Ok(Query::Boolean(BooleanQuery::new()));
        }

        let mut per_field: Vec<Query> = self
            .fields
            .iter()
            .map(|(field, boost)| self.field_query(field, &tokens).boosted(*boost))
            .collect();
        if per_field.len() == 1 {
            return Ok(per_field.remove(0));
        }
        let mut combined = BooleanQuery::new();
        for q in per_field {
            combined.add(Occur::Should, q);
        }
        Ok(Query::Boolean(combined))
    }

    fn field_query(&self, field: &str, tokens: &[String]) -> Query {
        let mut clauses: Vec<Query> = tokens.iter().map(|t| self.token_query(field, t)).collect();
        if clauses.len() == 1 {
            return clauses.remove(0);
        }
        let mut q = BooleanQuery::new();
        for clause in clauses {
            q.add(self.default_operator, clause);
        }
        Query::Boolean(q)
    }

    fn token_query(&self, field: &str, token: &str) -> Query {
        let alternatives = self.synonyms.get(token);
        if alternatives.is_empty() {
            return Query::term(field, token);
        }
        let mut group = BooleanQuery::new().with(Occur::Should, Query::term(field, token));
        for alt in alternatives {
            let q = if alt.len() == 1 {
                Query::term(field, alt[0].as_str())
            } else {
                let mut all = BooleanQuery::new();
                for term in alt {
                    all.add(Occur::Must, Query::term(field, term.as_str()));
                }
                Query::Boolean(all)
            };
            group.add(Occur::Should, q);
        }
        Query::Boolean(group)
    }
}
