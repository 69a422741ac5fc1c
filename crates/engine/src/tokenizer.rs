//! Text tokenizer used by the standard analyzer
//!
//! Pipeline: UAX#29 word boundaries → strip possessives → remove non-alphanumeric
//!           → lowercase → filter short tokens → (stopwords) → (English stem)

use rust_stemmers::{Algorithm, Stemmer};
use unicode_segmentation::UnicodeSegmentation;

/// Standard English stopwords (Lucene's default set).
///
/// These high-frequency words carry little discriminative value for BM25
/// and are filtered out during tokenization when enabled.
pub const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

/// Tokens shorter than this (in bytes) are dropped.
const MIN_TOKEN_LEN: usize = 2;

/// Check if a token is a stopword.
#[inline]
pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

/// Strip English possessive suffix (`'s` / `\u{2019}s`).
#[inline]
fn strip_possessive(word: &str) -> &str {
    word.strip_suffix("'s")
        .or_else(|| word.strip_suffix("\u{2019}s"))
        .unwrap_or(word)
}

/// Split text into normalized words without stopword removal or stemming.
///
/// 1. UAX#29 word boundaries (`unicode_words`)
/// 2. Strip English possessives (`'s`)
/// 3. Remove non-alphanumeric characters (e.g. internal apostrophes)
/// 4. Lowercase
/// 5. Filter tokens shorter than 2 characters
pub fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.unicode_words()
        .map(strip_possessive)
        .map(|w| {
            w.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
        })
        .map(|w| w.to_lowercase())
        .filter(|s| s.len() >= MIN_TOKEN_LEN)
}

/// Tokenizer with optional stopword removal and Porter2 stemming.
pub struct Tokenizer {
    stopwords: bool,
    stemmer: Option<Stemmer>,
}

impl Tokenizer {
    /// Create a tokenizer
    pub fn new(stopwords: bool, stem: bool) -> Self {
        Tokenizer {
            stopwords,
            stemmer: stem.then(|| Stemmer::create(Algorithm::English)),
        }
    }

    /// Tokenize text into searchable terms.
    ///
    /// # Example
    ///
    /// ```
    /// use tessera_engine::tokenizer::Tokenizer;
    ///
    /// let tokens = Tokenizer::new(true, true).tokenize("The Quick Brown Foxes");
    /// assert_eq!(tokens, vec!["quick", "brown", "fox"]);
    /// ```
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        words(text)
            .filter(|s| !(self.stopwords && is_stopword(s)))
            .map(|s| match &self.stemmer {
                Some(stemmer) => stemmer.stem(&s).into_owned(),
                None => s,
            })
            .collect()
    }
}
