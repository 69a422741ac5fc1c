//! Text extraction from host entry values
//!
//! The host stores opaque bytes; an extractor turns one value into the text
//! that is indexed for it. The same extractor is used when a coordinator
//! re-indexes candidates during `finalize`, so it must be deterministic.

use std::fmt;
use std::sync::Arc;
use tessera_core::{EntryValue, Error, Result};

/// Turns an entry value into searchable text
pub trait TextExtractor: Send + Sync + fmt::Debug {
    /// Name used in logs and as the default field name
    fn name(&self) -> &str;

    /// Extract the text to index for a value
    fn extract(&self, value: &EntryValue) -> Result<String>;
}

/// Shared extractor handle
pub type SharedExtractor = Arc<dyn TextExtractor>;

/// Interprets the whole value as UTF-8 text
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8Extractor;

impl TextExtractor for Utf8Extractor {
    fn name(&self) -> &str {
        "text"
    }

    fn extract(&self, value: &EntryValue) -> Result<String> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::extraction("value is not valid UTF-8"))
    }
}

/// Extracts a string member of a JSON value by JSON pointer (e.g. `/body/text`)
#[derive(Debug, Clone)]
pub struct JsonFieldExtractor {
    pointer: String,
    name: String,
}

impl JsonFieldExtractor {
    /// Create an extractor for a JSON pointer
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the pointer does not start with `/`.
    pub fn new(pointer: impl Into<String>) -> Result<Self> {
        let pointer = pointer.into();
        if !pointer.starts_with('/') {
            return Err(Error::config(format!(
                "JSON pointer '{}' must start with '/'",
                pointer
            )));
        }
        let name = pointer.trim_start_matches('/').replace('/', ".");
        Ok(JsonFieldExtractor { pointer, name })
    }
}

impl TextExtractor for JsonFieldExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    fn extract(&self, value: &EntryValue) -> Result<String> {
        let json: serde_json::Value = serde_json::from_slice(value.as_bytes())
            .map_err(|e| Error::extraction(format!("invalid JSON: {}", e)))?;
        match json.pointer(&self.pointer) {
            Some(serde_json::Value::String(s)) => Ok(s.clone()),
            Some(serde_json::Value::Null) | None => Ok(String::new()),
            Some(other) => Err(Error::extraction(format!(
                "'{}' is not a string: {}",
                self.pointer, other
            ))),
        }
    }
}
