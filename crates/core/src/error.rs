//! Error types for Tessera
//!
//! This module defines all error types used throughout the workspace.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use crate::types::PartitionId;
use std::io;
use thiserror::Error;

/// Result type alias for Tessera operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the partitioned text index
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from a storage backend
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Data corruption detected (bad magic, checksum mismatch)
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// Invalid configuration, rejected at build/load time
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation not valid in the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The partition index was closed
    #[error("Index for partition {0} is closed")]
    IndexClosed(PartitionId),

    /// No text index exists for the queried field
    #[error("No text index for field '{field}' on partition {partition}")]
    IndexNotFound {
        /// Field the query targets
        field: String,
        /// Partition that was asked
        partition: PartitionId,
    },

    /// Text could not be extracted from an entry value
    #[error("Text extraction failed: {0}")]
    Extraction(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create an invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    /// Create a corruption error
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Create an extraction error
    pub fn extraction(msg: impl Into<String>) -> Self {
        Error::Extraction(msg.into())
    }

    /// True for errors raised by the storage backend
    pub fn is_io(&self) -> bool {
        matches!(self, Error::Io(_))
    }
}

impl From<rmp_serde::encode::Error> for Error {
    fn from(e: rmp_serde::encode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for Error {
    fn from(e: rmp_serde::decode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
