//! Core types for Tessera
//!
//! This module defines the foundational types:
//! - PartitionId: Identifier of one shard of the host key-value store
//! - EntryKey: Opaque binary key of a host entry
//! - EntryValue: Opaque binary value of a host entry

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a storage partition
///
/// Partitions are assigned by the host store. The index layer never invents
/// partition ids; they are threaded through index creation explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionId(pub u32);

impl PartitionId {
    /// Create a partition id
    pub fn new(id: u32) -> Self {
        PartitionId(id)
    }

    /// Raw numeric value
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl From<u32> for PartitionId {
    fn from(id: u32) -> Self {
        PartitionId(id)
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Binary key of a host entry
///
/// The key is opaque: it is stored next to indexed documents and handed back
/// verbatim at query time, so no reverse lookup into the host is needed.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryKey(Vec<u8>);

impl EntryKey {
    /// Wrap raw key bytes
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        EntryKey(bytes.into())
    }

    /// Borrow the raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume into raw bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Length of the key in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the key is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Deterministic, untokenized term derived from the key bytes.
    ///
    /// Used for delete/update-by-term. Two keys produce the same term iff
    /// their bytes are equal.
    pub fn key_term(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.0)
    }
}

impl fmt::Debug for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => write!(f, "EntryKey({:?})", s),
            Err(_) => write!(f, "EntryKey(b64:{})", self.key_term()),
        }
    }
}

impl From<Vec<u8>> for EntryKey {
    fn from(bytes: Vec<u8>) -> Self {
        EntryKey(bytes)
    }
}

impl From<&[u8]> for EntryKey {
    fn from(bytes: &[u8]) -> Self {
        EntryKey(bytes.to_vec())
    }
}

impl From<&str> for EntryKey {
    fn from(s: &str) -> Self {
        EntryKey(s.as_bytes().to_vec())
    }
}

/// Binary value of a host entry
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryValue(Vec<u8>);

impl EntryValue {
    /// Wrap raw value bytes
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        EntryValue(bytes.into())
    }

    /// Borrow the raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume into raw bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Length of the value in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the value is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// View the value as UTF-8 text, if it is valid UTF-8
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }
}

impl fmt::Debug for EntryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryValue({} bytes)", self.0.len())
    }
}

impl From<Vec<u8>> for EntryValue {
    fn from(bytes: Vec<u8>) -> Self {
        EntryValue(bytes)
    }
}

impl From<&str> for EntryValue {
    fn from(s: &str) -> Self {
        EntryValue(s.as_bytes().to_vec())
    }
}

impl From<String> for EntryValue {
    fn from(s: String) -> Self {
        EntryValue(s.into_bytes())
    }
}
