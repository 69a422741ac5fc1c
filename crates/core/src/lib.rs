//! Core types for Tessera
//!
//! This crate defines the foundational types used throughout the workspace:
//! - PartitionId: Identifier of a host store partition
//! - EntryKey / EntryValue: Opaque binary key and value of a host entry
//! - Error: Error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{EntryKey, EntryValue, PartitionId};
