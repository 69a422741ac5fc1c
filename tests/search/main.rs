//! Search Integration Test Suite
//!
//! End-to-end coverage of partition indexes, distributed aggregation and the
//! reference local store.
//!
//! ## Modules
//!
//! - `partition_index`: round-trip, update atomicity, batch mode, merging
//! - `aggregation`: global ranking, post-filters, score normalization
//! - `concurrency`: parallel mutations, batch transitions under load
//! - `persistence`: filesystem backends across reopen
//! - `query_building`: synonyms and stop words through a whole search
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test search
//!
//! # Include the stress tests
//! cargo test --test search -- --ignored
//! ```

#[path = "../common/mod.rs"]
mod common;

mod aggregation;
mod concurrency;
mod partition_index;
mod persistence;
mod query_building;
