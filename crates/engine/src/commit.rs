//! Commit points
//!
//! A commit point (`commit_<generation>.tcp`) names the segments of a durable
//! index state plus each segment's tombstones. The highest generation on the
//! backend is the current one; older commit files and unreferenced segment
//! files are removed after a successful commit.
//!
//! Layout: magic `TCMT` + u32 LE version + MessagePack payload.

use crate::backend::StorageBackend;
use serde::{Deserialize, Serialize};
use tessera_core::{Error, Result};

/// Magic bytes for commit files
const COMMIT_MAGIC: &[u8; 4] = b"TCMT";
/// Current commit format version
const COMMIT_VERSION: u32 = 1;

/// Durable index state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct CommitPoint {
    /// Monotonic commit generation
    pub generation: u64,
    /// Next segment id to assign
    pub next_segment_id: u64,
    /// Live segments in index order
    pub segments: Vec<CommittedSegment>,
}

/// One segment referenced by a commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct CommittedSegment {
    pub segment_id: u64,
    /// Deleted doc numbers, sorted
    pub tombstones: Vec<u32>,
}

impl CommitPoint {
    pub fn file_name(generation: u64) -> String {
        format!("commit_{}.tcp", generation)
    }

    pub fn parse_file_name(name: &str) -> Option<u64> {
        name.strip_prefix("commit_")?.strip_suffix(".tcp")?.parse().ok()
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let payload = rmp_serde::to_vec_named(self)?;
        let mut buf = Vec::with_capacity(8 + payload.len());
        buf.extend_from_slice(COMMIT_MAGIC);
        buf.extend_from_slice(&COMMIT_VERSION.to_le_bytes());
        buf.extend_from_slice(&payload);
        Ok(buf)
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < 8 {
            return Err(Error::corruption("commit point too small"));
        }
        if &buf[0..4] != COMMIT_MAGIC {
            return Err(Error::corruption("bad commit magic"));
        }
        let version = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        if version != COMMIT_VERSION {
            return Err(Error::corruption(format!(
                "unsupported commit version {}",
                version
            )));
        }
        Ok(rmp_serde::from_slice(&buf[8..])?)
    }

    /// Write this commit point to the backend
    pub fn write(&self, backend: &dyn StorageBackend) -> Result<()> {
        backend.write_file(&Self::file_name(self.generation), &self.encode()?)
    }
}

/// Load the newest commit point on a backend, if any
pub(crate) fn latest_commit(backend: &dyn StorageBackend) -> Result<Option<CommitPoint>> {
    let newest = backend
        .list_files()?
        .iter()
        .filter_map(|name| CommitPoint::parse_file_name(name))
        .max();
    match newest {
        Some(generation) => {
            let bytes = backend.read_file(&CommitPoint::file_name(generation))?;
            Ok(Some(CommitPoint::decode(&bytes)?))
        }
        None => Ok(None),
    }
}
