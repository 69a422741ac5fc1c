//! Storage backends for local indexes
//!
//! A backend is a flat namespace of named files owned by exactly one
//! partition index. Segment files and commit points live here.
//!
//! - `MemoryBackend`: on-heap, the default
//! - `FsBackend`: one directory per partition, atomic temp + rename writes
//! - Custom backends: registered by name with [`register_backend`]

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tessera_core::{Error, PartitionId, Result};

/// Suffix of in-flight temporary files (never listed)
const TMP_SUFFIX: &str = ".tmp";

/// File storage capability used by the index writer
pub trait StorageBackend: Send + Sync + fmt::Debug {
    /// Names of all files, sorted
    fn list_files(&self) -> Result<Vec<String>>;

    /// Length of a file in bytes
    fn file_length(&self, name: &str) -> Result<u64>;

    /// Read a whole file
    fn read_file(&self, name: &str) -> Result<Vec<u8>>;

    /// Write a whole file, atomically replacing any previous content
    fn write_file(&self, name: &str, data: &[u8]) -> Result<()>;

    /// Delete a file; deleting a missing file is not an error
    fn delete_file(&self, name: &str) -> Result<()>;
}

/// Factory for a registered custom backend, keyed by partition id
pub type BackendFactory =
    Arc<dyn Fn(PartitionId) -> Result<Arc<dyn StorageBackend>> + Send + Sync>;

static BACKENDS: Lazy<RwLock<HashMap<String, BackendFactory>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Register a custom backend factory under `name`.
pub fn register_backend(name: impl Into<String>, factory: BackendFactory) {
    BACKENDS.write().insert(name.into(), factory);
}

// ============================================================================
// BackendSpec
// ============================================================================

/// Serializable description of how to open a partition's backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendSpec {
    /// On-heap storage, lost when the index is dropped
    #[default]
    Memory,
    /// Directory `<root>/partition-<id>`
    Filesystem {
        /// Root directory shared by all partitions
        root: PathBuf,
    },
    /// Backend registered with [`register_backend`]
    Custom {
        /// Registered name
        name: String,
    },
}

impl BackendSpec {
    /// Open the backend for one partition
    pub fn open(&self, partition: PartitionId) -> Result<Arc<dyn StorageBackend>> {
        match self {
            BackendSpec::Memory => Ok(Arc::new(MemoryBackend::new())),
            BackendSpec::Filesystem { root } => {
                let dir = root.join(format!("partition-{}", partition));
                Ok(Arc::new(FsBackend::open(dir)?))
            }
            BackendSpec::Custom { name } => {
                let factory = BACKENDS.read().get(name).cloned().ok_or_else(|| {
                    Error::config(format!("storage backend '{}' is not registered", name))
                })?;
                factory(partition)
            }
        }
    }

    /// Validate the descriptor without opening anything
    pub fn validate(&self) -> Result<()> {
        match self {
            BackendSpec::Custom { name } if !BACKENDS.read().contains_key(name) => Err(
                Error::config(format!("storage backend '{}' is not registered", name)),
            ),
            _ => Ok(()),
        }
    }
}

// ============================================================================
// MemoryBackend
// ============================================================================

/// On-heap backend
#[derive(Debug, Default)]
pub struct MemoryBackend {
    files: RwLock<BTreeMap<String, Arc<Vec<u8>>>>,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(name: &str) -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::NotFound,
        format!("file '{}' not found", name),
    ))
}

impl StorageBackend for MemoryBackend {
    fn list_files(&self) -> Result<Vec<String>> {
        Ok(self.files.read().keys().cloned().collect())
    }

    fn file_length(&self, name: &str) -> Result<u64> {
        self.files
            .read()
            .get(name)
            .map(|f| f.len() as u64)
            .ok_or_else(|| not_found(name))
    }

    fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        self.files
            .read()
            .get(name)
            .map(|f| f.to_vec())
            .ok_or_else(|| not_found(name))
    }

    fn write_file(&self, name: &str, data: &[u8]) -> Result<()> {
        self.files
            .write()
            .insert(name.to_string(), Arc::new(data.to_vec()));
        Ok(())
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.files.write().remove(name);
        Ok(())
    }
}

// ============================================================================
// FsBackend
// ============================================================================

/// Directory-backed storage
#[derive(Debug)]
pub struct FsBackend {
    dir: PathBuf,
}

impl FsBackend {
    /// Open (creating if needed) a backend directory
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(FsBackend { dir })
    }

    /// Directory holding the files
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl StorageBackend for FsBackend {
    fn list_files(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.ends_with(TMP_SUFFIX) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn file_length(&self, name: &str) -> Result<u64> {
        Ok(std::fs::metadata(self.dir.join(name))?.len())
    }

    fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        Ok(std::fs::read(self.dir.join(name))?)
    }

    fn write_file(&self, name: &str, data: &[u8]) -> Result<()> {
        // Atomic write: temp + fsync + rename
        let path = self.dir.join(name);
        let tmp_path = self.dir.join(format!("{}{}", name, TMP_SUFFIX));
        {
            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(data)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        match std::fs::remove_file(self.dir.join(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
