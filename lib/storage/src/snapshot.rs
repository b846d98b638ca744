// Per-category index snapshots on local disk
use atomicwrites::{AtomicFile, OverwriteBehavior};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use solescope_core::{CategoryIndex, Error, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const SNAPSHOT_VERSION: u32 = 1;
const SNAPSHOT_EXTENSION: &str = "idx";

/// On-disk wrapper around a bincode-encoded [`CategoryIndex`].
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotEnvelope {
    version: u32,
    category: String,
    checksum: String,
    payload: Vec<u8>,
}

/// Stores one snapshot file per category under a single directory.
///
/// Files are replaced atomically, so a reader sees either the previous
/// snapshot or the new one. A file that fails verification is reported as
/// absent.
pub struct SnapshotStore {
    snapshot_dir: PathBuf,
}

impl SnapshotStore {
    pub fn new<P: AsRef<Path>>(snapshot_dir: P) -> Result<Self> {
        let snapshot_dir = snapshot_dir.as_ref().to_path_buf();
        fs::create_dir_all(&snapshot_dir)?;
        Ok(Self { snapshot_dir })
    }

    pub fn dir(&self) -> &Path {
        &self.snapshot_dir
    }

    pub fn path_for(&self, category: &str) -> PathBuf {
        self.snapshot_dir
            .join(format!("{}.{}", category, SNAPSHOT_EXTENSION))
    }

    pub fn exists(&self, category: &str) -> bool {
        self.path_for(category).is_file()
    }

    pub fn save(&self, index: &CategoryIndex) -> Result<()> {
        let payload = bincode::serialize(index)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        let envelope = SnapshotEnvelope {
            version: SNAPSHOT_VERSION,
            category: index.category().to_string(),
            checksum: checksum(&payload),
            payload,
        };
        let data = bincode::serialize(&envelope)
            .map_err(|e| Error::Serialization(e.to_string()))?;

        let path = self.path_for(index.category());
        AtomicFile::new(&path, OverwriteBehavior::AllowOverwrite)
            .write(|f| f.write_all(&data))
            .map_err(|e| Error::Persistence(format!("{}: {}", path.display(), e)))?;

        debug!(category = index.category(), bytes = data.len(), "Snapshot written");
        Ok(())
    }

    /// Load and verify the snapshot for `category`.
    ///
    /// Returns `Ok(None)` when no file exists or when the file is corrupt,
    /// truncated, from another format version, or fails the index
    /// invariants.
    pub fn load(&self, category: &str) -> Result<Option<CategoryIndex>> {
        let path = self.path_for(category);
        if !path.is_file() {
            return Ok(None);
        }

        let data = fs::read(&path)?;
        match decode(category, &data) {
            Ok(index) => Ok(Some(index)),
            Err(e) => {
                warn!(category, path = %path.display(), error = %e, "Discarding unusable snapshot");
                Ok(None)
            }
        }
    }

    pub fn remove(&self, category: &str) -> Result<bool> {
        let path = self.path_for(category);
        if path.exists() {
            fs::remove_file(&path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

fn checksum(payload: &[u8]) -> String {
    format!("{:x}", Sha256::digest(payload))
}

fn decode(category: &str, data: &[u8]) -> Result<CategoryIndex> {
    let envelope: SnapshotEnvelope = bincode::deserialize(data)
        .map_err(|e| Error::Persistence(format!("bad envelope: {}", e)))?;

    if envelope.version != SNAPSHOT_VERSION {
        return Err(Error::Persistence(format!(
            "unsupported snapshot version {}",
            envelope.version
        )));
    }
    if envelope.category != category {
        return Err(Error::Persistence(format!(
            "snapshot belongs to {}",
            envelope.category
        )));
    }
    if checksum(&envelope.payload) != envelope.checksum {
        return Err(Error::Persistence("checksum mismatch".to_string()));
    }

    let index: CategoryIndex = bincode::deserialize(&envelope.payload)
        .map_err(|e| Error::Persistence(format!("bad payload: {}", e)))?;
    if index.category() != category {
        return Err(Error::Persistence("category mismatch in payload".to_string()));
    }
    index.validate()?;
    Ok(index)
}
