//! JSON snapshot format for a [`Catalog`](crate::Catalog).

use ragwatch_core::{Chunk, ChunkId, DistanceMetric, FileRecord, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

pub(crate) const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Snapshot {
    pub format_version: u32,
    pub embedding_dim: usize,
    pub metric: DistanceMetric,
    pub next_id: ChunkId,
    pub entries: Vec<SnapshotEntry>,
    pub files: Vec<FileRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct SnapshotEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub tombstoned: bool,
}

impl Snapshot {
    /// Check every invariant a reloaded catalog depends on.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.format_version != FORMAT_VERSION {
            return Err(StoreError::Corrupt(format!(
                "unsupported format version {}",
                self.format_version
            )));
        }
        if self.embedding_dim == 0 {
            return Err(StoreError::Corrupt("embedding_dim is 0".to_string()));
        }

        let mut ids = HashSet::with_capacity(self.entries.len());
        for entry in &self.entries {
            let id = entry.chunk.id;
            if !ids.insert(id) {
                return Err(StoreError::Corrupt(format!("duplicate chunk id {id}")));
            }
            if id >= self.next_id {
                return Err(StoreError::Corrupt(format!(
                    "chunk id {id} is not below next_id {}",
                    self.next_id
                )));
            }
            if entry.vector.len() != self.embedding_dim {
                return Err(StoreError::Corrupt(format!(
                    "vector for chunk {id} has length {}, expected {}",
                    entry.vector.len(),
                    self.embedding_dim
                )));
            }
            if entry.vector.iter().any(|x| !x.is_finite()) {
                return Err(StoreError::Corrupt(format!(
                    "vector for chunk {id} has non-finite components"
                )));
            }
            if entry.chunk.text.is_empty() {
                return Err(StoreError::Corrupt(format!("chunk {id} has empty text")));
            }
        }

        for record in &self.files {
            if let Some(missing) = record.chunk_ids.iter().find(|id| !ids.contains(id)) {
                return Err(StoreError::Corrupt(format!(
                    "file record {} references unknown chunk {missing}",
                    record.path.display()
                )));
            }
        }
        Ok(())
    }

    pub async fn read(path: &Path) -> Result<Self, StoreError> {
        let bytes = tokio::fs::read(path).await?;
        let snapshot: Self = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::Corrupt(format!("{}: {e}", path.display())))?;
        snapshot.validate()?;
        debug!(
            "Read snapshot {:?} ({} entries, {} files)",
            path,
            snapshot.entries.len(),
            snapshot.files.len()
        );
        Ok(snapshot)
    }

    /// Write to a sibling temp file, then rename over `path`.
    pub async fn write(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec(self)?;
        let tmp = temp_path(path);
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        debug!("Wrote snapshot {:?} ({} bytes)", path, bytes.len());
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
