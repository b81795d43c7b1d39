//! The paired chunk store and vector index.

use chrono::Utc;
use ragwatch_core::{
    Chunk, ChunkDraft, ChunkId, DistanceMetric, FileRecord, FileStatus, IndexStats, SearchHit,
    StoreError,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::chunks::ChunkStore;
use crate::snapshot::{Snapshot, SnapshotEntry, FORMAT_VERSION};
use crate::vectors::{VectorEntry, VectorIndex};

/// Chunk store and vector index kept in 1:1 correspondence.
///
/// Commits are serialized by an internal mutex; searches and lookups only
/// take read locks and never wait on a commit's provider calls. Within a
/// commit, chunks are stored before their vectors are published, so every
/// id a search returns already resolves to its text.
pub struct Catalog {
    chunks: ChunkStore,
    vectors: VectorIndex,
    files: RwLock<HashMap<PathBuf, FileRecord>>,
    commit_lock: Mutex<()>,
}

/// Result of a successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
    /// Identifier stamped into every committed chunk
    pub document_id: Uuid,
    /// New ids in sequence order
    pub chunk_ids: Vec<ChunkId>,
    /// Ids of the previous version that were tombstoned
    pub retired: usize,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new(dimension: usize, metric: DistanceMetric) -> Result<Self, StoreError> {
        Ok(Self {
            chunks: ChunkStore::new(),
            vectors: VectorIndex::new(dimension, metric)?,
            files: RwLock::new(HashMap::new()),
            commit_lock: Mutex::new(()),
        })
    }

    /// Load `path` if it exists, otherwise start empty.
    ///
    /// A snapshot whose dimension or metric differs from the arguments is
    /// rejected rather than silently reinterpreted.
    pub async fn open(
        path: &Path,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<Self, StoreError> {
        if !tokio::fs::try_exists(path).await? {
            info!("No snapshot at {:?}, starting empty", path);
            return Self::new(dimension, metric);
        }

        let catalog = Self::load(path).await?;
        if catalog.dimension() != dimension {
            return Err(StoreError::DimensionMismatch {
                expected: dimension,
                actual: catalog.dimension(),
            });
        }
        if catalog.metric() != metric {
            return Err(StoreError::InvalidArgument(format!(
                "snapshot uses metric {}, configured metric is {}",
                catalog.metric(),
                metric
            )));
        }
        Ok(catalog)
    }

    /// Load a snapshot written by [`Catalog::save`].
    pub async fn load(path: &Path) -> Result<Self, StoreError> {
        let snapshot = Snapshot::read(path).await?;

        let mut chunks = Vec::with_capacity(snapshot.entries.len());
        let mut vectors = Vec::with_capacity(snapshot.entries.len());
        for SnapshotEntry {
            chunk,
            vector,
            tombstoned,
        } in snapshot.entries
        {
            vectors.push(VectorEntry {
                id: chunk.id,
                vector,
                tombstoned,
            });
            chunks.push(chunk);
        }

        let catalog = Self {
            chunks: ChunkStore::restore(chunks, snapshot.next_id),
            vectors: VectorIndex::restore(snapshot.embedding_dim, snapshot.metric, &vectors)?,
            files: RwLock::new(
                snapshot
                    .files
                    .into_iter()
                    .map(|r| (r.path.clone(), r))
                    .collect(),
            ),
            commit_lock: Mutex::new(()),
        };
        info!(
            "Loaded {} chunks ({} live) from {:?}",
            vectors.len(),
            catalog.vectors.live_len().await,
            path
        );
        Ok(catalog)
    }

    /// Persist every `(chunk, vector)` pair and the file records.
    pub async fn save(&self, path: &Path) -> Result<(), StoreError> {
        let _guard = self.commit_lock.lock().await;

        let chunks = self.chunks.all().await;
        let mut vectors: HashMap<ChunkId, VectorEntry> = self
            .vectors
            .entries()
            .await
            .into_iter()
            .map(|e| (e.id, e))
            .collect();

        let mut entries = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let Some(entry) = vectors.remove(&chunk.id) else {
                return Err(StoreError::Corrupt(format!(
                    "chunk {} has no vector",
                    chunk.id
                )));
            };
            entries.push(SnapshotEntry {
                chunk,
                vector: entry.vector,
                tombstoned: entry.tombstoned,
            });
        }
        if let Some(id) = vectors.keys().next() {
            return Err(StoreError::Corrupt(format!("vector {id} has no chunk")));
        }

        let mut files: Vec<FileRecord> = self.files.read().await.values().cloned().collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));

        let snapshot = Snapshot {
            format_version: FORMAT_VERSION,
            embedding_dim: self.vectors.dimension(),
            metric: self.vectors.metric(),
            next_id: self.chunks.next_id().await,
            entries,
            files,
        };
        snapshot.write(path).await?;
        info!("Saved {} chunks to {:?}", snapshot.entries.len(), path);
        Ok(())
    }

    /// Embedding dimension.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.vectors.dimension()
    }

    /// Distance metric.
    #[must_use]
    pub fn metric(&self) -> DistanceMetric {
        self.vectors.metric()
    }

    /// The chunk store half.
    #[must_use]
    pub fn chunks(&self) -> &ChunkStore {
        &self.chunks
    }

    /// The vector index half.
    #[must_use]
    pub fn vectors(&self) -> &VectorIndex {
        &self.vectors
    }

    /// Commit an unnamed document. Never deduplicated.
    pub async fn commit(
        &self,
        drafts: Vec<ChunkDraft>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<CommitReceipt, StoreError> {
        let _guard = self.commit_lock.lock().await;
        self.commit_pairs(drafts, vectors, &[]).await
    }

    /// Commit a new version of `path`, replacing the previous one.
    ///
    /// The new vectors become searchable in the same step that hides the old
    /// ones, so a concurrent search sees exactly one version of the file.
    pub async fn commit_file(
        &self,
        path: &Path,
        content_hash: String,
        drafts: Vec<ChunkDraft>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<CommitReceipt, StoreError> {
        let _guard = self.commit_lock.lock().await;
        let previous = match self.files.read().await.get(path) {
            Some(old) if old.status == FileStatus::Indexed => old.chunk_ids.clone(),
            _ => Vec::new(),
        };
        let receipt = self.commit_pairs(drafts, vectors, &previous).await?;

        self.files.write().await.insert(
            path.to_path_buf(),
            FileRecord {
                document_id: receipt.document_id,
                path: path.to_path_buf(),
                content_hash,
                chunk_ids: receipt.chunk_ids.clone(),
                indexed_at: Utc::now(),
                status: FileStatus::Indexed,
            },
        );
        debug!(
            "Committed {} chunks for {:?} (retired {})",
            receipt.chunk_ids.len(),
            path,
            receipt.retired
        );
        Ok(receipt)
    }

    /// Tombstone every live chunk of `path`. Returns how many were hidden.
    pub async fn retire_path(&self, path: &Path) -> usize {
        let _guard = self.commit_lock.lock().await;
        let mut files = self.files.write().await;
        let Some(record) = files.get_mut(path) else {
            return 0;
        };
        if record.status == FileStatus::Deleted {
            return 0;
        }
        record.status = FileStatus::Deleted;
        let hidden = self.vectors.tombstone(&record.chunk_ids).await;
        debug!("Retired {} chunks for {:?}", hidden, path);
        hidden
    }

    /// Whether `path` is indexed with exactly this content hash.
    pub async fn is_current(&self, path: &Path, content_hash: &str) -> bool {
        self.files
            .read()
            .await
            .get(path)
            .is_some_and(|r| r.status == FileStatus::Indexed && r.content_hash == content_hash)
    }

    /// File record for `path`.
    pub async fn file_record(&self, path: &Path) -> Option<FileRecord> {
        self.files.read().await.get(path).cloned()
    }

    /// All file records, sorted by path.
    pub async fn file_records(&self) -> Vec<FileRecord> {
        let mut records: Vec<_> = self.files.read().await.values().cloned().collect();
        records.sort_by(|a, b| a.path.cmp(&b.path));
        records
    }

    /// k-NN search over live chunks.
    pub async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, StoreError> {
        self.vectors.search(query, k).await
    }

    /// Resolve ids to chunks, aligned with input order.
    pub async fn resolve(&self, ids: &[ChunkId]) -> Vec<Option<Chunk>> {
        self.chunks.get_many(ids).await
    }

    /// Chunk and file counts.
    ///
    /// Pipeline-level counters (failed and skipped files) are left at zero.
    pub async fn stats(&self) -> IndexStats {
        let files = self.files.read().await;
        let indexed_files = files
            .values()
            .filter(|r| r.status == FileStatus::Indexed)
            .count() as u64;
        let last_update = files.values().map(|r| r.indexed_at).max();
        drop(files);

        let total = self.vectors.len().await as u64;
        let live = self.vectors.live_len().await as u64;
        IndexStats {
            indexed_files,
            live_chunks: live,
            tombstoned_chunks: total - live,
            last_update,
            ..IndexStats::default()
        }
    }

    /// Verify that every chunk has a vector and every vector a chunk.
    pub async fn check_pairing(&self) -> Result<(), StoreError> {
        let _guard = self.commit_lock.lock().await;
        let vector_ids: Vec<ChunkId> = self.vectors.entries().await.iter().map(|e| e.id).collect();
        let chunk_count = self.chunks.len().await;
        if chunk_count != vector_ids.len() {
            return Err(StoreError::Corrupt(format!(
                "{} chunks but {} vectors",
                chunk_count,
                vector_ids.len()
            )));
        }
        for (id, chunk) in vector_ids.iter().zip(self.chunks.get_many(&vector_ids).await) {
            if chunk.is_none() {
                return Err(StoreError::Corrupt(format!("vector {id} has no chunk")));
            }
        }
        Ok(())
    }

    /// Store chunks, then publish their vectors. Caller holds `commit_lock`.
    /// Store chunks, then publish their vectors while hiding `retire`.
    async fn commit_pairs(
        &self,
        mut drafts: Vec<ChunkDraft>,
        vectors: Vec<Vec<f32>>,
        retire: &[ChunkId],
    ) -> Result<CommitReceipt, StoreError> {
        if drafts.is_empty() {
            return Err(StoreError::InvalidArgument(
                "document has no chunks".to_string(),
            ));
        }
        if drafts.len() != vectors.len() {
            return Err(StoreError::InvalidArgument(format!(
                "{} chunks but {} vectors",
                drafts.len(),
                vectors.len()
            )));
        }

        let document_id = Uuid::new_v4();
        let now = Utc::now();
        for draft in &mut drafts {
            draft.metadata.document_id = Some(document_id);
            draft.metadata.indexed_at = Some(now);
        }

        let ids = self.chunks.put_batch(drafts).await?;
        let batch = ids.iter().copied().zip(vectors).collect();
        match self.vectors.insert_batch_replacing(batch, retire).await {
            Ok(retired) => Ok(CommitReceipt {
                document_id,
                chunk_ids: ids,
                retired,
            }),
            Err(e) => {
                let removed = self.chunks.remove_many(&ids).await;
                error!(
                    "Vector insert failed, rolled back {} orphaned chunks: {}",
                    removed, e
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragwatch_core::ChunkMetadata;
    use std::sync::Arc;

    fn drafts(path: &str, texts: &[&str]) -> Vec<ChunkDraft> {
        texts
            .iter()
            .zip(0u32..)
            .map(|(text, seq)| ChunkDraft {
                text: (*text).to_string(),
                source_path: PathBuf::from(path),
                sequence_index: seq,
                byte_range: 0..text.len() as u64,
                line_range: None,
                metadata: ChunkMetadata::default(),
            })
            .collect()
    }

    fn unit(dim: usize, axis: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[axis % dim] = 1.0;
        v
    }

    #[tokio::test]
    async fn test_commit_pairs_chunks_and_vectors() {
        let catalog = Catalog::new(4, DistanceMetric::L2).unwrap();
        let receipt = catalog
            .commit(drafts("/a.txt", &["one", "two"]), vec![unit(4, 0), unit(4, 1)])
            .await
            .unwrap();
        assert_eq!(receipt.chunk_ids, vec![0, 1]);

        let hits = catalog.search(&unit(4, 1), 1).await.unwrap();
        assert_eq!(hits[0].id, 1);
        let chunk = catalog.chunks().get(hits[0].id).await.unwrap();
        assert_eq!(chunk.text, "two");
        assert_eq!(chunk.metadata.document_id, Some(receipt.document_id));
        catalog.check_pairing().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_vector_insert_rolls_back_chunks() {
        let catalog = Catalog::new(4, DistanceMetric::L2).unwrap();
        let err = catalog
            .commit(drafts("/a.txt", &["one", "two"]), vec![unit(4, 0), vec![1.0; 3]])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { .. }));
        assert!(catalog.chunks().is_empty().await);
        assert!(catalog.vectors().is_empty().await);
        catalog.check_pairing().await.unwrap();

        let receipt = catalog
            .commit(drafts("/a.txt", &["three"]), vec![unit(4, 2)])
            .await
            .unwrap();
        assert_eq!(receipt.chunk_ids, vec![2]);
    }

    #[tokio::test]
    async fn test_mismatched_lengths_rejected() {
        let catalog = Catalog::new(4, DistanceMetric::L2).unwrap();
        let err = catalog
            .commit(drafts("/a.txt", &["one", "two"]), vec![unit(4, 0)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
        assert!(catalog.chunks().is_empty().await);
    }

    #[tokio::test]
    async fn test_recommit_file_tombstones_previous_version() {
        let catalog = Catalog::new(4, DistanceMetric::L2).unwrap();
        let path = Path::new("/docs/a.txt");
        let first = catalog
            .commit_file(path, "h1".to_string(), drafts("/docs/a.txt", &["old"]), vec![unit(4, 0)])
            .await
            .unwrap();
        let second = catalog
            .commit_file(path, "h2".to_string(), drafts("/docs/a.txt", &["new"]), vec![unit(4, 0)])
            .await
            .unwrap();
        assert_eq!(second.retired, 1);

        let hits = catalog.search(&unit(4, 0), 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, second.chunk_ids[0]);

        // Old ids stay resolvable.
        let old = catalog.chunks().get(first.chunk_ids[0]).await.unwrap();
        assert_eq!(old.text, "old");

        assert!(catalog.is_current(path, "h2").await);
        assert!(!catalog.is_current(path, "h1").await);

        let stats = catalog.stats().await;
        assert_eq!(stats.indexed_files, 1);
        assert_eq!(stats.live_chunks, 1);
        assert_eq!(stats.tombstoned_chunks, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_searches_never_see_two_versions_of_a_file() {
        let catalog = Arc::new(Catalog::new(4, DistanceMetric::L2).unwrap());
        let path = Path::new("/docs/a.txt");
        let vectors = || vec![unit(4, 0), unit(4, 1), unit(4, 2)];

        let writer = {
            let catalog = Arc::clone(&catalog);
            tokio::spawn(async move {
                for version in 0..50 {
                    let text = format!("v{version}");
                    let t = text.as_str();
                    catalog
                        .commit_file(
                            path,
                            text.clone(),
                            drafts("/docs/a.txt", &[t, t, t]),
                            vectors(),
                        )
                        .await
                        .unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let catalog = Arc::clone(&catalog);
                tokio::spawn(async move {
                    for _ in 0..200 {
                        let hits = catalog.search(&unit(4, 0), 100).await.unwrap();
                        assert!(hits.is_empty() || hits.len() == 3, "saw {} hits", hits.len());
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }

        let stats = catalog.stats().await;
        assert_eq!(stats.live_chunks, 3);
        assert_eq!(stats.tombstoned_chunks, 147);
        catalog.check_pairing().await.unwrap();
    }

    #[tokio::test]
    async fn test_retire_path() {
        let catalog = Catalog::new(4, DistanceMetric::L2).unwrap();
        let path = Path::new("/docs/a.txt");
        catalog
            .commit_file(
                path,
                "h".to_string(),
                drafts("/docs/a.txt", &["a", "b"]),
                vec![unit(4, 0), unit(4, 1)],
            )
            .await
            .unwrap();

        assert_eq!(catalog.retire_path(path).await, 2);
        assert_eq!(catalog.retire_path(path).await, 0);
        assert_eq!(catalog.retire_path(Path::new("/nope")).await, 0);
        assert!(catalog.search(&unit(4, 0), 3).await.unwrap().is_empty());
        assert_eq!(
            catalog.file_record(path).await.unwrap().status,
            FileStatus::Deleted
        );
        assert!(!catalog.is_current(path, "h").await);
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("index.json");

        let catalog = Catalog::new(4, DistanceMetric::L2).unwrap();
        catalog
            .commit_file(
                Path::new("/docs/a.txt"),
                "h1".to_string(),
                drafts("/docs/a.txt", &["alpha", "beta"]),
                vec![vec![0.1, 0.2, 0.3, 0.4], vec![1.0, -1.0, 0.5, 0.25]],
            )
            .await
            .unwrap();
        catalog
            .commit(drafts("manual", &["gamma"]), vec![vec![9.0, 8.0, 7.0, 6.0]])
            .await
            .unwrap();
        catalog.retire_path(Path::new("/docs/a.txt")).await;
        catalog.save(&path).await.unwrap();

        let loaded = Catalog::open(&path, 4, DistanceMetric::L2).await.unwrap();
        for id in 0..3 {
            let a = catalog.chunks().get(id).await.unwrap();
            let b = loaded.chunks().get(id).await.unwrap();
            assert_eq!(a, b);
            assert_eq!(
                catalog.vectors().vector(id).await,
                loaded.vectors().vector(id).await
            );
            assert_eq!(
                catalog.vectors().is_live(id).await,
                loaded.vectors().is_live(id).await
            );
        }
        assert_eq!(loaded.chunks().next_id().await, 3);
        assert_eq!(loaded.file_records().await, catalog.file_records().await);
        loaded.check_pairing().await.unwrap();
    }

    #[tokio::test]
    async fn test_open_rejects_dimension_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        let catalog = Catalog::new(4, DistanceMetric::L2).unwrap();
        catalog.save(&path).await.unwrap();

        let err = Catalog::open(&path, 8, DistanceMetric::L2).await.err().unwrap();
        assert!(matches!(
            err,
            StoreError::DimensionMismatch {
                expected: 8,
                actual: 4
            }
        ));
    }

    #[tokio::test]
    async fn test_open_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::open(&dir.path().join("none.json"), 4, DistanceMetric::Cosine)
            .await
            .unwrap();
        assert_eq!(catalog.metric(), DistanceMetric::Cosine);
        assert!(catalog.chunks().is_empty().await);
    }

    #[tokio::test]
    async fn test_concurrent_commits_and_queries() {
        let catalog = Arc::new(Catalog::new(8, DistanceMetric::L2).unwrap());

        let writers: Vec<_> = (0..8)
            .map(|doc| {
                let catalog = Arc::clone(&catalog);
                tokio::spawn(async move {
                    let path = format!("/docs/{doc}.txt");
                    let texts: Vec<String> = (0..5).map(|i| format!("doc {doc} part {i}")).collect();
                    let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
                    let vectors = (0..5).map(|i| unit(8, doc + i)).collect();
                    catalog
                        .commit_file(Path::new(&path), format!("h{doc}"), drafts(&path, &refs), vectors)
                        .await
                        .unwrap();
                })
            })
            .collect();

        let readers: Vec<_> = (0..16)
            .map(|q| {
                let catalog = Arc::clone(&catalog);
                tokio::spawn(async move {
                    for _ in 0..10 {
                        let hits = catalog.search(&unit(8, q), 5).await.unwrap();
                        let ids: Vec<_> = hits.iter().map(|h| h.id).collect();
                        for chunk in catalog.resolve(&ids).await {
                            assert!(chunk.is_some());
                        }
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        for handle in writers.into_iter().chain(readers) {
            handle.await.unwrap();
        }

        assert_eq!(catalog.stats().await.live_chunks, 40);
        catalog.check_pairing().await.unwrap();
    }
}
