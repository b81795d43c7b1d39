//! Append-only chunk text store.

use ragwatch_core::{Chunk, ChunkDraft, ChunkId, StoreError};
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Chunk text keyed by store-assigned ids.
///
/// Ids come from a counter that never goes backwards, so an id is never
/// handed out twice even after a rollback. A chunk becomes visible to
/// readers only once the write lock that inserted it is released.
pub struct ChunkStore {
    inner: RwLock<ChunkTable>,
}

#[derive(Default)]
struct ChunkTable {
    chunks: BTreeMap<ChunkId, Chunk>,
    next_id: ChunkId,
}

impl ChunkStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(ChunkTable::default()),
        }
    }

    /// Store one chunk and return its id.
    pub async fn put(&self, draft: ChunkDraft) -> Result<ChunkId, StoreError> {
        let ids = self.put_batch(vec![draft]).await?;
        ids.into_iter()
            .next()
            .ok_or_else(|| StoreError::InvalidArgument("empty batch".to_string()))
    }

    /// Store a batch under a single lock acquisition.
    ///
    /// Ids are contiguous and assigned in input order. Either every draft is
    /// stored or none is.
    pub async fn put_batch(&self, drafts: Vec<ChunkDraft>) -> Result<Vec<ChunkId>, StoreError> {
        if let Some(draft) = drafts.iter().find(|d| d.text.is_empty()) {
            return Err(StoreError::InvalidArgument(format!(
                "chunk {} of {} has empty text",
                draft.sequence_index,
                draft.source_path.display()
            )));
        }

        let mut table = self.inner.write().await;
        let mut ids = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let id = table.next_id;
            table.next_id += 1;
            table.chunks.insert(id, Chunk::from_draft(id, draft));
            ids.push(id);
        }
        debug!("Stored {} chunks", ids.len());
        Ok(ids)
    }

    /// Look up one chunk.
    pub async fn get(&self, id: ChunkId) -> Result<Chunk, StoreError> {
        self.inner
            .read()
            .await
            .chunks
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    /// Look up many chunks. The output is aligned with `ids`.
    pub async fn get_many(&self, ids: &[ChunkId]) -> Vec<Option<Chunk>> {
        let table = self.inner.read().await;
        ids.iter().map(|id| table.chunks.get(id).cloned()).collect()
    }

    /// Number of stored chunks.
    pub async fn len(&self) -> usize {
        self.inner.read().await.chunks.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.chunks.is_empty()
    }

    /// The id the next `put` will assign.
    pub async fn next_id(&self) -> ChunkId {
        self.inner.read().await.next_id
    }

    /// Drop chunks whose vectors never made it into the index.
    pub(crate) async fn remove_many(&self, ids: &[ChunkId]) -> usize {
        let mut table = self.inner.write().await;
        ids.iter()
            .filter(|id| table.chunks.remove(id).is_some())
            .count()
    }

    /// Every chunk in id order.
    pub(crate) async fn all(&self) -> Vec<Chunk> {
        self.inner.read().await.chunks.values().cloned().collect()
    }

    /// Rebuild from persisted state.
    pub(crate) fn restore(chunks: Vec<Chunk>, next_id: ChunkId) -> Self {
        let chunks = chunks.into_iter().map(|c| (c.id, c)).collect();
        Self {
            inner: RwLock::new(ChunkTable { chunks, next_id }),
        }
    }
}

impl Default for ChunkStore {
    fn default() -> Self {
        Self::new()
    }
}
