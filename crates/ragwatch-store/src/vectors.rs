//! Exact k-nearest-neighbor vector index.
//!
//! Vectors live in one contiguous `Vec<f32>` and every search is a full
//! linear scan, so results are the true k nearest neighbors under the
//! configured [`DistanceMetric`]. Removal is soft: a tombstoned id keeps its
//! slot but is skipped by [`VectorIndex::search`].

use ragwatch_core::{ChunkId, DistanceMetric, SearchHit, StoreError};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::{debug, error};

/// Vector index with a fixed dimension and metric.
pub struct VectorIndex {
    dimension: usize,
    metric: DistanceMetric,
    inner: RwLock<VectorTable>,
}

#[derive(Default)]
struct VectorTable {
    ids: Vec<ChunkId>,
    data: Vec<f32>,
    live: Vec<bool>,
    positions: HashMap<ChunkId, usize>,
    live_count: usize,
}

impl VectorTable {
    fn push(&mut self, id: ChunkId, vector: &[f32], live: bool) {
        self.positions.insert(id, self.ids.len());
        self.ids.push(id);
        self.data.extend_from_slice(vector);
        self.live.push(live);
        if live {
            self.live_count += 1;
        }
    }

    fn hide(&mut self, ids: &[ChunkId]) -> usize {
        let mut hidden = 0;
        for id in ids {
            if let Some(&pos) = self.positions.get(id) {
                if self.live[pos] {
                    self.live[pos] = false;
                    self.live_count -= 1;
                    hidden += 1;
                }
            }
        }
        hidden
    }
}

/// A persisted index entry.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorEntry {
    pub id: ChunkId,
    pub vector: Vec<f32>,
    pub tombstoned: bool,
}

impl VectorIndex {
    /// Create an empty index. `dimension` must be non-zero.
    pub fn new(dimension: usize, metric: DistanceMetric) -> Result<Self, StoreError> {
        if dimension == 0 {
            return Err(StoreError::InvalidArgument(
                "embedding dimension must be > 0".to_string(),
            ));
        }
        Ok(Self {
            dimension,
            metric,
            inner: RwLock::new(VectorTable::default()),
        })
    }

    /// Embedding dimension.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Distance metric.
    #[must_use]
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Insert one vector.
    pub async fn insert(&self, id: ChunkId, vector: Vec<f32>) -> Result<(), StoreError> {
        self.insert_batch(vec![(id, vector)]).await
    }

    /// Insert a batch atomically.
    ///
    /// The whole batch is validated before anything is written, so a failure
    /// leaves the index untouched and a success publishes every vector at once.
    pub async fn insert_batch(&self, batch: Vec<(ChunkId, Vec<f32>)>) -> Result<(), StoreError> {
        self.insert_batch_replacing(batch, &[]).await.map(|_| ())
    }

    /// Insert a batch and tombstone `retire` under one write lock.
    ///
    /// A search sees either the old ids or the new batch, never both. On
    /// failure nothing is inserted or tombstoned. Returns how many of
    /// `retire` were live.
    pub async fn insert_batch_replacing(
        &self,
        batch: Vec<(ChunkId, Vec<f32>)>,
        retire: &[ChunkId],
    ) -> Result<usize, StoreError> {
        let mut table = self.inner.write().await;

        let mut seen = HashSet::with_capacity(batch.len());
        for (id, vector) in &batch {
            if let Err(e) = self.check_vector(vector) {
                error!("Rejected vector for chunk {}: {}", id, e);
                return Err(e);
            }
            if table.positions.contains_key(id) || !seen.insert(*id) {
                error!("Duplicate vector id {}", id);
                return Err(StoreError::DuplicateId(*id));
            }
        }

        table.data.reserve(batch.len() * self.dimension);
        for (id, vector) in &batch {
            table.push(*id, vector, true);
        }
        let retired = table.hide(retire);
        debug!(
            "Indexed {} vectors, retired {} ({} live)",
            batch.len(),
            retired,
            table.live_count
        );
        Ok(retired)
    }

    /// The `k` live vectors closest to `query`.
    ///
    /// Results are ascending by distance with ties broken by ascending id.
    /// An empty index yields an empty result.
    pub async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, StoreError> {
        if k == 0 {
            return Err(StoreError::InvalidArgument("k must be > 0".to_string()));
        }
        self.check_vector(query)?;

        let table = self.inner.read().await;
        let mut heap: BinaryHeap<Candidate> = BinaryHeap::with_capacity(k.min(table.live_count));
        for (pos, vector) in table.data.chunks_exact(self.dimension).enumerate() {
            if !table.live[pos] {
                continue;
            }
            let candidate = Candidate {
                distance: self.metric.distance(query, vector),
                id: table.ids[pos],
            };
            if heap.len() < k {
                heap.push(candidate);
            } else if heap.peek().is_some_and(|worst| candidate < *worst) {
                heap.pop();
                heap.push(candidate);
            }
        }

        Ok(heap
            .into_sorted_vec()
            .into_iter()
            .map(|c| SearchHit {
                id: c.id,
                distance: c.distance,
            })
            .collect())
    }

    /// Hide ids from search. Returns how many were live.
    pub async fn tombstone(&self, ids: &[ChunkId]) -> usize {
        let hidden = self.inner.write().await.hide(ids);
        if hidden > 0 {
            debug!("Tombstoned {} vectors", hidden);
        }
        hidden
    }

    /// The stored vector for `id`, tombstoned or not.
    pub async fn vector(&self, id: ChunkId) -> Option<Vec<f32>> {
        let table = self.inner.read().await;
        table.positions.get(&id).map(|&pos| {
            let start = pos * self.dimension;
            table.data[start..start + self.dimension].to_vec()
        })
    }

    /// Whether `id` is present and visible to search.
    pub async fn is_live(&self, id: ChunkId) -> bool {
        let table = self.inner.read().await;
        table.positions.get(&id).is_some_and(|&pos| table.live[pos])
    }

    /// Total vectors, tombstoned included.
    pub async fn len(&self) -> usize {
        self.inner.read().await.ids.len()
    }

    /// Whether the index holds no vectors at all.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.ids.is_empty()
    }

    /// Vectors visible to search.
    pub async fn live_len(&self) -> usize {
        self.inner.read().await.live_count
    }

    /// Every entry in insertion order.
    pub(crate) async fn entries(&self) -> Vec<VectorEntry> {
        let table = self.inner.read().await;
        table
            .ids
            .iter()
            .zip(table.data.chunks_exact(self.dimension))
            .zip(&table.live)
            .map(|((&id, vector), &live)| VectorEntry {
                id,
                vector: vector.to_vec(),
                tombstoned: !live,
            })
            .collect()
    }

    /// Rebuild from persisted entries. Entries must already be validated.
    pub(crate) fn restore(
        dimension: usize,
        metric: DistanceMetric,
        entries: &[VectorEntry],
    ) -> Result<Self, StoreError> {
        let mut index = Self::new(dimension, metric)?;
        let table = index.inner.get_mut();
        table.data.reserve(entries.len() * dimension);
        for entry in entries {
            table.push(entry.id, &entry.vector, !entry.tombstoned);
        }
        Ok(index)
    }

    fn check_vector(&self, vector: &[f32]) -> Result<(), StoreError> {
        if vector.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        if let Some(pos) = vector.iter().position(|x| !x.is_finite()) {
            return Err(StoreError::InvalidVector(format!(
                "component {} is {}",
                pos, vector[pos]
            )));
        }
        Ok(())
    }
}

/// Heap entry ordered by `(distance, id)`.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: f32,
    id: ChunkId,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.id.cmp(&other.id))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}
