//! Core types for ragwatch.
//!
//! ## Chunks
//! - [`ChunkId`]: store-assigned, monotonically increasing identifier
//! - [`ChunkDraft`]: a split chunk waiting for an id
//! - [`Chunk`]: an indexed chunk, immutable once stored
//! - [`ChunkConfig`]: the splitting window
//!
//! ## Loading and embedding
//! - [`ExtractedContent`]: text produced by a document loader
//! - [`EmbeddingOutput`]: one vector returned by an embedder
//!
//! ## Search
//! - [`DistanceMetric`]: metric fixed at index construction
//! - [`SearchHit`]: an `(id, distance)` result
//! - [`QueryAnswer`]: the coordinator's reply
//!
//! ## Ingestion
//! - [`FileEvent`]: filesystem change notification
//! - [`IngestState`]: per-file state machine
//! - [`FileRecord`], [`IndexStats`]: bookkeeping

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::ChunkError;

// ============================================================================
// Chunks
// ============================================================================

/// Identifier assigned by the chunk store. Never reused.
pub type ChunkId = u64;

/// A chunk produced by the splitter that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDraft {
    /// The exact text that will be embedded
    pub text: String,
    /// Originating document
    pub source_path: PathBuf,
    /// Position within the source document (0-indexed)
    pub sequence_index: u32,
    /// Byte range in the loaded text
    pub byte_range: Range<u64>,
    /// Line range in the loaded text
    pub line_range: Option<Range<u32>>,
    /// Provenance metadata
    pub metadata: ChunkMetadata,
}

/// An indexed unit of text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Store-assigned identifier
    pub id: ChunkId,
    /// The exact text that was embedded
    pub text: String,
    /// Originating document
    pub source_path: PathBuf,
    /// Position within the source document (0-indexed)
    pub sequence_index: u32,
    /// Byte range in the loaded text
    pub byte_range: Range<u64>,
    /// Line range in the loaded text
    pub line_range: Option<Range<u32>>,
    /// Provenance metadata
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Attach a store-assigned id to a draft.
    #[must_use]
    pub fn from_draft(id: ChunkId, draft: ChunkDraft) -> Self {
        Self {
            id,
            text: draft.text,
            source_path: draft.source_path,
            sequence_index: draft.sequence_index,
            byte_range: draft.byte_range,
            line_range: draft.line_range,
            metadata: draft.metadata,
        }
    }
}

/// Metadata associated with a chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Document commit this chunk belongs to
    pub document_id: Option<Uuid>,
    /// Embedding model used
    pub embedding_model: Option<String>,
    /// When the chunk was committed
    pub indexed_at: Option<DateTime<Utc>>,
}

/// Splitting window, measured in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Maximum characters per chunk
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks
    pub chunk_overlap: usize,
}

impl ChunkConfig {
    /// Create a window, validating `0 <= overlap < chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ChunkError> {
        let config = Self {
            chunk_size,
            chunk_overlap,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the window invariants.
    pub fn validate(&self) -> Result<(), ChunkError> {
        if self.chunk_size == 0 {
            return Err(ChunkError::InvalidConfig(
                "chunk_size must be > 0".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ChunkError::InvalidConfig(format!(
                "chunk_overlap ({}) must be < chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Output from a chunker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkOutput {
    /// Chunk content
    pub content: String,
    /// Byte range in source text
    pub byte_range: Range<u64>,
    /// Line range in source text
    pub line_range: Option<Range<u32>>,
}

// ============================================================================
// Loading
// ============================================================================

/// Content produced by a document loader.
#[derive(Debug, Clone, Default)]
pub struct ExtractedContent {
    /// UTF-8 text of the document
    pub text: String,
    /// Document-level metadata
    pub metadata: ContentMetadataInfo,
}

/// Metadata extracted alongside the text.
#[derive(Debug, Clone, Default)]
pub struct ContentMetadataInfo {
    /// Document title, when the format declares one
    pub title: Option<String>,
    /// Loader format tag (`text`, `markdown`, `pdf`)
    pub format: Option<String>,
    /// Page count (for PDFs)
    pub page_count: Option<u32>,
}

// ============================================================================
// Embedding
// ============================================================================

/// Output from embedding one input.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingOutput {
    /// The embedding vector
    pub embedding: Vec<f32>,
    /// Number of tokens in input (approximate for offline providers)
    pub token_count: usize,
}

// ============================================================================
// Search
// ============================================================================

/// Distance metric for vector search. Smaller is always closer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Squared Euclidean distance
    #[default]
    L2,
    /// `1 - cosine similarity`
    Cosine,
    /// Negated dot product
    Dot,
}

impl DistanceMetric {
    /// Distance between two vectors of equal length.
    #[must_use]
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::L2 => a
                .iter()
                .zip(b)
                .map(|(x, y)| {
                    let d = x - y;
                    d * d
                })
                .sum(),
            Self::Cosine => {
                let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    return 1.0;
                }
                1.0 - dot / (norm_a * norm_b)
            }
            Self::Dot => -a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>(),
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::L2 => f.write_str("l2"),
            Self::Cosine => f.write_str("cosine"),
            Self::Dot => f.write_str("dot"),
        }
    }
}

/// A k-NN result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: ChunkId,
    pub distance: f32,
}

/// The retrieval coordinator's reply to a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryAnswer {
    /// The query as submitted
    pub query_text: String,
    /// Generated answer, verbatim
    pub answer: String,
    /// Ids of the chunks handed to the generator, in rank order
    pub retrieved_ids: Vec<ChunkId>,
}

// ============================================================================
// Ingestion
// ============================================================================

/// File system event for ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Deleted(PathBuf),
    Renamed { from: PathBuf, to: PathBuf },
}

impl FileEvent {
    /// The path the event leaves behind (the target of a rename).
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Created(p) | Self::Modified(p) | Self::Deleted(p) => p,
            Self::Renamed { to, .. } => to,
        }
    }
}

/// Per-file ingestion state.
///
/// `Detected → Loading → Splitting → Embedding → Committing → Indexed`;
/// any stage may move to `Failed`, which is terminal for that event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum IngestState {
    Detected,
    Loading,
    Splitting,
    Embedding,
    Committing,
    Indexed,
    Failed(String),
}

impl IngestState {
    /// Whether no further transition follows this state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Indexed | Self::Failed(_))
    }
}

/// File indexing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    /// Chunks are live
    Indexed,
    /// Chunks have been tombstoned
    Deleted,
}

/// Bookkeeping for the chunks committed from one source path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Identifier of the commit that produced `chunk_ids`
    pub document_id: Uuid,
    /// Source path
    pub path: PathBuf,
    /// blake3 of the file bytes
    pub content_hash: String,
    /// Ids in sequence order
    pub chunk_ids: Vec<ChunkId>,
    /// Commit time
    pub indexed_at: DateTime<Utc>,
    /// Current status
    pub status: FileStatus,
}

/// Overall index statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Files committed by the pipeline
    pub indexed_files: u64,
    /// Files that ended in `Failed`
    pub failed_files: u64,
    /// Files skipped because their content was unchanged
    pub skipped_files: u64,
    /// Chunks visible to search
    pub live_chunks: u64,
    /// Chunks hidden from search but still resolvable
    pub tombstoned_chunks: u64,
    /// Last successful commit
    pub last_update: Option<DateTime<Utc>>,
}
