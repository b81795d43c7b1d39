//! Collaborator traits for ragwatch components.
//!
//! - [`DocumentLoader`]: Turn a path into UTF-8 text
//! - [`Chunker`]: Split text into overlapping chunks
//! - [`Embedder`]: Map text batches to fixed-dimension vectors
//! - [`Generator`]: Answer a query from retrieved context
//!
//! The ingestion pipeline and the retrieval coordinator only see these
//! traits, so offline and networked providers can be swapped freely.

use async_trait::async_trait;
use std::path::Path;

use crate::error::{ChunkError, LoadError, ProviderError};
use crate::types::{ChunkConfig, ChunkOutput, EmbeddingOutput, ExtractedContent};

// ============================================================================
// Loading
// ============================================================================

/// Trait for loading a document from disk.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Lowercase file extensions this loader handles.
    fn supported_extensions(&self) -> &[&str];

    /// Check if this loader can handle the given file.
    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                let ext = e.to_ascii_lowercase();
                self.supported_extensions().contains(&ext.as_str())
            })
            .unwrap_or(false)
    }

    /// Load the document text.
    async fn load(&self, path: &Path) -> Result<ExtractedContent, LoadError>;
}

// ============================================================================
// Chunking
// ============================================================================

/// Trait for splitting text into chunks.
#[async_trait]
pub trait Chunker: Send + Sync {
    /// Name of this chunking strategy.
    fn name(&self) -> &str;

    /// Split `text` under `config`. Output is in document order.
    async fn chunk(&self, text: &str, config: &ChunkConfig)
        -> Result<Vec<ChunkOutput>, ChunkError>;
}

// ============================================================================
// Embedding
// ============================================================================

/// Trait for generating embeddings.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model name/identifier.
    fn model_name(&self) -> &str;

    /// Embedding dimension. Fixed for the lifetime of the provider.
    fn dimension(&self) -> usize;

    /// Embed a batch. Output has the same length and order as `texts`.
    async fn embed_text(&self, texts: &[&str]) -> Result<Vec<EmbeddingOutput>, ProviderError>;

    /// Embed a query as a single-item batch.
    async fn embed_query(&self, query: &str) -> Result<EmbeddingOutput, ProviderError> {
        let results = self.embed_text(&[query]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Malformed("empty embedding result".to_string()))
    }
}

// ============================================================================
// Generation
// ============================================================================

/// Trait for producing an answer from a query and retrieved chunk texts.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Model name/identifier.
    fn model_name(&self) -> &str;

    /// Generate an answer. `context` is in rank order.
    async fn generate(&self, query: &str, context: &[&str]) -> Result<String, ProviderError>;
}
