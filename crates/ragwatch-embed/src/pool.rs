//! Embedder pool for concurrent embedding operations.

use ragwatch_core::{Embedder, Error, Result, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Shared embedder with a concurrency limit and a per-call timeout.
///
/// Every call either returns exactly one vector per input, in input order,
/// each of the embedder's declared dimension, or fails without side effects.
pub struct EmbedderPool {
    embedder: Arc<dyn Embedder>,
    /// Semaphore to limit concurrent provider calls
    semaphore: Semaphore,
    max_concurrent: usize,
    timeout: Duration,
}

impl EmbedderPool {
    /// Create a new embedder pool. `max_concurrent` is clamped to at least 1.
    pub fn new(embedder: Arc<dyn Embedder>, max_concurrent: usize, timeout: Duration) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            embedder,
            semaphore: Semaphore::new(max_concurrent),
            max_concurrent,
            timeout,
        }
    }

    /// Get the embedding dimension.
    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    /// Get the model name.
    pub fn model_name(&self) -> &str {
        self.embedder.model_name()
    }

    /// Embed a batch of texts as one provider call.
    pub async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| Error::Other(format!("embedder pool closed: {e}")))?;

        let outputs = tokio::time::timeout(self.timeout, self.embedder.embed_text(texts))
            .await
            .map_err(|_| {
                warn!(
                    "Embedding {} texts timed out after {:?}",
                    texts.len(),
                    self.timeout
                );
                Error::ProviderTimeout {
                    operation: "embedding",
                    timeout: self.timeout,
                }
            })??;

        if outputs.len() != texts.len() {
            return Err(Error::EmbeddingMismatch {
                expected: texts.len(),
                actual: outputs.len(),
            });
        }
        let expected = self.dimension();
        if let Some(bad) = outputs.iter().find(|o| o.embedding.len() != expected) {
            warn!(
                "{} returned a {}-dim vector, expected {}",
                self.model_name(),
                bad.embedding.len(),
                expected
            );
            return Err(Error::Store(StoreError::DimensionMismatch {
                expected,
                actual: bad.embedding.len(),
            }));
        }
        debug!("Embedded {} texts with {}", texts.len(), self.model_name());
        Ok(outputs.into_iter().map(|o| o.embedding).collect())
    }

    /// Embed a single query as a one-item batch.
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[query])
            .await?
            .into_iter()
            .next()
            .ok_or(Error::EmbeddingMismatch {
                expected: 1,
                actual: 0,
            })
    }

    /// Get pool statistics.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Get max concurrent operations.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}
