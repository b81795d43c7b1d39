//! Query execution.

use ragwatch_core::{Chunk, Error, Generator, QueryAnswer, Result};
use ragwatch_embed::EmbedderPool;
use ragwatch_store::Catalog;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Answers queries from the chunks committed to a [`Catalog`].
pub struct RetrievalCoordinator {
    catalog: Arc<Catalog>,
    embedder: Arc<EmbedderPool>,
    generator: Arc<dyn Generator>,
    /// Caller-side limit on one generation call
    generation_timeout: Duration,
}

impl RetrievalCoordinator {
    pub fn new(
        catalog: Arc<Catalog>,
        embedder: Arc<EmbedderPool>,
        generator: Arc<dyn Generator>,
        generation_timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            embedder,
            generator,
            generation_timeout,
        }
    }

    /// The `k` nearest live chunks to `query`, closest first.
    ///
    /// `k` has no upper bound: `min(k, live chunks)` are returned. An id the
    /// chunk store cannot resolve is dropped with a warning.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Chunk>> {
        Self::validate(query, k)?;

        let vector = self.embedder.embed_query(query).await?;
        let hits = self.catalog.search(&vector, k).await?;
        let ids: Vec<_> = hits.iter().map(|h| h.id).collect();
        debug!("Query matched {} chunks", ids.len());

        let chunks = self
            .catalog
            .resolve(&ids)
            .await
            .into_iter()
            .zip(&ids)
            .filter_map(|(chunk, id)| {
                if chunk.is_none() {
                    warn!("Index returned chunk {} with no stored text, dropping it", id);
                }
                chunk
            })
            .collect();
        Ok(chunks)
    }

    /// Retrieve, then generate an answer from the retrieved text.
    ///
    /// The generator's output is returned unchanged.
    pub async fn answer(&self, query: &str, k: usize) -> Result<QueryAnswer> {
        let chunks = self.retrieve(query, k).await?;
        let context: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();

        let answer = tokio::time::timeout(
            self.generation_timeout,
            self.generator.generate(query, &context),
        )
        .await
        .map_err(|_| {
            warn!("Generation timed out after {:?}", self.generation_timeout);
            Error::ProviderTimeout {
                operation: "generation",
                timeout: self.generation_timeout,
            }
        })??;

        Ok(QueryAnswer {
            query_text: query.to_string(),
            answer,
            retrieved_ids: chunks.iter().map(|c| c.id).collect(),
        })
    }

    /// Reject bad input before any provider call.
    fn validate(query: &str, k: usize) -> Result<()> {
        if query.trim().is_empty() {
            return Err(Error::EmptyQuery);
        }
        if k == 0 {
            return Err(Error::InvalidArgument("k must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ragwatch_core::{
        ChunkDraft, ChunkMetadata, DistanceMetric, Embedder, EmbeddingOutput, ProviderError,
    };
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DIM: usize = 2;

    /// Embeds "x…" texts along the first axis and everything else along the second.
    struct AxisEmbedder {
        calls: AtomicUsize,
    }

    impl AxisEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Embedder for AxisEmbedder {
        fn model_name(&self) -> &str {
            "axis"
        }

        fn dimension(&self) -> usize {
            DIM
        }

        async fn embed_text(
            &self,
            texts: &[&str],
        ) -> std::result::Result<Vec<EmbeddingOutput>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| EmbeddingOutput {
                    embedding: if t.starts_with('x') {
                        vec![1.0, 0.0]
                    } else {
                        vec![0.0, 1.0]
                    },
                    token_count: 1,
                })
                .collect())
        }
    }

    struct UnreachableEmbedder;

    #[async_trait]
    impl Embedder for UnreachableEmbedder {
        fn model_name(&self) -> &str {
            "unreachable"
        }

        fn dimension(&self) -> usize {
            DIM
        }

        async fn embed_text(
            &self,
            _texts: &[&str],
        ) -> std::result::Result<Vec<EmbeddingOutput>, ProviderError> {
            Err(ProviderError::Unavailable("connection refused".to_string()))
        }
    }

    /// Returns the context joined with `|`.
    struct JoinGenerator;

    #[async_trait]
    impl Generator for JoinGenerator {
        fn model_name(&self) -> &str {
            "join"
        }

        async fn generate(
            &self,
            _query: &str,
            context: &[&str],
        ) -> std::result::Result<String, ProviderError> {
            Ok(context.join("|"))
        }
    }

    struct SlowGenerator;

    #[async_trait]
    impl Generator for SlowGenerator {
        fn model_name(&self) -> &str {
            "slow"
        }

        async fn generate(
            &self,
            _query: &str,
            _context: &[&str],
        ) -> std::result::Result<String, ProviderError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(String::new())
        }
    }

    fn draft(text: &str, seq: u32) -> ChunkDraft {
        ChunkDraft {
            text: text.to_string(),
            source_path: PathBuf::from("doc.txt"),
            sequence_index: seq,
            byte_range: 0..text.len() as u64,
            line_range: None,
            metadata: ChunkMetadata::default(),
        }
    }

    async fn seeded_catalog() -> Arc<Catalog> {
        let catalog = Arc::new(Catalog::new(DIM, DistanceMetric::L2).unwrap());
        catalog
            .commit(
                vec![draft("x near", 0), draft("y far", 1), draft("x close", 2)],
                vec![vec![0.9, 0.0], vec![0.0, 1.0], vec![1.0, 0.5]],
            )
            .await
            .unwrap();
        catalog
    }

    fn coordinator(
        catalog: Arc<Catalog>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
    ) -> RetrievalCoordinator {
        RetrievalCoordinator::new(
            catalog,
            Arc::new(EmbedderPool::new(embedder, 2, Duration::from_secs(5))),
            generator,
            Duration::from_millis(200),
        )
    }

    #[tokio::test]
    async fn test_retrieve_returns_stored_text_in_rank_order() {
        let coord = coordinator(
            seeded_catalog().await,
            Arc::new(AxisEmbedder::new()),
            Arc::new(JoinGenerator),
        );
        let chunks = coord.retrieve("x query", 2).await.unwrap();
        let texts: Vec<_> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["x near", "x close"]);
    }

    #[tokio::test]
    async fn test_answer_passes_context_and_ids() {
        let coord = coordinator(
            seeded_catalog().await,
            Arc::new(AxisEmbedder::new()),
            Arc::new(JoinGenerator),
        );
        let answer = coord.answer("y?", 1).await.unwrap();
        assert_eq!(answer.query_text, "y?");
        assert_eq!(answer.answer, "y far");
        assert_eq!(answer.retrieved_ids, vec![1]);
    }

    #[tokio::test]
    async fn test_k_larger_than_index() {
        let coord = coordinator(
            seeded_catalog().await,
            Arc::new(AxisEmbedder::new()),
            Arc::new(JoinGenerator),
        );
        for k in [4, 11, 10_000, usize::MAX] {
            let answer = coord.answer("x", k).await.unwrap();
            assert_eq!(answer.retrieved_ids, vec![0, 2, 1]);
        }
    }

    #[tokio::test]
    async fn test_empty_index_answers_with_no_context() {
        let catalog = Arc::new(Catalog::new(DIM, DistanceMetric::L2).unwrap());
        let coord = coordinator(catalog, Arc::new(AxisEmbedder::new()), Arc::new(JoinGenerator));
        let answer = coord.answer("anything", 3).await.unwrap();
        assert!(answer.retrieved_ids.is_empty());
        assert_eq!(answer.answer, "");
    }

    #[tokio::test]
    async fn test_invalid_input_rejected_before_embedding() {
        let embedder = Arc::new(AxisEmbedder::new());
        let coord = coordinator(
            seeded_catalog().await,
            Arc::clone(&embedder) as Arc<dyn Embedder>,
            Arc::new(JoinGenerator),
        );

        assert!(matches!(coord.answer("   ", 3).await, Err(Error::EmptyQuery)));
        assert!(matches!(
            coord.answer("q", 0).await,
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unreachable_embedder_is_service_unavailable() {
        let coord = coordinator(
            seeded_catalog().await,
            Arc::new(UnreachableEmbedder),
            Arc::new(JoinGenerator),
        );
        assert!(matches!(
            coord.answer("q", 1).await,
            Err(Error::ServiceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_generation_timeout() {
        let coord = coordinator(
            seeded_catalog().await,
            Arc::new(AxisEmbedder::new()),
            Arc::new(SlowGenerator),
        );
        let err = coord.answer("q", 1).await.unwrap_err();
        assert!(matches!(
            err,
            Error::ProviderTimeout {
                operation: "generation",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_tombstoned_chunks_not_retrieved() {
        let catalog = seeded_catalog().await;
        catalog.vectors().tombstone(&[0]).await;
        let coord = coordinator(catalog, Arc::new(AxisEmbedder::new()), Arc::new(JoinGenerator));
        let answer = coord.answer("x", 1).await.unwrap();
        assert_eq!(answer.retrieved_ids, vec![2]);
    }
}
