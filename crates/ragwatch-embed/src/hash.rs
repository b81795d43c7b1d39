//! Deterministic offline embedder.
//!
//! Each lowercase word is hashed with blake3 into a signed bucket, and the
//! bucket counts are normalized to a unit vector. Texts sharing vocabulary
//! land close together, which is enough for local use and tests without a
//! model download or network access.

use async_trait::async_trait;
use ragwatch_core::{Embedder, EmbeddingOutput, ProviderError};

/// Feature-hashing embedder of arbitrary dimension.
pub struct HashEmbedder {
    dimension: usize,
    model_name: String,
}

impl HashEmbedder {
    /// Create an embedder producing `dimension`-length vectors.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            model_name: format!("blake3-hash-{dimension}"),
        }
    }

    /// Embed one text.
    #[must_use]
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        if self.dimension == 0 {
            return vector;
        }

        let mut any = false;
        for word in words(text) {
            any = true;
            let hash = blake3::hash(word.as_bytes());
            let bytes = hash.as_bytes();
            let bucket = u64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ]) % self.dimension as u64;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket as usize] += sign;
        }

        // Punctuation-only text still gets a stable, non-zero vector.
        if !any {
            let hash = blake3::hash(text.as_bytes());
            let bucket = hash.as_bytes()[0] as usize % self.dimension;
            vector[bucket] = 1.0;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_text(&self, texts: &[&str]) -> Result<Vec<EmbeddingOutput>, ProviderError> {
        Ok(texts
            .iter()
            .map(|text| EmbeddingOutput {
                embedding: self.embed_one(text),
                token_count: words(text).count(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragwatch_core::DistanceMetric;

    #[test]
    fn test_deterministic() {
        let embedder = HashEmbedder::new(64);
        assert_eq!(
            embedder.embed_one("The quick brown fox"),
            embedder.embed_one("The quick brown fox")
        );
    }

    #[test]
    fn test_unit_length() {
        let embedder = HashEmbedder::new(32);
        let v = embedder.embed_one("hello world again");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_case_and_punctuation_insensitive() {
        let embedder = HashEmbedder::new(64);
        assert_eq!(
            embedder.embed_one("Rust, Tokio!"),
            embedder.embed_one("rust tokio")
        );
    }

    #[test]
    fn test_shared_vocabulary_is_closer() {
        let embedder = HashEmbedder::new(256);
        let query = embedder.embed_one("vector index search");
        let related = embedder.embed_one("exact vector search over the index");
        let unrelated = embedder.embed_one("chocolate cake recipe with butter");
        let metric = DistanceMetric::L2;
        assert!(metric.distance(&query, &related) < metric.distance(&query, &unrelated));
    }

    #[test]
    fn test_punctuation_only_text_is_nonzero() {
        let embedder = HashEmbedder::new(16);
        let v = embedder.embed_one("?!...");
        assert!(v.iter().any(|x| *x != 0.0));
    }

    #[tokio::test]
    async fn test_embed_text_batch() {
        let embedder = HashEmbedder::new(8);
        assert_eq!(embedder.model_name(), "blake3-hash-8");
        let out = embedder.embed_text(&["one two", "three"]).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].embedding.len(), 8);
        assert_eq!(out[0].token_count, 2);
        assert_eq!(out[1].token_count, 1);
    }
}
