//! # ragwatch-embed
//!
//! Embedding providers for ragwatch.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`EmbedderPool`] | Concurrency limit, caller timeout and batch-length check around any [`Embedder`](ragwatch_core::Embedder) |
//! | [`HashEmbedder`] | Deterministic offline embedder built from blake3 feature hashing |
//! | [`OpenAiEmbedder`] | Client for OpenAI-compatible `/embeddings` endpoints |
//!
//! ```rust,ignore
//! use ragwatch_embed::{EmbedderPool, HashEmbedder};
//! use std::{sync::Arc, time::Duration};
//!
//! let pool = EmbedderPool::new(Arc::new(HashEmbedder::new(256)), 4, Duration::from_secs(30));
//! let vectors = pool.embed_batch(&["Hello world", "Machine learning"]).await?;
//! ```

pub mod hash;
pub mod openai;
pub mod pool;

pub use hash::HashEmbedder;
pub use openai::OpenAiEmbedder;
pub use pool::EmbedderPool;
