//! # ragwatch-core
//!
//! Core types and traits for ragwatch, a watched-folder retrieval service.
//!
//! This crate provides the foundational abstractions shared by every other
//! ragwatch crate:
//!
//! - **Document Loading**: [`DocumentLoader`] trait for turning a path into text
//! - **Splitting**: [`Chunker`] trait for cutting text into overlapping chunks
//! - **Embedding**: [`Embedder`] trait for mapping text batches to vectors
//! - **Generation**: [`Generator`] trait for answering a query from context
//!
//! ## Architecture
//!
//! ```text
//! FileEvent → DocumentLoader → Chunker → Embedder → Catalog { ChunkStore, VectorIndex }
//!                                                          ↑
//! query text → Embedder → VectorIndex.search → ChunkStore.get_many → Generator → answer
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Chunk`] | An indexed span of text, keyed by a store-assigned [`ChunkId`] |
//! | [`ChunkDraft`] | A chunk that has not been assigned an id yet |
//! | [`SearchHit`] | An `(id, distance)` pair returned by the vector index |
//! | [`FileRecord`] | Provenance of the chunks committed for one source path |
//! | [`IngestState`] | Per-file ingestion state machine |
//! | [`QueryAnswer`] | The answer returned by the retrieval coordinator |
//!
//! ## Related Crates
//!
//! - `ragwatch-store`: chunk store, vector index and the paired catalog
//! - `ragwatch-chunker`: overlapping-window splitter
//! - `ragwatch-extract`: document loaders
//! - `ragwatch-embed`: embedding providers and the embedder pool
//! - `ragwatch-index`: file watcher and ingestion pipeline
//! - `ragwatch-query`: retrieval coordinator and generation providers

pub mod error;
pub mod traits;
pub mod types;

pub use error::{ChunkError, Error, LoadError, ProviderError, Result, StoreError};
pub use traits::*;
pub use types::*;
