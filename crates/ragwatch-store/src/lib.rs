//! Storage layer for ragwatch.
//!
//! - [`ChunkStore`]: append-only chunk text keyed by store-assigned ids
//! - [`VectorIndex`]: exact k-NN over fixed-dimension vectors, with tombstones
//! - [`Catalog`]: the two halves kept in 1:1 correspondence, plus per-file
//!   records and JSON snapshot persistence
//!
//! # Example
//!
//! ```rust,ignore
//! use ragwatch_store::Catalog;
//! use ragwatch_core::DistanceMetric;
//!
//! let catalog = Catalog::open(&state_path, 384, DistanceMetric::L2).await?;
//! let receipt = catalog.commit(drafts, vectors).await?;
//! let hits = catalog.search(&query_vector, 3).await?;
//! catalog.save(&state_path).await?;
//! ```

pub mod catalog;
pub mod chunks;
mod snapshot;
pub mod vectors;

pub use catalog::{Catalog, CommitReceipt};
pub use chunks::ChunkStore;
pub use vectors::{VectorEntry, VectorIndex};
