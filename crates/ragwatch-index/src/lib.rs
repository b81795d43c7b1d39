//! Ingestion for ragwatch.
//!
//! This crate turns filesystem changes into committed `(chunk, vector)`
//! pairs: load → split → embed → commit.
//!
//! # Components
//!
//! - [`IngestPipeline`]: initial scan, event worker, manual ingestion and shutdown
//! - [`FileWatcher`]: debounced recursive watcher feeding a bounded queue
//! - [`PathFilter`]: extension allow-list plus exclude patterns
//! - [`IndexUpdate`]: progress events broadcast to subscribers
//!
//! # Example
//!
//! ```rust,ignore
//! use ragwatch_index::{IngestPipeline, PipelineConfig, IndexUpdate};
//!
//! let pipeline = IngestPipeline::new(catalog, loaders, chunker, embedder, PipelineConfig::new(dir));
//! let mut updates = pipeline.subscribe();
//! pipeline.start().await?;
//!
//! while let Ok(update) = updates.recv().await {
//!     if let IndexUpdate::FileIndexed { path, chunk_count } = update {
//!         println!("{} → {} chunks", path.display(), chunk_count);
//!     }
//! }
//! pipeline.stop().await?;
//! ```

pub mod filter;
pub mod pipeline;
pub mod watcher;

pub use filter::PathFilter;
pub use pipeline::{IndexUpdate, IngestPipeline, PipelineConfig, ScanReport};
pub use watcher::FileWatcher;
