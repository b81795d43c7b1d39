//! # ragwatch-extract
//!
//! Document loaders that turn a path into UTF-8 text for the ingestion
//! pipeline.
//!
//! | Loader | Extensions | Notes |
//! |--------|------------|-------|
//! | [`TextLoader`] | `.txt`, `.text`, `.md`, `.markdown` | Strict UTF-8; Markdown title from the first `#` heading |
//! | [`PdfLoader`] | `.pdf` | `pdf-extract` on a blocking thread |
//!
//! [`LoaderRegistry`] routes a path to the first loader that accepts its
//! extension and reports `UnsupportedFormat` otherwise.
//!
//! ```rust,ignore
//! use ragwatch_extract::LoaderRegistry;
//! use ragwatch_core::DocumentLoader;
//!
//! let loaders = LoaderRegistry::with_defaults();
//! let content = loaders.load(Path::new("notes.md")).await?;
//! ```

pub mod pdf;
pub mod registry;
pub mod text;

pub use pdf::PdfLoader;
pub use registry::LoaderRegistry;
pub use text::TextLoader;
