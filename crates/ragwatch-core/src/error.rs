//! Error types for ragwatch.

use std::time::Duration;

use thiserror::Error;

use crate::types::ChunkId;

/// Main error type for ragwatch operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Document loading failed
    #[error("load error: {0}")]
    Load(#[from] LoadError),

    /// Splitting failed
    #[error("chunking error: {0}")]
    Chunking(#[from] ChunkError),

    /// An embedding or generation backend failed
    #[error("provider error: {0}")]
    Provider(ProviderError),

    /// Chunk store or vector index operation failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The embedding provider returned a different number of vectors than inputs
    #[error("embedding mismatch: expected {expected} embeddings, got {actual}")]
    EmbeddingMismatch { expected: usize, actual: usize },

    /// A provider call exceeded the caller-supplied timeout
    #[error("{operation} timed out after {timeout:?}")]
    ProviderTimeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// A provider could not be reached
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The query text was empty or whitespace-only
    #[error("query text is empty")]
    EmptyQuery,

    /// A caller-supplied argument was rejected before any provider call
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<ProviderError> for Error {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Unavailable(msg) => Self::ServiceUnavailable(msg),
            other => Self::Provider(other),
        }
    }
}

/// Document loading errors.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(String),
}

/// Splitting errors.
#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("document has no text to split")]
    EmptyInput,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Errors reported by embedding and generation backends.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("backend failure: {0}")]
    Backend(String),

    #[error("unreachable: {0}")]
    Unavailable(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Chunk store and vector index errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("duplicate chunk id {0}")]
    DuplicateId(ChunkId),

    #[error("chunk {0} not found")]
    NotFound(ChunkId),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid vector: {0}")]
    InvalidVector(String),

    #[error("persisted index is corrupt: {0}")]
    Corrupt(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for ragwatch operations.
pub type Result<T> = std::result::Result<T, Error>;
