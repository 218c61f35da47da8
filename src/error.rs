//! Error type shared by every `docia-core` operation.

use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, DociaError>;

#[derive(Debug, Error)]
pub enum DociaError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode index artifact: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("failed to decode index artifact: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Persisted artifacts are missing. Never replaced by an empty index.
    #[error("index not initialized: no artifacts under {path}; run a full rebuild first")]
    IndexNotInitialized { path: PathBuf },

    #[error("invalid index: {reason}")]
    InvalidIndex { reason: String },

    #[error("invalid query: {reason}")]
    InvalidQuery { reason: String },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("vector dimension mismatch (expected {expected}, got {actual})")]
    VecDimensionMismatch { expected: usize, actual: usize },

    #[error("embedding model mismatch: index built with {expected}, provider is {actual}")]
    ModelMismatch { expected: String, actual: String },

    #[error("embedding provider failed: {reason}")]
    Embedding { reason: String },

    #[error("embedding provider timed out after {elapsed_ms} ms")]
    EmbeddingTimeout { elapsed_ms: u64 },

    #[error("operation cancelled by caller")]
    Cancelled,

    #[error("no document source configured")]
    DocumentSourceUnavailable,

    #[error("document source failed: {reason}")]
    DocumentSource { reason: String },

    #[error("lock error: {reason}")]
    Lock { reason: String },
}

impl DociaError {
    /// True for errors raised by the embedding provider path (failure, timeout, cancel).
    #[must_use]
    pub fn is_embedding_failure(&self) -> bool {
        matches!(
            self,
            Self::Embedding { .. } | Self::EmbeddingTimeout { .. } | Self::Cancelled
        )
    }
}
