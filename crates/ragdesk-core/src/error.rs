use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to extract text from {}: {reason}", path.display())]
    Extraction { path: PathBuf, reason: String },

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Dimension mismatch: index expects {expected}D vectors, got {actual}D")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid query: index expects {expected}D query vector, got {actual}D")]
    InvalidQuery { expected: usize, actual: usize },

    #[error("Invalid vector: {0}")]
    InvalidVector(String),

    #[error("Vector/chunk count mismatch: {vectors} vectors for {chunks} chunks")]
    LengthMismatch { vectors: usize, chunks: usize },

    #[error("Index persistence failed at {}: {reason}", path.display())]
    Persistence { path: PathBuf, reason: String },

    #[error("Too many documents: at most {max} per session, got {given}")]
    TooManyDocuments { max: usize, given: usize },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation failed: {0}")]
    Operation(String),
}

impl Error {
    pub fn extraction(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Extraction { path: path.into(), reason: reason.to_string() }
    }

    pub fn persistence(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Persistence { path: path.into(), reason: reason.to_string() }
    }

    /// Whether ingestion of a batch can move on to the next document after this error.
    pub fn is_document_scoped(&self) -> bool {
        matches!(self, Self::Extraction { .. } | Self::Embedding(_) | Self::Persistence { .. } | Self::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
