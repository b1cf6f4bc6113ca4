use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::types::ChunkId;

/// Membership divergence between the corpus map and the two indexes.
///
/// Each list holds ids sorted ascending so reports are stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InconsistencyReport {
    pub missing_from_vector: Vec<ChunkId>,
    pub missing_from_lexical: Vec<ChunkId>,
    pub orphaned_in_vector: Vec<ChunkId>,
    pub orphaned_in_lexical: Vec<ChunkId>,
}

impl InconsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.missing_from_vector.is_empty()
            && self.missing_from_lexical.is_empty()
            && self.orphaned_in_vector.is_empty()
            && self.orphaned_in_lexical.is_empty()
    }
}

impl fmt::Display for InconsistencyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "missing from vector {:?}, missing from lexical {:?}, orphaned in vector {:?}, orphaned in lexical {:?}",
            self.missing_from_vector, self.missing_from_lexical, self.orphaned_in_vector, self.orphaned_in_lexical
        )
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Not found: {0}")]
    NotFound(ChunkId),

    #[error("Index inconsistency: {0}")]
    IndexInconsistency(InconsistencyReport),

    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Chunk id was deleted and cannot be reused: {0}")]
    RetiredChunk(ChunkId),

    #[error("{backend} backend does not support {operation}")]
    Unsupported { backend: String, operation: &'static str },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Lexical index error: {0}")]
    Lexical(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Operation failed: {0}")]
    Operation(String),
}

pub type Result<T> = std::result::Result<T, Error>;
