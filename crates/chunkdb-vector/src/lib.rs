//! chunkdb-vector
//!
//! In-process vector storage behind the `VectorIndexer` capability trait:
//! an exact-scan index with native deletion and an append-only log that
//! relies on the corpus for tombstoning.

pub mod append_log;
pub mod flat;
pub mod search;

use std::sync::Arc;

use chunkdb_core::config::VectorConfig;
use chunkdb_core::error::Result;
use chunkdb_core::traits::VectorIndexer;
use chunkdb_core::types::BackendKind;

pub use append_log::AppendLog;
pub use flat::FlatIndex;
pub use search::cosine;

/// Build the backend selected by configuration.
pub fn open_backend(config: &VectorConfig) -> Result<Arc<dyn VectorIndexer>> {
    Ok(match config.backend {
        BackendKind::Flat => Arc::new(FlatIndex::new(config.dimension, config.similarity, config.compaction_ratio)),
        BackendKind::AppendLog => match config.journal_path() {
            Some(path) => Arc::new(AppendLog::open(config.dimension, config.similarity, &path)?),
            None => Arc::new(AppendLog::in_memory(config.dimension, config.similarity)),
        },
    })
}
