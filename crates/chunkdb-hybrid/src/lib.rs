//! chunkdb-hybrid
//!
//! Corpus coordination, hybrid ranking and the ingestion pipeline, plus
//! [`ChunkDb`], which wires them from [`Settings`].

pub mod corpus;
pub mod ingest;
pub mod ranker;
pub mod scoring;

use std::sync::Arc;

use tracing::info;

use chunkdb_core::config::Settings;
use chunkdb_core::error::{Error, Result};
use chunkdb_core::traits::{Embedder, TextIndexer};
use chunkdb_embed::EmbedPool;
use chunkdb_text::LexicalIndex;

pub use corpus::{ChunkFailure, Coordinator, CorpusStats, IndexedChunk, IngestReport};
pub use ingest::Ingestor;
pub use ranker::{HybridRanker, SearchMetadata, SearchResponse};

/// Corpus, ranker and ingestor sharing one embedder.
pub struct ChunkDb {
    pub corpus: Arc<Coordinator>,
    pub ranker: HybridRanker,
    pub ingestor: Ingestor,
}

impl ChunkDb {
    pub fn build(settings: &Settings, embedder: Arc<dyn Embedder>) -> Result<Self> {
        settings.validate()?;
        if embedder.dim() != settings.vector.dimension {
            return Err(Error::InvalidConfig(format!(
                "embedder produces {} dimensions, vector.dimension is {}",
                embedder.dim(),
                settings.vector.dimension
            )));
        }
        if embedder.model_id() != settings.vector.model_id {
            return Err(Error::InvalidConfig(format!(
                "embedder model '{}' does not match vector.model_id '{}'",
                embedder.model_id(),
                settings.vector.model_id
            )));
        }
        let vector = chunkdb_vector::open_backend(&settings.vector)?;
        let lexical: Arc<dyn TextIndexer> = Arc::new(LexicalIndex::new(settings.lexical.writer_memory_bytes)?);
        let corpus = Arc::new(
            Coordinator::new(vector, lexical, embedder.model_id()).with_compaction_ratio(settings.vector.compaction_ratio),
        );
        let pool = EmbedPool::new(embedder.clone(), settings.ingest.batch_size, settings.ingest.max_workers);
        info!(backend = %settings.vector.backend, dimension = settings.vector.dimension, model = embedder.model_id(), "chunkdb ready");
        Ok(Self {
            ranker: HybridRanker::new(corpus.clone(), embedder, settings.retrieval.clone()),
            ingestor: Ingestor::new(corpus.clone(), pool),
            corpus,
        })
    }
}
