use std::sync::Arc;

use tracing::{info, instrument, warn};

use chunkdb_core::data_processor::{embedding_text, DataProcessor};
use chunkdb_core::error::{Error, Result};
use chunkdb_core::types::Chunk;
use chunkdb_embed::EmbedPool;

use crate::corpus::{ChunkFailure, Coordinator, IngestReport};

/// Embeds chunk batches on the worker pool and hands them to the corpus.
pub struct Ingestor {
    corpus: Arc<Coordinator>,
    pool: EmbedPool,
    processor: DataProcessor,
}

impl Ingestor {
    pub fn new(corpus: Arc<Coordinator>, pool: EmbedPool) -> Self { Self { corpus, pool, processor: DataProcessor::new() } }

    #[instrument(skip_all, fields(chunks = chunks.len()))]
    pub async fn ingest(&self, chunks: Vec<Chunk>) -> Result<IngestReport> {
        let chunks: Vec<Chunk> = chunks.into_iter().map(|c| self.processor.normalize(c)).collect();
        let texts: Vec<String> = chunks.iter().map(embedding_text).collect();
        let embedded = self.pool.embed_all(texts).await;

        let mut report = IngestReport::default();
        let batch_size = self.pool.batch_size();
        let mut remaining = chunks.into_iter();
        for outcome in embedded {
            let batch: Vec<Chunk> = remaining.by_ref().take(batch_size).collect();
            match outcome {
                Ok(vectors) => {
                    let corpus = self.corpus.clone();
                    let applied = tokio::task::spawn_blocking(move || corpus.ingest(batch, vectors))
                        .await
                        .map_err(|e| Error::Operation(format!("ingest worker failed: {e}")))??;
                    report.merge(applied);
                }
                Err(e) => {
                    warn!(error = %e, chunks = batch.len(), "embedding failed for batch");
                    let message = e.to_string();
                    report.failed.extend(batch.into_iter().map(|c| ChunkFailure {
                        chunk_id: c.chunk_id,
                        error: Error::EmbeddingUnavailable(message.clone()),
                    }));
                }
            }
        }
        info!(ingested = report.ingested.len(), failed = report.failed.len(), "ingest finished");
        Ok(report)
    }
}
