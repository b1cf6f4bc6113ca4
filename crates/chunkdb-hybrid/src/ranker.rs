use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, instrument, warn};

use chunkdb_core::config::RetrievalConfig;
use chunkdb_core::error::Result;
use chunkdb_core::traits::Embedder;
use chunkdb_core::types::{ChunkId, QueryFilters, RetrievalResult, VectorHit};
use chunkdb_embed::embed_query;

use crate::corpus::{Coordinator, IndexedChunk};
use crate::scoring::{self, QueryContext};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchMetadata {
    pub query: String,
    pub total_results: usize,
    pub retrieval_time_ms: u64,
    pub semantic_candidates: usize,
    pub lexical_candidates: usize,
    pub merged_candidates: usize,
    pub semantic_degraded: bool,
    pub lexical_degraded: bool,
    pub filters: QueryFilters,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResponse {
    pub results: Vec<RetrievalResult>,
    pub metadata: SearchMetadata,
}

struct Candidate {
    entry: Arc<IndexedChunk>,
    semantic: f32,
    lexical: f32,
}

/// Runs both sub-queries, merges candidates by chunk id and applies the
/// hybrid score, filters, threshold and final cut.
pub struct HybridRanker {
    corpus: Arc<Coordinator>,
    embedder: Arc<dyn Embedder>,
    config: RetrievalConfig,
}

impl HybridRanker {
    pub fn new(corpus: Arc<Coordinator>, embedder: Arc<dyn Embedder>, config: RetrievalConfig) -> Self {
        Self { corpus, embedder, config }
    }

    pub fn config(&self) -> &RetrievalConfig { &self.config }

    pub async fn rank(&self, query: &str, filters: &QueryFilters) -> Result<Vec<RetrievalResult>> {
        Ok(self.search(query, filters).await?.results)
    }

    #[instrument(skip(self, filters))]
    pub async fn search(&self, query: &str, filters: &QueryFilters) -> Result<SearchResponse> {
        let started = Instant::now();
        let ctx = QueryContext::new(query, &self.config);
        let mut metadata = SearchMetadata {
            query: query.to_string(),
            total_results: 0,
            retrieval_time_ms: 0,
            semantic_candidates: 0,
            lexical_candidates: 0,
            merged_candidates: 0,
            semantic_degraded: false,
            lexical_degraded: false,
            filters: filters.clone(),
        };
        if self.corpus.is_empty() {
            metadata.retrieval_time_ms = started.elapsed().as_millis() as u64;
            return Ok(SearchResponse { results: Vec::new(), metadata });
        }

        let vector_filters = filters.vector_filters();
        let semantic = async {
            let timeout = Duration::from_millis(self.config.embed_timeout_ms);
            let query_vector = embed_query(self.embedder.clone(), query.to_string(), timeout).await?;
            self.corpus.vector_search_any(&query_vector, self.config.k_retrieve, &vector_filters)
        };
        let lexical = async { self.corpus.lexical_scores(&ctx.tokens) };
        let (semantic, lexical) = tokio::join!(semantic, lexical);

        let semantic_hits = semantic.unwrap_or_else(|e| {
            warn!(error = %e, "semantic retrieval unavailable, ranking lexically");
            metadata.semantic_degraded = true;
            Vec::new()
        });
        let lexical_scores = lexical.unwrap_or_else(|e| {
            warn!(error = %e, "lexical retrieval unavailable, ranking semantically");
            metadata.lexical_degraded = true;
            HashMap::new()
        });

        let candidates = self.merge(&semantic_hits, &lexical_scores, filters, &mut metadata);
        metadata.merged_candidates = candidates.len();

        let mut scored: Vec<RetrievalResult> = candidates
            .into_iter()
            .filter(|c| filters.admits(&c.entry.chunk))
            .filter_map(|c| {
                let chunk = &c.entry.chunk;
                let (breakdown, final_score) = scoring::score(&self.config, &ctx, chunk, &c.entry.content_tokens, c.semantic, c.lexical);
                (final_score >= self.config.similarity_threshold).then(|| RetrievalResult {
                    chunk_id: chunk.chunk_id.clone(),
                    content: chunk.content.clone(),
                    content_type: chunk.content_type,
                    page_number: chunk.page_number,
                    final_score,
                    score_breakdown: breakdown,
                })
            })
            .collect();
        scored.sort_by(|a, b| b.final_score.total_cmp(&a.final_score));
        scored.truncate(self.config.rerank_k);

        metadata.total_results = scored.len();
        metadata.retrieval_time_ms = started.elapsed().as_millis() as u64;
        debug!(
            results = scored.len(),
            semantic = metadata.semantic_candidates,
            lexical = metadata.lexical_candidates,
            elapsed_ms = metadata.retrieval_time_ms,
            "query ranked"
        );
        Ok(SearchResponse { results: scored, metadata })
    }

    /// Semantic hits first in similarity order, then lexical-only hits by
    /// (score desc, ingestion order asc). Ids no longer in the corpus are
    /// dropped, as are lexical-only hits the filters reject, so they never
    /// take a candidate slot.
    fn merge(
        &self,
        semantic_hits: &[VectorHit],
        lexical_scores: &HashMap<ChunkId, f32>,
        filters: &QueryFilters,
        metadata: &mut SearchMetadata,
    ) -> Vec<Candidate> {
        let ids = semantic_hits.iter().map(|h| h.chunk_id.as_str()).chain(lexical_scores.keys().map(String::as_str));
        let records = self.corpus.lookup(ids);

        let mut merged = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        for hit in semantic_hits {
            let Some(entry) = records.get(&hit.chunk_id) else { continue };
            if !seen.insert(hit.chunk_id.as_str()) { continue; }
            let lexical = lexical_scores.get(&hit.chunk_id).copied().unwrap_or(0.0);
            merged.push(Candidate { entry: entry.clone(), semantic: hit.similarity, lexical });
        }
        metadata.semantic_candidates = merged.len();

        let mut lexical_only: Vec<(&Arc<IndexedChunk>, f32)> = lexical_scores
            .iter()
            .filter_map(|(id, score)| records.get(id).map(|entry| (entry, *score)))
            .filter(|(entry, _)| filters.admits(&entry.chunk))
            .collect();
        lexical_only.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.seq.cmp(&b.0.seq)));
        lexical_only.truncate(self.config.k_retrieve);
        metadata.lexical_candidates = lexical_only.len();

        for (entry, score) in lexical_only {
            if seen.contains(entry.chunk.chunk_id.as_str()) { continue; }
            merged.push(Candidate { entry: entry.clone(), semantic: 0.0, lexical: score });
        }
        merged
    }
}
