use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use twox_hash::XxHash64;

use chunkdb_core::error::{Error, InconsistencyReport, Result};
use chunkdb_core::traits::{TextIndexer, VectorIndexer};
use chunkdb_core::types::{BackendKind, Chunk, ChunkId, IndexedVector, MetadataFilter, VectorHit};
use chunkdb_text::tokenize;

const STRIPES: usize = 64;

/// A chunk as held by the corpus, with the derived data ranking needs.
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub chunk: Chunk,
    /// Ingestion rank; kept across replacement so tie-breaking is stable.
    pub seq: u64,
    pub lexical_tokens: Vec<String>,
    pub content_tokens: HashSet<String>,
}

#[derive(Debug)]
pub struct ChunkFailure {
    pub chunk_id: ChunkId,
    pub error: Error,
}

#[derive(Debug, Default)]
pub struct IngestReport {
    pub ingested: Vec<ChunkId>,
    pub failed: Vec<ChunkFailure>,
}

impl IngestReport {
    pub fn merge(&mut self, other: IngestReport) {
        self.ingested.extend(other.ingested);
        self.failed.extend(other.failed);
    }

    pub fn is_complete(&self) -> bool { self.failed.is_empty() }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorpusStats {
    pub chunks: usize,
    pub vector_entries: usize,
    pub lexical_documents: usize,
    pub tombstones: usize,
    pub retired: usize,
    pub backend: BackendKind,
    pub dimension: usize,
    pub model_id: String,
}

/// Owner of the authoritative chunk map and the only writer of both indexes.
///
/// Mutations of one chunk id are serialized on a striped lock; different ids
/// proceed in parallel. A chunk enters the map only after both indexes hold
/// it and leaves the map before either index drops it, and queries only
/// surface ids present in the map, so a chunk is never visible through just
/// one index.
pub struct Coordinator {
    vector: Arc<dyn VectorIndexer>,
    lexical: Arc<dyn TextIndexer>,
    model_id: String,
    compaction_ratio: f32,
    chunks: RwLock<HashMap<ChunkId, Arc<IndexedChunk>>>,
    retired: RwLock<HashSet<ChunkId>>,
    tombstones: RwLock<HashSet<ChunkId>>,
    next_seq: AtomicU64,
    stripes: Vec<Mutex<()>>,
}

impl Coordinator {
    /// Vectors already held by the backend (a replayed journal) have no corpus
    /// record yet, so they start out tombstoned and never take a search slot.
    /// Ingesting one of those ids again revives it.
    pub fn new(vector: Arc<dyn VectorIndexer>, lexical: Arc<dyn TextIndexer>, model_id: impl Into<String>) -> Self {
        let inherited = vector.ids();
        if !inherited.is_empty() {
            warn!(vectors = inherited.len(), "backend holds vectors with no corpus record, tombstoning them");
        }
        Self {
            vector,
            lexical,
            model_id: model_id.into(),
            compaction_ratio: 0.3,
            chunks: RwLock::new(HashMap::new()),
            retired: RwLock::new(HashSet::new()),
            tombstones: RwLock::new(inherited),
            next_seq: AtomicU64::new(0),
            stripes: (0..STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Tombstone ratio above which `remove` compacts a backend without native delete.
    pub fn with_compaction_ratio(mut self, ratio: f32) -> Self { self.compaction_ratio = ratio; self }

    pub fn dim(&self) -> usize { self.vector.dim() }

    pub fn model_id(&self) -> &str { &self.model_id }

    fn stripe(&self, chunk_id: &str) -> MutexGuard<'_, ()> {
        let mut hasher = XxHash64::with_seed(0);
        chunk_id.hash(&mut hasher);
        let idx = (hasher.finish() as usize) % self.stripes.len();
        self.stripes[idx].lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_all(&self) -> Vec<MutexGuard<'_, ()>> {
        self.stripes.iter().map(|s| s.lock().unwrap_or_else(PoisonError::into_inner)).collect()
    }

    fn map(&self) -> std::sync::RwLockReadGuard<'_, HashMap<ChunkId, Arc<IndexedChunk>>> {
        self.chunks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_retired(&self, chunk_id: &str) -> bool { self.retired.read().unwrap_or_else(PoisonError::into_inner).contains(chunk_id) }

    /// Index each chunk with its vector. Chunks succeed or fail independently;
    /// a failed chunk is rolled back from every store it reached.
    #[instrument(skip_all, fields(chunks = chunks.len()))]
    pub fn ingest(&self, chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<IngestReport> {
        if chunks.len() != vectors.len() {
            return Err(Error::InvalidInput(format!("{} chunks but {} vectors", chunks.len(), vectors.len())));
        }
        let mut report = IngestReport::default();
        for (chunk, vector) in chunks.into_iter().zip(vectors) {
            let chunk_id = chunk.chunk_id.clone();
            match self.ingest_one(chunk, vector) {
                Ok(()) => report.ingested.push(chunk_id),
                Err(error) => {
                    warn!(chunk_id = %chunk_id, error = %error, "chunk ingest failed");
                    report.failed.push(ChunkFailure { chunk_id, error });
                }
            }
        }
        info!(ingested = report.ingested.len(), failed = report.failed.len(), "ingest batch applied");
        Ok(report)
    }

    fn ingest_one(&self, chunk: Chunk, vector: Vec<f32>) -> Result<()> {
        if chunk.chunk_id.is_empty() { return Err(Error::InvalidInput("empty chunk_id".into())); }
        let _guard = self.stripe(&chunk.chunk_id);
        if self.is_retired(&chunk.chunk_id) { return Err(Error::RetiredChunk(chunk.chunk_id)); }
        if vector.len() != self.vector.dim() {
            return Err(Error::DimensionMismatch { expected: self.vector.dim(), actual: vector.len() });
        }

        let chunk_id = chunk.chunk_id.clone();
        let previous = self.map().get(&chunk_id).cloned();
        let previous_vector = self.vector.get(&chunk_id);
        let lexical_tokens = tokenize(chunk.lexical_text());
        let content_tokens: HashSet<String> = tokenize(&chunk.content).into_iter().collect();

        let record = IndexedVector { chunk_id: chunk_id.clone(), vector, model_id: self.model_id.clone() };
        self.vector.upsert(record, chunk.metadata())?;
        if let Err(e) = self.lexical.add(&chunk_id, &lexical_tokens) {
            self.rollback_vector(&chunk_id, previous.as_deref(), previous_vector);
            self.rollback_lexical(&chunk_id, previous.as_deref());
            return Err(e);
        }

        let seq = previous.as_ref().map(|p| p.seq).unwrap_or_else(|| self.next_seq.fetch_add(1, Ordering::SeqCst));
        let entry = Arc::new(IndexedChunk { chunk, seq, lexical_tokens, content_tokens });
        self.chunks.write().unwrap_or_else(PoisonError::into_inner).insert(chunk_id.clone(), entry);
        self.tombstones.write().unwrap_or_else(PoisonError::into_inner).remove(&chunk_id);
        debug!(chunk_id = %chunk_id, seq, replaced = previous.is_some(), "chunk indexed");
        Ok(())
    }

    fn rollback_vector(&self, chunk_id: &str, previous: Option<&IndexedChunk>, previous_vector: Option<IndexedVector>) {
        let restored = match (previous, previous_vector) {
            (Some(prev), Some(record)) => self.vector.upsert(record, prev.chunk.metadata()),
            _ if self.vector.supports_delete() => self.vector.delete(chunk_id).map(|_| ()),
            _ => {
                self.tombstones.write().unwrap_or_else(PoisonError::into_inner).insert(chunk_id.to_string());
                Ok(())
            }
        };
        match restored {
            Ok(()) => info!(chunk_id, "vector rolled back after lexical failure"),
            Err(e) => warn!(chunk_id, error = %e, "vector rollback failed"),
        }
    }

    /// A failed `add` may still have committed, so put the lexical store back
    /// to the previous token list, or drop the document for a new chunk.
    fn rollback_lexical(&self, chunk_id: &str, previous: Option<&IndexedChunk>) {
        let restored = match previous {
            Some(prev) => self.lexical.add(chunk_id, &prev.lexical_tokens),
            None => self.lexical.remove(chunk_id).map(|_| ()),
        };
        if let Err(e) = restored {
            warn!(chunk_id, error = %e, "lexical rollback failed");
        }
    }

    /// Remove a chunk from the map and both indexes. Returns whether anything
    /// was removed; repeating the call after a partial failure finishes the job.
    #[instrument(skip(self))]
    pub fn remove(&self, chunk_id: &str) -> Result<bool> {
        let removed = {
            let _guard = self.stripe(chunk_id);
            let in_map = self.chunks.write().unwrap_or_else(PoisonError::into_inner).remove(chunk_id).is_some();
            let was_retired = self.is_retired(chunk_id);
            if in_map || was_retired {
                self.retired.write().unwrap_or_else(PoisonError::into_inner).insert(chunk_id.to_string());
            }
            let in_vector = if self.vector.supports_delete() {
                self.vector.delete(chunk_id)?
            } else if self.vector.get(chunk_id).is_some() {
                self.tombstones.write().unwrap_or_else(PoisonError::into_inner).insert(chunk_id.to_string())
            } else {
                false
            };
            let in_lexical = self.lexical.remove(chunk_id)?;
            if (in_vector || in_lexical) && !in_map && !was_retired {
                warn!(chunk_id, in_vector, in_lexical, "removed index entries with no corpus record");
                self.retired.write().unwrap_or_else(PoisonError::into_inner).insert(chunk_id.to_string());
            }
            in_map || in_vector || in_lexical
        };
        if removed {
            debug!(chunk_id, "chunk removed");
            self.compact_if_needed()?;
        }
        Ok(removed)
    }

    pub fn get(&self, chunk_id: &str) -> Result<Chunk> {
        self.map().get(chunk_id).map(|c| c.chunk.clone()).ok_or_else(|| Error::NotFound(chunk_id.to_string()))
    }

    pub fn contains(&self, chunk_id: &str) -> bool { self.map().contains_key(chunk_id) }

    pub fn len(&self) -> usize { self.map().len() }

    pub fn is_empty(&self) -> bool { self.map().is_empty() }

    pub fn ids(&self) -> HashSet<ChunkId> { self.map().keys().cloned().collect() }

    /// Snapshot of the records for `ids` that are currently in the corpus.
    pub fn lookup<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> HashMap<ChunkId, Arc<IndexedChunk>> {
        let map = self.map();
        ids.into_iter().filter_map(|id| map.get(id).map(|c| (id.to_string(), c.clone()))).collect()
    }

    /// Vector search that never returns tombstoned ids.
    pub fn vector_search(&self, query: &[f32], k: usize, filter: &MetadataFilter) -> Result<Vec<VectorHit>> {
        let excluded = self.tombstones.read().unwrap_or_else(PoisonError::into_inner).clone();
        self.vector.search(query, k, filter, &excluded)
    }

    /// Vector search under a disjunction of filters: one search per filter,
    /// merged by similarity with earlier-ingested chunks winning ties.
    pub fn vector_search_any(&self, query: &[f32], k: usize, filters: &[MetadataFilter]) -> Result<Vec<VectorHit>> {
        match filters {
            [] => self.vector_search(query, k, &MetadataFilter::new()),
            [only] => self.vector_search(query, k, only),
            _ => {
                let mut hits = Vec::new();
                for filter in filters { hits.extend(self.vector_search(query, k, filter)?); }
                let map = self.map();
                let seq = |id: &str| map.get(id).map_or(u64::MAX, |c| c.seq);
                hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity).then_with(|| seq(&a.chunk_id).cmp(&seq(&b.chunk_id))));
                let mut seen = HashSet::new();
                hits.retain(|h| seen.insert(h.chunk_id.clone()));
                hits.truncate(k);
                Ok(hits)
            }
        }
    }

    pub fn lexical_scores(&self, query_tokens: &[String]) -> Result<HashMap<ChunkId, f32>> {
        if self.lexical.is_empty() { return Ok(HashMap::new()); }
        self.lexical.score(query_tokens)
    }

    fn tombstone_ratio(&self) -> f32 {
        let total = self.vector.len();
        if total == 0 { return 0.0; }
        self.tombstones.read().unwrap_or_else(PoisonError::into_inner).len() as f32 / total as f32
    }

    fn compact_if_needed(&self) -> Result<()> {
        if !self.vector.supports_delete() && self.tombstone_ratio() > self.compaction_ratio {
            self.compact()?;
        }
        Ok(())
    }

    /// Drop tombstoned vectors from the backend and merge lexical segments.
    #[instrument(skip(self))]
    pub fn compact(&self) -> Result<usize> {
        let _all = self.lock_all();
        let dead = self.tombstones.read().unwrap_or_else(PoisonError::into_inner).clone();
        let removed = self.vector.compact(&dead)?;
        self.tombstones.write().unwrap_or_else(PoisonError::into_inner).clear();
        if let Err(e) = self.lexical.compact() { warn!(error = %e, "lexical compaction failed"); }
        info!(tombstones = dead.len(), removed, "corpus compacted");
        Ok(removed)
    }

    /// Compare the three membership sets while no mutation is in flight.
    #[instrument(skip(self))]
    pub fn verify(&self) -> Result<()> {
        let _all = self.lock_all();
        let corpus = self.ids();
        let tombstones = self.tombstones.read().unwrap_or_else(PoisonError::into_inner).clone();
        let vector: HashSet<ChunkId> = self.vector.ids().into_iter().filter(|id| !tombstones.contains(id)).collect();
        let lexical = self.lexical.ids()?;

        let sorted = |set: HashSet<&ChunkId>| {
            let mut v: Vec<ChunkId> = set.into_iter().cloned().collect();
            v.sort();
            v
        };
        let report = InconsistencyReport {
            missing_from_vector: sorted(corpus.difference(&vector).collect()),
            missing_from_lexical: sorted(corpus.difference(&lexical).collect()),
            orphaned_in_vector: sorted(vector.difference(&corpus).collect()),
            orphaned_in_lexical: sorted(lexical.difference(&corpus).collect()),
        };
        if report.is_consistent() { return Ok(()); }
        warn!(%report, "index inconsistency detected");
        Err(Error::IndexInconsistency(report))
    }

    pub fn stats(&self) -> CorpusStats {
        CorpusStats {
            chunks: self.len(),
            vector_entries: self.vector.len(),
            lexical_documents: self.lexical.len(),
            tombstones: self.tombstones.read().unwrap_or_else(PoisonError::into_inner).len(),
            retired: self.retired.read().unwrap_or_else(PoisonError::into_inner).len(),
            backend: self.vector.kind(),
            dimension: self.vector.dim(),
            model_id: self.model_id.clone(),
        }
    }
}
