use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::types::{BackendKind, ChunkId, IndexedVector, Meta, MetadataFilter, VectorHit};

/// External embedding capability: text in, fixed-length vector out.
///
/// Implementations must return vectors of `dim()` length for every input.
pub trait Embedder: Send + Sync {
    fn model_id(&self) -> &str;
    fn dim(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vector"))
    }
}

/// Keyword index over pre-tokenized chunk text.
pub trait TextIndexer: Send + Sync {
    /// Adds or replaces the token list for `chunk_id`.
    fn add(&self, chunk_id: &str, tokens: &[String]) -> Result<()>;
    /// Returns whether the chunk was present. Absent ids are not an error.
    fn remove(&self, chunk_id: &str) -> Result<bool>;
    /// Raw relevance per matching chunk. Empty corpus or empty query yields an empty map.
    fn score(&self, query_tokens: &[String]) -> Result<HashMap<ChunkId, f32>>;
    fn ids(&self) -> Result<HashSet<ChunkId>>;
    fn len(&self) -> usize;

    /// Reclaims space held by removed documents. Never changes membership.
    fn compact(&self) -> Result<()> { Ok(()) }

    fn is_empty(&self) -> bool { self.len() == 0 }
}

/// Vector storage capability shared by every backend variant.
///
/// Backends without native deletion report `supports_delete() == false` and
/// return `Error::Unsupported` from `delete`; the corpus then tombstones ids
/// and passes them as `excluded` to `search`.
pub trait VectorIndexer: Send + Sync {
    fn kind(&self) -> BackendKind;
    fn supports_delete(&self) -> bool;
    fn dim(&self) -> usize;
    /// Inserts or atomically replaces the vector for `record.chunk_id`.
    fn upsert(&self, record: IndexedVector, metadata: Meta) -> Result<()>;
    fn delete(&self, chunk_id: &str) -> Result<bool>;
    /// Up to `k` hits by descending similarity, ties by insertion order.
    /// Filtered and excluded entries never take a slot.
    fn search(&self, query: &[f32], k: usize, filter: &MetadataFilter, excluded: &HashSet<ChunkId>) -> Result<Vec<VectorHit>>;
    fn get(&self, chunk_id: &str) -> Option<IndexedVector>;
    fn ids(&self) -> HashSet<ChunkId>;
    fn len(&self) -> usize;
    /// Physically drops records for `dead` ids plus any internal garbage; returns records removed.
    fn compact(&self, dead: &HashSet<ChunkId>) -> Result<usize>;

    fn is_empty(&self) -> bool { self.len() == 0 }
}
