use std::hash::{Hash, Hasher};

use anyhow::Result;
use twox_hash::XxHash64;

use chunkdb_core::traits::Embedder;

pub const HASH_MODEL_ID: &str = "chunkdb/feature-hash-v1";

/// Scale `v` to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-12 {
        for x in v.iter_mut() { *x /= norm; }
    }
}

/// Bag-of-words feature hashing into `dim` buckets with a signed weight per
/// token, L2-normalized. Identical text always yields the identical vector and
/// texts sharing vocabulary have positive cosine similarity.
pub struct HashEmbedder {
    dim: usize,
    model_id: String,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self { Self { dim, model_id: HASH_MODEL_ID.to_string() } }

    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self { self.model_id = model_id.into(); self }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        if self.dim == 0 { return v; }
        let lowered = text.to_lowercase();
        for token in lowered.split(|c: char| !c.is_alphanumeric()).filter(|t| t.chars().count() > 1) {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
            v[idx] += sign * (0.5 + ((h >> 32) as u32) as f32 / u32::MAX as f32);
        }
        l2_normalize(&mut v);
        v
    }
}

impl Embedder for HashEmbedder {
    fn model_id(&self) -> &str { &self.model_id }
    fn dim(&self) -> usize { self.dim }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> { Ok(texts.iter().map(|t| self.embed_text(t)).collect()) }
}
