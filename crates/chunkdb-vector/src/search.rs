use std::cmp::Ordering;
use std::collections::HashSet;

use chunkdb_core::error::{Error, Result};
use chunkdb_core::types::{ChunkId, Meta, MetadataFilter, SimilarityScale, VectorHit};

/// Raw cosine similarity in [-1, 1]. Zero-length or degenerate vectors score 0.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
	let (mut dot, mut na, mut nb) = (0f32, 0f32, 0f32);
	for (x, y) in a.iter().zip(b) { dot += x * y; na += x * x; nb += y * y; }
	if na <= f32::EPSILON || nb <= f32::EPSILON { return 0.0; }
	let cos = dot / (na.sqrt() * nb.sqrt());
	if cos.is_finite() { cos.clamp(-1.0, 1.0) } else { 0.0 }
}

pub(crate) fn check_dim(expected: usize, vector: &[f32]) -> Result<()> {
	if vector.len() != expected { return Err(Error::DimensionMismatch { expected, actual: vector.len() }); }
	Ok(())
}

/// One searchable entry as seen by [`top_k`]; `order` is the insertion rank.
pub(crate) struct Entry<'a> {
	pub order: u64,
	pub chunk_id: &'a ChunkId,
	pub vector: &'a [f32],
	pub metadata: &'a Meta,
}

/// Exact top-k: filter and exclusion first, then sort by similarity desc with
/// earlier insertion winning ties, then cut to `k`.
pub(crate) fn top_k<'a>(
	entries: impl Iterator<Item = Entry<'a>>,
	query: &[f32],
	k: usize,
	scale: SimilarityScale,
	filter: &MetadataFilter,
	excluded: &HashSet<ChunkId>,
) -> Vec<VectorHit> {
	if k == 0 { return Vec::new(); }
	let mut scored: Vec<(f32, Entry<'a>)> = entries
		.filter(|e| !excluded.contains(e.chunk_id) && filter.matches(e.metadata))
		.map(|e| (scale.apply(cosine(query, e.vector)), e))
		.collect();
	scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal).then(a.1.order.cmp(&b.1.order)));
	scored
		.into_iter()
		.take(k)
		.map(|(similarity, e)| VectorHit { chunk_id: e.chunk_id.clone(), similarity, metadata: e.metadata.clone() })
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cosine_handles_degenerate_input() {
		assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
		assert!((cosine(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-6);
		assert!((cosine(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
	}

	#[test]
	fn scale_maps_into_unit_interval() {
		assert_eq!(SimilarityScale::Clamped.apply(-0.4), 0.0);
		assert!((SimilarityScale::Shifted.apply(-1.0)).abs() < 1e-6);
		assert!((SimilarityScale::Shifted.apply(0.0) - 0.5).abs() < 1e-6);
	}
}
