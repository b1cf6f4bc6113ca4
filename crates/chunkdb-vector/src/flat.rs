use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use tracing::{debug, info};

use chunkdb_core::error::Result;
use chunkdb_core::traits::VectorIndexer;
use chunkdb_core::types::{BackendKind, ChunkId, IndexedVector, Meta, MetadataFilter, SimilarityScale, VectorHit};

use crate::search::{check_dim, top_k, Entry};

struct Slot {
	record: IndexedVector,
	metadata: Meta,
	live: bool,
}

#[derive(Default)]
struct FlatState {
	slots: Vec<Slot>,
	by_id: HashMap<ChunkId, usize>,
	tombstones: usize,
}

impl FlatState {
	fn tombstone_ratio(&self) -> f32 {
		if self.slots.is_empty() { 0.0 } else { self.tombstones as f32 / self.slots.len() as f32 }
	}

	/// Drop dead slots, keeping live ones in insertion order. Returns slots removed.
	fn rebuild(&mut self) -> usize {
		let before = self.slots.len();
		self.slots.retain(|s| s.live);
		self.by_id = self.slots.iter().enumerate().map(|(i, s)| (s.record.chunk_id.clone(), i)).collect();
		self.tombstones = 0;
		before - self.slots.len()
	}
}

/// Exact-scan vector index with native deletion.
///
/// Each chunk owns a stable slot whose position is its insertion rank.
/// Replacing a vector rewrites the slot in place under the write lock, so a
/// search sees either the old or the new vector, never both. Deletion
/// tombstones the slot; once tombstones exceed `compaction_ratio` of all
/// slots the slot vector is rebuilt.
pub struct FlatIndex {
	dim: usize,
	scale: SimilarityScale,
	compaction_ratio: f32,
	state: RwLock<FlatState>,
}

impl FlatIndex {
	pub fn new(dim: usize, scale: SimilarityScale, compaction_ratio: f32) -> Self {
		Self { dim, scale, compaction_ratio, state: RwLock::new(FlatState::default()) }
	}

	pub fn tombstone_count(&self) -> usize { self.state.read().unwrap_or_else(PoisonError::into_inner).tombstones }

	pub fn slot_count(&self) -> usize { self.state.read().unwrap_or_else(PoisonError::into_inner).slots.len() }

	pub fn needs_compaction(&self) -> bool {
		self.state.read().unwrap_or_else(PoisonError::into_inner).tombstone_ratio() > self.compaction_ratio
	}
}

impl VectorIndexer for FlatIndex {
	fn kind(&self) -> BackendKind { BackendKind::Flat }

	fn supports_delete(&self) -> bool { true }

	fn dim(&self) -> usize { self.dim }

	fn upsert(&self, record: IndexedVector, metadata: Meta) -> Result<()> {
		check_dim(self.dim, &record.vector)?;
		let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
		match state.by_id.get(&record.chunk_id).copied() {
			Some(slot) => state.slots[slot] = Slot { record, metadata, live: true },
			None => {
				let slot = state.slots.len();
				state.by_id.insert(record.chunk_id.clone(), slot);
				state.slots.push(Slot { record, metadata, live: true });
			}
		}
		Ok(())
	}

	fn delete(&self, chunk_id: &str) -> Result<bool> {
		let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
		let Some(slot) = state.by_id.remove(chunk_id) else { return Ok(false) };
		state.slots[slot].live = false;
		state.tombstones += 1;
		debug!(chunk_id, tombstones = state.tombstones, "flat slot tombstoned");
		if state.tombstone_ratio() > self.compaction_ratio {
			let removed = state.rebuild();
			info!(removed, live = state.slots.len(), "flat index compacted");
		}
		Ok(true)
	}

	fn search(&self, query: &[f32], k: usize, filter: &MetadataFilter, excluded: &HashSet<ChunkId>) -> Result<Vec<VectorHit>> {
		check_dim(self.dim, query)?;
		let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
		let entries = state.slots.iter().enumerate().filter(|(_, s)| s.live).map(|(i, s)| Entry {
			order: i as u64,
			chunk_id: &s.record.chunk_id,
			vector: &s.record.vector,
			metadata: &s.metadata,
		});
		Ok(top_k(entries, query, k, self.scale, filter, excluded))
	}

	fn get(&self, chunk_id: &str) -> Option<IndexedVector> {
		let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
		state.by_id.get(chunk_id).map(|&slot| state.slots[slot].record.clone())
	}

	fn ids(&self) -> HashSet<ChunkId> { self.state.read().unwrap_or_else(PoisonError::into_inner).by_id.keys().cloned().collect() }

	fn len(&self) -> usize { self.state.read().unwrap_or_else(PoisonError::into_inner).by_id.len() }

	fn compact(&self, dead: &HashSet<ChunkId>) -> Result<usize> {
		let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
		for chunk_id in dead {
			if let Some(slot) = state.by_id.remove(chunk_id) {
				state.slots[slot].live = false;
				state.tombstones += 1;
			}
		}
		let removed = state.rebuild();
		if removed > 0 { info!(removed, live = state.slots.len(), "flat index compacted"); }
		Ok(removed)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chunkdb_core::error::Error;

	fn rec(id: &str, v: &[f32]) -> IndexedVector { IndexedVector { chunk_id: id.into(), vector: v.to_vec(), model_id: "m".into() } }

	fn meta(content_type: &str) -> Meta { Meta::from([("content_type".to_string(), content_type.to_string())]) }

	#[test]
	fn dimension_is_enforced() {
		let index = FlatIndex::new(3, SimilarityScale::Clamped, 0.3);
		let err = index.upsert(rec("a", &[1.0, 0.0]), Meta::new()).unwrap_err();
		assert!(matches!(err, Error::DimensionMismatch { expected: 3, actual: 2 }));
		assert!(index.search(&[1.0], 5, &MetadataFilter::new(), &HashSet::new()).is_err());
		assert!(index.is_empty());
	}

	#[test]
	fn filter_applies_before_the_cut() {
		let index = FlatIndex::new(2, SimilarityScale::Clamped, 0.3);
		index.upsert(rec("t1", &[1.0, 0.0]), meta("text")).unwrap();
		index.upsert(rec("t2", &[0.9, 0.1]), meta("text")).unwrap();
		index.upsert(rec("tab", &[0.1, 0.9]), meta("table")).unwrap();

		let filter = MetadataFilter::new().eq("content_type", "table");
		let hits = index.search(&[1.0, 0.0], 1, &filter, &HashSet::new()).unwrap();
		assert_eq!(hits.len(), 1);
		assert_eq!(hits[0].chunk_id, "tab");
	}

	#[test]
	fn ties_go_to_earlier_insertion_and_replace_keeps_slot() {
		let index = FlatIndex::new(2, SimilarityScale::Clamped, 0.3);
		index.upsert(rec("first", &[1.0, 0.0]), Meta::new()).unwrap();
		index.upsert(rec("second", &[0.0, 1.0]), Meta::new()).unwrap();
		index.upsert(rec("second", &[2.0, 0.0]), Meta::new()).unwrap();
		index.upsert(rec("first", &[3.0, 0.0]), Meta::new()).unwrap();

		let hits = index.search(&[1.0, 0.0], 10, &MetadataFilter::new(), &HashSet::new()).unwrap();
		let ids: Vec<&str> = hits.iter().map(|h| h.chunk_id.as_str()).collect();
		assert_eq!(ids, vec!["first", "second"]);
		assert_eq!(index.len(), 2);
		assert_eq!(index.get("second").unwrap().vector, vec![2.0, 0.0]);
	}

	#[test]
	fn delete_is_idempotent_and_compacts_past_ratio() {
		let index = FlatIndex::new(2, SimilarityScale::Clamped, 0.3);
		for i in 0..10 { index.upsert(rec(&format!("c{i}"), &[1.0, i as f32]), Meta::new()).unwrap(); }
		assert!(index.delete("c0").unwrap());
		assert!(!index.delete("c0").unwrap());
		assert!(index.delete("c1").unwrap());
		assert!(index.delete("c2").unwrap());
		assert_eq!(index.tombstone_count(), 3);
		assert!(!index.needs_compaction());

		assert!(index.delete("c3").unwrap());
		assert_eq!(index.tombstone_count(), 0, "ratio above 0.3 triggers a rebuild");
		assert_eq!(index.slot_count(), 6);
		let hits = index.search(&[1.0, 0.0], 10, &MetadataFilter::new(), &HashSet::new()).unwrap();
		assert!(hits.iter().all(|h| h.chunk_id != "c3"));
		assert_eq!(hits.len(), 6);
	}

	#[test]
	fn excluded_ids_never_take_a_slot() {
		let index = FlatIndex::new(2, SimilarityScale::Shifted, 0.3);
		index.upsert(rec("a", &[1.0, 0.0]), Meta::new()).unwrap();
		index.upsert(rec("b", &[-1.0, 0.0]), Meta::new()).unwrap();
		let hits = index.search(&[1.0, 0.0], 1, &MetadataFilter::new(), &HashSet::from(["a".to_string()])).unwrap();
		assert_eq!(hits[0].chunk_id, "b");
		assert!(hits[0].similarity.abs() < 1e-6);
	}
}
