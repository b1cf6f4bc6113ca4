use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use chunkdb_core::error::{Error, Result};
use chunkdb_core::traits::VectorIndexer;
use chunkdb_core::types::{BackendKind, ChunkId, IndexedVector, Meta, MetadataFilter, SimilarityScale, VectorHit};

use crate::search::{check_dim, top_k, Entry};

/// One journal line. `order` is the chunk's first-insertion rank, carried so
/// replay reproduces tie-breaking.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LogRecord {
	order: u64,
	#[serde(flatten)]
	record: IndexedVector,
	metadata: Meta,
}

#[derive(Default)]
struct LogState {
	records: Vec<LogRecord>,
	latest: HashMap<ChunkId, usize>,
	next_order: u64,
	journal: Option<BufWriter<File>>,
}

impl LogState {
	fn apply(&mut self, rec: LogRecord) {
		self.next_order = self.next_order.max(rec.order + 1);
		self.latest.insert(rec.record.chunk_id.clone(), self.records.len());
		self.records.push(rec);
	}
}

/// Append-only vector log without native deletion.
///
/// Every upsert appends a record; only the latest record per chunk is
/// searchable. `delete` is unsupported, the caller passes dead ids to
/// `search` as exclusions and later to `compact`, which rewrites the log
/// (and the journal, when one is configured) without them.
pub struct AppendLog {
	dim: usize,
	scale: SimilarityScale,
	journal_path: Option<PathBuf>,
	state: RwLock<LogState>,
}

impl AppendLog {
	pub fn in_memory(dim: usize, scale: SimilarityScale) -> Self {
		Self { dim, scale, journal_path: None, state: RwLock::new(LogState::default()) }
	}

	/// Open a journaled log, replaying any records already on disk.
	///
	/// A torn final line from an interrupted append is dropped and the file
	/// truncated to the last whole record; a bad line anywhere else is an error.
	pub fn open(dim: usize, scale: SimilarityScale, path: &Path) -> Result<Self> {
		let mut state = LogState::default();
		if path.exists() {
			let text = fs::read_to_string(path)?;
			let mut offset = 0usize;
			for (line_no, line) in text.split_inclusive('\n').enumerate() {
				let is_last = offset + line.len() == text.len();
				let body = line.trim();
				if !body.is_empty() {
					match serde_json::from_str::<LogRecord>(body) {
						Ok(rec) if line.ends_with('\n') => {
							check_dim(dim, &rec.record.vector)?;
							state.apply(rec);
						}
						Err(e) if !is_last => return Err(Error::Operation(format!("{}:{}: {}", path.display(), line_no + 1, e))),
						_ => {
							warn!(path = %path.display(), line = line_no + 1, "dropping torn journal tail");
							OpenOptions::new().write(true).open(path)?.set_len(offset as u64)?;
							break;
						}
					}
				}
				offset += line.len();
			}
			info!(path = %path.display(), records = state.records.len(), live = state.latest.len(), "append log replayed");
		} else if let Some(parent) = path.parent() {
			if !parent.as_os_str().is_empty() { fs::create_dir_all(parent)?; }
		}
		let file = OpenOptions::new().create(true).append(true).open(path)?;
		state.journal = Some(BufWriter::new(file));
		Ok(Self { dim, scale, journal_path: Some(path.to_path_buf()), state: RwLock::new(state) })
	}

	/// Records held, including superseded ones not yet compacted away.
	pub fn record_count(&self) -> usize { self.state.read().unwrap_or_else(PoisonError::into_inner).records.len() }

	fn rewrite_journal(&self, path: &Path, records: &[LogRecord]) -> Result<BufWriter<File>> {
		let tmp = path.with_extension("jsonl.tmp");
		{
			let mut out = BufWriter::new(File::create(&tmp)?);
			for rec in records {
				serde_json::to_writer(&mut out, rec)?;
				out.write_all(b"\n")?;
			}
			out.flush()?;
		}
		fs::rename(&tmp, path)?;
		Ok(BufWriter::new(OpenOptions::new().append(true).open(path)?))
	}
}

impl VectorIndexer for AppendLog {
	fn kind(&self) -> BackendKind { BackendKind::AppendLog }

	fn supports_delete(&self) -> bool { false }

	fn dim(&self) -> usize { self.dim }

	fn upsert(&self, record: IndexedVector, metadata: Meta) -> Result<()> {
		check_dim(self.dim, &record.vector)?;
		let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
		let order = match state.latest.get(&record.chunk_id) {
			Some(&idx) => state.records[idx].order,
			None => state.next_order,
		};
		let rec = LogRecord { order, record, metadata };
		if let Some(journal) = state.journal.as_mut() {
			let mut line = serde_json::to_vec(&rec)?;
			line.push(b'\n');
			journal.write_all(&line)?;
			journal.flush()?;
		}
		state.apply(rec);
		Ok(())
	}

	fn delete(&self, _chunk_id: &str) -> Result<bool> {
		Err(Error::Unsupported { backend: BackendKind::AppendLog.to_string(), operation: "delete" })
	}

	fn search(&self, query: &[f32], k: usize, filter: &MetadataFilter, excluded: &HashSet<ChunkId>) -> Result<Vec<VectorHit>> {
		check_dim(self.dim, query)?;
		let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
		let entries = state.latest.values().map(|&idx| {
			let rec = &state.records[idx];
			Entry { order: rec.order, chunk_id: &rec.record.chunk_id, vector: &rec.record.vector, metadata: &rec.metadata }
		});
		Ok(top_k(entries, query, k, self.scale, filter, excluded))
	}

	fn get(&self, chunk_id: &str) -> Option<IndexedVector> {
		let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
		state.latest.get(chunk_id).map(|&idx| state.records[idx].record.clone())
	}

	fn ids(&self) -> HashSet<ChunkId> { self.state.read().unwrap_or_else(PoisonError::into_inner).latest.keys().cloned().collect() }

	fn len(&self) -> usize { self.state.read().unwrap_or_else(PoisonError::into_inner).latest.len() }

	fn compact(&self, dead: &HashSet<ChunkId>) -> Result<usize> {
		let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
		let before = state.records.len();
		let mut kept: Vec<LogRecord> = state
			.latest
			.iter()
			.filter(|(id, _)| !dead.contains(*id))
			.map(|(_, &idx)| state.records[idx].clone())
			.collect();
		kept.sort_by_key(|r| r.order);

		if let Some(path) = &self.journal_path {
			state.journal = None;
			match self.rewrite_journal(path, &kept) {
				Ok(journal) => state.journal = Some(journal),
				Err(e) => {
					warn!(path = %path.display(), error = %e, "journal rewrite failed, reopening for append");
					state.journal = Some(BufWriter::new(OpenOptions::new().create(true).append(true).open(path)?));
					return Err(e);
				}
			}
		}

		let next_order = state.next_order;
		let mut rebuilt = LogState { journal: state.journal.take(), ..LogState::default() };
		for rec in kept { rebuilt.apply(rec); }
		rebuilt.next_order = rebuilt.next_order.max(next_order);
		*state = rebuilt;
		let removed = before - state.records.len();
		info!(removed, live = state.latest.len(), "append log compacted");
		Ok(removed)
	}
}
