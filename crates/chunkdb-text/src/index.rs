use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use tantivy::collector::{Count, DocSetCollector};
use tantivy::query::{AllQuery, TermQuery};
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tracing::{debug, info, warn};

use chunkdb_core::error::{Error, Result};
use chunkdb_core::traits::TextIndexer;
use chunkdb_core::types::ChunkId;

use crate::tantivy_utils::{build_schema, register_tokenizer, LexicalFields};

/// Tantivy enforces a per-thread floor on the writer arena.
const MIN_WRITER_MEMORY: usize = 15_000_000;

pub(crate) fn lexical_err(e: impl std::fmt::Display) -> Error { Error::Lexical(e.to_string()) }

/// In-RAM lexical index, one tantivy document per chunk.
///
/// A single writer sits behind a mutex; every mutation commits and reloads the
/// reader before returning, so a later `score` observes it. Readers never take
/// the writer lock.
pub struct LexicalIndex {
	pub(crate) reader: IndexReader,
	writer: Mutex<IndexWriter>,
	index: Index,
	pub(crate) fields: LexicalFields,
}

impl LexicalIndex {
	pub fn new(writer_memory_bytes: usize) -> Result<Self> {
		let (schema, fields) = build_schema();
		let index = Index::create_in_ram(schema);
		register_tokenizer(&index);
		let writer: IndexWriter = index.writer_with_num_threads(1, writer_memory_bytes.max(MIN_WRITER_MEMORY)).map_err(lexical_err)?;
		let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into().map_err(lexical_err)?;
		Ok(Self { reader, writer: Mutex::new(writer), index, fields })
	}

	fn id_term(&self, chunk_id: &str) -> Term { Term::from_field_text(self.fields.chunk_id, chunk_id) }

	pub fn contains(&self, chunk_id: &str) -> Result<bool> {
		let searcher = self.reader.searcher();
		let query = TermQuery::new(self.id_term(chunk_id), IndexRecordOption::Basic);
		Ok(searcher.search(&query, &Count).map_err(lexical_err)? > 0)
	}

	/// Replace the document for `chunk_id` in one commit, so the old and new
	/// token lists are never visible together.
	pub fn add_tokens(&self, chunk_id: &str, tokens: &[String]) -> Result<()> {
		let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
		writer.delete_term(self.id_term(chunk_id));
		let staged = writer
			.add_document(doc!(self.fields.chunk_id => chunk_id.to_string(), self.fields.terms => tokens.join(" ")))
			.and_then(|_| writer.commit());
		if let Err(e) = staged {
			warn!(chunk_id, error = %e, "lexical add failed, rolling back writer");
			let _ = writer.rollback();
			return Err(lexical_err(e));
		}
		self.reader.reload().map_err(lexical_err)?;
		debug!(chunk_id, tokens = tokens.len(), "lexical document committed");
		Ok(())
	}

	pub fn remove_doc(&self, chunk_id: &str) -> Result<bool> {
		let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
		if !self.contains(chunk_id)? { return Ok(false); }
		writer.delete_term(self.id_term(chunk_id));
		if let Err(e) = writer.commit() {
			let _ = writer.rollback();
			return Err(lexical_err(e));
		}
		self.reader.reload().map_err(lexical_err)?;
		Ok(true)
	}

	/// Chunk ids of every live document, read from the index itself.
	pub fn live_ids(&self) -> Result<HashSet<ChunkId>> {
		let searcher = self.reader.searcher();
		let addresses = searcher.search(&AllQuery, &DocSetCollector).map_err(lexical_err)?;
		let mut ids = HashSet::with_capacity(addresses.len());
		for address in addresses {
			let doc: TantivyDocument = searcher.doc(address).map_err(lexical_err)?;
			if let Some(id) = doc.get_first(self.fields.chunk_id).and_then(|v| v.as_str()) { ids.insert(id.to_string()); }
		}
		Ok(ids)
	}

	pub fn num_docs(&self) -> usize { self.reader.searcher().num_docs() as usize }

	/// Merge all searchable segments so deleted documents stop counting
	/// towards document frequencies.
	pub fn merge_segments(&self) -> Result<()> {
		let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
		let segment_ids = self.index.searchable_segment_ids().map_err(lexical_err)?;
		if segment_ids.len() < 2 { return Ok(()); }
		writer.merge(&segment_ids).wait().map_err(lexical_err)?;
		let _ = writer.garbage_collect_files().wait();
		self.reader.reload().map_err(lexical_err)?;
		info!(segments = segment_ids.len(), "lexical segments merged");
		Ok(())
	}
}

impl TextIndexer for LexicalIndex {
	fn add(&self, chunk_id: &str, tokens: &[String]) -> Result<()> { self.add_tokens(chunk_id, tokens) }
	fn remove(&self, chunk_id: &str) -> Result<bool> { self.remove_doc(chunk_id) }
	fn score(&self, query_tokens: &[String]) -> Result<HashMap<ChunkId, f32>> { self.score_tokens(query_tokens) }
	fn ids(&self) -> Result<HashSet<ChunkId>> { self.live_ids() }
	fn len(&self) -> usize { self.num_docs() }
	fn compact(&self) -> Result<()> { self.merge_segments() }
}
