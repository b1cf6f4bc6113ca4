use std::collections::HashMap;

use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::{TantivyDocument, Term};

use chunkdb_core::error::Result;
use chunkdb_core::types::ChunkId;

use crate::index::{lexical_err, LexicalIndex};

impl LexicalIndex {
	/// BM25 score for every live chunk matching at least one query token.
	///
	/// Each query token is a `Should` clause, so repeated tokens count once per
	/// occurrence. Empty corpus or empty query yields an empty map.
	pub fn score_tokens(&self, query_tokens: &[String]) -> Result<HashMap<ChunkId, f32>> {
		if query_tokens.is_empty() { return Ok(HashMap::new()); }
		let searcher = self.reader.searcher();
		let live_docs = searcher.num_docs() as usize;
		if live_docs == 0 { return Ok(HashMap::new()); }

		let clauses: Vec<(Occur, Box<dyn Query>)> = query_tokens
			.iter()
			.map(|token| {
				let term = Term::from_field_text(self.fields.terms, token);
				(Occur::Should, Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs)) as Box<dyn Query>)
			})
			.collect();
		let query = BooleanQuery::new(clauses);
		let top_docs = searcher.search(&query, &TopDocs::with_limit(live_docs)).map_err(lexical_err)?;

		let mut scores = HashMap::with_capacity(top_docs.len());
		for (score, address) in top_docs {
			let doc: TantivyDocument = searcher.doc(address).map_err(lexical_err)?;
			if let Some(id) = doc.get_first(self.fields.chunk_id).and_then(|v| v.as_str()) { scores.insert(id.to_string(), score); }
		}
		Ok(scores)
	}
}

#[cfg(test)]
mod tests {
	use crate::{tokenize, LexicalIndex};
	use chunkdb_core::traits::TextIndexer;

	#[test]
	fn empty_corpus_scores_nothing() {
		let index = LexicalIndex::new(0).unwrap();
		assert!(index.score(&tokenize("anything at all")).unwrap().is_empty());
	}

	#[test]
	fn rarer_terms_weigh_more() {
		let index = LexicalIndex::new(0).unwrap();
		index.add("a", &tokenize("revenue revenue growth")).unwrap();
		index.add("b", &tokenize("growth outlook")).unwrap();
		index.add("c", &tokenize("unrelated words here")).unwrap();

		let scores = index.score(&tokenize("revenue growth")).unwrap();
		assert_eq!(scores.len(), 2);
		assert!(!scores.contains_key("c"));
		assert!(scores["a"] > scores["b"]);
		assert!(index.score(&[]).unwrap().is_empty());
	}
}
