use tantivy::schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED, STRING};
use tantivy::tokenizer::{TextAnalyzer, WhitespaceTokenizer};
use tantivy::Index;

/// Analyzer name for the token field. Input is already tokenized, so the
/// analyzer only splits on whitespace.
pub const TOKEN_ANALYZER: &str = "chunk_terms";

#[derive(Debug, Clone, Copy)]
pub struct LexicalFields {
	pub chunk_id: Field,
	pub terms: Field,
}

pub fn build_schema() -> (Schema, LexicalFields) {
	let mut schema_builder = Schema::builder();
	let chunk_id = schema_builder.add_text_field("chunk_id", STRING | STORED);
	let terms_indexing = TextFieldIndexing::default().set_tokenizer(TOKEN_ANALYZER).set_index_option(IndexRecordOption::WithFreqs);
	let terms = schema_builder.add_text_field("terms", TextOptions::default().set_indexing_options(terms_indexing));
	(schema_builder.build(), LexicalFields { chunk_id, terms })
}

pub fn register_tokenizer(index: &Index) {
	let tokenizer = TextAnalyzer::builder(WhitespaceTokenizer::default()).build();
	index.tokenizers().register(TOKEN_ANALYZER, tokenizer);
}
