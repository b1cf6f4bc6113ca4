//! chunkdb-text
//!
//! Tantivy-backed lexical index over pre-tokenized chunk text. Documents are
//! added and removed one chunk at a time; BM25 statistics come from the live
//! segments, so no full rebuild is ever needed.

pub mod tantivy_utils;
pub mod tokenize;
pub mod index;
pub mod search;

pub use index::LexicalIndex;
pub use tokenize::tokenize;
