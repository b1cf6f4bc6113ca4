//! Domain types shared by the text engine, the vector engine and the hybrid ranker.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::data_processor::{clean_text, word_count};
use crate::error::Error;

pub type ChunkId = String;
pub type Meta = HashMap<String, String>;

/// Kind of content a chunk was extracted from.
///
/// Determines embedding preprocessing and the content-type boost at ranking time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Text,
    Table,
    Image,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Table => "table",
            ContentType::Image => "image",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for ContentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(ContentType::Text),
            "table" => Ok(ContentType::Table),
            "image" => Ok(ContentType::Image),
            other => Err(Error::InvalidInput(format!("unknown content type '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableMetadata {
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(default)]
    pub rows: usize,
    #[serde(default)]
    pub columns: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    #[serde(default)]
    pub ocr_confidence: f32,
    #[serde(default = "default_ocr_engine")]
    pub ocr_engine: String,
}

fn default_ocr_engine() -> String { "unknown".to_string() }
fn default_page() -> u32 { 1 }

/// The atomic retrievable unit produced by ingestion.
///
/// - `chunk_id`: globally unique, never reused once deleted
/// - `content`: original text (rendered text for tables and images)
/// - `cleaned_content`: normalized text used for embedding and lexical indexing
/// - `page_number`/`word_count`/`char_count`: positional and size metadata used in scoring
/// - `table`/`image`: type-specific metadata, present only for that content type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: ChunkId,
    pub content: String,
    #[serde(default)]
    pub cleaned_content: String,
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default = "default_page")]
    pub page_number: u32,
    #[serde(default)]
    pub word_count: usize,
    #[serde(default)]
    pub char_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<TableMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageMetadata>,
}

impl Chunk {
    /// A text chunk on page 1 with derived cleaned content and counts.
    pub fn text(chunk_id: impl Into<ChunkId>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            chunk_id: chunk_id.into(),
            cleaned_content: clean_text(&content),
            word_count: word_count(&content),
            char_count: content.chars().count(),
            content,
            content_type: ContentType::Text,
            page_number: 1,
            table: None,
            image: None,
        }
    }

    pub fn table(chunk_id: impl Into<ChunkId>, content: impl Into<String>, headers: Vec<String>, rows: usize) -> Self {
        let columns = headers.len();
        let mut chunk = Self::text(chunk_id, content);
        chunk.content_type = ContentType::Table;
        chunk.table = Some(TableMetadata { headers, rows, columns });
        chunk
    }

    pub fn image(chunk_id: impl Into<ChunkId>, content: impl Into<String>, ocr_confidence: f32, ocr_engine: impl Into<String>) -> Self {
        let mut chunk = Self::text(chunk_id, content);
        chunk.content_type = ContentType::Image;
        chunk.image = Some(ImageMetadata { ocr_confidence, ocr_engine: ocr_engine.into() });
        chunk
    }

    pub fn with_page(mut self, page_number: u32) -> Self { self.page_number = page_number; self }

    pub fn with_word_count(mut self, word_count: usize) -> Self { self.word_count = word_count; self }

    /// Text fed to the lexical index: cleaned content, or raw content when cleaning left nothing.
    pub fn lexical_text(&self) -> &str {
        if self.cleaned_content.trim().is_empty() { &self.content } else { &self.cleaned_content }
    }

    /// Flat metadata stored next to the chunk's vector and matched by search filters.
    pub fn metadata(&self) -> Meta {
        let mut meta = Meta::new();
        meta.insert("content_type".into(), self.content_type.as_str().into());
        meta.insert("page_number".into(), self.page_number.to_string());
        meta.insert("word_count".into(), self.word_count.to_string());
        meta.insert("char_count".into(), self.char_count.to_string());
        match self.content_type {
            ContentType::Table => {
                let table = self.table.clone().unwrap_or_default();
                meta.insert("table_rows".into(), table.rows.to_string());
                meta.insert("table_columns".into(), table.columns.to_string());
            }
            ContentType::Image => {
                let image = self.image.clone().unwrap_or_default();
                meta.insert("ocr_confidence".into(), format!("{:.2}", image.ocr_confidence));
                meta.insert("ocr_engine".into(), image.ocr_engine);
            }
            ContentType::Text => {}
        }
        meta
    }
}

/// One chunk's embedding as held by a vector backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedVector {
    pub chunk_id: ChunkId,
    pub vector: Vec<f32>,
    pub model_id: String,
}

/// Which vector storage variant backs the index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Exact scan with native deletion.
    #[default]
    Flat,
    /// Append-only log; deletion is synthesized by the corpus through tombstones.
    AppendLog,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Flat => f.write_str("flat"),
            BackendKind::AppendLog => f.write_str("append_log"),
        }
    }
}

/// How raw cosine similarity in [-1, 1] is reported in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityScale {
    /// Negative similarities become 0.
    #[default]
    Clamped,
    /// `(cos + 1) / 2`.
    Shifted,
}

impl SimilarityScale {
    pub fn apply(&self, cosine: f32) -> f32 {
        let scaled = match self {
            SimilarityScale::Clamped => cosine,
            SimilarityScale::Shifted => (cosine + 1.0) / 2.0,
        };
        scaled.clamp(0.0, 1.0)
    }
}

/// Conjunction of exact-match equality predicates over vector metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataFilter {
    pub equals: Vec<(String, String)>,
}

impl MetadataFilter {
    pub fn new() -> Self { Self::default() }

    pub fn eq(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.equals.push((key.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool { self.equals.is_empty() }

    pub fn matches(&self, meta: &Meta) -> bool {
        self.equals.iter().all(|(k, v)| meta.get(k).is_some_and(|m| m == v))
    }
}

/// A vector search hit; `similarity` is always in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub chunk_id: ChunkId,
    pub similarity: f32,
    pub metadata: Meta,
}

/// Caller-supplied query filters, applied by exclusion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_types: Option<BTreeSet<ContentType>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_word_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
}

impl QueryFilters {
    pub fn new() -> Self { Self::default() }

    pub fn content_types<I: IntoIterator<Item = ContentType>>(mut self, types: I) -> Self {
        self.content_types = Some(types.into_iter().collect());
        self
    }

    pub fn min_word_count(mut self, min: usize) -> Self { self.min_word_count = Some(min); self }

    pub fn page_number(mut self, page: u32) -> Self { self.page_number = Some(page); self }

    pub fn admits(&self, chunk: &Chunk) -> bool {
        if let Some(types) = &self.content_types {
            if !types.contains(&chunk.content_type) { return false; }
        }
        if let Some(min) = self.min_word_count {
            if chunk.word_count < min { return false; }
        }
        if let Some(page) = self.page_number {
            if chunk.page_number != page { return false; }
        }
        true
    }

    /// Equality filters evaluated inside the vector search, before the top-k
    /// cut. A hit must match one of them; several content types give one
    /// filter per type.
    pub fn vector_filters(&self) -> Vec<MetadataFilter> {
        let mut base = MetadataFilter::new();
        if let Some(page) = self.page_number { base = base.eq("page_number", page.to_string()); }
        match &self.content_types {
            Some(types) if !types.is_empty() => types.iter().map(|t| base.clone().eq("content_type", t.as_str())).collect(),
            _ => vec![base],
        }
    }
}

/// Per-candidate components of the hybrid score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub semantic_score: f32,
    pub lexical_score: f32,
    pub lexical_score_norm: f32,
    pub base_score: f32,
    pub content_type_boost: f32,
    pub length_normalization: f32,
    pub position_score: f32,
    pub freshness_score: f32,
    pub lexical_overlap: f32,
}

/// A ranked chunk reference handed to answer generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub chunk_id: ChunkId,
    pub content: String,
    pub content_type: ContentType,
    pub page_number: u32,
    pub final_score: f32,
    pub score_breakdown: ScoreBreakdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_metadata_is_flattened() {
        let chunk = Chunk::table("t1", "Quarter Revenue Q1 100", vec!["Quarter".into(), "Revenue".into()], 4).with_page(2);
        let meta = chunk.metadata();
        assert_eq!(meta.get("content_type").map(String::as_str), Some("table"));
        assert_eq!(meta.get("page_number").map(String::as_str), Some("2"));
        assert_eq!(meta.get("table_rows").map(String::as_str), Some("4"));
        assert_eq!(meta.get("table_columns").map(String::as_str), Some("2"));
        assert!(!meta.contains_key("ocr_engine"));
    }

    #[test]
    fn content_type_filters_are_pushed_down() {
        let filters = QueryFilters::new().content_types([ContentType::Table]).page_number(3);
        let pushed = filters.vector_filters();
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].equals.len(), 2);

        let multi = QueryFilters::new().content_types([ContentType::Table, ContentType::Image]).vector_filters();
        assert_eq!(multi.len(), 2);
        let image = Chunk::image("i", "chart", 0.9, "ocr").metadata();
        let text = Chunk::text("t", "plain words").metadata();
        assert!(multi.iter().any(|f| f.matches(&image)));
        assert!(!multi.iter().any(|f| f.matches(&text)));

        let unfiltered = QueryFilters::new().vector_filters();
        assert_eq!(unfiltered.len(), 1);
        assert!(unfiltered[0].is_empty());
    }

    #[test]
    fn filters_exclude_by_type_and_size() {
        let filters = QueryFilters::new().content_types([ContentType::Table]).min_word_count(5);
        let text = Chunk::text("a", "one two three four five six");
        let small_table = Chunk::table("b", "x y", vec![], 1);
        let table = Chunk::table("c", "alpha beta gamma delta epsilon", vec![], 1);
        assert!(!filters.admits(&text));
        assert!(!filters.admits(&small_table));
        assert!(filters.admits(&table));
    }

    #[test]
    fn similarity_scales_stay_in_unit_range() {
        assert_eq!(SimilarityScale::Clamped.apply(-0.4), 0.0);
        assert!((SimilarityScale::Shifted.apply(0.0) - 0.5).abs() < 1e-6);
        assert_eq!(SimilarityScale::Shifted.apply(1.0), 1.0);
    }

    #[test]
    fn content_type_parses_case_insensitively() {
        assert_eq!("TABLE".parse::<ContentType>().ok(), Some(ContentType::Table));
        assert!("video".parse::<ContentType>().is_err());
    }
}
