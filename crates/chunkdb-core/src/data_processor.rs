//! Chunk record preparation: text cleaning, size metadata, embedding input
//! text, and loading chunk records emitted by the ingestion collaborator as
//! JSON lines.
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::types::{Chunk, ContentType};

const KEPT_PUNCTUATION: &str = ".,!?;:-";

/// Normalize text for embedding and lexical indexing.
///
/// Collapses whitespace, removes everything except word characters, whitespace
/// and `.,!?;:-`, then drops words shorter than two characters unless the word
/// is one of the kept punctuation marks.
pub fn clean_text(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let stripped: String = collapsed
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace() || KEPT_PUNCTUATION.contains(*c))
        .collect();
    stripped
        .split_whitespace()
        .filter(|w| w.chars().count() >= 2 || KEPT_PUNCTUATION.contains(*w))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn word_count(text: &str) -> usize { text.split_whitespace().count() }

/// Text handed to the embedding model, with type-specific context prepended.
pub fn embedding_text(chunk: &Chunk) -> String {
    let body = chunk.lexical_text();
    match chunk.content_type {
        ContentType::Text => body.to_string(),
        ContentType::Table => {
            let table = chunk.table.clone().unwrap_or_default();
            let mut text = format!("Table with {} rows and {} columns. ", table.rows, table.columns);
            if !table.headers.is_empty() { text.push_str(&format!("Headers: {}. ", table.headers.join(", "))); }
            text.push_str(body);
            text
        }
        ContentType::Image => {
            let confidence = chunk.image.as_ref().map(|i| i.ocr_confidence).unwrap_or(0.0);
            format!("Image content extracted via OCR (confidence: {:.2}). {}", confidence, body)
        }
    }
}

#[derive(Default)]
pub struct DataProcessor;

impl DataProcessor {
    pub fn new() -> Self { Self }

    /// Fill derived fields the producer left empty.
    pub fn normalize(&self, mut chunk: Chunk) -> Chunk {
        if chunk.cleaned_content.trim().is_empty() { chunk.cleaned_content = clean_text(&chunk.content); }
        if chunk.word_count == 0 { chunk.word_count = word_count(&chunk.content); }
        if chunk.char_count == 0 { chunk.char_count = chunk.content.chars().count(); }
        if chunk.content_type == ContentType::Table {
            if let Some(table) = chunk.table.as_mut() {
                if table.columns == 0 { table.columns = table.headers.len(); }
            }
        }
        chunk
    }

    /// Parse one JSON-lines file of chunk records. Blank lines are skipped.
    pub fn load_file(&self, path: &Path) -> Result<Vec<Chunk>> {
        let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let mut chunks = Vec::new();
        for (line_no, line) in raw.lines().enumerate() {
            if line.trim().is_empty() { continue; }
            let chunk: Chunk = serde_json::from_str(line)
                .with_context(|| format!("{}:{}: invalid chunk record", path.display(), line_no + 1))?;
            chunks.push(self.normalize(chunk));
        }
        Ok(chunks)
    }

    /// Load a single `.jsonl` file, or every `.jsonl` file under a directory in path order.
    pub fn load(&self, path: &Path) -> Result<Vec<Chunk>> {
        if path.is_file() { return self.load_file(path); }
        let mut all_chunks = Vec::new();
        for file in self.list_jsonl_files(path) {
            all_chunks.extend(self.load_file(&file)?);
        }
        Ok(all_chunks)
    }

    fn list_jsonl_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(root).into_iter().filter_map(|e| e.ok()).filter(|e| e.file_type().is_file()) {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) == Some("jsonl") { files.push(path.to_path_buf()); }
        }
        files.sort();
        files
    }
}
