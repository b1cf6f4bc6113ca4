//! Hybrid score arithmetic. Pure functions over configuration and one
//! candidate; no index access.

use std::collections::HashSet;

use chunkdb_core::config::RetrievalConfig;
use chunkdb_core::types::{Chunk, ContentType, ScoreBreakdown};
use chunkdb_text::tokenize;

/// Per-query values shared by every candidate.
#[derive(Debug, Clone)]
pub struct QueryContext {
    pub tokens: Vec<String>,
    pub token_set: HashSet<String>,
    pub numeric_intent: bool,
    pub visual_intent: bool,
}

impl QueryContext {
    pub fn new(query: &str, config: &RetrievalConfig) -> Self {
        let lowered = query.to_lowercase();
        let tokens = tokenize(query);
        let token_set = tokens.iter().cloned().collect();
        Self {
            numeric_intent: mentions_any(&lowered, &config.numeric_keywords),
            visual_intent: mentions_any(&lowered, &config.visual_keywords),
            tokens,
            token_set,
        }
    }
}

/// Substring match against the lowercased query, so "totals" also hits "total".
fn mentions_any(lowered_query: &str, keywords: &[String]) -> bool {
    keywords.iter().any(|k| !k.is_empty() && lowered_query.contains(&k.to_lowercase()))
}

pub fn normalize_lexical(raw: f32, divisor: f32) -> f32 {
    if divisor <= 0.0 { return 0.0; }
    (raw / divisor).clamp(0.0, 1.0)
}

pub fn content_type_boost(config: &RetrievalConfig, query: &QueryContext, content_type: ContentType) -> f32 {
    match content_type {
        ContentType::Table if query.numeric_intent => config.table_boost,
        ContentType::Image if query.visual_intent => config.image_boost,
        _ => 1.0,
    }
}

pub fn length_normalization(config: &RetrievalConfig, word_count: usize) -> f32 {
    if word_count < config.short_chunk_words {
        config.short_chunk_factor
    } else if word_count > config.long_chunk_words {
        config.long_chunk_factor
    } else {
        1.0
    }
}

pub fn position_score(config: &RetrievalConfig, page_number: u32) -> f32 {
    if page_number <= config.early_page_limit {
        config.early_page_factor
    } else if page_number <= config.middle_page_limit {
        1.0
    } else {
        config.late_page_factor
    }
}

/// Share of distinct query tokens present in the chunk. 0 when either side has none.
pub fn lexical_overlap(query_tokens: &HashSet<String>, content_tokens: &HashSet<String>) -> f32 {
    if query_tokens.is_empty() || content_tokens.is_empty() { return 0.0; }
    let shared = query_tokens.intersection(content_tokens).count();
    shared as f32 / query_tokens.len() as f32
}

/// Score one candidate; returns the breakdown and the final hybrid score.
pub fn score(
    config: &RetrievalConfig,
    query: &QueryContext,
    chunk: &Chunk,
    content_tokens: &HashSet<String>,
    semantic: f32,
    lexical_raw: f32,
) -> (ScoreBreakdown, f32) {
    let semantic_score = semantic.clamp(0.0, 1.0);
    let lexical_score_norm = normalize_lexical(lexical_raw, config.lexical_divisor);
    let base_score = config.semantic_weight * semantic_score + config.lexical_weight * lexical_score_norm;
    let breakdown = ScoreBreakdown {
        semantic_score,
        lexical_score: lexical_raw,
        lexical_score_norm,
        base_score,
        content_type_boost: content_type_boost(config, query, chunk.content_type),
        length_normalization: length_normalization(config, chunk.word_count),
        position_score: position_score(config, chunk.page_number),
        freshness_score: 1.0,
        lexical_overlap: lexical_overlap(&query.token_set, content_tokens),
    };
    let final_score = breakdown.base_score
        * breakdown.content_type_boost
        * breakdown.length_normalization
        * breakdown.position_score
        * breakdown.freshness_score
        + config.overlap_weight * breakdown.lexical_overlap;
    (breakdown, final_score)
}
