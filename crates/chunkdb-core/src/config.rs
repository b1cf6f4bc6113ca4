//! Configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars.
//! Nested keys in env vars are separated by `__` (`APP_RETRIEVAL__RERANK_K=8`).
//! Every section has defaults, so a missing file yields a working configuration.
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::{BackendKind, SimilarityScale};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.settings()?;
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> Self { Self { figment } }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Typed, validated settings.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to extract settings: {}", e))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub retrieval: RetrievalConfig,
    pub vector: VectorConfig,
    pub lexical: LexicalConfig,
    pub ingest: IngestConfig,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        let r = &self.retrieval;
        if r.k_retrieve == 0 { return Err(Error::InvalidConfig("retrieval.k_retrieve must be > 0".into())); }
        if r.rerank_k == 0 { return Err(Error::InvalidConfig("retrieval.rerank_k must be > 0".into())); }
        if r.lexical_divisor <= 0.0 { return Err(Error::InvalidConfig("retrieval.lexical_divisor must be positive".into())); }
        if r.semantic_weight < 0.0 || r.lexical_weight < 0.0 || r.overlap_weight < 0.0 {
            return Err(Error::InvalidConfig("retrieval weights must be non-negative".into()));
        }
        if r.short_chunk_words > r.long_chunk_words {
            return Err(Error::InvalidConfig("retrieval.short_chunk_words must not exceed long_chunk_words".into()));
        }
        if self.vector.dimension == 0 { return Err(Error::InvalidConfig("vector.dimension must be > 0".into())); }
        if !(0.0..=1.0).contains(&self.vector.compaction_ratio) {
            return Err(Error::InvalidConfig("vector.compaction_ratio must be within [0, 1]".into()));
        }
        if self.ingest.max_workers == 0 { return Err(Error::InvalidConfig("ingest.max_workers must be > 0".into())); }
        if self.ingest.batch_size == 0 { return Err(Error::InvalidConfig("ingest.batch_size must be > 0".into())); }
        Ok(())
    }
}

/// Ranking knobs. The scaling constants are empirical defaults, not invariants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub k_retrieve: usize,
    pub rerank_k: usize,
    pub similarity_threshold: f32,
    pub semantic_weight: f32,
    pub lexical_weight: f32,
    pub table_boost: f32,
    pub image_boost: f32,
    pub lexical_divisor: f32,
    pub overlap_weight: f32,
    pub embed_timeout_ms: u64,
    pub numeric_keywords: Vec<String>,
    pub visual_keywords: Vec<String>,
    pub short_chunk_words: usize,
    pub long_chunk_words: usize,
    pub short_chunk_factor: f32,
    pub long_chunk_factor: f32,
    pub early_page_limit: u32,
    pub middle_page_limit: u32,
    pub early_page_factor: f32,
    pub late_page_factor: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k_retrieve: 10,
            rerank_k: 5,
            similarity_threshold: 0.7,
            semantic_weight: 0.6,
            lexical_weight: 0.3,
            table_boost: 1.2,
            image_boost: 1.1,
            lexical_divisor: 10.0,
            overlap_weight: 0.1,
            embed_timeout_ms: 5_000,
            numeric_keywords: ["number", "count", "amount", "total", "sum", "average", "data"].iter().map(|s| s.to_string()).collect(),
            visual_keywords: ["image", "figure", "diagram", "chart", "graph"].iter().map(|s| s.to_string()).collect(),
            short_chunk_words: 20,
            long_chunk_words: 300,
            short_chunk_factor: 0.7,
            long_chunk_factor: 0.8,
            early_page_limit: 3,
            middle_page_limit: 10,
            early_page_factor: 1.1,
            late_page_factor: 0.9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    pub dimension: usize,
    pub model_id: String,
    pub backend: BackendKind,
    /// Append-log journal file; `~` and `${VAR}` are expanded.
    pub journal_path: Option<String>,
    pub similarity: SimilarityScale,
    pub compaction_ratio: f32,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            dimension: 384,
            model_id: "chunkdb/feature-hash-v1".to_string(),
            backend: BackendKind::Flat,
            journal_path: None,
            similarity: SimilarityScale::Clamped,
            compaction_ratio: 0.3,
        }
    }
}

impl VectorConfig {
    pub fn journal_path(&self) -> Option<PathBuf> { self.journal_path.as_deref().map(expand_path) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LexicalConfig {
    pub writer_memory_bytes: usize,
}

impl Default for LexicalConfig {
    fn default() -> Self { Self { writer_memory_bytes: 50_000_000 } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub batch_size: usize,
    pub max_workers: usize,
}

impl Default for IngestConfig {
    fn default() -> Self { Self { batch_size: 32, max_workers: 2 } }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    // Expand env vars first
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    // Expand ~ at start
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_without_any_file() {
        Jail::expect_with(|_jail| {
            let config = Config::load().map_err(|e| e.to_string())?;
            let settings = config.settings().map_err(|e| e.to_string())?;
            assert_eq!(settings.retrieval.k_retrieve, 10);
            assert_eq!(settings.retrieval.rerank_k, 5);
            assert!((settings.retrieval.similarity_threshold - 0.7).abs() < 1e-6);
            assert!((settings.retrieval.lexical_divisor - 10.0).abs() < 1e-6);
            assert_eq!(settings.vector.backend, BackendKind::Flat);
            Ok(())
        });
    }

    #[test]
    fn file_then_env_overrides() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [retrieval]
                rerank_k = 3
                table_boost = 1.5

                [vector]
                dimension = 8
                backend = "append_log"
                "#,
            )?;
            jail.set_env("APP_RETRIEVAL__RERANK_K", "7");
            let settings = Config::load().map_err(|e| e.to_string())?.settings().map_err(|e| e.to_string())?;
            assert_eq!(settings.retrieval.rerank_k, 7);
            assert!((settings.retrieval.table_boost - 1.5).abs() < 1e-6);
            assert_eq!(settings.vector.dimension, 8);
            assert_eq!(settings.vector.backend, BackendKind::AppendLog);
            assert_eq!(settings.retrieval.k_retrieve, 10);
            Ok(())
        });
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut settings = Settings::default();
        settings.retrieval.lexical_divisor = 0.0;
        assert!(matches!(settings.validate(), Err(Error::InvalidConfig(_))));
        let mut settings = Settings::default();
        settings.ingest.max_workers = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn relative_paths_resolve_against_base() {
        let base = Path::new("/srv/chunkdb");
        assert_eq!(resolve_with_base(base, "journal.jsonl"), PathBuf::from("/srv/chunkdb/journal.jsonl"));
        assert_eq!(resolve_with_base(base, "/tmp/j.jsonl"), PathBuf::from("/tmp/j.jsonl"));
    }
}
