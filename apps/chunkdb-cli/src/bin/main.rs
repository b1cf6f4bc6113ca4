use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use chunkdb_core::config::{Config, Settings};
use chunkdb_core::data_processor::DataProcessor;
use chunkdb_core::types::{ContentType, QueryFilters};
use chunkdb_embed::HashEmbedder;
use chunkdb_hybrid::{ChunkDb, SearchResponse};

const USAGE: &str = "Usage:
  chunkdb query <chunks.jsonl|dir> \"<query>\" [--type text|table|image]... [--min-words N] [--page N] [--json]
  chunkdb stats <chunks.jsonl|dir>";

struct QueryArgs {
    data: PathBuf,
    query: String,
    filters: QueryFilters,
    json: bool,
}

fn parse_query_args(args: &[String]) -> anyhow::Result<QueryArgs> {
    let mut positional = Vec::new();
    let mut types = Vec::new();
    let mut filters = QueryFilters::new();
    let mut json = false;
    let mut i = 0;
    while i < args.len() {
        let value = || args.get(i + 1).with_context(|| format!("{} requires a value", args[i]));
        match args[i].as_str() {
            "--type" => { types.push(value()?.parse::<ContentType>()?); i += 2; }
            "--min-words" => { filters = filters.min_word_count(value()?.parse().context("--min-words expects a number")?); i += 2; }
            "--page" => { filters = filters.page_number(value()?.parse().context("--page expects a number")?); i += 2; }
            "--json" => { json = true; i += 1; }
            flag if flag.starts_with("--") => bail!("unknown flag {flag}\n{USAGE}"),
            other => { positional.push(other.to_string()); i += 1; }
        }
    }
    if !types.is_empty() { filters = filters.content_types(types); }
    let [data, query] = <[String; 2]>::try_from(positional).map_err(|_| anyhow::anyhow!("expected a data path and a query\n{USAGE}"))?;
    Ok(QueryArgs { data: PathBuf::from(data), query, filters, json })
}

async fn load_corpus(settings: &Settings, data: &Path) -> anyhow::Result<ChunkDb> {
    let embedder = Arc::new(HashEmbedder::new(settings.vector.dimension));
    let db = ChunkDb::build(settings, embedder)?;
    let chunks = DataProcessor::new().load(data).with_context(|| format!("loading chunks from {}", data.display()))?;
    info!(chunks = chunks.len(), path = %data.display(), "loaded chunk records");

    let pb = ProgressBar::new(chunks.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")?
            .progress_chars("#>-"),
    );
    let group = settings.ingest.batch_size * settings.ingest.max_workers;
    let mut failed = 0usize;
    let mut pending = chunks.into_iter().peekable();
    while pending.peek().is_some() {
        let batch: Vec<_> = pending.by_ref().take(group).collect();
        let size = batch.len() as u64;
        let report = db.ingestor.ingest(batch).await?;
        for failure in &report.failed { warn!(chunk_id = %failure.chunk_id, error = %failure.error, "chunk not indexed"); }
        failed += report.failed.len();
        pb.inc(size);
    }
    pb.finish_with_message(format!("indexed, {failed} failed"));
    Ok(db)
}

fn print_response(response: &SearchResponse) {
    let meta = &response.metadata;
    println!(
        "\n{} result(s) for \"{}\" in {} ms (semantic {}, lexical {}, merged {})",
        meta.total_results, meta.query, meta.retrieval_time_ms, meta.semantic_candidates, meta.lexical_candidates, meta.merged_candidates
    );
    if meta.semantic_degraded { println!("  semantic retrieval unavailable, lexical-only ranking"); }
    if meta.lexical_degraded { println!("  lexical retrieval unavailable, semantic-only ranking"); }
    for (rank, r) in response.results.iter().enumerate() {
        let b = &r.score_breakdown;
        println!("\n{:>2}. {} [{} p.{}] score {:.4}", rank + 1, r.chunk_id, r.content_type, r.page_number, r.final_score);
        println!(
            "    semantic {:.3} | lexical {:.3} (norm {:.3}) | base {:.3} | type x{:.2} | length x{:.2} | position x{:.2} | overlap {:.2}",
            b.semantic_score, b.lexical_score, b.lexical_score_norm, b.base_score, b.content_type_boost, b.length_normalization, b.position_score, b.lexical_overlap
        );
        let preview: String = r.content.chars().take(160).collect();
        println!("    {}", preview);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let settings = config.settings()?;
    let mut args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() { bail!("{USAGE}"); }
    let cmd = args.remove(0);

    match cmd.as_str() {
        "query" => {
            let query = parse_query_args(&args)?;
            let db = load_corpus(&settings, &query.data).await?;
            let response = db.ranker.search(&query.query, &query.filters).await?;
            if query.json { println!("{}", serde_json::to_string_pretty(&response)?); } else { print_response(&response); }
        }
        "stats" => {
            let data = args.first().map(PathBuf::from).with_context(|| USAGE.to_string())?;
            let db = load_corpus(&settings, &data).await?;
            println!("{}", serde_json::to_string_pretty(&db.corpus.stats())?);
            match db.corpus.verify() {
                Ok(()) => println!("membership consistent"),
                Err(e) => println!("{e}"),
            }
        }
        other => bail!("unknown command {other}\n{USAGE}"),
    }
    Ok(())
}
