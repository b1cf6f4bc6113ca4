use std::env;
use std::path::PathBuf;

use chunkdb_core::data_processor::DataProcessor;
use chunkdb_core::traits::TextIndexer;
use chunkdb_text::{tokenize, LexicalIndex};

// Index a chunk file lexically and print raw BM25 scores for a query.
// Usage:
//   cargo run -p chunkdb-text --example score -- <chunks.jsonl> "your query" [--limit 10]

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    if args.len() < 2 {
        eprintln!("Usage: cargo run -p chunkdb-text --example score -- <chunks.jsonl> <query> [--limit N]");
        std::process::exit(1);
    }
    let path = PathBuf::from(&args[0]);
    let query = &args[1];
    let mut limit: usize = 10;
    if let Some(pos) = args.iter().position(|a| a == "--limit") {
        limit = args.get(pos + 1).and_then(|v| v.parse().ok()).unwrap_or(limit);
    }

    let chunks = DataProcessor::new().load(&path)?;
    let index = LexicalIndex::new(50_000_000)?;
    for chunk in &chunks { index.add(&chunk.chunk_id, &tokenize(chunk.lexical_text()))?; }
    println!("Indexed {} chunks from {}", index.len(), path.display());

    let mut scored: Vec<(String, f32)> = index.score(&tokenize(query))?.into_iter().collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    for (rank, (chunk_id, score)) in scored.into_iter().take(limit).enumerate() {
        println!("{:>2}. {:<32} {:.4}", rank + 1, chunk_id, score);
    }
    Ok(())
}
