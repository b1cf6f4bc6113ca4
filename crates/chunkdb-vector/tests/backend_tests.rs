use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::sync::Arc;
use std::thread;

use tempfile::TempDir;

use chunkdb_core::config::VectorConfig;
use chunkdb_core::traits::VectorIndexer;
use chunkdb_core::types::{BackendKind, Chunk, IndexedVector, MetadataFilter, SimilarityScale};
use chunkdb_vector::{open_backend, AppendLog, FlatIndex};

fn record(id: &str, vector: Vec<f32>) -> IndexedVector { IndexedVector { chunk_id: id.to_string(), vector, model_id: "test-model".to_string() } }

#[test]
fn journal_replays_latest_records_in_order() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("vectors/log.jsonl");
    {
        let log = AppendLog::open(3, SimilarityScale::Clamped, &path).unwrap();
        log.upsert(record("a", vec![1.0, 0.0, 0.0]), Chunk::text("a", "alpha").metadata()).unwrap();
        log.upsert(record("b", vec![1.0, 0.0, 0.0]), Chunk::table("b", "beta", vec!["x".into()], 1).metadata()).unwrap();
        log.upsert(record("a", vec![0.0, 1.0, 0.0]), Chunk::text("a", "alpha").metadata()).unwrap();
    }

    let reopened = AppendLog::open(3, SimilarityScale::Clamped, &path).unwrap();
    assert_eq!(reopened.len(), 2);
    assert_eq!(reopened.record_count(), 3);
    assert_eq!(reopened.get("a").unwrap().vector, vec![0.0, 1.0, 0.0]);

    let tables = reopened.search(&[1.0, 0.0, 0.0], 5, &MetadataFilter::new().eq("content_type", "table"), &HashSet::new()).unwrap();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].chunk_id, "b");
    assert_eq!(tables[0].metadata.get("table_rows").map(String::as_str), Some("1"));
}

#[test]
fn compaction_rewrites_the_journal() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("log.jsonl");
    {
        let log = AppendLog::open(2, SimilarityScale::Clamped, &path).unwrap();
        log.upsert(record("keep", vec![1.0, 0.0]), Default::default()).unwrap();
        log.upsert(record("gone", vec![0.0, 1.0]), Default::default()).unwrap();
        log.compact(&HashSet::from(["gone".to_string()])).unwrap();
        log.upsert(record("late", vec![1.0, 1.0]), Default::default()).unwrap();
    }
    let reopened = AppendLog::open(2, SimilarityScale::Clamped, &path).unwrap();
    assert_eq!(reopened.ids(), HashSet::from(["keep".to_string(), "late".to_string()]));
    assert_eq!(reopened.record_count(), 2);
}

#[test]
fn journal_with_wrong_dimension_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("log.jsonl");
    {
        let log = AppendLog::open(2, SimilarityScale::Clamped, &path).unwrap();
        log.upsert(record("a", vec![1.0, 0.0]), Default::default()).unwrap();
    }
    assert!(AppendLog::open(4, SimilarityScale::Clamped, &path).is_err());
}

#[test]
fn torn_journal_tail_is_dropped_on_replay() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("log.jsonl");
    {
        let log = AppendLog::open(2, SimilarityScale::Clamped, &path).unwrap();
        log.upsert(record("a", vec![1.0, 0.0]), Default::default()).unwrap();
    }
    let mut f = OpenOptions::new().append(true).open(&path).unwrap();
    f.write_all(br#"{"order":1,"chunk_id":"b","vec"#).unwrap();
    drop(f);

    {
        let log = AppendLog::open(2, SimilarityScale::Clamped, &path).unwrap();
        assert_eq!(log.ids(), HashSet::from(["a".to_string()]));
        log.upsert(record("c", vec![0.0, 1.0]), Default::default()).unwrap();
    }
    let reopened = AppendLog::open(2, SimilarityScale::Clamped, &path).unwrap();
    assert_eq!(reopened.ids(), HashSet::from(["a".to_string(), "c".to_string()]));
    assert_eq!(reopened.record_count(), 2);
}

#[test]
fn corrupt_journal_line_before_the_tail_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("log.jsonl");
    {
        let log = AppendLog::open(2, SimilarityScale::Clamped, &path).unwrap();
        log.upsert(record("a", vec![1.0, 0.0]), Default::default()).unwrap();
    }
    let good = fs::read_to_string(&path).unwrap();
    fs::write(&path, format!("not json\n{good}")).unwrap();
    let err = AppendLog::open(2, SimilarityScale::Clamped, &path).err().expect("corrupt journal must not open");
    assert!(err.to_string().contains("log.jsonl:1"));
}

#[test]
fn configured_backend_is_selected() {
    let config = VectorConfig { dimension: 4, backend: BackendKind::AppendLog, ..VectorConfig::default() };
    let backend = open_backend(&config).unwrap();
    assert_eq!(backend.kind(), BackendKind::AppendLog);
    assert!(!backend.supports_delete());
    assert_eq!(backend.dim(), 4);

    let flat = open_backend(&VectorConfig::default()).unwrap();
    assert_eq!(flat.kind(), BackendKind::Flat);
    assert_eq!(flat.dim(), 384);
}

#[test]
fn readers_see_old_or_new_vector_during_replacement() {
    let index = Arc::new(FlatIndex::new(2, SimilarityScale::Clamped, 0.3));
    index.upsert(record("x", vec![1.0, 0.0]), Default::default()).unwrap();

    let writer = {
        let index = index.clone();
        thread::spawn(move || {
            for i in 0..200 {
                let v = if i % 2 == 0 { vec![0.0, 1.0] } else { vec![1.0, 0.0] };
                index.upsert(record("x", v), Default::default()).unwrap();
            }
        })
    };
    for _ in 0..200 {
        let hits = index.search(&[1.0, 0.0], 10, &MetadataFilter::new(), &HashSet::new()).unwrap();
        assert_eq!(hits.len(), 1, "exactly one current vector per chunk");
        assert!(hits[0].similarity == 0.0 || (hits[0].similarity - 1.0).abs() < 1e-6);
    }
    writer.join().unwrap();
}
