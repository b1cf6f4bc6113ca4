use std::fs;
use std::io::Write;
use tempfile::TempDir;

use chunkdb_core::data_processor::DataProcessor;
use chunkdb_core::types::ContentType;

#[test]
fn load_single_file_normalizes_records() {
    let tmp = TempDir::new().unwrap();
    let file_path = tmp.path().join("doc.jsonl");
    let mut f = fs::File::create(&file_path).unwrap();
    writeln!(f, r#"{{"chunk_id":"doc:0","content":"Total revenue increased by 10%","page_number":1}}"#).unwrap();
    writeln!(f).unwrap();
    writeln!(
        f,
        r#"{{"chunk_id":"doc:1","content":"Q1 100 Q2 110","content_type":"table","page_number":2,"table":{{"headers":["Quarter","Revenue"],"rows":2}}}}"#
    )
    .unwrap();

    let chunks = DataProcessor::new().load(&file_path).expect("load");

    assert_eq!(chunks.len(), 2, "blank lines are skipped");
    assert_eq!(chunks[0].word_count, 5);
    assert_eq!(chunks[0].cleaned_content, "Total revenue increased by 10");
    assert_eq!(chunks[1].content_type, ContentType::Table);
    assert_eq!(chunks[1].table.as_ref().map(|t| t.columns), Some(2), "columns derived from headers");
}

#[test]
fn load_directory_reads_jsonl_files_in_path_order() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::create_dir_all(dir.join("nested")).unwrap();
    fs::write(dir.join("b.jsonl"), r#"{"chunk_id":"b:0","content":"bravo charlie"}"#).unwrap();
    fs::write(dir.join("nested/a.jsonl"), r#"{"chunk_id":"a:0","content":"alpha delta"}"#).unwrap();
    fs::write(dir.join("notes.txt"), "ignored").unwrap();

    let chunks = DataProcessor::new().load(dir).expect("load dir");

    let ids: Vec<&str> = chunks.iter().map(|c| c.chunk_id.as_str()).collect();
    assert_eq!(ids, vec!["b:0", "a:0"]);
}

#[test]
fn malformed_record_reports_location() {
    let tmp = TempDir::new().unwrap();
    let file_path = tmp.path().join("bad.jsonl");
    fs::write(&file_path, "{\"chunk_id\":\"x\"}\n").unwrap();

    let err = DataProcessor::new().load(&file_path).unwrap_err();
    assert!(format!("{err:#}").contains("bad.jsonl:1"));
}
