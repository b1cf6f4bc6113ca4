use std::collections::HashSet;

use chunkdb_core::traits::TextIndexer;
use chunkdb_text::{tokenize, LexicalIndex};

fn corpus() -> LexicalIndex {
    let index = LexicalIndex::new(0).expect("index");
    let docs = [
        ("report:0", "Total revenue increased by 10% compared to last year"),
        ("report:1", "Q1 revenue 100 Q2 revenue 110 Q3 revenue 125"),
        ("report:2", "The bar chart shows quarterly sales by region"),
        ("report:3", "Employee headcount remained flat across all offices"),
    ];
    for (id, text) in docs { index.add(id, &tokenize(text)).expect("add"); }
    index
}

#[test]
fn lexical_full_flow() {
    let index = corpus();
    assert_eq!(index.len(), 4);

    let scores = index.score(&tokenize("revenue growth")).expect("score");
    let hits: HashSet<&str> = scores.keys().map(String::as_str).collect();
    assert_eq!(hits, HashSet::from(["report:0", "report:1"]));
    assert!(scores["report:1"] > scores["report:0"], "higher term frequency ranks first");

    assert!(index.score(&tokenize("nonexistent")).expect("score").is_empty());
    assert!(index.score(&tokenize("!!! ?")).expect("score").is_empty(), "punctuation-only query has no tokens");
}

#[test]
fn removal_is_visible_to_next_score() {
    let index = corpus();
    assert!(index.remove("report:1").expect("remove"));
    let scores = index.score(&tokenize("revenue")).expect("score");
    assert_eq!(scores.keys().collect::<Vec<_>>(), vec!["report:0"]);

    index.compact().expect("compact");
    assert_eq!(index.len(), 3);
    assert_eq!(index.ids().expect("ids").len(), 3);
}

#[test]
fn replacing_tokens_drops_old_terms() {
    let index = corpus();
    index.add("report:3", &tokenize("regional revenue summary")).expect("replace");
    assert_eq!(index.len(), 4);
    assert!(index.score(&tokenize("headcount")).expect("score").is_empty());
    assert!(index.score(&tokenize("revenue")).expect("score").contains_key("report:3"));
}
