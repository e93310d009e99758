//! End-to-end pipeline tests: segment → structure → persist.

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use tarajim_core::mock::{MockModel, MockReply};
use tarajim_core::{AdaptiveLimiter, Config, RunError, run_document};
use tarajim_parsing::{EntryPattern, segment_text};
use tarajim_reporting::{BookStore, write_summary};

const STUB_JSON: &str = r#"{"name":"Ahmad","birth_date":null,"death_date":"1200","profession":null,"known_works":[]}"#;

const TWO_ENTRIES: &str = "1 - Ahmad ibn Ali (d. 1200)\n2 - Yusuf ibn Omar (b. 1150)";

fn fast_config() -> Config {
    Config {
        max_retries: 0,
        requests_per_minute: 600,
        limiter: Arc::new(AdaptiveLimiter::per_minute(600)),
        ..Config::default()
    }
}

#[tokio::test(start_paused = true)]
async fn full_run_writes_records_and_index() {
    let root = tempfile::tempdir().unwrap();
    let store = Arc::new(BookStore::open(root.path(), "test-book").unwrap());
    let chunks = segment_text(TWO_ENTRIES, &EntryPattern::default_numbered());
    assert_eq!(chunks.len(), 2);

    let model = Arc::new(MockModel::new(MockReply::Reply(STUB_JSON.into())));
    let report = run_document(
        chunks,
        fast_config(),
        model,
        store.clone(),
        HashSet::new(),
        |_| {},
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(report.total, 2);
    assert_eq!(report.succeeded, 2);
    assert!(report.failed.is_empty());

    let index = store.load_index().unwrap();
    assert_eq!(index.len(), 2);
    assert_eq!(index[0].index, 1);
    assert_eq!(index[1].index, 2);
    for entry in &index {
        let content = std::fs::read_to_string(store.dir().join(&entry.file)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["name"], "Ahmad");
        assert_eq!(value["death_date"], "1200");
        assert_eq!(value["birth_date"], serde_json::Value::Null);
    }

    let summary = write_summary(store.dir(), &report).unwrap();
    assert!(summary.exists());
}

#[tokio::test(start_paused = true)]
async fn malformed_chunk_gets_no_index_entry_and_run_continues() {
    let root = tempfile::tempdir().unwrap();
    let store = Arc::new(BookStore::open(root.path(), "test-book").unwrap());
    let chunks = segment_text(TWO_ENTRIES, &EntryPattern::default_numbered());

    // Chunk 1: garbage on the primary ask and the strict re-ask; chunk 2 valid.
    let model = Arc::new(MockModel::with_sequence(vec![
        MockReply::Reply("no data here".into()),
        MockReply::Reply("really, none".into()),
        MockReply::Reply(STUB_JSON.into()),
    ]));

    let report = run_document(
        chunks,
        fast_config(),
        model,
        store.clone(),
        HashSet::new(),
        |_| {},
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed_indices(), vec![1]);

    let index = store.load_index().unwrap();
    assert_eq!(index.len(), 1);
    assert_eq!(index[0].index, 2);
}

#[tokio::test(start_paused = true)]
async fn resume_skips_indices_already_in_the_index() {
    let root = tempfile::tempdir().unwrap();
    let store = Arc::new(BookStore::open(root.path(), "test-book").unwrap());
    let chunks = segment_text(TWO_ENTRIES, &EntryPattern::default_numbered());

    // First pass completes everything
    let model = Arc::new(MockModel::new(MockReply::Reply(STUB_JSON.into())));
    run_document(
        chunks.clone(),
        fast_config(),
        model,
        store.clone(),
        HashSet::new(),
        |_| {},
        CancellationToken::new(),
    )
    .await
    .unwrap();

    // Second pass: a model that would fail every call; it must never be hit
    let failing = Arc::new(MockModel::new(MockReply::Error("should not be called".into())));
    let done = store.completed_indices().unwrap();
    let report = run_document(
        chunks,
        fast_config(),
        failing.clone(),
        store.clone(),
        done,
        |_| {},
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(report.succeeded, 0);
    assert!(report.failed.is_empty());
    assert_eq!(report.skipped_resume, vec![1, 2]);
    assert_eq!(failing.call_count(), 0);
    // Index unchanged
    assert_eq!(store.load_index().unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn zero_matches_surfaces_no_matches_found() {
    let chunks = segment_text("prose without markers", &EntryPattern::default_numbered());
    assert!(chunks.is_empty());

    let root = tempfile::tempdir().unwrap();
    let store = Arc::new(BookStore::open(root.path(), "test-book").unwrap());
    let model = Arc::new(MockModel::new(MockReply::Reply(STUB_JSON.into())));
    let err = run_document(
        chunks,
        fast_config(),
        model,
        store.clone(),
        HashSet::new(),
        |_| {},
        CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, RunError::NoMatchesFound));
    // Nothing was written
    assert!(store.load_index().unwrap().is_empty());
    assert!(!store.index_path().exists());
}

#[tokio::test(start_paused = true)]
async fn rerunning_a_chunk_is_byte_identical() {
    let root = tempfile::tempdir().unwrap();
    let store = Arc::new(BookStore::open(root.path(), "test-book").unwrap());
    let chunks = segment_text("1 - Ahmad ibn Ali (d. 1200)", &EntryPattern::default_numbered());

    let model = Arc::new(MockModel::new(MockReply::Reply(STUB_JSON.into())));
    run_document(
        chunks.clone(),
        fast_config(),
        model.clone(),
        store.clone(),
        HashSet::new(),
        |_| {},
        CancellationToken::new(),
    )
    .await
    .unwrap();

    let file = store.dir().join(&store.load_index().unwrap()[0].file);
    let first = std::fs::read(&file).unwrap();

    // Re-run without resume: same deterministic model, same bytes
    run_document(
        chunks,
        fast_config(),
        model,
        store.clone(),
        HashSet::new(),
        |_| {},
        CancellationToken::new(),
    )
    .await
    .unwrap();
    let second = std::fs::read(&file).unwrap();
    assert_eq!(first, second);
}
