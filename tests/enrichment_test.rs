//! Integration tests for the batch enrichment pipeline

mod common;

use chrono::Utc;
use common::{running_state, watch, FakeCatalog};
use std::path::Path;
use watch_wrapped::config::AppConfig;
use watch_wrapped::dataset::{read_enriched_events, write_enriched_events, write_watch_events};
use watch_wrapped::enrichment::{BatchOutcome, EnrichmentEngine, EnrichmentSettings};
use watch_wrapped::metrics::PipelineMetrics;
use watch_wrapped::models::{EnrichedEvent, WatchEvent};
use watch_wrapped::state::{PipelinePaths, PipelineState, RunPhase};
use watch_wrapped::utils::VIDEO_ID_NOT_FOUND;

fn settings(paths: &PipelinePaths) -> EnrichmentSettings {
    EnrichmentSettings::from_config(paths, &AppConfig::default().catalog)
}

fn run_batch(
    api: &FakeCatalog,
    root: &Path,
    state: &mut PipelineState,
    batch_size: usize,
    year_filter: Option<i32>,
) -> BatchOutcome {
    let paths = PipelinePaths::new(root);
    EnrichmentEngine::new(api, settings(&paths))
        .with_timezone(Utc)
        .process_batch(
            state,
            &paths.watch_history_csv(),
            &paths.enriched_csv(),
            batch_size,
            year_filter,
            &mut PipelineMetrics::default(),
        )
        .unwrap()
}

fn seed_raw(root: &Path, rows: &[WatchEvent]) -> PipelinePaths {
    let paths = PipelinePaths::new(root);
    write_watch_events(&paths.watch_history_csv(), rows).unwrap();
    paths
}

#[test]
fn test_rerun_does_not_duplicate_rows() {
    let dir = tempfile::tempdir().unwrap();
    let paths = seed_raw(
        dir.path(),
        &[watch("a", "2023-01-01T10:00:00Z"), watch("b", "2023-01-02T10:00:00Z")],
    );
    let api = FakeCatalog::new()
        .with_video("a", "PT3M", "10")
        .with_video("b", "PT30M", "20");
    let mut state = running_state(dir.path());

    let first = run_batch(&api, dir.path(), &mut state, 500, None);
    assert!(matches!(first, BatchOutcome::Processed { enriched: 2, failed: 0, remaining: 0 }));
    let after_first = std::fs::read(paths.enriched_csv()).unwrap();

    let second = run_batch(&api, dir.path(), &mut state, 500, None);
    assert_eq!(second, BatchOutcome::Exhausted);
    assert_eq!(std::fs::read(paths.enriched_csv()).unwrap(), after_first);
    assert!(!state.is_processing());
    assert!(!state.is_keep_running());
    assert_eq!(state.phase(), RunPhase::Exhausted);
}

#[test]
fn test_resumes_after_existing_enrichment() {
    let dir = tempfile::tempdir().unwrap();
    let raw: Vec<WatchEvent> = (1..=5)
        .map(|i| watch(&format!("v{i}"), &format!("2023-03-0{i}T12:00:00Z")))
        .collect();
    let paths = seed_raw(dir.path(), &raw);

    let done: Vec<EnrichedEvent> = raw[..2]
        .iter()
        .map(|row| EnrichedEvent {
            duration_seconds: Some(60),
            ..EnrichedEvent::from_raw(row)
        })
        .collect();
    write_enriched_events(&paths.enriched_csv(), &done).unwrap();

    let mut api = FakeCatalog::new();
    for i in 1..=5 {
        api = api.with_video(&format!("v{i}"), "PT1M", "10");
    }
    let mut state = running_state(dir.path());

    let outcome = run_batch(&api, dir.path(), &mut state, 3, None);
    assert!(matches!(outcome, BatchOutcome::Processed { enriched: 3, remaining: 0, .. }));
    assert_eq!(api.requested_ids(), vec!["v3", "v4", "v5"]);
    assert!(state.is_keep_running());

    assert_eq!(run_batch(&api, dir.path(), &mut state, 3, None), BatchOutcome::Exhausted);
    assert!(!state.is_processing());
    assert!(!state.is_keep_running());
    assert_eq!(read_enriched_events(&paths.enriched_csv()).unwrap().len(), 5);
}

#[test]
fn test_batch_size_bounds_each_call() {
    let dir = tempfile::tempdir().unwrap();
    let raw: Vec<WatchEvent> = (0..7)
        .map(|i| watch(&format!("v{i}"), &format!("2023-05-0{}T08:00:00Z", i + 1)))
        .collect();
    let paths = seed_raw(dir.path(), &raw);
    let api = FakeCatalog::new();
    let mut state = running_state(dir.path());

    let mut sizes = Vec::new();
    loop {
        match run_batch(&api, dir.path(), &mut state, 3, None) {
            BatchOutcome::Processed { .. } => {
                sizes.push(read_enriched_events(&paths.enriched_csv()).unwrap().len());
            },
            BatchOutcome::Exhausted => break,
            BatchOutcome::Skipped => panic!("run was not stopped"),
        }
    }
    assert_eq!(sizes, vec![3, 6, 7]);
}

#[test]
fn test_new_rows_are_written_ahead_of_old_ones() {
    let dir = tempfile::tempdir().unwrap();
    let paths = seed_raw(
        dir.path(),
        &[watch("old", "2023-01-01T10:00:00Z"), watch("new", "2023-01-02T10:00:00Z")],
    );
    let api = FakeCatalog::new();
    let mut state = running_state(dir.path());

    run_batch(&api, dir.path(), &mut state, 1, None);
    run_batch(&api, dir.path(), &mut state, 1, None);

    let rows = read_enriched_events(&paths.enriched_csv()).unwrap();
    let order: Vec<&str> = rows.iter().map(|row| row.video_link.as_str()).collect();
    assert_eq!(
        order,
        vec![
            "https://www.youtube.com/watch?v=new",
            "https://www.youtube.com/watch?v=old"
        ]
    );
}

#[test]
fn test_link_without_id_is_recorded_and_never_retried() {
    let dir = tempfile::tempdir().unwrap();
    let mut no_id = watch("x", "2023-01-01T10:00:00Z");
    no_id.video_link = "https://www.youtube.com/shorts/x".to_string();
    let paths = seed_raw(dir.path(), &[no_id]);
    let api = FakeCatalog::new();
    let mut state = running_state(dir.path());

    let outcome = run_batch(&api, dir.path(), &mut state, 10, None);
    assert!(matches!(outcome, BatchOutcome::Processed { enriched: 0, failed: 1, .. }));

    let rows = read_enriched_events(&paths.enriched_csv()).unwrap();
    assert_eq!(rows[0].error.as_deref(), Some(VIDEO_ID_NOT_FOUND));
    assert_eq!(rows[0].duration_seconds, None);
    assert_eq!(rows[0].category_id, None);
    assert!(api.video_calls.borrow().is_empty());

    assert_eq!(run_batch(&api, dir.path(), &mut state, 10, None), BatchOutcome::Exhausted);
}

#[test]
fn test_year_filter_restricts_candidates() {
    let dir = tempfile::tempdir().unwrap();
    let paths = seed_raw(
        dir.path(),
        &[
            watch("old", "2022-06-01T10:00:00Z"),
            watch("new", "2023-06-01T10:00:00Z"),
            watch("bad", "not a timestamp"),
        ],
    );
    let api = FakeCatalog::new().with_video("new", "PT5M", "10");
    let mut state = running_state(dir.path());

    run_batch(&api, dir.path(), &mut state, 10, Some(2023));
    let rows = read_enriched_events(&paths.enriched_csv()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].duration_seconds, Some(300));

    assert_eq!(run_batch(&api, dir.path(), &mut state, 10, Some(2023)), BatchOutcome::Exhausted);
}

#[test]
fn test_unparseable_timestamps_still_enriched_without_filter() {
    let dir = tempfile::tempdir().unwrap();
    let paths = seed_raw(dir.path(), &[watch("bad", "sometime last year")]);
    let api = FakeCatalog::new().with_video("bad", "PT1M", "10");
    let mut state = running_state(dir.path());

    run_batch(&api, dir.path(), &mut state, 10, None);
    let rows = read_enriched_events(&paths.enriched_csv()).unwrap();
    assert_eq!(rows[0].duration_seconds, Some(60));
    assert_eq!(rows[0].watch_time, "sometime last year");
}

#[test]
fn test_catalog_metadata_and_category_names_are_merged() {
    let dir = tempfile::tempdir().unwrap();
    let paths = seed_raw(
        dir.path(),
        &[watch("a", "2023-01-01T10:00:00Z"), watch("b", "2023-01-02T10:00:00Z")],
    );
    let api = FakeCatalog::new()
        .with_video("a", "PT3M", "10")
        .with_video("b", "PT30M", "20");
    let mut state = running_state(dir.path());

    run_batch(&api, dir.path(), &mut state, 1, None);
    run_batch(&api, dir.path(), &mut state, 1, None);

    let rows = read_enriched_events(&paths.enriched_csv()).unwrap();
    let a = rows.iter().find(|row| row.video_link.ends_with("v=a")).unwrap();
    assert_eq!(a.duration_seconds, Some(180));
    assert_eq!(a.category_name.as_deref(), Some("Music"));
    assert_eq!(a.video_name.as_deref(), Some("Title a"));
    assert_eq!(a.channel_name.as_deref(), Some("Channel a"));
    assert_eq!(a.channel_link.as_deref(), Some("https://www.youtube.com/channel/UCa"));
    assert_eq!(a.error, None);

    let b = rows.iter().find(|row| row.video_link.ends_with("v=b")).unwrap();
    assert_eq!(b.category_name.as_deref(), Some("Gaming"));

    // The category map is fetched once and then read from its file.
    assert_eq!(api.category_calls.get(), 1);
    assert!(paths.category_map("US").exists());
}

#[test]
fn test_unknown_ids_are_cached_as_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let paths = seed_raw(dir.path(), &[watch("gone", "2023-01-01T10:00:00Z")]);
    let api = FakeCatalog::new();
    let mut state = running_state(dir.path());

    run_batch(&api, dir.path(), &mut state, 10, None);
    let rows = read_enriched_events(&paths.enriched_csv()).unwrap();
    assert_eq!(
        rows[0].error.as_deref(),
        Some("Warning: Video ID gone not found or inaccessible.")
    );

    // A fresh enriched table is served entirely from the cache.
    std::fs::remove_file(paths.enriched_csv()).unwrap();
    let mut state = running_state(dir.path());
    run_batch(&api, dir.path(), &mut state, 10, None);
    assert_eq!(api.video_calls.borrow().len(), 1);
}

#[test]
fn test_chunk_failure_is_recorded_but_not_cached() {
    let dir = tempfile::tempdir().unwrap();
    let paths = seed_raw(
        dir.path(),
        &[watch("a", "2023-01-01T10:00:00Z"), watch("b", "2023-01-02T10:00:00Z")],
    );
    let api = FakeCatalog::new().with_video("a", "PT3M", "10");
    api.fail_requests("quota exceeded");
    let mut state = running_state(dir.path());

    let outcome = run_batch(&api, dir.path(), &mut state, 10, None);
    assert!(matches!(outcome, BatchOutcome::Processed { enriched: 0, failed: 2, .. }));

    let rows = read_enriched_events(&paths.enriched_csv()).unwrap();
    assert!(rows.iter().all(|row| row.error.as_deref() == Some("quota exceeded")));
    assert!(!paths.metadata_cache().exists());
}

#[test]
fn test_rows_beyond_fifty_use_multiple_requests() {
    let dir = tempfile::tempdir().unwrap();
    let raw: Vec<WatchEvent> = (0..55)
        .map(|i| watch(&format!("v{i}"), &format!("2023-01-01T10:{:02}:00Z", i)))
        .collect();
    seed_raw(dir.path(), &raw);
    let api = FakeCatalog::new();
    let mut state = running_state(dir.path());

    run_batch(&api, dir.path(), &mut state, 500, None);
    let calls = api.video_calls.borrow();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].len(), 50);
    assert_eq!(calls[1].len(), 5);
}
