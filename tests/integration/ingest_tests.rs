//! End-to-end ingestion runs against a mock archive API

use crate::common::{
    ad, ids, page, read_rows, test_config, test_orchestrator, test_orchestrator_with_probe,
    FakeRendererFactory, ScriptedSpace, ARCHIVE_PATH,
};
use snap_harvest::config::FilterKind;
use snap_harvest::state::CheckpointStore;
use snap_harvest::{run_ingest, HarvestError, RunPhase, StopReason};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use std::sync::atomic::Ordering;
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

async fn mount_term(server: &MockServer, term: &str, records: Vec<serde_json::Value>) {
    Mock::given(method("GET"))
        .and(path(ARCHIVE_PATH))
        .and(query_param("search_terms", term))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(records, None)))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_filtered_records_are_not_emitted() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, &server.uri(), &["A"]);
    let aggregate = config.output.aggregate_path();
    let per_item = config.output.item_path("A");
    let state_path = config.output.state_path();

    mount_term(
        &server,
        "A",
        vec![
            ad("1", "Giảm giá cực sốc hôm nay", None),
            ad("2", "Flash sale today only", None),
            ad("3", "Mua ngay kẻo lỡ", None),
        ],
    )
    .await;

    let mut orchestrator =
        test_orchestrator(config, FakeRendererFactory::default(), CancellationToken::new());
    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.stop_reason, StopReason::Completed);
    assert_eq!(summary.rows_written, 2);
    assert_eq!(summary.records_filtered, 1);
    assert_eq!(orchestrator.phase(), RunPhase::Finished);

    assert_eq!(ids(&read_rows(&aggregate)), ["1", "3"]);
    assert_eq!(ids(&read_rows(&per_item)), ["1", "3"]);

    let state = CheckpointStore::new(&state_path).load();
    assert_eq!(state.seen_record_ids(), ["1", "3"]);
    assert!(state.is_completed("A"));
}

#[tokio::test]
async fn test_failing_item_is_completed_without_abort() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir, &server.uri(), &["B", "C"]);
    config.retry.max_retries = 2;
    config.filter.kind = FilterKind::Any;
    let state_path = config.output.state_path();

    Mock::given(method("GET"))
        .and(path(ARCHIVE_PATH))
        .and(query_param("search_terms", "B"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;
    mount_term(&server, "C", vec![ad("9", "hello", None)]).await;

    let mut orchestrator =
        test_orchestrator(config, FakeRendererFactory::default(), CancellationToken::new());
    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.items_completed, 2);
    assert_eq!(summary.items_partial, 1);
    assert_eq!(summary.rows_written, 1);

    let state = CheckpointStore::new(&state_path).load();
    assert_eq!(state.completed_work_items(), ["B", "C"]);
}

#[tokio::test]
async fn test_rows_carry_captured_artifacts() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir, &server.uri(), &["giày dép"]);
    config.filter.kind = FilterKind::Any;
    let aggregate = config.output.aggregate_path();
    let shots = config.capture.screenshots_dir.clone();

    Mock::given(path("/cdn/5.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(vec![0x89, b'P', b'N', b'G']),
        )
        .mount(&server)
        .await;
    mount_term(
        &server,
        "giày dép",
        vec![
            ad("5", "shoes", Some(format!("{}/cdn/5.png", server.uri()))),
            ad("6", "sandals", None),
        ],
    )
    .await;

    let mut orchestrator =
        test_orchestrator(config, FakeRendererFactory::default(), CancellationToken::new());
    let summary = orchestrator.run().await.unwrap();
    assert_eq!(summary.artifacts_captured, 1);

    let rows = read_rows(&aggregate);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].term, "giày dép");
    assert_eq!(rows[0].artifact_source.as_deref(), Some("direct-download"));
    let expected = shots.join("giày_dép_5.png");
    assert_eq!(
        rows[0].local_screenshot_path.as_deref(),
        Some(expected.display().to_string().as_str())
    );
    assert!(expected.exists());
    assert_eq!(rows[1].local_screenshot_path, None);
    assert_eq!(rows[1].currency.as_deref(), Some("VND"));
}

#[tokio::test]
async fn test_low_disk_space_stops_capture_for_rest_of_item() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir, &server.uri(), &["A", "B"]);
    config.filter.kind = FilterKind::Any;
    config.capture.min_free_gb = 1.0;
    let aggregate = config.output.aggregate_path();

    // Snapshot pages are not mocked, so every capture ends in the renderer
    let snapshot = |id: &str| Some(format!("{}/snapshot?id={}", server.uri(), id));
    mount_term(
        &server,
        "A",
        vec![
            ad("1", "a", snapshot("1")),
            ad("2", "b", snapshot("2")),
            ad("3", "c", snapshot("3")),
        ],
    )
    .await;
    mount_term(&server, "B", vec![ad("4", "d", snapshot("4"))]).await;

    // Enough space for record 1, too little for record 2, plenty afterwards
    let space = ScriptedSpace::new(&[u64::MAX, 0]);
    let mut orchestrator = test_orchestrator_with_probe(
        config,
        FakeRendererFactory::default(),
        Box::new(space.clone()),
        CancellationToken::new(),
    );
    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.rows_written, 4);
    assert_eq!(summary.artifacts_captured, 2);
    // Record 3 is never checked; item B checks again
    assert_eq!(space.queries.load(Ordering::SeqCst), 3);

    let rows = read_rows(&aggregate);
    assert_eq!(ids(&rows), ["1", "2", "3", "4"]);
    let captured: Vec<bool> = rows
        .iter()
        .map(|row| row.local_screenshot_path.is_some())
        .collect();
    assert_eq!(captured, [true, false, false, true]);
}

#[tokio::test]
async fn test_partial_batch_is_flushed_at_item_end() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir, &server.uri(), &["A"]);
    config.filter.kind = FilterKind::Any;
    config.output.batch_size = 2;
    let aggregate = config.output.aggregate_path();

    mount_term(
        &server,
        "A",
        vec![ad("1", "a", None), ad("2", "b", None), ad("3", "c", None)],
    )
    .await;

    let mut orchestrator =
        test_orchestrator(config, FakeRendererFactory::default(), CancellationToken::new());
    orchestrator.run().await.unwrap();

    let content = std::fs::read_to_string(&aggregate).unwrap();
    assert_eq!(content.matches("term,record_id").count(), 1);
    assert_eq!(ids(&read_rows(&aggregate)), ["1", "2", "3"]);
}

#[tokio::test]
async fn test_resume_skips_completed_items() {
    let dir = TempDir::new().unwrap();

    let first = MockServer::start().await;
    let mut config = test_config(&dir, &first.uri(), &["A"]);
    config.filter.kind = FilterKind::Any;
    mount_term(&first, "A", vec![ad("1", "a", None)]).await;

    let mut orchestrator = test_orchestrator(
        config.clone(),
        FakeRendererFactory::default(),
        CancellationToken::new(),
    );
    orchestrator.run().await.unwrap();

    let second = MockServer::start().await;
    let mut config = test_config(&dir, &second.uri(), &["A", "B"]);
    config.filter.kind = FilterKind::Any;
    Mock::given(query_param("search_terms", "A"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![], None)))
        .expect(0)
        .mount(&second)
        .await;
    mount_term(&second, "B", vec![ad("2", "b", None)]).await;
    let aggregate = config.output.aggregate_path();

    let mut orchestrator =
        test_orchestrator(config, FakeRendererFactory::default(), CancellationToken::new());
    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.items_skipped, 1);
    assert_eq!(summary.items_completed, 1);
    assert_eq!(ids(&read_rows(&aggregate)), ["1", "2"]);
}

#[tokio::test]
async fn test_shutdown_mid_item_then_resume_has_no_duplicates() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir, &server.uri(), &["A"]);
    config.filter.kind = FilterKind::Any;
    let aggregate = config.output.aggregate_path();
    let state_path = config.output.state_path();

    let token = CancellationToken::new();
    let trigger = token.clone();
    // Capturing record 2's artifact requests shutdown
    Mock::given(path("/cdn/2.png"))
        .respond_with(move |_: &Request| {
            trigger.cancel();
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(vec![1, 2, 3])
        })
        .mount(&server)
        .await;
    mount_term(
        &server,
        "A",
        vec![
            ad("1", "a", None),
            ad("2", "b", Some(format!("{}/cdn/2.png", server.uri()))),
            ad("3", "c", None),
        ],
    )
    .await;

    let mut orchestrator = test_orchestrator(config.clone(), FakeRendererFactory::default(), token);
    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.stop_reason, StopReason::Shutdown);
    assert_eq!(ids(&read_rows(&aggregate)), ["1", "2"]);
    let state = CheckpointStore::new(&state_path).load();
    assert!(!state.is_completed("A"));
    assert_eq!(state.seen_record_ids(), ["1", "2"]);

    let mut orchestrator =
        test_orchestrator(config, FakeRendererFactory::default(), CancellationToken::new());
    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.stop_reason, StopReason::Completed);
    assert_eq!(summary.records_duplicate, 2);
    assert_eq!(ids(&read_rows(&aggregate)), ["1", "2", "3"]);
    assert!(CheckpointStore::new(&state_path).load().is_completed("A"));
}

#[tokio::test]
async fn test_run_ingest_with_builtin_renderer() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir, &server.uri(), &["A"]);
    config.filter.kind = FilterKind::Any;
    let aggregate = config.output.aggregate_path();

    Mock::given(path("/snapshot"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<html><body><p>creative</p></body></html>"),
        )
        .mount(&server)
        .await;
    mount_term(
        &server,
        "A",
        vec![ad("1", "a", Some(format!("{}/snapshot?id=1", server.uri())))],
    )
    .await;

    let summary = run_ingest(
        config,
        "test-token".to_string(),
        "hash".to_string(),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(summary.artifacts_captured, 1);
    let rows = read_rows(&aggregate);
    assert_eq!(rows[0].artifact_source.as_deref(), Some("rendered-capture"));
    assert!(rows[0]
        .local_screenshot_path
        .as_deref()
        .unwrap()
        .ends_with("A_1.html"));
}

#[tokio::test]
async fn test_run_ingest_aborts_on_auth_failure() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, &server.uri(), &["A", "B"]);
    let state_path = config.output.state_path();

    Mock::given(method("GET"))
        .and(path(ARCHIVE_PATH))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .expect(1)
        .mount(&server)
        .await;

    let err = run_ingest(
        config,
        "bad-token".to_string(),
        "hash".to_string(),
        CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, HarvestError::SourceAuth { status: 403, .. }));
    let state = CheckpointStore::new(&state_path).load();
    assert!(state.completed_work_items().is_empty());
    assert_eq!(state.config_hash(), Some("hash"));
}
