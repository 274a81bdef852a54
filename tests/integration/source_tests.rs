//! Fetch client behavior against a mock archive API

use crate::common::{ad, page, test_config, ARCHIVE_PATH};
use snap_harvest::source::{FetchClient, FetchSettings, GraphApiSource, SourceError};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(config: &snap_harvest::Config) -> FetchClient<GraphApiSource> {
    let source = GraphApiSource::new(reqwest::Client::new(), &config.source, "secret").unwrap();
    FetchClient::new(
        source,
        FetchSettings::from_config(config),
        CancellationToken::new(),
    )
}

#[tokio::test]
async fn test_follows_pagination_cursor() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, &server.uri(), &["giày"]);

    let next = format!("{}/ads_archive/next?after=abc", server.uri());
    Mock::given(method("GET"))
        .and(path(ARCHIVE_PATH))
        .and(query_param("search_terms", "giày"))
        .and(query_param("access_token", "secret"))
        .and(query_param("limit", "50"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(page(vec![ad("1", "a", None)], Some(next))),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/ads_archive/next"))
        .and(query_param("after", "abc"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(page(vec![ad("2", "b", None), ad("3", "c", None)], None)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let outcome = client_for(&config).fetch_term("giày").await.unwrap();

    assert_eq!(outcome.pages, 2);
    assert!(outcome.partial.is_none());
    let ids: Vec<_> = outcome.records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, ["1", "2", "3"]);
    assert_eq!(outcome.records[0].owner_name.as_deref(), Some("Cửa hàng"));
}

#[tokio::test]
async fn test_page_budget_stops_pagination() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir, &server.uri(), &["A"]);
    config.source.max_pages = 1;

    let next = format!("{}/ads_archive/next", server.uri());
    Mock::given(method("GET"))
        .and(path(ARCHIVE_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(page(vec![ad("1", "a", None)], Some(next))),
        )
        .mount(&server)
        .await;

    Mock::given(path("/ads_archive/next"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![], None)))
        .expect(0)
        .mount(&server)
        .await;

    let outcome = client_for(&config).fetch_term("A").await.unwrap();
    assert_eq!(outcome.pages, 1);
    assert_eq!(outcome.records.len(), 1);
}

#[tokio::test]
async fn test_rate_limit_is_retried() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, &server.uri(), &["A"]);

    Mock::given(method("GET"))
        .and(path(ARCHIVE_PATH))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(ARCHIVE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![ad("7", "x", None)], None)))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = client_for(&config).fetch_term("A").await.unwrap();
    assert!(outcome.partial.is_none());
    assert_eq!(outcome.records.len(), 1);
}

#[tokio::test]
async fn test_exhausted_retries_yield_partial_outcome() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir, &server.uri(), &["B"]);
    config.retry.max_retries = 2;

    Mock::given(method("GET"))
        .and(path(ARCHIVE_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .expect(3)
        .mount(&server)
        .await;

    let outcome = client_for(&config).fetch_term("B").await.unwrap();

    assert!(outcome.records.is_empty());
    let partial = outcome.partial.expect("partial fetch expected");
    assert_eq!(partial.term, "B");
    assert_eq!(partial.attempts, 3);
    assert!(partial.source.is_transient());
}

#[tokio::test]
async fn test_auth_failure_is_not_retried() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, &server.uri(), &["A"]);

    Mock::given(method("GET"))
        .and(path(ARCHIVE_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid token"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client_for(&config).fetch_term("A").await.unwrap_err();
    assert!(matches!(err, SourceError::Auth { status: 401, .. }));
}

#[tokio::test]
async fn test_records_without_id_are_rejected() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, &server.uri(), &["A"]);

    let body = serde_json::json!({
        "data": [
            {"ad_creative_body": "no id"},
            {"id": "", "ad_creative_body": "blank id"},
            {"id": 12, "ad_creative_body": "numeric id"}
        ]
    });
    Mock::given(method("GET"))
        .and(path(ARCHIVE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let outcome = client_for(&config).fetch_term("A").await.unwrap();
    assert_eq!(outcome.rejected, 2);
    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.records[0].id, "12");
}
