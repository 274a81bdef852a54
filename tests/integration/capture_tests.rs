//! Snapshot capture strategies against mock artifact hosts

use crate::common::{test_capturer, test_config, FakeRendererFactory, FixedSpace};
use snap_harvest::capture::{
    ArtifactSource, CaptureOutcome, CaptureSettings, HtmlRendererFactory, SnapshotCapturer,
};
use snap_harvest::guard::ResourceGuard;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_direct_download_by_extension() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, &server.uri(), &["A"]);

    Mock::given(method("GET"))
        .and(path("/cdn/1.jpg"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/jpeg")
                .set_body_bytes(vec![0xFF, 0xD8, 0xFF, 0xE0]),
        )
        .expect(1)
        .mount(&server)
        .await;

    let factory = FakeRendererFactory::default();
    let mut capturer = test_capturer(&config, factory.clone());
    let url = format!("{}/cdn/1.jpg", server.uri());

    let outcome = capturer.capture("1", Some(&url), "A_1").await;

    let artifact = outcome.artifact().expect("artifact expected").clone();
    assert_eq!(artifact.source, ArtifactSource::DirectDownload);
    assert_eq!(
        artifact.local_path,
        config.capture.screenshots_dir.join("A_1.jpeg")
    );
    assert_eq!(
        std::fs::read(&artifact.local_path).unwrap(),
        vec![0xFF, 0xD8, 0xFF, 0xE0]
    );
    assert!(factory.navigations.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_non_image_download_falls_through_to_renderer() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, &server.uri(), &["A"]);

    // Both the GET and the HEAD probe see HTML
    Mock::given(path("/cdn/2.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html; charset=utf-8")
                .set_body_string("<html><body>login wall</body></html>"),
        )
        .mount(&server)
        .await;

    let factory = FakeRendererFactory::default();
    let mut capturer = test_capturer(&config, factory.clone());
    let url = format!("{}/cdn/2.png", server.uri());

    let outcome = capturer.capture("2", Some(&url), "A_2").await;

    let artifact = outcome.artifact().expect("artifact expected").clone();
    assert_eq!(artifact.source, ArtifactSource::RenderedCapture);
    assert_eq!(
        artifact.local_path,
        config.capture.screenshots_dir.join("A_2.png")
    );
    assert_eq!(std::fs::read(&artifact.local_path).unwrap(), b"rendered");
    assert_eq!(*factory.navigations.lock().unwrap(), vec![url]);
}

#[tokio::test]
async fn test_probe_finds_image_without_extension() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, &server.uri(), &["A"]);

    Mock::given(method("HEAD"))
        .and(path("/render"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-type", "image/webp"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/render"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/webp")
                .set_body_bytes(b"RIFFxxxxWEBP".to_vec()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut capturer = test_capturer(&config, FakeRendererFactory::default());
    let url = format!("{}/render?id=3", server.uri());

    let outcome = capturer.capture("3", Some(&url), "A_3").await;

    let artifact = outcome.artifact().expect("artifact expected").clone();
    assert_eq!(artifact.source, ArtifactSource::DirectDownload);
    assert!(artifact.local_path.ends_with("A_3.webp"));
}

#[tokio::test]
async fn test_absent_resource_is_skipped() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, "http://127.0.0.1:9", &["A"]);
    let mut capturer = test_capturer(&config, FakeRendererFactory::default());

    assert!(matches!(
        capturer.capture("1", None, "A_1").await,
        CaptureOutcome::Skipped
    ));
    assert!(matches!(
        capturer.capture("1", Some("  "), "A_1").await,
        CaptureOutcome::Skipped
    ));
}

#[tokio::test]
async fn test_low_disk_space_skips_capture() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, &server.uri(), &["A"]);

    Mock::given(path("/cdn/1.png"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-type", "image/png"))
        .expect(0)
        .mount(&server)
        .await;

    let mut settings = CaptureSettings::from_config(&config.capture);
    settings.min_free_bytes = 1024;
    let mut capturer = SnapshotCapturer::new(
        reqwest::Client::new(),
        ResourceGuard::new(&config.capture.screenshots_dir, Box::new(FixedSpace(1023))),
        Box::new(FakeRendererFactory::default()),
        settings,
    );
    let url = format!("{}/cdn/1.png", server.uri());

    match capturer.capture("1", Some(&url), "A_1").await {
        CaptureOutcome::InsufficientCapacity(e) => {
            assert_eq!(e.available, 1023);
            assert_eq!(e.required, 1024);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn test_html_renderer_snapshots_document() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, &server.uri(), &["A"]);

    let document = "<html><body><img src=\"creative.png\"></body></html>";
    Mock::given(path("/snapshot"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(document),
        )
        .mount(&server)
        .await;

    let client = reqwest::Client::new();
    let mut capturer = SnapshotCapturer::new(
        client.clone(),
        ResourceGuard::new(&config.capture.screenshots_dir, Box::new(FixedSpace(u64::MAX))),
        Box::new(HtmlRendererFactory::new(client)),
        CaptureSettings::from_config(&config.capture),
    );
    let url = format!("{}/snapshot?id=4", server.uri());

    let outcome = capturer.capture("4", Some(&url), "A_4").await;

    let artifact = outcome.artifact().expect("artifact expected").clone();
    assert_eq!(artifact.source, ArtifactSource::RenderedCapture);
    assert!(artifact.local_path.ends_with("A_4.html"));
    assert_eq!(
        std::fs::read_to_string(&artifact.local_path).unwrap(),
        document
    );

    capturer.shutdown().await;
    assert!(!capturer.renderer_active());
}

#[tokio::test]
async fn test_all_strategies_failing() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, &server.uri(), &["A"]);

    Mock::given(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = reqwest::Client::new();
    let mut capturer = SnapshotCapturer::new(
        client.clone(),
        ResourceGuard::new(&config.capture.screenshots_dir, Box::new(FixedSpace(u64::MAX))),
        Box::new(HtmlRendererFactory::new(client)),
        CaptureSettings::from_config(&config.capture),
    );
    let url = format!("{}/gone", server.uri());

    assert!(matches!(
        capturer.capture("5", Some(&url), "A_5").await,
        CaptureOutcome::Failed
    ));
}

#[tokio::test]
async fn test_restart_relaunches_renderer() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, "http://127.0.0.1:9", &["A"]);
    let mut capturer = test_capturer(&config, FakeRendererFactory::default());

    assert!(!capturer.renderer_active());
    capturer.start_renderer().await.unwrap();
    assert!(capturer.renderer_active());
    capturer.restart_renderer().await.unwrap();
    assert!(capturer.renderer_active());
    capturer.shutdown().await;
    capturer.shutdown().await;
    assert!(!capturer.renderer_active());
}
