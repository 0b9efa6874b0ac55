use async_trait::async_trait;
use rust_manga_sync::browser::BrowserError;
use rust_manga_sync::error::{CrawlError, ErrorKind};
use rust_manga_sync::http_client::{EnhancedHttpClient, HttpClientConfig};
use rust_manga_sync::transport::{FetchOptions, Renderer, Transport, TransportSelector};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CHAPTER_PAGE: &str =
    r#"<html><body><div class="reading-content"><img src="https://img.test/1.jpg"></div></body></html>"#;

enum Behaviour {
    Markup(&'static str),
    EngineDown,
    NavigationFails,
}

struct CountingRenderer {
    calls: AtomicUsize,
    behaviour: Behaviour,
}

impl CountingRenderer {
    fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            behaviour,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Renderer for CountingRenderer {
    async fn render(&self, url: &str, _render_marker: Option<&str>) -> Result<String, BrowserError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behaviour {
            Behaviour::Markup(markup) => Ok(markup.to_string()),
            Behaviour::EngineDown => Err(BrowserError::EngineUnavailable("chrome not found".to_string())),
            Behaviour::NavigationFails => Err(BrowserError::NavigationError(format!("timeout for {}", url))),
        }
    }
}

fn http() -> EnhancedHttpClient {
    EnhancedHttpClient::with_config(HttpClientConfig {
        timeout: Duration::from_secs(5),
        max_retries: 1,
        retry_base_delay_ms: 10,
        ..HttpClientConfig::default()
    })
    .unwrap()
}

async fn serve(server: &MockServer, route: &str, status: u16, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(server)
        .await;
}

fn chapter_options() -> FetchOptions {
    FetchOptions::require(".reading-content img").render_marker(".reading-content")
}

#[tokio::test]
async fn test_plain_page_with_marker_stays_lightweight() {
    let server = MockServer::start().await;
    serve(&server, "/chapter-1/", 200, CHAPTER_PAGE).await;

    let renderer = CountingRenderer::new(Behaviour::Markup("<html>rendered</html>"));
    let selector = TransportSelector::new(http(), Some(renderer.clone()));

    let fetched = selector
        .fetch(&format!("{}/chapter-1/", server.uri()), &chapter_options())
        .await
        .unwrap();

    assert_eq!(fetched.transport, Transport::Lightweight);
    assert_eq!(fetched.markup, CHAPTER_PAGE);
    assert_eq!(renderer.calls(), 0);
    assert_eq!(selector.counts(), (1, 0));
}

#[tokio::test]
async fn test_challenge_page_escalates_to_rendered() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/chapter-1/",
        503,
        "<html><title>Just a moment...</title><div class=\"reading-content\"><img src=\"x.jpg\"></div></html>",
    )
    .await;

    let renderer = CountingRenderer::new(Behaviour::Markup(CHAPTER_PAGE));
    let selector = TransportSelector::new(http(), Some(renderer.clone()));

    let fetched = selector
        .fetch(&format!("{}/chapter-1/", server.uri()), &chapter_options())
        .await
        .unwrap();

    assert_eq!(fetched.transport, Transport::Rendered);
    assert_eq!(fetched.markup, CHAPTER_PAGE);
    assert_eq!(renderer.calls(), 1);
}

#[tokio::test]
async fn test_missing_marker_escalates() {
    let server = MockServer::start().await;
    serve(&server, "/chapter-2/", 200, "<html><body><div id=\"app\"></div></body></html>").await;

    let renderer = CountingRenderer::new(Behaviour::Markup(CHAPTER_PAGE));
    let selector = TransportSelector::new(http(), Some(renderer.clone()));

    let fetched = selector
        .fetch(&format!("{}/chapter-2/", server.uri()), &chapter_options())
        .await
        .unwrap();

    assert_eq!(fetched.transport, Transport::Rendered);
    assert_eq!(renderer.calls(), 1);
}

#[tokio::test]
async fn test_empty_body_counts_as_blocked() {
    let server = MockServer::start().await;
    serve(&server, "/empty", 200, "").await;

    let selector = TransportSelector::new(http(), None);
    let err = selector
        .fetch(&format!("{}/empty", server.uri()), &FetchOptions::default())
        .await
        .unwrap_err();

    match &err {
        CrawlError::FetchFailed { transport, .. } => assert_eq!(*transport, Transport::Lightweight),
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(err.kind(), ErrorKind::Blocked);
}

#[tokio::test]
async fn test_prefer_rendered_skips_plain_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(CHAPTER_PAGE))
        .expect(0)
        .mount(&server)
        .await;

    let renderer = CountingRenderer::new(Behaviour::Markup(CHAPTER_PAGE));
    let selector = TransportSelector::new(http(), Some(renderer.clone()));
    let options = FetchOptions {
        prefer_rendered: true,
        ..chapter_options()
    };

    let fetched = selector
        .fetch(&format!("{}/chapter-1/", server.uri()), &options)
        .await
        .unwrap();
    assert_eq!(fetched.transport, Transport::Rendered);
    assert_eq!(renderer.calls(), 1);
}

#[tokio::test]
async fn test_both_tiers_failing_reports_rendered_transport() {
    let server = MockServer::start().await;
    serve(&server, "/chapter-3/", 403, "Attention Required! | Cloudflare").await;

    let renderer = CountingRenderer::new(Behaviour::NavigationFails);
    let selector = TransportSelector::new(http(), Some(renderer.clone()));

    let err = selector
        .fetch(&format!("{}/chapter-3/", server.uri()), &chapter_options())
        .await
        .unwrap_err();

    match err {
        CrawlError::FetchFailed { transport, .. } => assert_eq!(transport, Transport::Rendered),
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_engine_unavailable_is_fatal() {
    let server = MockServer::start().await;
    serve(&server, "/chapter-4/", 503, "<title>Just a moment...</title>").await;

    let renderer = CountingRenderer::new(Behaviour::EngineDown);
    let selector = TransportSelector::new(http(), Some(renderer.clone()));

    let err = selector
        .fetch(&format!("{}/chapter-4/", server.uri()), &chapter_options())
        .await
        .unwrap_err();

    assert!(matches!(err, CrawlError::EngineUnavailable(_)));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_refused_connection_is_transient_whatever_the_url() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let selector = TransportSelector::new(http(), None);

    let err = selector
        .fetch(
            &format!("http://127.0.0.1:{}/manga/the-challenge-of-gods/", port),
            &chapter_options(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TransientNetwork);
    assert!(!err.is_fatal());
}

#[tokio::test]
async fn test_missing_marker_without_renderer_is_blocked() {
    let server = MockServer::start().await;
    serve(&server, "/manga/x/", 200, "<html><body><div id=\"app\"></div></body></html>").await;

    let selector = TransportSelector::new(http(), None);
    let err = selector
        .fetch(&format!("{}/manga/x/", server.uri()), &chapter_options())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Blocked);
}

#[tokio::test]
async fn test_prefer_rendered_without_renderer_uses_plain_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/lastupdates.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string(CHAPTER_PAGE))
        .expect(1)
        .mount(&server)
        .await;

    let selector = TransportSelector::new(http(), None);
    let options = FetchOptions {
        prefer_rendered: true,
        ..chapter_options()
    };

    let fetched = selector
        .fetch(&format!("{}/lastupdates.php?list=1", server.uri()), &options)
        .await
        .unwrap();
    assert_eq!(fetched.transport, Transport::Lightweight);
    assert_eq!(selector.counts(), (1, 0));
}
