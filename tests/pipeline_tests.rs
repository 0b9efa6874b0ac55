use async_trait::async_trait;
use rust_manga_sync::browser::BrowserError;
use rust_manga_sync::crawler::{CrawlOrchestrator, CrawlPlan, PageOrder};
use rust_manga_sync::error::CrawlError;
use rust_manga_sync::http_client::{EnhancedHttpClient, HttpClientConfig};
use rust_manga_sync::models::ChapterNumber;
use rust_manga_sync::sources::MadaraAdapter;
use rust_manga_sync::store::{DocumentStore, MemoryStore};
use rust_manga_sync::sync::SyncGateway;
use rust_manga_sync::transport::{Renderer, TransportSelector};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CHAPTER_ONE: &str = r#"<html><body><div class="reading-content">
    <img data-src="https://img.test/alpha/1/001.jpg" src="data:image/gif;base64,AAA">
    <img src="https://img.test/alpha/1/002.jpg">
</div></body></html>"#;

const RENDERED_CHAPTER: &str = r#"<html><body><div class="reading-content">
    <img src="https://img.test/alpha/2/001.jpg">
</div></body></html>"#;

fn listing(base: &str) -> String {
    format!(
        r#"<html><body>
        <div class="page-item-detail"><div class="post-title"><a href="{base}/manga/alpha/">Alpha Story</a></div></div>
        <div class="page-item-detail"><div class="post-title"><a href="{base}/manga/beta/">Beta Story</a></div></div>
        </body></html>"#
    )
}

const EMPTY_LISTING: &str = r#"<html><body>
    <div class="page-item-detail"><div class="post-title"><a href="/genre/action/">Action</a></div></div>
</body></html>"#;

const ALPHA_DETAIL: &str = r#"<html><head><title>Alpha Story | Test</title></head><body>
    <div class="post-title"><h1>Alpha Story</h1></div>
    <div class="summary__content">A story about alpha.</div>
    <div class="genres-content"><a>Action</a></div>
    <ul class="main version-chap">
        <li class="wp-manga-chapter"><a href="/manga/alpha/chapter-2/">Chapter 2</a></li>
        <li class="wp-manga-chapter"><a href="/manga/alpha/chapter-1/">Chapter 1</a></li>
    </ul>
</body></html>"#;

const BETA_DETAIL: &str = r#"<html><body>
    <div class="post-title"><h1>Beta Story</h1></div>
    <ul class="main version-chap">
        <li class="wp-manga-chapter"><a href="/manga/beta/notice/">Notice</a></li>
    </ul>
</body></html>"#;

struct FixedRenderer {
    result: Result<&'static str, ()>,
}

#[async_trait]
impl Renderer for FixedRenderer {
    async fn render(&self, _url: &str, _render_marker: Option<&str>) -> Result<String, BrowserError> {
        match self.result {
            Ok(markup) => Ok(markup.to_string()),
            Err(()) => Err(BrowserError::EngineUnavailable("no chrome binary".to_string())),
        }
    }
}

async fn serve(server: &MockServer, route: &str, body: String, hits: Option<u64>) {
    let mock = Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body));
    let mock = match hits {
        Some(n) => mock.expect(n),
        None => mock,
    };
    mock.mount(server).await;
}

async fn madara_site() -> MockServer {
    let server = MockServer::start().await;
    let base = server.uri();
    serve(&server, "/", listing(&base), None).await;
    serve(&server, "/page/2/", EMPTY_LISTING.to_string(), None).await;
    serve(&server, "/manga/alpha/", ALPHA_DETAIL.to_string(), None).await;
    serve(&server, "/manga/beta/", BETA_DETAIL.to_string(), None).await;
    serve(&server, "/manga/alpha/chapter-1/", CHAPTER_ONE.to_string(), Some(1)).await;
    serve(
        &server,
        "/manga/alpha/chapter-2/",
        "<html><body><p>Chapter coming soon</p></body></html>".to_string(),
        None,
    )
    .await;
    server
}

fn plan(order: PageOrder) -> CrawlPlan {
    CrawlPlan {
        first_page: 1,
        last_page: 2,
        order,
        concurrency: 2,
        request_delay: Duration::ZERO,
    }
}

fn orchestrator(
    server: &MockServer,
    store: Arc<dyn DocumentStore>,
    renderer: Option<Arc<dyn Renderer>>,
    order: PageOrder,
) -> CrawlOrchestrator {
    let http = EnhancedHttpClient::with_config(HttpClientConfig {
        timeout: Duration::from_secs(5),
        max_retries: 0,
        ..HttpClientConfig::default()
    })
    .unwrap();

    CrawlOrchestrator::new(
        Arc::new(MadaraAdapter::new(server.uri())),
        Arc::new(TransportSelector::new(http, renderer)),
        SyncGateway::new(store),
        plan(order),
    )
}

fn number(value: f64) -> ChapterNumber {
    ChapterNumber::new(value).unwrap()
}

#[tokio::test]
async fn test_full_run_then_resume() {
    let server = madara_site().await;
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());

    let report = orchestrator(&server, store.clone(), None, PageOrder::Descending)
        .run()
        .await
        .unwrap();

    assert_eq!(report.pages_walked, 2);
    assert_eq!(report.empty_pages, 1);
    assert_eq!(report.items_processed, 1);
    assert_eq!(report.items_skipped, 1);
    assert_eq!(report.chapters_fetched, 1);
    assert_eq!(report.chapters_failed, 1);
    assert_eq!(report.rendered_fetches, 0);

    let entry = store.find_catalog_entry("alpha").await.unwrap().unwrap();
    assert_eq!(entry.title, "Alpha Story");
    assert_eq!(entry.total_chapters, 2);
    assert!(store.find_catalog_entry("beta").await.unwrap().is_none());

    let chapter_one = store.find_chapter("alpha", number(1.0)).await.unwrap().unwrap();
    assert_eq!(
        chapter_one.images,
        vec!["https://img.test/alpha/1/001.jpg", "https://img.test/alpha/1/002.jpg"]
    );
    assert_eq!(chapter_one.total_images, 2);

    let placeholder = store.find_chapter("alpha", number(2.0)).await.unwrap().unwrap();
    assert!(placeholder.images.is_empty());
    assert_eq!(placeholder.total_images, 0);
    assert!(placeholder.chapter_url.ends_with("/manga/alpha/chapter-2/"));
    let stats_before = store.stats().await.unwrap();

    // Second run: chapter 1 is complete and must not be fetched again
    let report = orchestrator(&server, store.clone(), None, PageOrder::Descending)
        .run()
        .await
        .unwrap();

    assert_eq!(report.chapters_skipped, 1);
    assert_eq!(report.chapters_fetched, 0);
    assert_eq!(report.chapters_failed, 1);
    assert_eq!(
        store.find_chapter("alpha", number(1.0)).await.unwrap().unwrap(),
        chapter_one
    );
    assert_eq!(store.stats().await.unwrap(), stats_before);
}

#[tokio::test]
async fn test_renderer_fills_in_blocked_chapter() {
    let server = madara_site().await;
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let renderer: Arc<dyn Renderer> = Arc::new(FixedRenderer {
        result: Ok(RENDERED_CHAPTER),
    });

    let report = orchestrator(&server, store.clone(), Some(renderer), PageOrder::Ascending)
        .run()
        .await
        .unwrap();

    assert_eq!(report.chapters_fetched, 2);
    assert_eq!(report.chapters_failed, 0);
    assert_eq!(report.rendered_fetches, 1);

    let chapter_two = store.find_chapter("alpha", number(2.0)).await.unwrap().unwrap();
    assert_eq!(chapter_two.images, vec!["https://img.test/alpha/2/001.jpg"]);
    assert_eq!(store.stats().await.unwrap().complete_chapters, 2);
}

#[tokio::test]
async fn test_unavailable_engine_aborts_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503).set_body_string("<title>Just a moment...</title>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page/2/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(EMPTY_LISTING))
        .expect(0)
        .mount(&server)
        .await;

    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let renderer: Arc<dyn Renderer> = Arc::new(FixedRenderer { result: Err(()) });

    let err = orchestrator(&server, store.clone(), Some(renderer), PageOrder::Ascending)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, CrawlError::EngineUnavailable(_)));
    assert_eq!(store.stats().await.unwrap().total_manga, 0);
}

#[tokio::test]
async fn test_engine_loss_in_fanout_lets_siblings_finish() {
    let server = madara_site().await;
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let renderer: Arc<dyn Renderer> = Arc::new(FixedRenderer { result: Err(()) });

    let err = orchestrator(&server, store.clone(), Some(renderer), PageOrder::Ascending)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, CrawlError::EngineUnavailable(_)));

    let chapter_one = store.find_chapter("alpha", number(1.0)).await.unwrap().unwrap();
    assert_eq!(chapter_one.total_images, 2);
    assert!(store.find_chapter("alpha", number(2.0)).await.unwrap().is_none());
    assert!(store.find_catalog_entry("alpha").await.unwrap().is_some());

    let requested: Vec<String> = server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r| r.url.path().to_string())
        .collect();
    assert!(requested.contains(&"/manga/alpha/chapter-1/".to_string()));
    assert!(!requested.contains(&"/manga/beta/".to_string()));
    assert!(!requested.contains(&"/page/2/".to_string()));
}
