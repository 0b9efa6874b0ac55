use rust_manga_sync::http_client::{EnhancedHttpClient, HttpClientConfig};
use std::time::{Duration, Instant};
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_client(max_retries: usize) -> EnhancedHttpClient {
    EnhancedHttpClient::with_config(HttpClientConfig {
        timeout: Duration::from_secs(5),
        max_retries,
        retry_base_delay_ms: 50,
        ..HttpClientConfig::default()
    })
    .expect("Failed to create client")
}

#[tokio::test]
async fn test_fetch_returns_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/manga/"))
        .and(header_exists("user-agent"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let body = fast_client(2)
        .get_text(&format!("{}/manga/", server.uri()))
        .await
        .unwrap();
    assert_eq!(body, "<html>ok</html>");
}

#[tokio::test]
async fn test_error_status_body_is_returned_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/blocked"))
        .respond_with(ResponseTemplate::new(503).set_body_string("<title>Just a moment...</title>"))
        .expect(1)
        .mount(&server)
        .await;

    let body = fast_client(2)
        .get_text(&format!("{}/blocked", server.uri()))
        .await
        .unwrap();
    assert!(body.contains("Just a moment"));
}

#[tokio::test]
async fn test_connection_failure_retries_with_linear_backoff() {
    // Nothing listens on this port once the listener is dropped
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let uri = format!("http://127.0.0.1:{}", port);

    let started = Instant::now();
    let result = fast_client(2).get_text(&format!("{}/gone", uri)).await;

    assert!(result.is_err());
    // 50ms after the first failure, 100ms after the second
    assert!(started.elapsed() >= Duration::from_millis(150));
}
