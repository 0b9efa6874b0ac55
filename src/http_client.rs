use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, USER_AGENT};
use reqwest::{Client, ClientBuilder};
use std::time::Duration;
use tokio::time::sleep;

/// User agents to rotate through to avoid bot detection
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:123.0) Gecko/20100101 Firefox/123.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
];

/// Configuration for the lightweight fetch transport
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub max_retries: usize,
    pub retry_base_delay_ms: u64,
    pub enable_cookies: bool,
    pub enable_gzip: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            max_retries: 2,
            retry_base_delay_ms: 500,
            enable_cookies: true,
            enable_gzip: true,
        }
    }
}

/// Plain HTTP fetcher with browser-like headers and bounded retries.
///
/// Non-success statuses are not errors here: challenge pages come back as
/// 403/503 bodies and are classified by content further up.
pub struct EnhancedHttpClient {
    client: Client,
    config: HttpClientConfig,
}

impl EnhancedHttpClient {
    /// Create a new client with default configuration
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_config(HttpClientConfig::default())
    }

    pub fn with_config(config: HttpClientConfig) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
        headers.insert("DNT", HeaderValue::from_static("1"));
        headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));
        headers.insert("Sec-Fetch-Dest", HeaderValue::from_static("document"));
        headers.insert("Sec-Fetch-Mode", HeaderValue::from_static("navigate"));
        headers.insert("Sec-Fetch-Site", HeaderValue::from_static("none"));

        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .cookie_store(config.enable_cookies)
            .gzip(config.enable_gzip)
            .brotli(config.enable_gzip)
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .default_headers(headers)
            .build()?;

        Ok(Self { client, config })
    }

    /// Get a random user agent from the pool
    pub fn random_user_agent() -> &'static str {
        let mut rng = rand::thread_rng();
        USER_AGENTS[rng.gen_range(0..USER_AGENTS.len())]
    }

    /// Linear backoff: `base * attempt`, attempts counted from 1
    pub fn retry_delay(&self, attempt: usize) -> Duration {
        Duration::from_millis(self.config.retry_base_delay_ms * attempt as u64)
    }

    fn is_transient(error: &reqwest::Error) -> bool {
        error.is_timeout() || error.is_connect() || error.is_request() || error.is_body()
    }

    /// Fetch a URL and return its body, retrying transient network failures.
    pub async fn get_text(&self, url: &str) -> Result<String, reqwest::Error> {
        let mut attempt = 0;
        loop {
            let result = self.fetch_once(url).await;
            match result {
                Ok(body) => return Ok(body),
                Err(e) if Self::is_transient(&e) && attempt < self.config.max_retries => {
                    attempt += 1;
                    log::warn!(
                        "Request failed for {}, attempt {}/{}: {}",
                        url,
                        attempt,
                        self.config.max_retries + 1,
                        e
                    );
                    sleep(self.retry_delay(attempt)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<String, reqwest::Error> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, Self::random_user_agent())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            log::debug!("Received status {} for {}", status, url);
        }
        response.text().await
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }
}
