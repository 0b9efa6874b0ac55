use crate::browser::BrowserConfig;
use crate::crawler::PageOrder;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Adapter name, see `sources::SOURCE_NAMES`
    #[serde(default = "default_source")]
    pub source: String,
    /// Overrides the adapter's site root
    #[serde(default)]
    pub source_base_url: Option<String>,
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub bot_detection: BotDetectionConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Listing page range and fan-out limits
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CrawlConfig {
    /// Lower bound of the page range (inclusive)
    pub first_page: u32,
    /// Upper bound of the page range (inclusive)
    pub last_page: u32,
    /// Walk direction through the range
    pub order: PageOrder,
    /// Simultaneous leaf fetches per item
    pub concurrency: usize,
    /// Pause between items, in milliseconds
    pub request_delay_ms: u64,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            first_page: 1,
            last_page: 2,
            order: PageOrder::Descending,
            concurrency: 1,
            request_delay_ms: 300,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BotDetectionConfig {
    /// Escalate to headless Chrome when the plain fetch is not enough
    #[serde(default = "default_true")]
    pub enable_browser: bool,

    /// Timeout for HTTP requests in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Linear backoff base in milliseconds
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,

    /// Enable cookie support
    #[serde(default = "default_true")]
    pub enable_cookies: bool,

    /// Enable gzip/brotli compression
    #[serde(default = "default_true")]
    pub enable_compression: bool,
}

fn default_true() -> bool { true }
fn default_timeout() -> u64 { 20 }
fn default_max_retries() -> usize { 2 }
fn default_retry_base_delay() -> u64 { 500 }
fn default_source() -> String { "manhuafast".to_string() }

impl Default for BotDetectionConfig {
    fn default() -> Self {
        Self {
            enable_browser: true,
            timeout_secs: 20,
            max_retries: 2,
            retry_base_delay_ms: 500,
            enable_cookies: true,
            enable_compression: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sqlite,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            database_path: "manga.db".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Seconds between scheduled runs; 0 disables the scheduler
    pub schedule_interval_secs: u64,
    pub run_on_startup: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            schedule_interval_secs: 6 * 60 * 60,
            run_on_startup: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: default_source(),
            source_base_url: None,
            crawl: CrawlConfig::default(),
            bot_detection: BotDetectionConfig::default(),
            browser: BrowserConfig::default(),
            storage: StorageConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    /// Reads `CONFIG_PATH` (or `config.toml`), then applies environment
    /// overrides. A missing or unreadable file falls back to defaults.
    pub fn load() -> Self {
        let path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        let mut config = Self::from_file(Path::new(&path));
        config.apply_overrides(|name| env::var(name).ok());
        config
    }

    fn from_file(path: &Path) -> Self {
        if !path.exists() {
            log::info!("[config] {} not found, using defaults", path.display());
            return Self::default();
        }
        match fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content).unwrap_or_else(|e| {
                log::warn!("[config] invalid {}: {}, using defaults", path.display(), e);
                Self::default()
            }),
            Err(e) => {
                log::warn!("[config] cannot read {}: {}, using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// `PAGES`, `CONCURRENCY`, `PORT`, `DATABASE_PATH` and
    /// `MANGA_SCRAPER_USE_BROWSER`, looked up through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(pages) = lookup("PAGES").and_then(|v| v.trim().parse::<u32>().ok()) {
            self.crawl.last_page = pages.max(1);
        }
        if let Some(concurrency) = lookup("CONCURRENCY").and_then(|v| v.trim().parse::<usize>().ok()) {
            self.crawl.concurrency = concurrency.max(1);
        }
        if let Some(port) = lookup("PORT").and_then(|v| v.trim().parse::<u16>().ok()) {
            self.server.port = port;
        }
        if let Some(path) = lookup("DATABASE_PATH").filter(|v| !v.trim().is_empty()) {
            self.storage.database_path = path;
        }
        if let Some(flag) = lookup("MANGA_SCRAPER_USE_BROWSER") {
            match flag.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.bot_detection.enable_browser = true,
                "0" | "false" | "no" | "off" => self.bot_detection.enable_browser = false,
                other => log::warn!("[config] ignoring MANGA_SCRAPER_USE_BROWSER={}", other),
            }
        }
    }
}

impl BotDetectionConfig {
    /// Create the lightweight HTTP client from this configuration
    pub fn create_http_client(&self) -> Result<crate::http_client::EnhancedHttpClient, reqwest::Error> {
        use crate::http_client::{EnhancedHttpClient, HttpClientConfig};
        use std::time::Duration;

        let config = HttpClientConfig {
            timeout: Duration::from_secs(self.timeout_secs),
            max_retries: self.max_retries,
            retry_base_delay_ms: self.retry_base_delay_ms,
            enable_cookies: self.enable_cookies,
            enable_gzip: self.enable_compression,
        };

        EnhancedHttpClient::with_config(config)
    }
}
