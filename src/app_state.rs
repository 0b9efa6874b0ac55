//! Application state for the Actix-web server
//!
//! Wrapped in `web::Data` and shared by every handler, the scheduler and the
//! background crawl task.

use crate::config::Config;
use crate::crawler::{CrawlProgress, SharedProgress};
use crate::store::DocumentStore;
use std::sync::{Arc, Mutex};

pub struct AppState {
    /// Application configuration, read once at startup
    pub config: Config,
    /// Document store shared with every crawl run
    pub store: Arc<dyn DocumentStore>,
    /// Progress of the current (or last) crawl run
    pub crawl_progress: SharedProgress,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            config,
            store,
            crawl_progress: Arc::new(Mutex::new(CrawlProgress::default())),
        }
    }

    pub fn progress_snapshot(&self) -> CrawlProgress {
        match self.crawl_progress.lock() {
            Ok(p) => p.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
