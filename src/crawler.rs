//! Three-stage crawl: listing pages, item details, chapter images
//!
//! Items are handled one at a time with a courtesy delay between them.
//! Only the chapter fan-out of a single item runs concurrently, bounded by
//! the [`ConcurrencyLimiter`]. Task failures are counted and logged; only
//! an unavailable rendering engine ends a run early.

use crate::browser::BrowserSession;
use crate::config::{Config, CrawlConfig};
use crate::error::CrawlError;
use crate::helpers::slugify;
use crate::limiter::{ConcurrencyLimiter, TaskOutcome};
use crate::models::{CatalogUpdate, ChapterNumber, CrawlTask};
use crate::sources::{self, ChapterLink, ExtractionAdapter, LeafContext, ListingItem, Stage};
use crate::store::DocumentStore;
use crate::sync::{LeafResult, SyncGateway};
use crate::transport::{Renderer, TransportSelector};
use actix_web::web;
use chrono::Utc;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::time::{sleep, Duration};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageOrder {
    Descending,
    Ascending,
}

/// Page range and pacing for one run.
#[derive(Debug, Clone)]
pub struct CrawlPlan {
    pub first_page: u32,
    pub last_page: u32,
    pub order: PageOrder,
    pub concurrency: usize,
    pub request_delay: Duration,
}

impl CrawlPlan {
    pub fn from_config(config: &CrawlConfig) -> Self {
        Self {
            first_page: config.first_page,
            last_page: config.last_page,
            order: config.order,
            concurrency: config.concurrency,
            request_delay: Duration::from_millis(config.request_delay_ms),
        }
    }

    /// Pages to walk, in walk order. Page numbers start at 1.
    pub fn pages(&self) -> Vec<u32> {
        let low = self.first_page.min(self.last_page).max(1);
        let high = self.first_page.max(self.last_page).max(1);
        match self.order {
            PageOrder::Ascending => (low..=high).collect(),
            PageOrder::Descending => (low..=high).rev().collect(),
        }
    }
}

/// Per-stage counts of one run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct CrawlReport {
    pub source: String,
    pub pages_walked: usize,
    pub empty_pages: usize,
    pub failed_pages: usize,
    pub items_processed: usize,
    pub items_skipped: usize,
    pub items_failed: usize,
    pub chapters_fetched: usize,
    pub chapters_skipped: usize,
    pub chapters_empty: usize,
    pub chapters_failed: usize,
    pub lightweight_fetches: usize,
    pub rendered_fetches: usize,
    pub started_at: i64,
    pub finished_at: Option<i64>,
}

impl CrawlReport {
    fn started(source: &str) -> Self {
        Self {
            source: source.to_string(),
            started_at: Utc::now().timestamp(),
            ..Self::default()
        }
    }
}

/// Live state of the current (or last) run, served by the front door.
#[derive(Debug, Default, Serialize, Clone)]
pub struct CrawlProgress {
    pub in_progress: bool,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub current_page: Option<u32>,
    pub current_item: Option<String>,
    pub last_report: Option<CrawlReport>,
    pub error: Option<String>,
}

pub type SharedProgress = Arc<Mutex<CrawlProgress>>;

fn with_progress(progress: &Option<SharedProgress>, update: impl FnOnce(&mut CrawlProgress)) {
    if let Some(progress) = progress {
        match progress.lock() {
            Ok(mut p) => update(&mut p),
            Err(poisoned) => update(&mut poisoned.into_inner()),
        }
    }
}

#[derive(Debug)]
enum LeafStatus {
    Fetched,
    AlreadyComplete,
}

pub struct CrawlOrchestrator {
    adapter: Arc<dyn ExtractionAdapter>,
    transport: Arc<TransportSelector>,
    gateway: SyncGateway,
    limiter: ConcurrencyLimiter,
    plan: CrawlPlan,
    progress: Option<SharedProgress>,
}

impl CrawlOrchestrator {
    pub fn new(
        adapter: Arc<dyn ExtractionAdapter>,
        transport: Arc<TransportSelector>,
        gateway: SyncGateway,
        plan: CrawlPlan,
    ) -> Self {
        Self {
            adapter,
            transport,
            gateway,
            limiter: ConcurrencyLimiter::new(plan.concurrency),
            plan,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<SharedProgress>) -> Self {
        self.progress = progress;
        self
    }

    /// Walks every planned page. Returns the report unless the rendering
    /// engine became unavailable.
    pub async fn run(&self) -> Result<CrawlReport, CrawlError> {
        let mut report = CrawlReport::started(self.adapter.name());
        info!(
            "[crawler] {} run started: pages {:?}, concurrency {}",
            self.adapter.name(),
            self.plan.pages(),
            self.limiter.max_concurrent()
        );

        for page in self.plan.pages() {
            with_progress(&self.progress, |p| p.current_page = Some(page));
            self.walk_page(page, &mut report).await?;
        }

        let (lightweight, rendered) = self.transport.counts();
        report.lightweight_fetches = lightweight;
        report.rendered_fetches = rendered;
        report.finished_at = Some(Utc::now().timestamp());

        info!(
            "[crawler] run finished: pages {} (empty {}, failed {}), items {} (skipped {}, failed {}), \
             chapters fetched {} skipped {} empty {} failed {}, fetches lightweight {} rendered {}",
            report.pages_walked,
            report.empty_pages,
            report.failed_pages,
            report.items_processed,
            report.items_skipped,
            report.items_failed,
            report.chapters_fetched,
            report.chapters_skipped,
            report.chapters_empty,
            report.chapters_failed,
            report.lightweight_fetches,
            report.rendered_fetches
        );
        Ok(report)
    }

    async fn walk_page(&self, page: u32, report: &mut CrawlReport) -> Result<(), CrawlError> {
        let task = CrawlTask::ListingPage { page };
        let url = self.adapter.listing_url(page);
        report.pages_walked += 1;

        let fetched = match self
            .transport
            .fetch(&url, &self.adapter.fetch_options(Stage::Listing))
            .await
        {
            Ok(fetched) => fetched,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("[crawler] {} failed: {}", task, e);
                report.failed_pages += 1;
                return Ok(());
            }
        };

        let mut items = self.adapter.parse_listing(&fetched.markup);
        if items.is_empty() {
            warn!("[crawler] {} yielded no items", task);
            report.empty_pages += 1;
            return Ok(());
        }
        info!("[crawler] {}: {} items via {}", task, items.len(), fetched.transport);

        if self.plan.order == PageOrder::Descending {
            items.reverse();
        }

        for (index, item) in items.iter().enumerate() {
            if index > 0 && !self.plan.request_delay.is_zero() {
                sleep(self.plan.request_delay).await;
            }
            with_progress(&self.progress, |p| p.current_item = Some(item.title.clone()));

            match self.process_item(item, report).await {
                Ok(()) => report.items_processed += 1,
                Err(e) if e.is_fatal() => return Err(e),
                Err(CrawlError::ExtractionEmpty(what)) => {
                    info!("[crawler] skipping {}: {}", item.title, what);
                    report.items_skipped += 1;
                }
                Err(e) => {
                    warn!("[crawler] item {} failed: {}", item.title, e);
                    report.items_failed += 1;
                }
            }
        }
        Ok(())
    }

    async fn process_item(
        &self,
        item: &ListingItem,
        report: &mut CrawlReport,
    ) -> Result<(), CrawlError> {
        let key = catalog_key(item);
        if key.is_empty() {
            return Err(CrawlError::ExtractionEmpty(format!(
                "no usable key for listing item '{}'",
                item.title
            )));
        }

        let url = self.adapter.detail_url(item);
        let task = CrawlTask::Detail {
            key: key.clone(),
            url: url.clone(),
        };
        let fetched = self
            .transport
            .fetch(&url, &self.adapter.fetch_options(Stage::Detail))
            .await?;

        let detail = self.adapter.parse_detail(&fetched.markup);
        let chapters = dedupe_chapters(detail.chapters);
        if chapters.is_empty() {
            return Err(CrawlError::ExtractionEmpty(format!("{} lists no chapters", task)));
        }

        let update = CatalogUpdate {
            key: key.clone(),
            title: non_empty_or(detail.title, &item.title),
            cover: non_empty_or(detail.cover, &item.cover_url),
            description: detail.description,
            genres: detail.genres,
            total_chapters: chapters.len() as u32,
        };
        let outcome = self.gateway.upsert_catalog_entry(&update).await?;
        info!(
            "[crawler] {} '{}' via {}: {} chapters (inserted={}, modified={})",
            task, update.title, fetched.transport, chapters.len(), outcome.inserted, outcome.modified
        );

        let leaves = chapters.iter().map(|chapter| self.sync_chapter(&key, chapter));
        let outcomes = self.limiter.run(leaves.collect()).await;

        let mut fatal = None;
        for outcome in outcomes {
            match outcome {
                TaskOutcome::Completed(LeafStatus::Fetched) => report.chapters_fetched += 1,
                TaskOutcome::Completed(LeafStatus::AlreadyComplete) => report.chapters_skipped += 1,
                TaskOutcome::Failed(CrawlError::ExtractionEmpty(_)) => report.chapters_empty += 1,
                TaskOutcome::Failed(e) if e.is_fatal() => {
                    report.chapters_failed += 1;
                    fatal.get_or_insert(e);
                }
                TaskOutcome::Failed(_) | TaskOutcome::Panicked(_) => report.chapters_failed += 1,
            }
        }

        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// One leaf task: completeness gate, fetch, extract, persist.
    async fn sync_chapter(&self, key: &str, chapter: &ChapterLink) -> Result<LeafStatus, CrawlError> {
        let task = CrawlTask::Leaf {
            manga_key: key.to_string(),
            chapter_number: chapter.number,
            chapter_url: chapter.url.clone(),
        };

        if self.gateway.chapter_is_complete(key, chapter.number).await? {
            debug!("[crawler] {} already complete", task);
            return Ok(LeafStatus::AlreadyComplete);
        }

        let fetched = match self
            .transport
            .fetch(&chapter.url, &self.adapter.fetch_options(Stage::Leaf))
            .await
        {
            Ok(fetched) => fetched,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                // keep the chapter identity even though nothing was fetched
                self.gateway
                    .upsert_chapter(key, chapter.number, &LeafResult::attempted(chapter.url.as_str()))
                    .await?;
                return Err(e);
            }
        };

        let context = LeafContext {
            chapter_url: chapter.url.clone(),
            chapter_number: chapter.number,
        };
        let images = self.adapter.parse_leaf_resources(&fetched.markup, &context);
        let result = LeafResult::with_images(chapter.url.as_str(), images);
        self.gateway.upsert_chapter(key, chapter.number, &result).await?;

        if result.images.is_empty() {
            return Err(CrawlError::ExtractionEmpty(format!("{} has no images", task)));
        }

        info!(
            "[crawler] {}: {} images via {}",
            task,
            result.images.len(),
            fetched.transport
        );
        Ok(LeafStatus::Fetched)
    }
}

/// Catalog key for a listing item: its own key, else its title, slugified.
pub fn catalog_key(item: &ListingItem) -> String {
    let key = slugify(&item.key);
    if key.is_empty() {
        slugify(&item.title)
    } else {
        key
    }
}

/// Keeps the first chapter seen for each number.
fn dedupe_chapters(chapters: Vec<ChapterLink>) -> Vec<ChapterLink> {
    let mut seen: HashSet<ChapterNumber> = HashSet::new();
    chapters
        .into_iter()
        .filter(|c| !c.url.trim().is_empty() && seen.insert(c.number))
        .collect()
}

fn non_empty_or(value: String, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

/// Assembles the pipeline from configuration and runs it once.
///
/// The browser session lives only for this run and is shut down whatever
/// the outcome.
pub async fn run_once(
    config: &Config,
    store: Arc<dyn DocumentStore>,
    progress: Option<SharedProgress>,
) -> Result<CrawlReport, CrawlError> {
    let adapter = sources::adapter_for(&config.source, config.source_base_url.as_deref())
        .ok_or_else(|| {
            CrawlError::Configuration(format!(
                "unknown source '{}', expected one of {:?}",
                config.source,
                sources::SOURCE_NAMES
            ))
        })?;
    let http = config
        .bot_detection
        .create_http_client()
        .map_err(|e| CrawlError::Configuration(format!("http client: {}", e)))?;

    let session = config
        .bot_detection
        .enable_browser
        .then(|| Arc::new(BrowserSession::from_config(config.browser.clone())));
    let renderer = session.clone().map(|s| s as Arc<dyn Renderer>);
    let transport = Arc::new(TransportSelector::new(http, renderer));

    let orchestrator = CrawlOrchestrator::new(
        adapter,
        transport,
        SyncGateway::new(store),
        CrawlPlan::from_config(&config.crawl),
    )
    .with_progress(progress);

    let result = orchestrator.run().await;
    if let Some(session) = session {
        session.shutdown().await;
    }
    result
}

/// Starts a background run unless one is already in progress.
/// Returns whether a run was spawned.
pub fn spawn_crawl(data: web::Data<crate::app_state::AppState>) -> bool {
    {
        let mut p = match data.crawl_progress.lock() {
            Ok(p) => p,
            Err(poisoned) => poisoned.into_inner(),
        };
        if p.in_progress {
            return false;
        }
        *p = CrawlProgress {
            in_progress: true,
            started_at: Some(Utc::now().timestamp()),
            last_report: p.last_report.take(),
            ..CrawlProgress::default()
        };
    }

    let data_clone = data.clone();
    actix_web::rt::spawn(async move {
        let progress = Some(data_clone.crawl_progress.clone());
        let result = run_once(&data_clone.config, data_clone.store.clone(), progress.clone()).await;

        with_progress(&progress, |p| {
            p.in_progress = false;
            p.finished_at = Some(Utc::now().timestamp());
            p.current_page = None;
            p.current_item = None;
            match result {
                Ok(report) => {
                    p.error = None;
                    p.last_report = Some(report);
                }
                Err(e) => {
                    error!("[crawler] run aborted: {}", e);
                    p.error = Some(e.to_string());
                }
            }
        });
    });
    true
}
