use super::config::BrowserConfig;
use super::intercept::{InterceptDecision, InterceptPredicate, PageOrigin, RequestDescriptor, ResourceKind};
use super::page::RenderedPage;
use crate::transport::Renderer;
use async_trait::async_trait;
use headless_chrome::browser::tab::RequestPausedDecision;
use headless_chrome::browser::transport::{SessionId, Transport};
use headless_chrome::protocol::cdp::Fetch::events::RequestPausedEvent;
use headless_chrome::protocol::cdp::Fetch::{FailRequest, RequestPattern, RequestStage};
use headless_chrome::protocol::cdp::Network::ErrorReason;
use headless_chrome::{Browser, LaunchOptions, Tab};
use log::{debug, info, warn};
use std::ffi::OsStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::spawn_blocking;

/// Errors that can occur during browser operations
#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("Rendering engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Browser configuration error: {0}")]
    ConfigurationError(String),

    #[error("Tab creation failed: {0}")]
    TabCreationError(String),

    #[error("Navigation error: {0}")]
    NavigationError(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("JavaScript execution error: {0}")]
    JavaScriptError(String),

    #[error("HTML extraction error: {0}")]
    HtmlExtractionError(String),
}

enum SessionState {
    Uninitialized,
    Ready(Arc<Browser>),
    Closed,
}

impl SessionState {
    fn name(&self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Ready(_) => "ready",
            SessionState::Closed => "closed",
        }
    }
}

/// A tab checked out of the session. Dropping an unreleased lease closes it.
pub struct TabLease {
    tab: Option<Arc<Tab>>,
}

impl TabLease {
    fn new(tab: Arc<Tab>) -> Self {
        Self { tab: Some(tab) }
    }

    pub fn tab(&self) -> Option<&Arc<Tab>> {
        self.tab.as_ref()
    }

    fn close(&mut self) {
        if let Some(tab) = self.tab.take() {
            if let Err(e) = tab.close(false) {
                debug!("[browser] tab close failed: {}", e);
            }
        }
    }
}

impl Drop for TabLease {
    fn drop(&mut self) {
        self.close();
    }
}

/// Owns one Chrome process and hands out short-lived tabs in its default
/// browsing context.
///
/// The engine is launched on the first [`acquire_tab`](Self::acquire_tab).
/// [`shutdown`](Self::shutdown) tears it down and a later acquire launches a
/// fresh one.
pub struct BrowserSession {
    config: BrowserConfig,
    predicate: InterceptPredicate,
    state: Mutex<SessionState>,
    open_tabs: std::sync::Mutex<Vec<Arc<Tab>>>,
    launches: AtomicUsize,
}

impl BrowserSession {
    pub fn new(config: BrowserConfig, predicate: InterceptPredicate) -> Self {
        Self {
            config,
            predicate,
            state: Mutex::new(SessionState::Uninitialized),
            open_tabs: std::sync::Mutex::new(Vec::new()),
            launches: AtomicUsize::new(0),
        }
    }

    /// Session whose interception predicate comes from the config blocklists.
    pub fn from_config(config: BrowserConfig) -> Self {
        let predicate = super::intercept::blocklist_predicate(
            &config.blocked_resource_types,
            &config.blocked_domains,
            config.block_cross_origin_scripts,
        );
        Self::new(config, predicate)
    }

    pub fn config(&self) -> &BrowserConfig {
        &self.config
    }

    /// Number of times the engine has been launched.
    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub async fn state_name(&self) -> &'static str {
        self.state.lock().await.name()
    }

    /// Build Chrome launch options from our config
    fn build_launch_options(config: &BrowserConfig) -> Result<LaunchOptions<'_>, BrowserError> {
        let args: Vec<&OsStr> = config.chrome_flags.iter().map(OsStr::new).collect();

        LaunchOptions::default_builder()
            .headless(config.headless)
            .window_size(Some(config.window_size))
            .idle_browser_timeout(config.idle_timeout())
            .args(args)
            .build()
            .map_err(|e| BrowserError::ConfigurationError(e.to_string()))
    }

    async fn ensure_browser(&self) -> Result<Arc<Browser>, BrowserError> {
        let mut state = self.state.lock().await;
        if let SessionState::Ready(browser) = &*state {
            return Ok(browser.clone());
        }

        info!("[browser] launching engine (state: {})", state.name());
        let config = self.config.clone();
        let browser = spawn_blocking(move || {
            let options = Self::build_launch_options(&config)?;
            Browser::new(options).map_err(|e| BrowserError::EngineUnavailable(e.to_string()))
        })
        .await
        .map_err(|e| BrowserError::EngineUnavailable(format!("launch task failed: {}", e)))??;

        let browser = Arc::new(browser);
        self.launches.fetch_add(1, Ordering::SeqCst);
        *state = SessionState::Ready(browser.clone());
        Ok(browser)
    }

    /// Opens an isolated tab with interception installed, launching the
    /// engine if needed.
    ///
    /// A `Ready` engine can still be dead (its event loop stops after the
    /// idle timeout), so a failed tab creation relaunches once and retries.
    pub async fn acquire_tab(&self) -> Result<TabLease, BrowserError> {
        let browser = self.ensure_browser().await?;
        match self.open_tab(browser.clone()).await {
            Err(BrowserError::TabCreationError(reason)) => {
                warn!("[browser] tab creation failed ({}), relaunching engine", reason);
                self.invalidate(browser).await;
                let browser = self.ensure_browser().await?;
                self.open_tab(browser).await
            }
            other => other,
        }
    }

    async fn open_tab(&self, browser: Arc<Browser>) -> Result<TabLease, BrowserError> {
        let config = self.config.clone();
        let predicate = self.predicate.clone();

        let tab = spawn_blocking(move || prepare_tab(&browser, &config, predicate))
            .await
            .map_err(|e| BrowserError::TabCreationError(format!("tab task failed: {}", e)))??;

        self.track(&tab);
        Ok(TabLease::new(tab))
    }

    /// Forgets `stale` if it is still the current engine, so the next
    /// acquire launches a fresh one.
    async fn invalidate(&self, stale: Arc<Browser>) {
        let previous = {
            let mut state = self.state.lock().await;
            match &*state {
                SessionState::Ready(current) if Arc::ptr_eq(current, &stale) => {
                    Some(std::mem::replace(&mut *state, SessionState::Uninitialized))
                }
                _ => None,
            }
        };
        if let Err(e) = spawn_blocking(move || drop((previous, stale))).await {
            warn!("[browser] dropping stale engine failed: {}", e);
        }
    }

    /// Closes the leased tab. Safe on every exit path.
    pub async fn release_tab(&self, mut lease: TabLease) {
        if let Some(tab) = lease.tab() {
            self.untrack(tab);
        }
        if let Err(e) = spawn_blocking(move || lease.close()).await {
            warn!("[browser] release task failed: {}", e);
        }
    }

    /// Closes every open tab, then the engine. Idempotent.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        if !matches!(&*state, SessionState::Ready(_)) {
            return;
        }
        let browser = match std::mem::replace(&mut *state, SessionState::Closed) {
            SessionState::Ready(browser) => browser,
            _ => return,
        };

        let tabs: Vec<Arc<Tab>> = match self.open_tabs.lock() {
            Ok(mut open) => open.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        };
        let closed = spawn_blocking(move || {
            for tab in tabs {
                let _ = tab.close(false);
            }
            drop(browser);
        })
        .await;
        if let Err(e) = closed {
            warn!("[browser] shutdown task failed: {}", e);
        }
        info!("[browser] engine closed");
    }

    fn track(&self, tab: &Arc<Tab>) {
        match self.open_tabs.lock() {
            Ok(mut open) => open.push(tab.clone()),
            Err(poisoned) => poisoned.into_inner().push(tab.clone()),
        }
    }

    fn untrack(&self, tab: &Arc<Tab>) {
        let mut open = match self.open_tabs.lock() {
            Ok(open) => open,
            Err(poisoned) => poisoned.into_inner(),
        };
        open.retain(|t| !Arc::ptr_eq(t, tab));
    }
}

fn prepare_tab(
    browser: &Browser,
    config: &BrowserConfig,
    predicate: InterceptPredicate,
) -> Result<Arc<Tab>, BrowserError> {
    let tab = browser
        .new_tab()
        .map_err(|e| BrowserError::TabCreationError(e.to_string()))?;

    tab.set_default_timeout(config.navigation_timeout());
    if let Some(user_agent) = &config.user_agent {
        tab.set_user_agent(user_agent, Some("en-US,en;q=0.9"), None)
            .map_err(|e| BrowserError::TabCreationError(e.to_string()))?;
    }

    let patterns = [RequestPattern {
        url_pattern: None,
        resource_Type: None,
        request_stage: Some(RequestStage::Request),
    }];
    tab.enable_fetch(Some(&patterns), None)
        .map_err(|e| BrowserError::TabCreationError(e.to_string()))?;

    let origin = PageOrigin::default();
    let interceptor = move |_transport: Arc<Transport>,
                            _session_id: SessionId,
                            event: RequestPausedEvent|
          -> RequestPausedDecision {
        let descriptor = origin.attach(describe_request(&event));
        match predicate(&descriptor) {
            InterceptDecision::Block => RequestPausedDecision::Fail(FailRequest {
                request_id: event.params.request_id,
                error_reason: ErrorReason::BlockedByClient,
            }),
            InterceptDecision::Allow => RequestPausedDecision::Continue(None),
        }
    };
    tab.enable_request_interception(Arc::new(interceptor))
        .map_err(|e| BrowserError::TabCreationError(e.to_string()))?;

    Ok(tab)
}

fn describe_request(event: &RequestPausedEvent) -> RequestDescriptor {
    let kind = serde_json::to_value(&event.params.resource_Type)
        .ok()
        .and_then(|v| v.as_str().map(ResourceKind::parse))
        .unwrap_or_else(|| ResourceKind::Other("unknown".to_string()));
    RequestDescriptor::new(event.params.request.url.clone(), kind)
}

#[async_trait]
impl Renderer for BrowserSession {
    async fn render(&self, url: &str, render_marker: Option<&str>) -> Result<String, BrowserError> {
        let lease = self.acquire_tab().await?;
        let tab = match lease.tab() {
            Some(tab) => tab.clone(),
            None => return Err(BrowserError::TabCreationError("lease already released".to_string())),
        };

        let url_owned = url.to_string();
        let marker = render_marker.map(str::to_string);
        let marker_timeout = self.config.render_marker_timeout();
        let scroll = self.config.scroll_for_lazy_content;

        let rendered = spawn_blocking(move || {
            let page = RenderedPage::new(tab);
            page.navigate(&url_owned)?;
            if let Some(marker) = marker {
                if let Err(e) = page.wait_for_selector_with_timeout(&marker, marker_timeout) {
                    debug!("[browser] render marker not seen on {}: {}", url_owned, e);
                }
            }
            if scroll {
                if let Err(e) = page.scroll_to_bottom() {
                    debug!("[browser] {}", e);
                }
            }
            page.get_html()
        })
        .await
        .map_err(|e| BrowserError::NavigationError(format!("render task failed: {}", e)))
        .and_then(|result| result);

        self.release_tab(lease).await;
        rendered
    }
}
