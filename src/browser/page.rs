use super::session::BrowserError;
use headless_chrome::Tab;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Blocking page operations on one leased tab.
///
/// Every call talks to Chrome synchronously, so callers run these inside
/// `spawn_blocking`.
pub struct RenderedPage {
    tab: Arc<Tab>,
    poll_interval: Duration,
}

impl RenderedPage {
    pub fn new(tab: Arc<Tab>) -> Self {
        Self {
            tab,
            poll_interval: Duration::from_millis(100),
        }
    }

    /// Navigate to a URL and wait until the document has loaded
    pub fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        self.tab
            .navigate_to(url)
            .map_err(|e| BrowserError::NavigationError(format!("Failed to navigate to {}: {}", url, e)))?;

        self.tab
            .wait_until_navigated()
            .map_err(|e| BrowserError::NavigationError(format!("Navigation timeout for {}: {}", url, e)))?;

        Ok(())
    }

    /// Poll until an element matches `selector` or `timeout` elapses
    pub fn wait_for_selector_with_timeout(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        let start = Instant::now();
        let literal = serde_json::to_string(selector)
            .map_err(|e| BrowserError::JavaScriptError(e.to_string()))?;
        let script = format!("document.querySelector({}) !== null", literal);

        loop {
            if start.elapsed() > timeout {
                return Err(BrowserError::Timeout(format!(
                    "Waiting for selector: {}",
                    selector
                )));
            }

            if let Ok(result) = self.tab.evaluate(&script, false) {
                if result.value.and_then(|v| v.as_bool()) == Some(true) {
                    return Ok(());
                }
            }

            std::thread::sleep(self.poll_interval);
        }
    }

    /// Scroll to the bottom of the page so lazy images get their real src
    pub fn scroll_to_bottom(&self) -> Result<(), BrowserError> {
        let script = "window.scrollTo(0, document.body ? document.body.scrollHeight : 0);";

        self.tab
            .evaluate(script, false)
            .map_err(|e| BrowserError::JavaScriptError(format!("Scroll failed: {}", e)))?;

        std::thread::sleep(Duration::from_millis(500));

        Ok(())
    }

    /// Get the rendered HTML of the page
    pub fn get_html(&self) -> Result<String, BrowserError> {
        self.tab
            .get_content()
            .map_err(|e| BrowserError::HtmlExtractionError(e.to_string()))
    }

    pub fn tab(&self) -> &Arc<Tab> {
        &self.tab
    }
}
