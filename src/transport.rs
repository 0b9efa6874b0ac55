//! Two-tier page fetching
//!
//! A plain HTTP fetch is tried first. The body is accepted when it carries
//! no challenge signature and contains the caller's required marker;
//! anything else escalates to the rendering engine. Rendering costs orders
//! of magnitude more, so escalation stays the exception path.

use crate::browser::BrowserError;
use crate::error::{CrawlError, ErrorKind};
use crate::http_client::EnhancedHttpClient;
use async_trait::async_trait;
use log::{debug, info, warn};
use scraper::{Html, Selector};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Which tier produced a piece of markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Lightweight,
    Rendered,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Lightweight => write!(f, "lightweight"),
            Transport::Rendered => write!(f, "rendered"),
        }
    }
}

/// Per-request acceptance rules.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// CSS selector (or plain text) a lightweight body must contain.
    pub required_marker: Option<String>,
    /// Selector to wait for after a rendered navigation. Never fatal.
    pub render_marker: Option<String>,
    /// Go straight to rendering.
    pub prefer_rendered: bool,
}

impl FetchOptions {
    pub fn require(marker: impl Into<String>) -> Self {
        Self {
            required_marker: Some(marker.into()),
            ..Self::default()
        }
    }

    pub fn render_marker(mut self, marker: impl Into<String>) -> Self {
        self.render_marker = Some(marker.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct Fetched {
    pub markup: String,
    pub transport: Transport,
}

/// The heavy tier: navigate, optionally wait for a marker, capture markup.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, url: &str, render_marker: Option<&str>) -> Result<String, BrowserError>;
}

const CHALLENGE_SIGNATURES: &[&[&str]] = &[
    &["cf-browser-verification"],
    &["cf-challenge-running"],
    &["challenge-form"],
    &["checking your browser", "cloudflare"],
    &["just a moment"],
    &["attention required", "cloudflare"],
];

/// True when a body is empty or matches a known interstitial.
pub fn looks_challenged(body: &str) -> bool {
    if body.trim().is_empty() {
        return true;
    }
    let lower = body.to_lowercase();
    CHALLENGE_SIGNATURES
        .iter()
        .any(|fragments| fragments.iter().all(|f| lower.contains(f)))
}

/// Checks a marker as a CSS selector, or as a substring when it is not one.
pub fn has_marker(body: &str, marker: &str) -> bool {
    match Selector::parse(marker) {
        Ok(selector) => Html::parse_document(body).select(&selector).next().is_some(),
        Err(_) => body.contains(marker),
    }
}

pub struct TransportSelector {
    http: EnhancedHttpClient,
    renderer: Option<Arc<dyn Renderer>>,
    lightweight_hits: AtomicUsize,
    rendered_hits: AtomicUsize,
}

impl TransportSelector {
    pub fn new(http: EnhancedHttpClient, renderer: Option<Arc<dyn Renderer>>) -> Self {
        Self {
            http,
            renderer,
            lightweight_hits: AtomicUsize::new(0),
            rendered_hits: AtomicUsize::new(0),
        }
    }

    pub fn has_renderer(&self) -> bool {
        self.renderer.is_some()
    }

    /// (lightweight, rendered) successes so far.
    pub fn counts(&self) -> (usize, usize) {
        (
            self.lightweight_hits.load(Ordering::Relaxed),
            self.rendered_hits.load(Ordering::Relaxed),
        )
    }

    pub async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<Fetched, CrawlError> {
        let mut last_cause = ErrorKind::Blocked;
        let mut last_reason = String::from("rendering preferred");

        // Without a renderer a preferred render degrades to the plain fetch
        if !options.prefer_rendered || self.renderer.is_none() {
            match self.http.get_text(url).await {
                Ok(body) => {
                    if looks_challenged(&body) {
                        last_reason = "challenge page detected".to_string();
                    } else if options
                        .required_marker
                        .as_deref()
                        .map_or(true, |marker| has_marker(&body, marker))
                    {
                        debug!("[transport] lightweight ok: {}", url);
                        self.lightweight_hits.fetch_add(1, Ordering::Relaxed);
                        return Ok(Fetched {
                            markup: body,
                            transport: Transport::Lightweight,
                        });
                    } else {
                        last_reason = "required marker missing".to_string();
                    }
                }
                Err(e) => {
                    last_cause = ErrorKind::TransientNetwork;
                    last_reason = e.to_string();
                }
            }
        }

        let renderer = match &self.renderer {
            Some(renderer) => renderer,
            None => {
                return Err(CrawlError::FetchFailed {
                    url: url.to_string(),
                    transport: Transport::Lightweight,
                    cause: last_cause,
                    reason: last_reason,
                })
            }
        };

        info!("[transport] escalating to rendered fetch for {} ({})", url, last_reason);
        match renderer.render(url, options.render_marker.as_deref()).await {
            Ok(markup) => {
                if looks_challenged(&markup) {
                    warn!("[transport] rendered page still looks challenged: {}", url);
                }
                self.rendered_hits.fetch_add(1, Ordering::Relaxed);
                Ok(Fetched {
                    markup,
                    transport: Transport::Rendered,
                })
            }
            Err(BrowserError::EngineUnavailable(reason)) => Err(CrawlError::EngineUnavailable(reason)),
            Err(e) => Err(CrawlError::FetchFailed {
                url: url.to_string(),
                transport: Transport::Rendered,
                cause: ErrorKind::TransientNetwork,
                reason: e.to_string(),
            }),
        }
    }
}
