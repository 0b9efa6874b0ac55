//! Request interception rules for rendered fetches
//!
//! Every outgoing request of a tab is described as a [`RequestDescriptor`]
//! and handed to a predicate. The stock predicate refuses heavy assets and
//! known tracker domains so a page renders with only its document and
//! scripts.

use reqwest::Url;
use std::sync::{Arc, Mutex};

/// Resource categories as reported by the DevTools protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    Document,
    Script,
    Xhr,
    Fetch,
    Image,
    Font,
    Media,
    Stylesheet,
    Manifest,
    Other(String),
}

impl ResourceKind {
    /// Parses a protocol name case-insensitively (`"Image"`, `"image"`).
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "document" => ResourceKind::Document,
            "script" => ResourceKind::Script,
            "xhr" => ResourceKind::Xhr,
            "fetch" => ResourceKind::Fetch,
            "image" => ResourceKind::Image,
            "font" => ResourceKind::Font,
            "media" => ResourceKind::Media,
            "stylesheet" => ResourceKind::Stylesheet,
            "manifest" => ResourceKind::Manifest,
            other => ResourceKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ResourceKind::Document => "document",
            ResourceKind::Script => "script",
            ResourceKind::Xhr => "xhr",
            ResourceKind::Fetch => "fetch",
            ResourceKind::Image => "image",
            ResourceKind::Font => "font",
            ResourceKind::Media => "media",
            ResourceKind::Stylesheet => "stylesheet",
            ResourceKind::Manifest => "manifest",
            ResourceKind::Other(name) => name,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub url: String,
    pub resource_kind: ResourceKind,
    /// Host of the top-level document the request belongs to, once known.
    pub page_host: Option<String>,
}

impl RequestDescriptor {
    pub fn new(url: impl Into<String>, resource_kind: ResourceKind) -> Self {
        Self {
            url: url.into(),
            resource_kind,
            page_host: None,
        }
    }

    pub fn with_page_host(mut self, page_host: Option<String>) -> Self {
        self.page_host = page_host;
        self
    }

    /// Script-driven traffic (`script`, `xhr`, `fetch`) to another host than the page's.
    pub fn is_cross_origin_script(&self) -> bool {
        if !matches!(
            self.resource_kind,
            ResourceKind::Script | ResourceKind::Xhr | ResourceKind::Fetch
        ) {
            return false;
        }
        match (&self.page_host, self.host()) {
            (Some(page), Some(host)) => *page != host,
            _ => false,
        }
    }

    pub fn host(&self) -> Option<String> {
        Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
    }
}

/// Host of a tab's top-level page, taken from its first document request.
#[derive(Debug, Default)]
pub struct PageOrigin {
    host: Mutex<Option<String>>,
}

impl PageOrigin {
    /// Tags `request` with the page host, learning it on the first document.
    pub fn attach(&self, request: RequestDescriptor) -> RequestDescriptor {
        let mut host = match self.host.lock() {
            Ok(host) => host,
            Err(poisoned) => poisoned.into_inner(),
        };
        if host.is_none() && request.resource_kind == ResourceKind::Document {
            *host = request.host();
        }
        let page_host = host.clone();
        request.with_page_host(page_host)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptDecision {
    Allow,
    Block,
}

pub type InterceptPredicate = Arc<dyn Fn(&RequestDescriptor) -> InterceptDecision + Send + Sync>;

/// Lets every request through.
pub fn allow_all() -> InterceptPredicate {
    Arc::new(|_| InterceptDecision::Allow)
}

/// Blocks a request whose type is listed or whose host is a listed domain
/// (or one of its subdomains). With `cross_origin_scripts` set, scripts and
/// XHR/fetch calls leaving the page's host are blocked as well.
pub fn blocklist_predicate(
    resource_types: &[String],
    domains: &[String],
    cross_origin_scripts: bool,
) -> InterceptPredicate {
    let kinds: Vec<ResourceKind> = resource_types.iter().map(|t| ResourceKind::parse(t)).collect();
    let domains: Vec<String> = domains
        .iter()
        .map(|d| d.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|d| !d.is_empty())
        .collect();

    Arc::new(move |request: &RequestDescriptor| {
        if kinds.contains(&request.resource_kind) {
            return InterceptDecision::Block;
        }
        if cross_origin_scripts && request.is_cross_origin_script() {
            return InterceptDecision::Block;
        }
        match request.host() {
            Some(host) if domains.iter().any(|d| host_matches(&host, d)) => InterceptDecision::Block,
            _ => InterceptDecision::Allow,
        }
    })
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .map_or(false, |prefix| prefix.ends_with('.'))
}
