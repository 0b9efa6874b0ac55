//! Per-site extraction adapters
//!
//! Every source turns raw markup into typed records through the same three
//! calls. Adapters never fail: missing fields come back empty and the
//! pipeline decides what an empty result means.

pub mod demonicscans;
pub mod wp_manga;

use crate::models::ChapterNumber;
use crate::transport::FetchOptions;
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;

pub use demonicscans::DemonicScansAdapter;
pub use wp_manga::MadaraAdapter;

/// One entry of a listing page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingItem {
    pub title: String,
    pub key: String,
    pub cover_url: String,
    pub item_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChapterLink {
    pub number: ChapterNumber,
    pub title: String,
    pub url: String,
    pub release_date: String,
}

/// Parsed detail page. Chapters are ordered newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailRecord {
    pub title: String,
    pub cover: String,
    pub description: String,
    pub genres: Vec<String>,
    pub chapters: Vec<ChapterLink>,
}

/// What a leaf parser knows about the page it is reading.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafContext {
    pub chapter_url: String,
    pub chapter_number: ChapterNumber,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Listing,
    Detail,
    Leaf,
}

pub trait ExtractionAdapter: Send + Sync {
    fn name(&self) -> &str;

    fn base_url(&self) -> &str;

    fn listing_url(&self, page: u32) -> String;

    fn detail_url(&self, item: &ListingItem) -> String;

    /// Acceptance rules handed to the transport for each stage.
    fn fetch_options(&self, stage: Stage) -> FetchOptions;

    fn parse_listing(&self, markup: &str) -> Vec<ListingItem>;

    fn parse_detail(&self, markup: &str) -> DetailRecord;

    fn parse_leaf_resources(&self, markup: &str, context: &LeafContext) -> Vec<String>;
}

/// Names accepted by [`adapter_for`].
pub const SOURCE_NAMES: &[&str] = &["manhuafast", "madara", "demonicscans"];

/// Look up an adapter by source name. `base_url` overrides the site root.
pub fn adapter_for(name: &str, base_url: Option<&str>) -> Option<Arc<dyn ExtractionAdapter>> {
    let base = base_url.map(|b| b.trim_end_matches('/').to_string());
    let adapter: Arc<dyn ExtractionAdapter> = match name.to_ascii_lowercase().as_str() {
        "manhuafast" | "madara" => Arc::new(match base {
            Some(base) => MadaraAdapter::new(base),
            None => MadaraAdapter::default(),
        }),
        "demonicscans" => Arc::new(match base {
            Some(base) => DemonicScansAdapter::new(base),
            None => DemonicScansAdapter::default(),
        }),
        _ => return None,
    };
    Some(adapter)
}

/// First selector of a fallback list that yields non-empty text.
pub(crate) fn first_text(root: ElementRef<'_>, selectors: &[&str]) -> String {
    selectors
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .find_map(|selector| {
            root.select(&selector)
                .map(|e| crate::helpers::clean_text(&e.text().collect::<String>()))
                .find(|t| !t.is_empty())
        })
        .unwrap_or_default()
}

/// Text of the `<title>` element.
pub(crate) fn document_title(document: &Html) -> String {
    match Selector::parse("title") {
        Ok(selector) => document
            .select(&selector)
            .next()
            .map(|e| crate::helpers::clean_text(&e.text().collect::<String>()))
            .unwrap_or_default(),
        Err(_) => String::new(),
    }
}

pub(crate) fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}
