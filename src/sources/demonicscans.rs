use super::{
    first_text, selector, ChapterLink, DetailRecord, ExtractionAdapter, LeafContext, ListingItem, Stage,
};
use crate::helpers::{absolute_url, clean_text, is_http_url, parse_chapter_number, slugify};
use crate::transport::FetchOptions;
use regex::Regex;
use scraper::Html;
use std::collections::HashSet;
use std::sync::LazyLock;

pub const DEFAULT_BASE_URL: &str = "https://demonicscans.org";

static KEY_IN_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(?:title|series|manga)/([^/?#]+)").expect("valid key regex"));

static IMAGE_EXTENSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(jpg|jpeg|png|webp|gif)$").expect("valid extension regex"));

/// Listing and detail pages need a rendered DOM here; the chapter reader
/// is served statically.
pub struct DemonicScansAdapter {
    base_url: String,
}

impl Default for DemonicScansAdapter {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl DemonicScansAdapter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn generate_key(href: &str, title: &str) -> String {
        KEY_IN_PATH
            .captures(href)
            .and_then(|caps| caps.get(1))
            .map(|m| slugify(m.as_str()))
            .filter(|key| !key.is_empty())
            .unwrap_or_else(|| slugify(title))
    }

    /// Reader images live under a directory named after the chapter number.
    fn belongs_to_chapter(src: &str, number: &str) -> bool {
        src.contains(&format!("/{}/", number))
            || src.contains(&format!("/{}./", number))
            || src.contains(&format!("/.{}/", number))
    }
}

impl ExtractionAdapter for DemonicScansAdapter {
    fn name(&self) -> &str {
        "demonicscans"
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn listing_url(&self, page: u32) -> String {
        format!("{}/lastupdates.php?list={}", self.base_url, page.max(1))
    }

    fn detail_url(&self, item: &ListingItem) -> String {
        if is_http_url(&item.item_url) {
            item.item_url.clone()
        } else {
            format!("{}/manga/{}", self.base_url, item.key)
        }
    }

    fn fetch_options(&self, stage: Stage) -> FetchOptions {
        match stage {
            Stage::Listing => FetchOptions {
                prefer_rendered: true,
                ..FetchOptions::require(".updates-element").render_marker(".updates-element")
            },
            Stage::Detail => FetchOptions {
                prefer_rendered: true,
                ..FetchOptions::require("#chapters-list li")
                    .render_marker("#manga-info-rightColumn, h1, .big-fat-titles, #manga-page")
            },
            Stage::Leaf => FetchOptions::require(".imgholder").render_marker(".imgholder, img"),
        }
    }

    fn parse_listing(&self, markup: &str) -> Vec<ListingItem> {
        let document = Html::parse_document(markup);
        let (Some(item_sel), Some(link_sel), Some(img_sel)) =
            (selector(".updates-element"), selector("a"), selector("img"))
        else {
            return Vec::new();
        };

        document
            .select(&item_sel)
            .filter_map(|item| {
                let link = item.select(&link_sel).next()?;
                let title = clean_text(link.value().attr("title").unwrap_or(""));
                let href = link.value().attr("href").unwrap_or("").trim();
                if title.is_empty() || href.is_empty() {
                    return None;
                }
                let cover_url = item
                    .select(&img_sel)
                    .next()
                    .and_then(|img| img.value().attr("src"))
                    .map(|src| absolute_url(&self.base_url, src))
                    .unwrap_or_default();
                Some(ListingItem {
                    key: Self::generate_key(href, &title),
                    title,
                    cover_url,
                    item_url: absolute_url(&self.base_url, href),
                })
            })
            .collect()
    }

    /// The detail page has no usable cover; the listing cover fills it in.
    fn parse_detail(&self, markup: &str) -> DetailRecord {
        let document = Html::parse_document(markup);
        let root = document.root_element();

        let genres: Vec<String> = selector(".genres-list li")
            .map(|sel| {
                document
                    .select(&sel)
                    .map(|e| clean_text(&e.text().collect::<String>()))
                    .filter(|g| !g.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let mut chapters = Vec::new();
        if let (Some(row_sel), Some(link_sel)) = (selector("#chapters-list li"), selector("a")) {
            for row in document.select(&row_sel) {
                let Some(link) = row.select(&link_sel).next() else { continue };
                let href = link.value().attr("href").unwrap_or("").trim();
                let title = clean_text(&link.text().collect::<String>());
                let Some(number) = parse_chapter_number(&title) else { continue };
                if href.is_empty() {
                    continue;
                }
                chapters.push(ChapterLink {
                    number,
                    title,
                    url: absolute_url(&self.base_url, href),
                    release_date: String::new(),
                });
            }
        }
        chapters.sort_by(|a, b| b.number.cmp(&a.number));

        DetailRecord {
            title: first_text(root, &["h1", ".manga-title", ".series-title", ".title-main"]),
            cover: String::new(),
            description: first_text(root, &[".white-font"]),
            genres,
            chapters,
        }
    }

    fn parse_leaf_resources(&self, markup: &str, context: &LeafContext) -> Vec<String> {
        let document = Html::parse_document(markup);
        let Some(img_sel) = selector(".imgholder, img") else {
            return Vec::new();
        };
        let number = context.chapter_number.to_string();

        let mut seen = HashSet::new();
        document
            .select(&img_sel)
            .filter_map(|img| {
                img.value()
                    .attr("src")
                    .filter(|s| !s.trim().is_empty())
                    .or_else(|| img.value().attr("data-src"))
            })
            .map(str::trim)
            .filter(|src| IMAGE_EXTENSION.is_match(src) && Self::belongs_to_chapter(src, &number))
            .map(|src| absolute_url(&self.base_url, src))
            .filter(|url| is_http_url(url) && seen.insert(url.clone()))
            .collect()
    }
}
