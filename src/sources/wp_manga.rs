//! Madara (WP-Manga) theme, the layout manhuafast.net runs on.

use super::{
    document_title, first_text, selector, ChapterLink, DetailRecord, ExtractionAdapter, LeafContext,
    ListingItem, Stage,
};
use crate::helpers::{absolute_url, clean_text, is_http_url, parse_chapter_number, pick_from_srcset, slugify};
use crate::transport::FetchOptions;
use scraper::{ElementRef, Html};
use std::collections::HashSet;

pub const DEFAULT_BASE_URL: &str = "https://manhuafast.net";

const TITLE_SELECTORS: &[&str] = &[".post-title h1", "h1.entry-title", ".manga-title", ".title h1", "h1"];

const COVER_SELECTORS: &[&str] = &[
    ".summary_image img",
    ".manga-cover img",
    ".post-thumb img",
    "img[alt*=\"cover\" i]",
];

const DESCRIPTION_SELECTORS: &[&str] = &[
    ".summary__content",
    ".description-summary",
    ".manga-excerpt",
    ".post-content .summary",
    ".post-content .description",
];

const GENRE_SELECTORS: &[&str] = &[".genres-content a", ".genres a", ".manga-genres a"];

const CHAPTER_SELECTORS: &[&str] = &["li.wp-manga-chapter", "ul.main.version-chap li"];

/// Lazy-loading attributes seen on reader images, in preference order.
const IMAGE_ATTRS: &[&str] = &[
    "src",
    "data-src",
    "data-lazy-src",
    "data-cfsrc",
    "data-original",
    "data-echo",
    "data-src-original",
    "data-orig-file",
    "data-url",
    "data-image",
    "data-lazy",
    "data-lazyload",
    "data-lazy-url",
    "data-thumb-url",
    "data-thumbnail",
    "data-ks-lazyload",
    "data-llsrc",
];

pub struct MadaraAdapter {
    base_url: String,
}

impl Default for MadaraAdapter {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl MadaraAdapter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Slug after `/manga/` in an item URL.
    fn key_from_href(href: &str) -> Option<String> {
        href.split("/manga/")
            .nth(1)
            .and_then(|rest| rest.split('/').next())
            .filter(|segment| !segment.is_empty())
            .map(slugify)
    }

    fn image_source(element: ElementRef<'_>) -> Option<String> {
        let value = element.value();
        IMAGE_ATTRS
            .iter()
            .filter_map(|attr| value.attr(attr))
            .map(str::trim)
            .find(|src| !src.is_empty() && !src.starts_with("data:"))
            .map(str::to_string)
            .or_else(|| {
                value
                    .attr("srcset")
                    .or_else(|| value.attr("data-srcset"))
                    .and_then(pick_from_srcset)
            })
    }

    fn cover_from(&self, element: ElementRef<'_>) -> String {
        Self::image_source(element)
            .map(|src| absolute_url(&self.base_url, &src))
            .filter(|src| src.contains("/uploads/"))
            .unwrap_or_default()
    }

    fn chapters(&self, document: &Html) -> Vec<ChapterLink> {
        let rows: Vec<ElementRef<'_>> = CHAPTER_SELECTORS
            .iter()
            .filter_map(|s| selector(s))
            .map(|sel| document.select(&sel).collect::<Vec<_>>())
            .find(|rows| !rows.is_empty())
            .unwrap_or_default();

        let (Some(link_sel), Some(date_sel)) = (selector("a"), selector(".chapter-release-date i, i")) else {
            return Vec::new();
        };

        let mut chapters: Vec<ChapterLink> = rows
            .into_iter()
            .filter_map(|row| {
                let link = row.select(&link_sel).next()?;
                let title = clean_text(&link.text().collect::<String>());
                let href = link.value().attr("href").unwrap_or("").trim();
                if title.is_empty() || href.is_empty() {
                    return None;
                }
                let number = parse_chapter_number(&title)?;
                let release_date = row
                    .select(&date_sel)
                    .next()
                    .map(|d| clean_text(&d.text().collect::<String>()))
                    .unwrap_or_default();
                Some(ChapterLink {
                    number,
                    title,
                    url: absolute_url(&self.base_url, href),
                    release_date,
                })
            })
            .collect();

        chapters.sort_by(|a, b| b.number.cmp(&a.number));
        chapters
    }
}

impl ExtractionAdapter for MadaraAdapter {
    fn name(&self) -> &str {
        "manhuafast"
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn listing_url(&self, page: u32) -> String {
        if page <= 1 {
            format!("{}/", self.base_url)
        } else {
            format!("{}/page/{}/", self.base_url, page)
        }
    }

    fn detail_url(&self, item: &ListingItem) -> String {
        if is_http_url(&item.item_url) {
            item.item_url.clone()
        } else {
            format!("{}/manga/{}/", self.base_url, item.key)
        }
    }

    fn fetch_options(&self, stage: Stage) -> FetchOptions {
        match stage {
            Stage::Listing => FetchOptions::require(".page-item-detail").render_marker(".page-item-detail"),
            Stage::Detail => FetchOptions::require("li.wp-manga-chapter")
                .render_marker("ul.main.version-chap li, li.wp-manga-chapter"),
            Stage::Leaf => FetchOptions::require(".reading-content img").render_marker(".reading-content"),
        }
    }

    fn parse_listing(&self, markup: &str) -> Vec<ListingItem> {
        let document = Html::parse_document(markup);
        let (Some(item_sel), Some(link_sel), Some(img_sel)) = (
            selector(".page-item-detail"),
            selector(".post-title a"),
            selector(".img-responsive, img"),
        ) else {
            return Vec::new();
        };

        document
            .select(&item_sel)
            .filter_map(|item| {
                let link = item.select(&link_sel).next()?;
                let title = clean_text(&link.text().collect::<String>());
                let href = link.value().attr("href").unwrap_or("").trim();
                let key = Self::key_from_href(href)?;
                if title.is_empty() {
                    return None;
                }
                let cover_url = item
                    .select(&img_sel)
                    .next()
                    .map(|img| self.cover_from(img))
                    .unwrap_or_default();
                Some(ListingItem {
                    title,
                    key,
                    cover_url,
                    item_url: absolute_url(&self.base_url, href),
                })
            })
            .collect()
    }

    fn parse_detail(&self, markup: &str) -> DetailRecord {
        let document = Html::parse_document(markup);
        let root = document.root_element();

        let mut title = first_text(root, TITLE_SELECTORS);
        if title.is_empty() {
            let page_title = document_title(&document);
            title = page_title
                .split('|')
                .next()
                .and_then(|t| t.split(" - ").next())
                .map(|t| t.trim().to_string())
                .unwrap_or_default();
        }

        let cover = COVER_SELECTORS
            .iter()
            .filter_map(|s| selector(s))
            .find_map(|sel| {
                document
                    .select(&sel)
                    .map(|img| self.cover_from(img))
                    .find(|src| !src.is_empty())
            })
            .unwrap_or_default();

        let genres = GENRE_SELECTORS
            .iter()
            .filter_map(|s| selector(s))
            .map(|sel| {
                let mut seen = HashSet::new();
                document
                    .select(&sel)
                    .map(|e| clean_text(&e.text().collect::<String>()))
                    .filter(|g| !g.is_empty() && seen.insert(g.clone()))
                    .collect::<Vec<_>>()
            })
            .find(|genres| !genres.is_empty())
            .unwrap_or_default();

        DetailRecord {
            title,
            cover,
            description: first_text(root, DESCRIPTION_SELECTORS),
            genres,
            chapters: self.chapters(&document),
        }
    }

    fn parse_leaf_resources(&self, markup: &str, context: &LeafContext) -> Vec<String> {
        let document = Html::parse_document(markup);
        let base = if context.chapter_url.is_empty() {
            self.base_url.as_str()
        } else {
            context.chapter_url.as_str()
        };

        let mut seen = HashSet::new();
        let mut images = Vec::new();
        let mut push = |src: String| {
            let url = absolute_url(base, &src);
            if is_http_url(&url) && seen.insert(url.clone()) {
                images.push(url);
            }
        };

        if let Some(img_sel) = selector(".reading-content img") {
            for img in document.select(&img_sel) {
                if let Some(src) = Self::image_source(img) {
                    push(src);
                }
            }
        }

        // <noscript> content parses as raw text, so re-parse it as markup
        if let Some(noscript_sel) = selector(".reading-content noscript") {
            for block in document.select(&noscript_sel) {
                let inner = Html::parse_fragment(&block.text().collect::<String>());
                if let Some(img_sel) = selector("img") {
                    for img in inner.select(&img_sel) {
                        if let Some(src) = Self::image_source(img) {
                            push(src);
                        }
                    }
                }
            }
        }

        images
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChapterNumber;

    const LISTING: &str = r#"
        <div class="page-item-detail">
            <a href="https://manhuafast.net/manga/nano-machine/"><img class="img-responsive" data-src="https://manhuafast.net/wp-content/uploads/nano.jpg" src="data:image/gif;base64,AAA"></a>
            <div class="post-title"><a href="https://manhuafast.net/manga/nano-machine/">Nano Machine</a></div>
        </div>
        <div class="page-item-detail">
            <div class="post-title"><a href="/manga/solo-leveling/">Solo Leveling</a></div>
            <img class="img-responsive" src="https://cdn.other.net/banner.png">
        </div>
        <div class="page-item-detail">
            <div class="post-title"><a href="/genre/action/">Action</a></div>
        </div>"#;

    const DETAIL: &str = r#"
        <html><head><title>Nano Machine | ManhuaFast</title></head><body>
        <div class="post-title"><h1> Nano Machine </h1></div>
        <div class="summary_image"><img data-src="/wp-content/uploads/cover.jpg"></div>
        <div class="summary__content"><p>A descendant from the future.</p></div>
        <div class="genres-content"><a>Action</a>, <a>Martial Arts</a>, <a>Action</a></div>
        <ul class="main version-chap">
            <li class="wp-manga-chapter"><a href="/manga/nano-machine/chapter-2/">Chapter 2</a><span class="chapter-release-date"><i>May 2, 2024</i></span></li>
            <li class="wp-manga-chapter"><a href="/manga/nano-machine/chapter-10-5/">Chapter 10.5</a></li>
            <li class="wp-manga-chapter"><a href="/manga/nano-machine/chapter-1/">Chapter 1</a></li>
            <li class="wp-manga-chapter"><a href="/manga/nano-machine/notice/">Notice</a></li>
        </ul></body></html>"#;

    #[test]
    fn test_listing_urls() {
        let adapter = MadaraAdapter::default();
        assert_eq!(adapter.listing_url(1), "https://manhuafast.net/");
        assert_eq!(adapter.listing_url(3), "https://manhuafast.net/page/3/");
    }

    #[test]
    fn test_parse_listing() {
        let adapter = MadaraAdapter::default();
        let items = adapter.parse_listing(LISTING);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].key, "nano-machine");
        assert_eq!(items[0].cover_url, "https://manhuafast.net/wp-content/uploads/nano.jpg");
        assert_eq!(items[1].key, "solo-leveling");
        assert_eq!(items[1].item_url, "https://manhuafast.net/manga/solo-leveling/");
        assert_eq!(items[1].cover_url, "");
    }

    #[test]
    fn test_parse_detail() {
        let adapter = MadaraAdapter::default();
        let detail = adapter.parse_detail(DETAIL);
        assert_eq!(detail.title, "Nano Machine");
        assert_eq!(detail.cover, "https://manhuafast.net/wp-content/uploads/cover.jpg");
        assert_eq!(detail.description, "A descendant from the future.");
        assert_eq!(detail.genres, vec!["Action", "Martial Arts"]);

        let numbers: Vec<f64> = detail.chapters.iter().map(|c| c.number.value()).collect();
        assert_eq!(numbers, vec![10.5, 2.0, 1.0]);
        assert_eq!(detail.chapters[1].release_date, "May 2, 2024");
        assert_eq!(
            detail.chapters[0].url,
            "https://manhuafast.net/manga/nano-machine/chapter-10-5/"
        );
    }

    #[test]
    fn test_detail_title_falls_back_to_document_title() {
        let adapter = MadaraAdapter::default();
        let detail = adapter.parse_detail("<html><head><title>Martial Peak - Read | Site</title></head></html>");
        assert_eq!(detail.title, "Martial Peak");
        assert!(detail.chapters.is_empty());
    }

    #[test]
    fn test_parse_leaf_resources() {
        let adapter = MadaraAdapter::default();
        let markup = r#"
            <div class="reading-content">
                <img src=" https://img.site/1.jpg ">
                <img src="data:image/gif;base64,AA" data-lazy-src="/uploads/2.jpg">
                <img data-srcset="https://img.site/3-small.jpg 400w, https://img.site/3.jpg 1200w">
                <img src="https://img.site/1.jpg">
                <img src="javascript:void(0)">
                <noscript><img src="https://img.site/4.jpg"></noscript>
            </div>
            <img src="https://img.site/ad.jpg">"#;
        let context = LeafContext {
            chapter_url: "https://manhuafast.net/manga/nano-machine/chapter-1/".to_string(),
            chapter_number: ChapterNumber::new(1.0).unwrap(),
        };

        let images = adapter.parse_leaf_resources(markup, &context);
        assert_eq!(
            images,
            vec![
                "https://img.site/1.jpg",
                "https://manhuafast.net/uploads/2.jpg",
                "https://img.site/3.jpg",
                "https://img.site/4.jpg",
            ]
        );
    }

    #[test]
    fn test_noscript_only_images() {
        let adapter = MadaraAdapter::default();
        let context = LeafContext {
            chapter_url: "https://manhuafast.net/manga/nano-machine/chapter-3/".to_string(),
            chapter_number: ChapterNumber::new(3.0).unwrap(),
        };
        let markup = r#"<div class="reading-content"><noscript><img src="https://img.site/4.jpg"><img data-src="/uploads/5.jpg"></noscript></div>"#;

        assert_eq!(
            adapter.parse_leaf_resources(markup, &context),
            vec!["https://img.site/4.jpg", "https://manhuafast.net/uploads/5.jpg"]
        );
    }

    #[test]
    fn test_detail_render_waits_for_chapter_list() {
        let options = MadaraAdapter::default().fetch_options(Stage::Detail);
        let marker = options.render_marker.unwrap();
        assert!(crate::transport::has_marker(DETAIL, &marker));
        assert!(!crate::transport::has_marker(
            r#"<div class="post-title"><h1>Nano Machine</h1></div><ul class="main version-chap"></ul>"#,
            &marker
        ));
    }

    #[test]
    fn test_malformed_markup_yields_empty() {
        let adapter = MadaraAdapter::default();
        assert!(adapter.parse_listing("<<<not html").is_empty());
        assert_eq!(adapter.parse_detail("").chapters.len(), 0);
    }
}
