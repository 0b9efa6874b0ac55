//! Helper functions shared by the crawl pipeline and the source adapters
//!
//! - Catalog key derivation (`slugify`)
//! - Chapter number extraction from free-text titles
//! - URL resolution and `srcset` candidate picking
//!
//! # Examples
//!
//! ```
//! use rust_manga_sync::helpers::{parse_chapter_number, slugify};
//!
//! assert_eq!(slugify("The Demonic Cult Instructor's Return!"), "the-demonic-cult-instructors-return");
//! assert_eq!(parse_chapter_number("Chapter 10.5").map(|n| n.value()), Some(10.5));
//! ```

use crate::models::ChapterNumber;
use regex::Regex;
use reqwest::Url;
use std::sync::LazyLock;

static NON_ALNUM_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("valid slug regex"));

/// Chapter number patterns in priority order; the first one that matches wins.
///
/// 1. an explicit "Chapter N" / "Ch. N" label
/// 2. a leading numeric token ("12 - The Return")
/// 3. any embedded numeric token ("Episode 7")
static CHAPTER_PATTERNS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r"(?i)\b(?:chapter|ch\.?)\s*(\d+(?:\.\d+)?)").expect("valid chapter label regex"),
        Regex::new(r"^\s*(\d+(?:\.\d+)?)").expect("valid leading number regex"),
        Regex::new(r"(\d+(?:\.\d+)?)").expect("valid embedded number regex"),
    ]
});

/// Derive the catalog key from a title or URL slug.
///
/// Lowercased, apostrophes dropped, every run of non-alphanumerics collapsed
/// into a single hyphen, no leading or trailing hyphens.
pub fn slugify(title: &str) -> String {
    let lowered = title.to_lowercase().replace(['\'', '\u{2019}'], "");
    NON_ALNUM_RUN
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}

/// Extract the chapter number from a chapter title.
pub fn parse_chapter_number(title: &str) -> Option<ChapterNumber> {
    CHAPTER_PATTERNS.iter().find_map(|pattern| {
        pattern
            .captures(title)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .and_then(ChapterNumber::new)
    })
}

/// Resolve `href` against `base`; already absolute URLs pass through.
pub fn absolute_url(base: &str, href: &str) -> String {
    let href = href.trim();
    if href.is_empty() {
        return String::new();
    }
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    Url::parse(base)
        .and_then(|b| b.join(href))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

pub fn is_http_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Pick the largest candidate of a `srcset` attribute.
///
/// Width descriptors score by pixel width, density descriptors by
/// `density * 1000`, bare URLs score 1.
pub fn pick_from_srcset(srcset: &str) -> Option<String> {
    let mut best: Option<(f64, &str)> = None;

    for candidate in srcset.split(',').map(str::trim).filter(|c| !c.is_empty()) {
        let mut parts = candidate.split_whitespace();
        let Some(url) = parts.next() else { continue };
        let score = match parts.next() {
            Some(d) if d.ends_with('w') => d.trim_end_matches('w').parse::<f64>().unwrap_or(1.0),
            Some(d) if d.ends_with('x') => d.trim_end_matches('x').parse::<f64>().unwrap_or(1.0) * 1000.0,
            _ => 1.0,
        };
        if best.map_or(true, |(s, _)| score > s) {
            best = Some((score, url));
        }
    }

    best.map(|(_, url)| url.to_string())
}

/// Collapse internal whitespace and trim.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
