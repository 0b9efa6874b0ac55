use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Numeric chapter identity.
///
/// Chapters are ordered numerically ("10.5" sits between 10 and 11), so the
/// value is kept as a finite float rather than the raw title string.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChapterNumber(f64);

impl ChapterNumber {
    /// Returns `None` for NaN, infinities and negative values.
    pub fn new(value: f64) -> Option<Self> {
        if value.is_finite() && value >= 0.0 {
            // fold -0.0 into 0.0 so equality and hashing agree
            Some(Self(value + 0.0))
        } else {
            None
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl PartialEq for ChapterNumber {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for ChapterNumber {}

impl Hash for ChapterNumber {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl PartialOrd for ChapterNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ChapterNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for ChapterNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.fract() == 0.0 {
            write!(f, "{}", self.0 as u64)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Top-level series record, keyed by its slug.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub key: String,
    pub title: String,
    pub cover: String,
    pub description: String,
    pub genres: Vec<String>,
    pub total_chapters: u32,
    pub total_views: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Catalog metadata from the latest successful detail fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogUpdate {
    pub key: String,
    pub title: String,
    pub cover: String,
    pub description: String,
    pub genres: Vec<String>,
    pub total_chapters: u32,
}

impl CatalogEntry {
    pub fn insert(update: &CatalogUpdate, now: DateTime<Utc>) -> Self {
        Self {
            key: update.key.clone(),
            title: update.title.clone(),
            cover: update.cover.clone(),
            description: update.description.clone(),
            genres: update.genres.clone(),
            total_chapters: update.total_chapters,
            total_views: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrites the metadata fields. Returns whether anything changed;
    /// `updated_at` only moves when it did.
    pub fn apply(&mut self, update: &CatalogUpdate, now: DateTime<Utc>) -> bool {
        let changed = self.title != update.title
            || self.cover != update.cover
            || self.description != update.description
            || self.genres != update.genres
            || self.total_chapters != update.total_chapters;

        if changed {
            self.title = update.title.clone();
            self.cover = update.cover.clone();
            self.description = update.description.clone();
            self.genres = update.genres.clone();
            self.total_chapters = update.total_chapters;
            self.updated_at = now;
        }
        changed
    }
}

/// Ordered image sequence for one chapter of a catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterRecord {
    pub manga_key: String,
    pub chapter_number: ChapterNumber,
    pub chapter_url: String,
    pub total_images: u32,
    pub images: Vec<String>,
    pub images_fetched_at: Option<DateTime<Utc>>,
    pub last_tried_at: Option<DateTime<Utc>>,
    pub total_views: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One write against a chapter document.
///
/// `images` is only applied when it holds at least one URL; an absent or
/// empty list never clears what is already stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterUpdate {
    pub manga_key: String,
    pub chapter_number: ChapterNumber,
    pub chapter_url: String,
    pub images: Option<Vec<String>>,
    pub attempted_at: DateTime<Utc>,
}

impl ChapterUpdate {
    fn fetched_images(&self) -> Option<&Vec<String>> {
        self.images.as_ref().filter(|images| !images.is_empty())
    }
}

impl ChapterRecord {
    pub fn placeholder(manga_key: &str, chapter_number: ChapterNumber, now: DateTime<Utc>) -> Self {
        Self {
            manga_key: manga_key.to_string(),
            chapter_number,
            chapter_url: String::new(),
            total_images: 0,
            images: Vec::new(),
            images_fetched_at: None,
            last_tried_at: None,
            total_views: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn insert(update: &ChapterUpdate, now: DateTime<Utc>) -> Self {
        let mut record = Self::placeholder(&update.manga_key, update.chapter_number, now);
        record.apply(update, now);
        record
    }

    /// A chapter with a positive image count and a non-empty sequence is
    /// never fetched again.
    pub fn is_complete(&self) -> bool {
        self.total_images > 0 && !self.images.is_empty()
    }

    /// Merges an update into the stored document. Returns whether the
    /// document changed.
    pub fn apply(&mut self, update: &ChapterUpdate, now: DateTime<Utc>) -> bool {
        let before = self.clone();

        if !update.chapter_url.is_empty() {
            self.chapter_url = update.chapter_url.clone();
        }
        self.last_tried_at = Some(update.attempted_at);

        if let Some(images) = update.fetched_images() {
            self.total_images = images.len() as u32;
            self.images = images.clone();
            self.images_fetched_at = Some(update.attempted_at);
        }

        let changed = *self != before;
        if changed {
            self.updated_at = now;
        }
        changed
    }
}

/// Ephemeral unit of crawl work.
#[derive(Debug, Clone, PartialEq)]
pub enum CrawlTask {
    ListingPage { page: u32 },
    Detail { key: String, url: String },
    Leaf {
        manga_key: String,
        chapter_number: ChapterNumber,
        chapter_url: String,
    },
}

impl fmt::Display for CrawlTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrawlTask::ListingPage { page } => write!(f, "listing page {}", page),
            CrawlTask::Detail { key, .. } => write!(f, "detail {}", key),
            CrawlTask::Leaf {
                manga_key,
                chapter_number,
                ..
            } => write!(f, "chapter {} of {}", chapter_number, manga_key),
        }
    }
}

/// Stored document counts, reported by the front door.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_manga: u64,
    pub total_chapters: u64,
    pub complete_chapters: u64,
}
