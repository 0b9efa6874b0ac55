//! Idempotent persistence for the crawl pipeline
//!
//! The gateway is the only writer of catalog entries and chapter records.
//! It gates leaf fetches on chapter completeness and keeps writes
//! non-destructive: a failed re-attempt never empties a complete chapter.

use crate::models::{CatalogUpdate, ChapterNumber, ChapterUpdate};
use crate::store::{DocumentStore, StoreResult, WriteOutcome};
use chrono::Utc;
use log::debug;
use std::sync::Arc;

/// Outcome of one leaf extraction, successful or not.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeafResult {
    pub chapter_url: String,
    pub images: Vec<String>,
}

impl LeafResult {
    pub fn with_images(chapter_url: impl Into<String>, images: Vec<String>) -> Self {
        Self {
            chapter_url: chapter_url.into(),
            images,
        }
    }

    /// An attempt that produced nothing.
    pub fn attempted(chapter_url: impl Into<String>) -> Self {
        Self::with_images(chapter_url, Vec::new())
    }
}

#[derive(Clone)]
pub struct SyncGateway {
    store: Arc<dyn DocumentStore>,
}

impl SyncGateway {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Insert-or-update by key; metadata always follows the latest fetch.
    pub async fn upsert_catalog_entry(&self, update: &CatalogUpdate) -> StoreResult<WriteOutcome> {
        let outcome = self.store.upsert_catalog_entry(update, Utc::now()).await?;
        debug!(
            "[sync] catalog {} inserted={} modified={}",
            update.key, outcome.inserted, outcome.modified
        );
        Ok(outcome)
    }

    /// True iff a stored chapter has a positive image count and a
    /// non-empty image sequence.
    pub async fn chapter_is_complete(
        &self,
        manga_key: &str,
        chapter_number: ChapterNumber,
    ) -> StoreResult<bool> {
        Ok(self
            .store
            .find_chapter(manga_key, chapter_number)
            .await?
            .map_or(false, |record| record.is_complete()))
    }

    /// Records a leaf attempt.
    ///
    /// Images are written only when the result carries some; otherwise a
    /// placeholder keeps the chapter identity and its attempt timestamp.
    /// Any change touches the parent catalog entry.
    pub async fn upsert_chapter(
        &self,
        manga_key: &str,
        chapter_number: ChapterNumber,
        result: &LeafResult,
    ) -> StoreResult<WriteOutcome> {
        let now = Utc::now();
        let update = ChapterUpdate {
            manga_key: manga_key.to_string(),
            chapter_number,
            chapter_url: result.chapter_url.clone(),
            images: (!result.images.is_empty()).then(|| result.images.clone()),
            attempted_at: now,
        };

        let outcome = self.store.upsert_chapter(&update, now).await?;
        if outcome.changed() {
            self.store.touch_catalog_entry(manga_key, now).await?;
        }

        debug!(
            "[sync] chapter {} of {} images={} inserted={} modified={}",
            chapter_number,
            manga_key,
            result.images.len(),
            outcome.inserted,
            outcome.modified
        );
        Ok(outcome)
    }
}
