use super::{DocumentStore, StoreError, StoreResult, WriteOutcome};
use crate::models::{
    CatalogEntry, CatalogUpdate, ChapterNumber, ChapterRecord, ChapterUpdate, StoreStats,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Collections {
    manga: HashMap<String, CatalogEntry>,
    chapters: BTreeMap<(String, ChapterNumber), ChapterRecord>,
}

/// In-process store for dry runs and tests.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Collections>> {
        self.collections.lock().map_err(|_| StoreError::Poisoned)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_catalog_entry(&self, key: &str) -> StoreResult<Option<CatalogEntry>> {
        Ok(self.lock()?.manga.get(key).cloned())
    }

    async fn upsert_catalog_entry(
        &self,
        update: &CatalogUpdate,
        now: DateTime<Utc>,
    ) -> StoreResult<WriteOutcome> {
        let mut collections = self.lock()?;
        match collections.manga.get_mut(&update.key) {
            Some(entry) => Ok(WriteOutcome::modified(entry.apply(update, now))),
            None => {
                collections
                    .manga
                    .insert(update.key.clone(), CatalogEntry::insert(update, now));
                Ok(WriteOutcome::inserted())
            }
        }
    }

    async fn touch_catalog_entry(&self, key: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut collections = self.lock()?;
        Ok(match collections.manga.get_mut(key) {
            Some(entry) => {
                entry.updated_at = now;
                true
            }
            None => false,
        })
    }

    async fn find_chapter(
        &self,
        manga_key: &str,
        chapter_number: ChapterNumber,
    ) -> StoreResult<Option<ChapterRecord>> {
        let collections = self.lock()?;
        Ok(collections
            .chapters
            .get(&(manga_key.to_string(), chapter_number))
            .cloned())
    }

    async fn upsert_chapter(
        &self,
        update: &ChapterUpdate,
        now: DateTime<Utc>,
    ) -> StoreResult<WriteOutcome> {
        let mut collections = self.lock()?;
        let id = (update.manga_key.clone(), update.chapter_number);
        match collections.chapters.get_mut(&id) {
            Some(record) => Ok(WriteOutcome::modified(record.apply(update, now))),
            None => {
                collections.chapters.insert(id, ChapterRecord::insert(update, now));
                Ok(WriteOutcome::inserted())
            }
        }
    }

    async fn chapters_for(&self, manga_key: &str) -> StoreResult<Vec<ChapterRecord>> {
        let collections = self.lock()?;
        Ok(collections
            .chapters
            .values()
            .filter(|record| record.manga_key == manga_key)
            .cloned()
            .collect())
    }

    async fn stats(&self) -> StoreResult<StoreStats> {
        let collections = self.lock()?;
        Ok(StoreStats {
            total_manga: collections.manga.len() as u64,
            total_chapters: collections.chapters.len() as u64,
            complete_chapters: collections
                .chapters
                .values()
                .filter(|record| record.is_complete())
                .count() as u64,
        })
    }
}
