//! Document persistence for catalog entries and chapter records
//!
//! Both engines share the merge rules defined on the documents themselves
//! (`CatalogEntry::apply`, `ChapterRecord::apply`), so an upsert means the
//! same thing whichever engine is configured.

pub mod memory;
pub mod sqlite;

use crate::models::{
    CatalogEntry, CatalogUpdate, ChapterNumber, ChapterRecord, ChapterUpdate, StoreStats,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::config::{StorageBackend, StorageConfig};
use std::sync::Arc;

/// Errors that can occur during storage operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid stored value: {0}")]
    InvalidValue(String),

    #[error("Store lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Opens the configured engine.
pub fn open_store(config: &StorageConfig) -> StoreResult<Arc<dyn DocumentStore>> {
    match config.backend {
        StorageBackend::Sqlite => {
            log::info!("[store] sqlite at {}", config.database_path);
            Ok(Arc::new(SqliteStore::open(&config.database_path)?))
        }
        StorageBackend::Memory => {
            log::info!("[store] in-memory, nothing survives a restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

/// Result of an upsert, in the store's insert/modify vocabulary.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    pub inserted: bool,
    pub modified: bool,
}

impl WriteOutcome {
    pub fn inserted() -> Self {
        Self { inserted: true, modified: false }
    }

    pub fn modified(changed: bool) -> Self {
        Self { inserted: false, modified: changed }
    }

    pub fn changed(&self) -> bool {
        self.inserted || self.modified
    }
}

/// Document collection API the sync gateway writes through.
///
/// Implementations enforce uniqueness on `CatalogEntry::key` and on
/// `(ChapterRecord::manga_key, ChapterRecord::chapter_number)`, and apply
/// each upsert atomically per document.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find_catalog_entry(&self, key: &str) -> StoreResult<Option<CatalogEntry>>;

    async fn upsert_catalog_entry(
        &self,
        update: &CatalogUpdate,
        now: DateTime<Utc>,
    ) -> StoreResult<WriteOutcome>;

    /// Moves `updated_at` of an existing entry. Returns false when no entry matched.
    async fn touch_catalog_entry(&self, key: &str, now: DateTime<Utc>) -> StoreResult<bool>;

    async fn find_chapter(
        &self,
        manga_key: &str,
        chapter_number: ChapterNumber,
    ) -> StoreResult<Option<ChapterRecord>>;

    async fn upsert_chapter(
        &self,
        update: &ChapterUpdate,
        now: DateTime<Utc>,
    ) -> StoreResult<WriteOutcome>;

    /// Chapters of one entry, ascending by number.
    async fn chapters_for(&self, manga_key: &str) -> StoreResult<Vec<ChapterRecord>>;

    async fn stats(&self) -> StoreResult<StoreStats>;
}
