use super::{DocumentStore, StoreError, StoreResult, WriteOutcome};
use crate::models::{
    CatalogEntry, CatalogUpdate, ChapterNumber, ChapterRecord, ChapterUpdate, StoreStats,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS manga (
    key TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    cover TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    genres TEXT NOT NULL DEFAULT '[]',
    total_chapters INTEGER NOT NULL DEFAULT 0,
    total_views INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS chapters (
    manga_key TEXT NOT NULL,
    chapter_number REAL NOT NULL,
    chapter_url TEXT NOT NULL DEFAULT '',
    total_images INTEGER NOT NULL DEFAULT 0,
    images TEXT NOT NULL DEFAULT '[]',
    images_fetched_at TEXT,
    last_tried_at TEXT,
    total_views INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (manga_key, chapter_number)
);

CREATE INDEX IF NOT EXISTS idx_chapters_manga_key ON chapters (manga_key);
"#;

const MANGA_COLUMNS: &str =
    "key, title, cover, description, genres, total_chapters, total_views, created_at, updated_at";

const CHAPTER_COLUMNS: &str = "manga_key, chapter_number, chapter_url, total_images, images, \
     images_fetched_at, last_tried_at, total_views, created_at, updated_at";

/// SQLite-backed document store.
///
/// Every read-merge-write cycle runs under the connection mutex, which keeps
/// each document write atomic.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        info!("Opening SQLite store at {}", path.as_ref().display());
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn load_manga(conn: &Connection, key: &str) -> StoreResult<Option<CatalogEntry>> {
        let sql = format!("SELECT {} FROM manga WHERE key = ?1", MANGA_COLUMNS);
        let raw = conn
            .query_row(&sql, params![key], RawManga::from_row)
            .optional()?;
        raw.map(RawManga::into_entry).transpose()
    }

    fn save_manga(conn: &Connection, entry: &CatalogEntry) -> StoreResult<()> {
        conn.execute(
            "INSERT INTO manga (key, title, cover, description, genres, total_chapters, total_views, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(key) DO UPDATE SET
                title = excluded.title,
                cover = excluded.cover,
                description = excluded.description,
                genres = excluded.genres,
                total_chapters = excluded.total_chapters,
                updated_at = excluded.updated_at",
            params![
                entry.key,
                entry.title,
                entry.cover,
                entry.description,
                serde_json::to_string(&entry.genres)?,
                entry.total_chapters as i64,
                entry.total_views as i64,
                entry.created_at,
                entry.updated_at,
            ],
        )?;
        Ok(())
    }

    fn load_chapter(
        conn: &Connection,
        manga_key: &str,
        chapter_number: ChapterNumber,
    ) -> StoreResult<Option<ChapterRecord>> {
        let sql = format!(
            "SELECT {} FROM chapters WHERE manga_key = ?1 AND chapter_number = ?2",
            CHAPTER_COLUMNS
        );
        let raw = conn
            .query_row(&sql, params![manga_key, chapter_number.value()], RawChapter::from_row)
            .optional()?;
        raw.map(RawChapter::into_record).transpose()
    }

    fn save_chapter(conn: &Connection, record: &ChapterRecord) -> StoreResult<()> {
        conn.execute(
            "INSERT INTO chapters (manga_key, chapter_number, chapter_url, total_images, images, images_fetched_at, last_tried_at, total_views, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(manga_key, chapter_number) DO UPDATE SET
                chapter_url = excluded.chapter_url,
                total_images = excluded.total_images,
                images = excluded.images,
                images_fetched_at = excluded.images_fetched_at,
                last_tried_at = excluded.last_tried_at,
                updated_at = excluded.updated_at",
            params![
                record.manga_key,
                record.chapter_number.value(),
                record.chapter_url,
                record.total_images as i64,
                serde_json::to_string(&record.images)?,
                record.images_fetched_at,
                record.last_tried_at,
                record.total_views as i64,
                record.created_at,
                record.updated_at,
            ],
        )?;
        Ok(())
    }
}

struct RawManga {
    key: String,
    title: String,
    cover: String,
    description: String,
    genres: String,
    total_chapters: i64,
    total_views: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RawManga {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: row.get(0)?,
            title: row.get(1)?,
            cover: row.get(2)?,
            description: row.get(3)?,
            genres: row.get(4)?,
            total_chapters: row.get(5)?,
            total_views: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_entry(self) -> StoreResult<CatalogEntry> {
        Ok(CatalogEntry {
            key: self.key,
            title: self.title,
            cover: self.cover,
            description: self.description,
            genres: serde_json::from_str(&self.genres)?,
            total_chapters: self.total_chapters.max(0) as u32,
            total_views: self.total_views.max(0) as u64,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

struct RawChapter {
    manga_key: String,
    chapter_number: f64,
    chapter_url: String,
    total_images: i64,
    images: String,
    images_fetched_at: Option<DateTime<Utc>>,
    last_tried_at: Option<DateTime<Utc>>,
    total_views: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RawChapter {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            manga_key: row.get(0)?,
            chapter_number: row.get(1)?,
            chapter_url: row.get(2)?,
            total_images: row.get(3)?,
            images: row.get(4)?,
            images_fetched_at: row.get(5)?,
            last_tried_at: row.get(6)?,
            total_views: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn into_record(self) -> StoreResult<ChapterRecord> {
        let chapter_number = ChapterNumber::new(self.chapter_number).ok_or_else(|| {
            StoreError::InvalidValue(format!("chapter number {}", self.chapter_number))
        })?;
        Ok(ChapterRecord {
            manga_key: self.manga_key,
            chapter_number,
            chapter_url: self.chapter_url,
            total_images: self.total_images.max(0) as u32,
            images: serde_json::from_str(&self.images)?,
            images_fetched_at: self.images_fetched_at,
            last_tried_at: self.last_tried_at,
            total_views: self.total_views.max(0) as u64,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn find_catalog_entry(&self, key: &str) -> StoreResult<Option<CatalogEntry>> {
        let conn = self.lock()?;
        Self::load_manga(&conn, key)
    }

    async fn upsert_catalog_entry(
        &self,
        update: &CatalogUpdate,
        now: DateTime<Utc>,
    ) -> StoreResult<WriteOutcome> {
        let conn = self.lock()?;
        match Self::load_manga(&conn, &update.key)? {
            Some(mut entry) => {
                let changed = entry.apply(update, now);
                if changed {
                    Self::save_manga(&conn, &entry)?;
                }
                Ok(WriteOutcome::modified(changed))
            }
            None => {
                Self::save_manga(&conn, &CatalogEntry::insert(update, now))?;
                Ok(WriteOutcome::inserted())
            }
        }
    }

    async fn touch_catalog_entry(&self, key: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE manga SET updated_at = ?1 WHERE key = ?2",
            params![now, key],
        )?;
        Ok(changed > 0)
    }

    async fn find_chapter(
        &self,
        manga_key: &str,
        chapter_number: ChapterNumber,
    ) -> StoreResult<Option<ChapterRecord>> {
        let conn = self.lock()?;
        Self::load_chapter(&conn, manga_key, chapter_number)
    }

    async fn upsert_chapter(
        &self,
        update: &ChapterUpdate,
        now: DateTime<Utc>,
    ) -> StoreResult<WriteOutcome> {
        let conn = self.lock()?;
        match Self::load_chapter(&conn, &update.manga_key, update.chapter_number)? {
            Some(mut record) => {
                let changed = record.apply(update, now);
                if changed {
                    Self::save_chapter(&conn, &record)?;
                }
                Ok(WriteOutcome::modified(changed))
            }
            None => {
                Self::save_chapter(&conn, &ChapterRecord::insert(update, now))?;
                Ok(WriteOutcome::inserted())
            }
        }
    }

    async fn chapters_for(&self, manga_key: &str) -> StoreResult<Vec<ChapterRecord>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM chapters WHERE manga_key = ?1 ORDER BY chapter_number ASC",
            CHAPTER_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![manga_key], RawChapter::from_row)?;

        let mut records = Vec::new();
        for raw in rows {
            records.push(raw?.into_record()?);
        }
        Ok(records)
    }

    async fn stats(&self) -> StoreResult<StoreStats> {
        let conn = self.lock()?;
        let total_manga: i64 = conn.query_row("SELECT COUNT(*) FROM manga", [], |row| row.get(0))?;
        let total_chapters: i64 =
            conn.query_row("SELECT COUNT(*) FROM chapters", [], |row| row.get(0))?;
        let complete_chapters: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chapters WHERE total_images > 0 AND images <> '[]'",
            [],
            |row| row.get(0),
        )?;

        Ok(StoreStats {
            total_manga: total_manga as u64,
            total_chapters: total_chapters as u64,
            complete_chapters: complete_chapters as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog_update(title: &str) -> CatalogUpdate {
        CatalogUpdate {
            key: "tower-of-god".to_string(),
            title: title.to_string(),
            cover: "https://example.com/cover.jpg".to_string(),
            description: "Climb the tower".to_string(),
            genres: vec!["Action".to_string(), "Fantasy".to_string()],
            total_chapters: 3,
        }
    }

    fn chapter_update(number: f64, images: Option<Vec<&str>>) -> ChapterUpdate {
        ChapterUpdate {
            manga_key: "tower-of-god".to_string(),
            chapter_number: ChapterNumber::new(number).unwrap(),
            chapter_url: format!("https://example.com/tower-of-god/{}", number),
            images: images.map(|list| list.into_iter().map(String::from).collect()),
            attempted_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_catalog_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let now = Utc::now();

        let outcome = store.upsert_catalog_entry(&catalog_update("Tower of God"), now).await.unwrap();
        assert!(outcome.inserted);

        let entry = store.find_catalog_entry("tower-of-god").await.unwrap().unwrap();
        assert_eq!(entry.title, "Tower of God");
        assert_eq!(entry.genres, vec!["Action".to_string(), "Fantasy".to_string()]);
        assert_eq!(entry.total_views, 0);

        let same = store.upsert_catalog_entry(&catalog_update("Tower of God"), now).await.unwrap();
        assert!(!same.changed());

        let renamed = store.upsert_catalog_entry(&catalog_update("Tower of God S3"), now).await.unwrap();
        assert!(renamed.modified);
        assert_eq!(store.stats().await.unwrap().total_manga, 1);
    }

    #[tokio::test]
    async fn test_chapter_never_downgraded() {
        let store = SqliteStore::open_in_memory().unwrap();
        let now = Utc::now();

        store
            .upsert_chapter(&chapter_update(10.5, Some(vec!["p1.jpg", "p2.jpg"])), now)
            .await
            .unwrap();
        store.upsert_chapter(&chapter_update(10.5, None), now).await.unwrap();

        let number = ChapterNumber::new(10.5).unwrap();
        let record = store.find_chapter("tower-of-god", number).await.unwrap().unwrap();
        assert!(record.is_complete());
        assert_eq!(record.total_images, 2);
        assert_eq!(record.images, vec!["p1.jpg".to_string(), "p2.jpg".to_string()]);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_chapters, 1);
        assert_eq!(stats.complete_chapters, 1);
    }

    #[tokio::test]
    async fn test_chapters_ordered_by_number() {
        let store = SqliteStore::open_in_memory().unwrap();
        let now = Utc::now();
        for number in [10.0, 9.0, 10.5, 100.0] {
            store.upsert_chapter(&chapter_update(number, None), now).await.unwrap();
        }

        let numbers: Vec<f64> = store
            .chapters_for("tower-of-god")
            .await
            .unwrap()
            .iter()
            .map(|c| c.chapter_number.value())
            .collect();
        assert_eq!(numbers, vec![9.0, 10.0, 10.5, 100.0]);
    }

    #[tokio::test]
    async fn test_open_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manga.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .upsert_catalog_entry(&catalog_update("Tower of God"), Utc::now())
                .await
                .unwrap();
        }

        let reopened = SqliteStore::open(&path).unwrap();
        assert!(reopened.find_catalog_entry("tower-of-god").await.unwrap().is_some());
    }
}
