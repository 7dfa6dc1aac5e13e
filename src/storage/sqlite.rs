//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the PageStore trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{PageStore, StorageError, StorageResult};
use crate::storage::{ComicRecord, ImageInfo, PageRecord, UpdatePolicy};
use crate::webpage::WebImage;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::path::Path;

const COMIC_COLUMNS: &str = "id, url, created_at, updated_at, bookmark, \
     updates_enabled, update_interval, update_limit";

const PAGE_COLUMNS: &str = "id, comic_id, number, url, accessed_at, \
     image_src, image_type, image_sha256, image_width, image_height";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Inserts a page at `number` inside an open transaction
    fn insert_in(
        tx: &Transaction<'_>,
        comic_id: i64,
        number: i64,
        url: &str,
        image: &WebImage,
    ) -> StorageResult<i64> {
        tx.execute(
            "UPDATE pages SET number = number + 1 WHERE comic_id = ?1 AND number >= ?2",
            params![comic_id, number],
        )?;

        tx.execute(
            "INSERT INTO pages (comic_id, number, url, modified_at, image_src, image_type,
             image_sha256, image_width, image_height, image_data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                comic_id,
                number,
                url,
                Utc::now().timestamp(),
                image.src,
                image.mime,
                image.hash,
                image.width,
                image.height,
                image.bytes,
            ],
        )?;
        let page_id = tx.last_insert_rowid();

        if number == 0 {
            tx.execute(
                "UPDATE comics SET bookmark = 0 WHERE id = ?1 AND bookmark = -1",
                params![comic_id],
            )?;
        }

        Ok(page_id)
    }
}

/// Reads the bookmark and page count of a comic inside a transaction
fn comic_position(tx: &Transaction<'_>, comic_id: i64) -> StorageResult<(i64, i64)> {
    let bookmark: i64 = tx
        .query_row(
            "SELECT bookmark FROM comics WHERE id = ?1",
            params![comic_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or(StorageError::ComicNotFound(comic_id))?;

    let count: i64 = tx.query_row(
        "SELECT COUNT(*) FROM pages WHERE comic_id = ?1",
        params![comic_id],
        |row| row.get(0),
    )?;

    Ok((bookmark, count))
}

fn from_timestamp(seconds: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(seconds, 0).unwrap_or_default()
}

fn row_to_comic(row: &Row<'_>) -> rusqlite::Result<ComicRecord> {
    Ok(ComicRecord {
        id: row.get(0)?,
        url: row.get(1)?,
        created_at: from_timestamp(row.get(2)?),
        updated_at: row.get::<_, Option<i64>>(3)?.map(from_timestamp),
        bookmark: row.get(4)?,
        policy: UpdatePolicy {
            enabled: row.get(5)?,
            interval_secs: u64::try_from(row.get::<_, i64>(6)?).unwrap_or(0),
            page_limit: row.get(7)?,
        },
    })
}

fn row_to_page(row: &Row<'_>) -> rusqlite::Result<PageRecord> {
    Ok(PageRecord {
        id: row.get(0)?,
        comic_id: row.get(1)?,
        number: row.get(2)?,
        url: row.get(3)?,
        accessed_at: row.get::<_, Option<i64>>(4)?.map(from_timestamp),
        image: ImageInfo {
            src: row.get(5)?,
            mime: row.get(6)?,
            hash: row.get(7)?,
            width: row.get(8)?,
            height: row.get(9)?,
        },
    })
}

impl PageStore for SqliteStorage {
    // ===== Comics =====

    fn create_comic(&mut self, url: &str, policy: UpdatePolicy) -> StorageResult<ComicRecord> {
        let interval = i64::try_from(policy.interval_secs).map_err(|_| {
            StorageError::ConstraintViolation(format!(
                "Update interval too large: {}",
                policy.interval_secs
            ))
        })?;

        self.conn.execute(
            "INSERT INTO comics (url, created_at, updates_enabled, update_interval, update_limit)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                url,
                Utc::now().timestamp(),
                policy.enabled,
                interval,
                policy.page_limit
            ],
        )?;

        self.get_comic(self.conn.last_insert_rowid())
    }

    fn get_comic(&self, comic_id: i64) -> StorageResult<ComicRecord> {
        let sql = format!("SELECT {} FROM comics WHERE id = ?1", COMIC_COLUMNS);

        self.conn
            .query_row(&sql, params![comic_id], row_to_comic)
            .optional()?
            .ok_or(StorageError::ComicNotFound(comic_id))
    }

    fn list_comics(&self) -> StorageResult<Vec<ComicRecord>> {
        let sql = format!("SELECT {} FROM comics ORDER BY id", COMIC_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;

        let comics = stmt
            .query_map([], row_to_comic)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(comics)
    }

    fn update_comic_updated(&mut self, comic_id: i64, at: DateTime<Utc>) -> StorageResult<()> {
        let timestamp = at.timestamp();
        self.conn.execute(
            "UPDATE comics SET updated_at = ?2
             WHERE id = ?1 AND (updated_at IS NULL OR updated_at < ?2)",
            params![comic_id, timestamp],
        )?;
        Ok(())
    }

    fn get_bookmark(&self, comic_id: i64) -> StorageResult<i64> {
        self.conn
            .query_row(
                "SELECT bookmark FROM comics WHERE id = ?1",
                params![comic_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(StorageError::ComicNotFound(comic_id))
    }

    fn set_bookmark(&mut self, comic_id: i64, number: i64) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        let (_, count) = comic_position(&tx, comic_id)?;

        if number < -1 || number >= count {
            return Err(StorageError::ConstraintViolation(format!(
                "Bookmark {} outside of 0..{}",
                number, count
            )));
        }

        tx.execute(
            "UPDATE comics SET bookmark = ?2 WHERE id = ?1",
            params![comic_id, number],
        )?;
        tx.commit()?;
        Ok(())
    }

    // ===== Pages =====

    fn get_pages(&self, comic_id: i64) -> StorageResult<Vec<PageRecord>> {
        let sql = format!(
            "SELECT {} FROM pages WHERE comic_id = ?1 ORDER BY number",
            PAGE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let pages = stmt
            .query_map(params![comic_id], row_to_page)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(pages)
    }

    fn get_page(&self, page_id: i64) -> StorageResult<PageRecord> {
        let sql = format!("SELECT {} FROM pages WHERE id = ?1", PAGE_COLUMNS);

        self.conn
            .query_row(&sql, params![page_id], row_to_page)
            .optional()?
            .ok_or(StorageError::PageNotFound(page_id))
    }

    fn insert_page(
        &mut self,
        comic_id: i64,
        url: &str,
        image: &WebImage,
    ) -> StorageResult<PageRecord> {
        let tx = self.conn.transaction()?;
        let (_, count) = comic_position(&tx, comic_id)?;

        let page_id = Self::insert_in(&tx, comic_id, count, url, image)?;
        tx.commit()?;

        tracing::debug!("Appended page {} to comic {}", count, comic_id);
        self.get_page(page_id)
    }

    fn insert_page_at(
        &mut self,
        comic_id: i64,
        number: i64,
        url: &str,
        image: &WebImage,
    ) -> StorageResult<PageRecord> {
        let tx = self.conn.transaction()?;
        let (_, count) = comic_position(&tx, comic_id)?;

        if number < 0 || number > count {
            return Err(StorageError::ConstraintViolation(format!(
                "Page number {} outside of 0..={}",
                number, count
            )));
        }

        let page_id = Self::insert_in(&tx, comic_id, number, url, image)?;
        tx.commit()?;

        self.get_page(page_id)
    }

    fn delete_page(&mut self, page_id: i64) -> StorageResult<()> {
        let tx = self.conn.transaction()?;

        let (comic_id, number): (i64, i64) = tx
            .query_row(
                "SELECT comic_id, number FROM pages WHERE id = ?1",
                params![page_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or(StorageError::PageNotFound(page_id))?;

        let (bookmark, count) = comic_position(&tx, comic_id)?;

        let move_bookmark = (bookmark > 0 && number <= bookmark) || (bookmark == 0 && count == 1);
        if move_bookmark {
            tx.execute(
                "UPDATE comics SET bookmark = MAX(bookmark - 1, -1) WHERE id = ?1",
                params![comic_id],
            )?;
        }

        tx.execute("DELETE FROM pages WHERE id = ?1", params![page_id])?;
        tx.execute(
            "UPDATE pages SET number = number - 1 WHERE comic_id = ?1 AND number > ?2",
            params![comic_id, number],
        )?;

        tx.commit()?;

        tracing::debug!("Deleted page {} of comic {}", number, comic_id);
        Ok(())
    }

    fn get_image_info(&self, page_id: i64) -> StorageResult<ImageInfo> {
        self.get_page(page_id).map(|page| page.image)
    }

    fn get_image_data(&self, page_id: i64) -> StorageResult<Vec<u8>> {
        self.conn
            .query_row(
                "SELECT image_data FROM pages WHERE id = ?1",
                params![page_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(StorageError::PageNotFound(page_id))
    }

    fn is_image_in_use(&self, comic_id: i64, hash: &str) -> StorageResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM pages WHERE comic_id = ?1 AND image_sha256 = ?2 LIMIT 1",
                params![comic_id, hash],
                |row| row.get(0),
            )
            .optional()?;

        Ok(found.is_some())
    }

    fn is_page_in_use(&self, comic_id: i64, url: &str) -> StorageResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM pages WHERE comic_id = ?1 AND url = ?2 LIMIT 1",
                params![comic_id, url],
                |row| row.get(0),
            )
            .optional()?;

        Ok(found.is_some())
    }

    // ===== Reading progress =====

    fn count_new_pages(&self, comic_id: i64) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM pages WHERE comic_id = ?1 AND accessed_at IS NULL",
            params![comic_id],
            |row| row.get(0),
        )?;

        u64::try_from(count).map_err(|e| StorageError::Database(e.to_string()))
    }

    fn mark_page_accessed(&mut self, page_id: i64, at: DateTime<Utc>) -> StorageResult<()> {
        let changed = self.conn.execute(
            "UPDATE pages SET accessed_at = ?2 WHERE id = ?1",
            params![page_id, at.timestamp()],
        )?;

        if changed == 0 {
            return Err(StorageError::PageNotFound(page_id));
        }
        Ok(())
    }
}
