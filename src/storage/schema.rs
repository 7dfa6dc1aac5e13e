//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Comic-Updater
//! database. Page numbering is maintained by the storage layer inside
//! explicit transactions, so `(comic_id, number)` is indexed but not unique:
//! a renumbering `UPDATE` briefly overlaps numbers row by row.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Tracked comics
CREATE TABLE IF NOT EXISTS comics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER,
    bookmark INTEGER NOT NULL DEFAULT -1,
    updates_enabled INTEGER NOT NULL DEFAULT 1,
    -- Time between automatic updates in seconds
    update_interval INTEGER NOT NULL DEFAULT 86400,
    -- Maximum number of unread pages to fetch automatically (-1 = no limit)
    update_limit INTEGER NOT NULL DEFAULT 3,
    CHECK (bookmark >= -1),
    CHECK (updates_enabled IN (0, 1)),
    CHECK (update_interval > 0),
    CHECK (update_limit >= -1)
);

-- Stored pages, ordered by number within a comic
CREATE TABLE IF NOT EXISTS pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    comic_id INTEGER NOT NULL REFERENCES comics(id) ON DELETE CASCADE,
    number INTEGER NOT NULL,
    url TEXT NOT NULL,
    accessed_at INTEGER,
    modified_at INTEGER NOT NULL,
    image_src TEXT NOT NULL,
    image_type TEXT NOT NULL,
    image_sha256 TEXT NOT NULL,
    image_width INTEGER NOT NULL,
    image_height INTEGER NOT NULL,
    image_data BLOB NOT NULL,
    CHECK (number >= 0),
    CHECK (image_width > 0),
    CHECK (image_height > 0),
    CHECK (length(image_sha256) = 64)
);

CREATE INDEX IF NOT EXISTS idx_pages_comic_number ON pages(comic_id, number);
CREATE INDEX IF NOT EXISTS idx_pages_sha256 ON pages(image_sha256);
CREATE INDEX IF NOT EXISTS idx_pages_url ON pages(url);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
