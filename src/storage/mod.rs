//! Storage module for comics and their pages
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Comic registration and update policies
//! - Ordered page persistence with renumbering and bookmark correction
//! - Image deduplication lookups

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{PageStore, StorageError, StorageResult};

use chrono::{DateTime, Utc};
use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(StorageError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// How a comic is updated automatically
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdatePolicy {
    /// Whether the scheduler updates this comic
    pub enabled: bool,

    /// Seconds between automatic updates
    pub interval_secs: u64,

    /// Maximum number of unread pages to collect (-1 = no limit)
    pub page_limit: i64,
}

impl UpdatePolicy {
    /// Returns true if `unread` pages already fill the limit
    pub fn limit_reached(&self, unread: u64) -> bool {
        match u64::try_from(self.page_limit) {
            Ok(limit) => unread >= limit,
            Err(_) => false,
        }
    }
}

impl Default for UpdatePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 86_400,
            page_limit: 3,
        }
    }
}

/// Represents a comic in the database
#[derive(Debug, Clone, PartialEq)]
pub struct ComicRecord {
    pub id: i64,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub bookmark: i64,
    pub policy: UpdatePolicy,
}

impl ComicRecord {
    /// When the next automatic update is due
    pub fn next_update_at(&self) -> DateTime<Utc> {
        let last = self.updated_at.unwrap_or(self.created_at);
        let interval = i64::try_from(self.policy.interval_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX);
        last.checked_add_signed(interval)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Returns true if automatic updates are enabled and due at `now`
    pub fn is_update_due(&self, now: DateTime<Utc>) -> bool {
        self.policy.enabled && self.next_update_at() <= now
    }
}

/// Stored image metadata of a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub src: String,
    pub mime: String,
    pub hash: String,
    pub width: u32,
    pub height: u32,
}

/// Represents a page in the database
#[derive(Debug, Clone, PartialEq)]
pub struct PageRecord {
    pub id: i64,
    pub comic_id: i64,
    pub number: i64,
    pub url: String,
    pub accessed_at: Option<DateTime<Utc>>,
    pub image: ImageInfo,
}

impl PageRecord {
    /// Returns true if the reader never opened this page
    pub fn is_new(&self) -> bool {
        self.accessed_at.is_none()
    }
}
