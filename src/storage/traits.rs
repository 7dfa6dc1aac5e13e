//! Storage traits and error types
//!
//! This module defines the trait interface for the ordered page store and
//! its error types.

use crate::storage::{ComicRecord, ImageInfo, PageRecord, UpdatePolicy};
use crate::webpage::WebImage;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Comic not found: {0}")]
    ComicNotFound(i64),

    #[error("Page not found: {0}")]
    PageNotFound(i64),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Ordered page store
///
/// Pages of a comic are numbered `0..N-1` without gaps. Every mutation keeps
/// that numbering and the comic's bookmark consistent in a single
/// transaction:
///
/// - Inserting at `n` shifts pages numbered `>= n` up by one
/// - Deleting page `n` shifts pages numbered `> n` down by one
/// - Deleting at or below a positive bookmark moves the bookmark back one;
///   deleting the last remaining page clears a bookmark of 0 to -1
/// - Inserting page 0 into a comic without a bookmark sets it to 0
pub trait PageStore {
    // ===== Comics =====

    /// Registers a comic to track
    fn create_comic(&mut self, url: &str, policy: UpdatePolicy) -> StorageResult<ComicRecord>;

    /// Gets a comic by ID
    fn get_comic(&self, comic_id: i64) -> StorageResult<ComicRecord>;

    /// Gets every comic, oldest first
    fn list_comics(&self) -> StorageResult<Vec<ComicRecord>>;

    /// Advances the comic's last-updated time
    ///
    /// Never moves the timestamp backwards.
    fn update_comic_updated(&mut self, comic_id: i64, at: DateTime<Utc>) -> StorageResult<()>;

    /// Gets the comic's bookmark (-1 if unset)
    fn get_bookmark(&self, comic_id: i64) -> StorageResult<i64>;

    /// Sets the comic's bookmark
    ///
    /// Fails with `ConstraintViolation` unless `-1 <= number < page count`.
    fn set_bookmark(&mut self, comic_id: i64, number: i64) -> StorageResult<()>;

    // ===== Pages =====

    /// Gets a comic's pages ordered by number
    fn get_pages(&self, comic_id: i64) -> StorageResult<Vec<PageRecord>>;

    /// Gets a page by ID
    fn get_page(&self, page_id: i64) -> StorageResult<PageRecord>;

    /// Appends a page after the comic's last page
    fn insert_page(
        &mut self,
        comic_id: i64,
        url: &str,
        image: &WebImage,
    ) -> StorageResult<PageRecord>;

    /// Inserts a page at `number`, shifting later pages up
    ///
    /// Fails with `ConstraintViolation` unless `0 <= number <= page count`.
    fn insert_page_at(
        &mut self,
        comic_id: i64,
        number: i64,
        url: &str,
        image: &WebImage,
    ) -> StorageResult<PageRecord>;

    /// Deletes a page, shifting later pages down
    fn delete_page(&mut self, page_id: i64) -> StorageResult<()>;

    /// Gets the stored image metadata of a page
    fn get_image_info(&self, page_id: i64) -> StorageResult<ImageInfo>;

    /// Gets the stored image bytes of a page
    fn get_image_data(&self, page_id: i64) -> StorageResult<Vec<u8>>;

    /// Returns true if any page of the comic stores an image with this hash
    fn is_image_in_use(&self, comic_id: i64, hash: &str) -> StorageResult<bool>;

    /// Returns true if any page of the comic has this URL
    fn is_page_in_use(&self, comic_id: i64, url: &str) -> StorageResult<bool>;

    // ===== Reading progress =====

    /// Counts pages never opened by the reader
    fn count_new_pages(&self, comic_id: i64) -> StorageResult<u64>;

    /// Records that the reader opened a page
    fn mark_page_accessed(&mut self, page_id: i64, at: DateTime<Utc>) -> StorageResult<()>;
}
