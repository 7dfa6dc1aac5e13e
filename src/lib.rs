//! Comic-Updater: next-page discovery for web comics without an API
//!
//! This crate keeps a local, ordered copy of paginated image sequences scraped
//! from arbitrary websites. Given the last stored page of a comic it crawls the
//! site's link graph, picks the "next" page and its image using edit-distance
//! heuristics, and persists the result while keeping page numbering and
//! bookmarks consistent.

pub mod config;
pub mod gate;
pub mod similarity;
pub mod storage;
pub mod updater;
pub mod url;
pub mod webpage;

use thiserror::Error;

/// Main error type for Comic-Updater operations
#[derive(Debug, Error)]
pub enum UpdaterError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Request gate error: {0}")]
    Gate(#[from] gate::GateError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid phase transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: updater::UpdatePhase,
        to: updater::UpdatePhase,
    },

    #[error("Page store lock poisoned")]
    LockPoisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Comic-Updater operations
pub type Result<T> = std::result::Result<T, UpdaterError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use gate::{FetchError, RequestGate};
pub use updater::{UpdateMode, UpdatePhase, UpdateResponse, Updater};
pub use url::{normalize_url, resolve_url};
pub use webpage::{parse_webpage, Link, WebImage, WebpageModel};
