//! Configuration module for Comic-Updater
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use comic_updater::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("comics.toml")).unwrap();
//! println!("Per-fetch timeout: {}s", config.http.timeout_secs);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, HttpConfig, StorageConfig, UpdaterConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
