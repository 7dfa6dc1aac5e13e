//! Similarity engine
//!
//! Edit-distance based string similarity used to rank candidate links and
//! images. Everything here is pure and deterministic; no I/O.
//!
//! # Components
//!
//! - `distance` / `similarity`: Levenshtein distance and the candidate-length
//!   normalized similarity derived from it
//! - `filter_by_similarity`, `best_match_index`, `sort_by_similarity_score`:
//!   ranking helpers over candidate lists
//! - `cluster` / `sorted_cluster`: greedy clustering around representatives

mod cluster;
mod levenshtein;

pub use cluster::{
    best_match_index, cluster, filter_by_similarity, sort_by_similarity_score, sorted_cluster,
    SimilarityMatch,
};
pub use levenshtein::{distance, similarity};

/// Default threshold for clustering links and image sources
pub const DEFAULT_CLUSTER_THRESHOLD: f64 = 0.62;

/// Default threshold for finding the "next" link on a previous page
pub const DEFAULT_LINK_THRESHOLD: f64 = 0.9;
