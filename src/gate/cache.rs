//! Response caching for the request gate
//!
//! Successful responses that the server marked cacheable are kept in memory
//! and served again until their own lifetime or the configured TTL runs out,
//! whichever comes first.

use crate::gate::FetchedResponse;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Map size from which lookups and stores sweep expired entries
const SWEEP_THRESHOLD: usize = 64;

/// A cached response and its expiry
#[derive(Debug, Clone)]
pub struct CachedResponse {
    /// The cached response
    pub response: FetchedResponse,

    /// When the response was fetched
    pub fetched_at: DateTime<Utc>,

    /// When the response stops being served
    pub expires_at: DateTime<Utc>,
}

impl CachedResponse {
    /// Creates a new entry expiring after `lifetime`
    pub fn new(response: FetchedResponse, lifetime: Duration) -> Self {
        let fetched_at = Utc::now();
        Self {
            response,
            fetched_at,
            expires_at: fetched_at + lifetime,
        }
    }

    /// Checks if the entry has expired
    pub fn is_stale(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Returns the age of the entry
    pub fn age(&self) -> Duration {
        Utc::now() - self.fetched_at
    }
}

/// In-memory response cache keyed by request signature
#[derive(Debug)]
pub struct ResponseCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CachedResponse>>,
}

impl ResponseCache {
    /// Creates an empty cache whose entries never outlive `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Request signature for a GET of `url`
    pub fn key(url: &str) -> String {
        format!("GET {}", url)
    }

    /// Returns a fresh cached response, evicting it if stale
    ///
    /// A miss on a large map also sweeps expired entries under other keys.
    pub fn get(&self, key: &str) -> Option<FetchedResponse> {
        let mut entries = self.lock_entries();

        match entries.get(key) {
            Some(entry) if !entry.is_stale() => Some(entry.response.clone()),
            Some(_) => {
                entries.remove(key);
                sweep(&mut entries);
                None
            }
            None => {
                sweep(&mut entries);
                None
            }
        }
    }

    /// Stores a response if it carries a cache lifetime
    ///
    /// # Returns
    ///
    /// `true` if the response was cached
    pub fn store(&self, key: String, response: &FetchedResponse) -> bool {
        let Some(max_age) = response.max_age else {
            return false;
        };

        let ttl_seconds = u64::try_from(self.ttl.num_seconds()).unwrap_or(0);
        let seconds = max_age.min(ttl_seconds);
        if seconds == 0 {
            return false;
        }
        let lifetime = Duration::seconds(i64::try_from(seconds).unwrap_or(0));

        let mut entries = self.lock_entries();
        sweep(&mut entries);
        entries.insert(key, CachedResponse::new(response.clone(), lifetime));
        true
    }

    /// Drops every expired entry
    pub fn purge_stale(&self) {
        self.lock_entries().retain(|_, entry| !entry.is_stale());
    }

    /// Number of entries, stale ones included
    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, CachedResponse>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drops expired entries once the map has grown past `SWEEP_THRESHOLD`
fn sweep(entries: &mut HashMap<String, CachedResponse>) {
    if entries.len() < SWEEP_THRESHOLD {
        return;
    }

    let before = entries.len();
    entries.retain(|_, entry| !entry.is_stale());
    tracing::trace!("Swept {} expired cache entries", before - entries.len());
}
