//! Token-scoped fetch groups

use crate::config::HttpConfig;
use crate::gate::cache::ResponseCache;
use crate::gate::fetcher::{build_http_client, fetch_url, FetchedResponse};
use crate::gate::{FetchError, GateError};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::{AbortHandle, JoinHandle};

/// Issues grouped, cancellable fetches identified by caller-chosen tokens
///
/// A token's lifecycle is `create` -> `push`* -> (`remove` | `cancel`). Every
/// access to the token map goes through one mutex, so concurrent callers
/// (several comics updating at once) never race.
///
/// Fetches run as Tokio tasks; `push` must be called from within a runtime.
#[derive(Debug)]
pub struct RequestGate {
    client: Client,
    follow_redirects: bool,
    cache: Arc<ResponseCache>,
    groups: Mutex<HashMap<String, Vec<AbortHandle>>>,
}

impl RequestGate {
    /// Creates a gate with its own HTTP client and response cache
    pub fn new(config: &HttpConfig) -> Result<Self, reqwest::Error> {
        let client = build_http_client(config)?;
        let ttl = chrono::Duration::from_std(config.cache_ttl())
            .unwrap_or_else(|_| chrono::Duration::hours(24));

        Ok(Self::with_client(
            client,
            config.follow_redirects,
            ResponseCache::new(ttl),
        ))
    }

    /// Creates a gate around an existing client and cache
    pub fn with_client(client: Client, follow_redirects: bool, cache: ResponseCache) -> Self {
        Self {
            client,
            follow_redirects,
            cache: Arc::new(cache),
            groups: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a new, empty fetch group
    ///
    /// # Errors
    ///
    /// `GateError::DuplicateToken` if the token is already registered.
    pub fn create(&self, token: &str) -> Result<(), GateError> {
        let mut groups = self.lock_groups();
        if groups.contains_key(token) {
            return Err(GateError::DuplicateToken(token.to_string()));
        }

        groups.insert(token.to_string(), Vec::new());
        Ok(())
    }

    /// Starts a fetch under `token`
    ///
    /// # Errors
    ///
    /// `GateError::UnknownToken` if the token was never created or was
    /// already canceled or removed; the caller's batch is gone.
    pub fn push(&self, token: &str, url: &str) -> Result<FetchHandle, GateError> {
        let mut groups = self.lock_groups();
        let group = groups
            .get_mut(token)
            .ok_or_else(|| GateError::UnknownToken(token.to_string()))?;

        let client = self.client.clone();
        let cache = Arc::clone(&self.cache);
        let follow_redirects = self.follow_redirects;
        let target = url.to_string();

        let task = tokio::spawn(async move {
            fetch_cached(&client, &cache, &target, follow_redirects).await
        });
        group.push(task.abort_handle());

        Ok(FetchHandle {
            url: url.to_string(),
            task,
        })
    }

    /// Aborts every in-flight fetch under `token` and discards the group
    ///
    /// Unknown tokens are ignored.
    pub fn cancel(&self, token: &str) {
        let group = self.lock_groups().remove(token);

        if let Some(handles) = group {
            tracing::debug!("Canceling {} fetch(es) under {}", handles.len(), token);
            for handle in handles {
                handle.abort();
            }
        }
    }

    /// Discards a completed group
    ///
    /// # Errors
    ///
    /// `GateError::UnknownToken` if the token is not registered.
    pub fn remove(&self, token: &str) -> Result<(), GateError> {
        self.lock_groups()
            .remove(token)
            .map(|_| ())
            .ok_or_else(|| GateError::UnknownToken(token.to_string()))
    }

    /// Returns true if the token is registered
    pub fn contains(&self, token: &str) -> bool {
        self.lock_groups().contains_key(token)
    }

    /// Number of registered tokens
    pub fn active_tokens(&self) -> usize {
        self.lock_groups().len()
    }

    /// Registers a token and returns a guard that cancels it on drop
    pub fn scope(&self, token: &str) -> Result<TokenGuard<'_>, GateError> {
        self.create(token)?;
        Ok(TokenGuard {
            gate: self,
            token: token.to_string(),
            armed: true,
        })
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    fn lock_groups(&self) -> MutexGuard<'_, HashMap<String, Vec<AbortHandle>>> {
        self.groups.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A fetch started by `RequestGate::push`
#[derive(Debug)]
pub struct FetchHandle {
    url: String,
    task: JoinHandle<Result<FetchedResponse, FetchError>>,
}

impl FetchHandle {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Waits for the fetch to settle
    ///
    /// A fetch aborted through `cancel` settles as `FetchError::Canceled`.
    pub async fn response(self) -> Result<FetchedResponse, FetchError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(FetchError::Canceled),
            Err(e) => Err(FetchError::Unknown(e.to_string())),
        }
    }
}

/// Keeps a token registered for the lifetime of a batch
///
/// Dropping the guard without calling `finish` cancels the token, so a batch
/// abandoned mid-flight (its future dropped) aborts its fetches.
#[derive(Debug)]
pub struct TokenGuard<'a> {
    gate: &'a RequestGate,
    token: String,
    armed: bool,
}

impl TokenGuard<'_> {
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Starts a fetch under the guarded token
    pub fn push(&self, url: &str) -> Result<FetchHandle, GateError> {
        self.gate.push(&self.token, url)
    }

    /// Removes the completed group
    ///
    /// # Errors
    ///
    /// `GateError::UnknownToken` if the token was canceled meanwhile.
    pub fn finish(mut self) -> Result<(), GateError> {
        self.armed = false;
        self.gate.remove(&self.token)
    }
}

impl Drop for TokenGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.gate.cancel(&self.token);
        }
    }
}

/// Serves a fetch from the cache or the network
async fn fetch_cached(
    client: &Client,
    cache: &ResponseCache,
    url: &str,
    follow_redirects: bool,
) -> Result<FetchedResponse, FetchError> {
    let key = ResponseCache::key(url);
    if let Some(response) = cache.get(&key) {
        tracing::trace!("Cache hit for {}", url);
        return Ok(response);
    }

    let response = fetch_url(client, url, follow_redirects).await?;
    cache.store(key, &response);

    Ok(response)
}
