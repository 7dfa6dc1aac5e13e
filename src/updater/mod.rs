//! Page discovery state machine
//!
//! An `Updater` owns the registry of active runs. Each run walks the phases in
//! `UpdatePhase`, reports every step on a broadcast channel, and can be stopped
//! at any time through its stop signal.
//!
//! # Example
//!
//! ```no_run
//! use comic_updater::config::HttpConfig;
//! use comic_updater::storage::open_storage;
//! use comic_updater::updater::{HttpSource, UpdateMode, Updater};
//! use comic_updater::{RequestGate, UpdaterError};
//! use std::path::Path;
//! use std::sync::{Arc, Mutex};
//!
//! # async fn run() -> Result<(), UpdaterError> {
//! let gate = Arc::new(RequestGate::new(&HttpConfig::default())?);
//! let store = Arc::new(Mutex::new(open_storage(Path::new("comics.db"))?));
//! let updater = Updater::new(
//!     Arc::new(HttpSource::new(gate)),
//!     store,
//!     Default::default(),
//! );
//!
//! if let Some(run) = updater.start(1, UpdateMode::SinglePage) {
//!     println!("{}", run.await.unwrap_or(comic_updater::UpdateResponse::Canceled));
//! }
//! # Ok(())
//! # }
//! ```

mod discovery;
mod runner;
mod schedule;
mod source;
mod state;

pub use discovery::{find_next_link, Discovery, StartingPoint, Step, Stop};
pub use runner::{execute, update_multiple_pages, update_single_page};
pub use schedule::{check_due, run_auto_updates};
pub use source::{HttpSource, WebSource};
pub use state::{ResponseState, UpdateEvent, UpdateMode, UpdatePhase, UpdateResponse};

use crate::config::UpdaterConfig;
use crate::storage::{PageStore, SqliteStorage};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// Capacity of the event channel; slow subscribers lose the oldest events
const EVENT_CAPACITY: usize = 256;

/// A run in the registry
struct ActiveRun {
    mode: UpdateMode,
    stop: watch::Sender<bool>,
}

/// Removes a run from the registry when dropped, even if the run panics
struct Registered {
    runs: Arc<Mutex<HashMap<i64, ActiveRun>>>,
    comic_id: i64,
}

impl Drop for Registered {
    fn drop(&mut self) {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.comic_id);
    }
}

/// Starts, tracks and stops update runs
///
/// At most one run per comic is active. Cloning shares the registry.
#[derive(Clone)]
pub struct Updater {
    source: Arc<dyn WebSource>,
    store: Arc<Mutex<SqliteStorage>>,
    config: UpdaterConfig,
    runs: Arc<Mutex<HashMap<i64, ActiveRun>>>,
    events: broadcast::Sender<UpdateEvent>,
}

impl Updater {
    pub fn new(
        source: Arc<dyn WebSource>,
        store: Arc<Mutex<SqliteStorage>>,
        config: UpdaterConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            source,
            store,
            config,
            runs: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }

    /// Receives every event of every run started after subscribing
    pub fn subscribe(&self) -> broadcast::Receiver<UpdateEvent> {
        self.events.subscribe()
    }

    pub fn store(&self) -> &Arc<Mutex<SqliteStorage>> {
        &self.store
    }

    pub fn config(&self) -> &UpdaterConfig {
        &self.config
    }

    /// Starts a run for `comic_id`
    ///
    /// # Returns
    ///
    /// * `Some(handle)` - The run was spawned; the handle yields its response
    /// * `None` - A run for this comic is already active
    pub fn start(&self, comic_id: i64, mode: UpdateMode) -> Option<JoinHandle<UpdateResponse>> {
        let (stop_tx, stop_rx) = watch::channel(false);

        {
            let mut runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);
            if runs.contains_key(&comic_id) {
                tracing::debug!("Comic {}: run already active", comic_id);
                return None;
            }
            runs.insert(comic_id, ActiveRun { mode, stop: stop_tx });
        }

        let mut discovery = Discovery::new(
            comic_id,
            mode,
            Arc::clone(&self.source),
            Arc::clone(&self.store),
            self.config.clone(),
            self.events.clone(),
        );
        let registered = Registered {
            runs: Arc::clone(&self.runs),
            comic_id,
        };

        Some(tokio::spawn(async move {
            let response = execute(&mut discovery, stop_rx).await;

            // A multi-page run counts as an update however it ended
            if mode == UpdateMode::MultiplePages {
                if let Err(e) = discovery.with_store(|s| s.update_comic_updated(comic_id, Utc::now()))
                {
                    tracing::error!("Comic {}: failed to stamp update: {:?}", comic_id, e);
                }
            }

            drop(registered);
            discovery.finish(&response);

            response
        }))
    }

    /// Runs an update to completion on the current task
    ///
    /// Returns `None` if a run for this comic is already active.
    pub async fn run(&self, comic_id: i64, mode: UpdateMode) -> Option<UpdateResponse> {
        let handle = self.start(comic_id, mode)?;

        Some(match handle.await {
            Ok(response) => response,
            Err(e) if e.is_panic() => {
                tracing::error!("Comic {}: update task panicked", comic_id);
                UpdateResponse::error("Update task panicked")
            }
            Err(_) => UpdateResponse::Canceled,
        })
    }

    /// Signals the run for `comic_id` to stop
    ///
    /// Returns false if no run was active.
    pub fn stop(&self, comic_id: i64) -> bool {
        let runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);
        match runs.get(&comic_id) {
            Some(run) => {
                tracing::info!("Comic {}: stopping {} update", comic_id, run.mode);
                let _ = run.stop.send(true);
                true
            }
            None => false,
        }
    }

    /// Signals every active run to stop
    pub fn stop_all(&self) -> usize {
        let runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);
        for run in runs.values() {
            let _ = run.stop.send(true);
        }
        runs.len()
    }

    pub fn is_running(&self, comic_id: i64) -> bool {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&comic_id)
    }

    /// Active runs and their modes
    pub fn running(&self) -> Vec<(i64, UpdateMode)> {
        let runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);
        let mut running: Vec<(i64, UpdateMode)> =
            runs.iter().map(|(id, run)| (*id, run.mode)).collect();
        running.sort_by_key(|(id, _)| *id);
        running
    }
}
