//! Automatic updates of due comics

use crate::storage::PageStore;
use crate::updater::{UpdateMode, UpdateResponse, Updater};
use crate::UpdaterError;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Starts a multi-page run for every comic whose update is due at `now`
///
/// Comics with a run already active are skipped.
///
/// # Returns
///
/// The ids of the comics a run was started for, with their run handles
pub fn check_due(
    updater: &Updater,
    now: DateTime<Utc>,
) -> Result<Vec<(i64, JoinHandle<UpdateResponse>)>, UpdaterError> {
    let comics = {
        let store = updater
            .store()
            .lock()
            .map_err(|_| UpdaterError::LockPoisoned)?;
        store.list_comics()?
    };

    let mut started = Vec::new();
    for comic in comics.iter().filter(|c| c.is_update_due(now)) {
        if let Some(handle) = updater.start(comic.id, UpdateMode::MultiplePages) {
            tracing::info!("Comic {}: automatic update started", comic.id);
            started.push((comic.id, handle));
        }
    }

    Ok(started)
}

/// Checks for due comics every `auto_check_interval` until `shutdown` is raised
///
/// Runs started here are stopped on shutdown.
pub async fn run_auto_updates(updater: Updater, mut shutdown: watch::Receiver<bool>) {
    let period = updater
        .config()
        .auto_check_interval()
        .max(Duration::from_secs(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    tracing::info!("Auto-update scheduler started (every {:?})", period);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match check_due(&updater, Utc::now()) {
                    Ok(started) if !started.is_empty() => {
                        tracing::debug!("{} automatic update(s) started", started.len());
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!("Failed to check for due comics: {}", e),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    let stopped = updater.stop_all();
    tracing::info!("Auto-update scheduler stopped ({} run(s) canceled)", stopped);
}
