//! End-to-end discovery runs against an in-memory comic site

use crate::support::*;
use chrono::{Duration, Utc};
use comic_updater::storage::{PageStore, UpdatePolicy};
use comic_updater::updater::{check_due, UpdateEvent, UpdateMode, UpdatePhase};
use comic_updater::{FetchError, UpdateResponse};
use tokio::sync::broadcast;

async fn run(updater: &comic_updater::Updater, comic_id: i64, mode: UpdateMode) -> UpdateResponse {
    updater
        .run(comic_id, mode)
        .await
        .expect("no other run should be active")
}

/// Collects events until the final one
async fn drain(events: &mut broadcast::Receiver<UpdateEvent>) -> Vec<UpdateEvent> {
    let mut seen = Vec::new();
    loop {
        let event = events.recv().await.unwrap();
        let done = event.is_final();
        seen.push(event);
        if done {
            return seen;
        }
    }
}

#[tokio::test]
async fn test_single_page_fetches_exactly_one_new_page() {
    let site = FakeSite::chain(&[0, 1, 2, 3, 4]);
    let (updater, comic) = updater_with_comic(&site, &[0, 1, 2], unlimited(), fast_settings());

    let response = run(&updater, comic, UpdateMode::SinglePage).await;

    assert_eq!(response, UpdateResponse::success("Successfully fetched page 4"));
    assert_eq!(
        page_urls(&updater, comic),
        vec![page_url(0), page_url(1), page_url(2), page_url(3)]
    );

    let stored = pages(&updater, comic);
    assert_eq!(stored[3].number, 3);
    assert_eq!(stored[3].image.src, image_src(3));
    assert_eq!(stored[3].image.hash, digest("page-3"));
    assert!(stored[3].is_new());
}

#[tokio::test]
async fn test_single_page_is_idempotent() {
    let site = FakeSite::chain(&[0, 1, 2, 3]);
    let (updater, comic) = updater_with_comic(&site, &[0, 1, 2], unlimited(), fast_settings());

    run(&updater, comic, UpdateMode::SinglePage).await;
    let response = run(&updater, comic, UpdateMode::SinglePage).await;

    assert_eq!(response, UpdateResponse::success("No new page found"));
    assert_eq!(pages(&updater, comic).len(), 4);
}

#[tokio::test]
async fn test_first_page_from_comic_url() {
    let site = FakeSite::chain(&[0, 1]);
    let (updater, comic) = updater_with_comic(&site, &[], unlimited(), fast_settings());

    let response = run(&updater, comic, UpdateMode::SinglePage).await;

    assert_eq!(response, UpdateResponse::success("Successfully fetched page 1"));
    let stored = pages(&updater, comic);
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].url, page_url(0));
    // The banner is smaller than the page image
    assert_eq!(stored[0].image.src, image_src(0));

    let bookmark = updater.store().lock().unwrap().get_bookmark(comic).unwrap();
    assert_eq!(bookmark, 0);
}

#[tokio::test]
async fn test_unreachable_comic_url() {
    let site = FakeSite::chain(&[]);
    let (updater, comic) = updater_with_comic(&site, &[], unlimited(), fast_settings());

    let response = run(&updater, comic, UpdateMode::SinglePage).await;

    assert_eq!(response.status_code(), Some(404));
    assert!(pages(&updater, comic).is_empty());
}

#[tokio::test]
async fn test_missing_last_page_is_deleted() {
    // Page 2 was taken down; page 1 now links to page 3
    let site = FakeSite::chain(&[0, 1, 3]);
    let (updater, comic) = updater_with_comic(&site, &[0, 1, 2], unlimited(), fast_settings());

    let response = run(&updater, comic, UpdateMode::SinglePage).await;

    assert_eq!(response, UpdateResponse::success("Successfully fetched page 3"));
    assert_eq!(
        page_urls(&updater, comic),
        vec![page_url(0), page_url(1), page_url(3)]
    );

    let numbers: Vec<i64> = pages(&updater, comic).iter().map(|p| p.number).collect();
    assert_eq!(numbers, vec![0, 1, 2]);
}

#[tokio::test]
async fn test_changed_image_is_fetched_again() {
    let site = FakeSite::chain(&[0, 1, 2, 3]);
    site.set_image(comic_image(&image_src(2), "page-2-redrawn"));
    let (updater, comic) = updater_with_comic(&site, &[0, 1, 2], unlimited(), fast_settings());

    let response = run(&updater, comic, UpdateMode::SinglePage).await;

    assert_eq!(response, UpdateResponse::success("Successfully fetched page 3"));
    let stored = pages(&updater, comic);
    assert_eq!(stored.len(), 3);
    assert_eq!(stored[2].url, page_url(2));
    assert_eq!(stored[2].image.hash, digest("page-2-redrawn"));
}

#[tokio::test]
async fn test_unverifiable_pages_exhaust_retries() {
    let site = FakeSite::chain(&[]);
    let (updater, comic) =
        updater_with_comic(&site, &[0, 1, 2, 3, 4], unlimited(), fast_settings());

    let response = run(&updater, comic, UpdateMode::SinglePage).await;

    assert_eq!(
        response,
        UpdateResponse::error("Unable to verify the last stored page")
    );
    // One attempt plus three fallbacks, each deleting a missing page
    assert_eq!(page_urls(&updater, comic), vec![page_url(0)]);
}

#[tokio::test]
async fn test_timeout_while_verifying_aborts_run() {
    let site = FakeSite::chain(&[0, 1, 2, 3]);
    site.fail(&page_url(2), FetchError::Timeout);
    let (updater, comic) = updater_with_comic(&site, &[0, 1, 2], unlimited(), fast_settings());

    let response = run(&updater, comic, UpdateMode::SinglePage).await;

    assert_eq!(response, UpdateResponse::Timeout);
    assert_eq!(
        page_urls(&updater, comic),
        vec![page_url(0), page_url(1), page_url(2)]
    );
}

#[tokio::test]
async fn test_server_error_while_verifying_keeps_page() {
    // Page 2 is temporarily broken; the run falls back to page 1
    let site = FakeSite::chain(&[0, 1, 2, 3]);
    site.fail(&page_url(2), FetchError::Http { status_code: 500 });
    let (updater, comic) = updater_with_comic(&site, &[0, 1, 2], unlimited(), fast_settings());
    let mut events = updater.subscribe();

    let response = run(&updater, comic, UpdateMode::SinglePage).await;

    assert_eq!(response, UpdateResponse::success("No new page found"));
    assert_eq!(
        page_urls(&updater, comic),
        vec![page_url(0), page_url(1), page_url(2)]
    );
    assert!(drain(&mut events)
        .await
        .iter()
        .any(|e| e.progress.as_deref() == Some("Failed to verify page (Attempt #1)")));
}

#[tokio::test]
async fn test_timeout_while_probing_candidates_aborts_run() {
    let site = FakeSite::chain(&[0, 1, 2, 3]);
    site.fail(&page_url(3), FetchError::Timeout);
    let (updater, comic) = updater_with_comic(&site, &[0, 1, 2], unlimited(), fast_settings());

    let response = run(&updater, comic, UpdateMode::SinglePage).await;

    assert_eq!(response, UpdateResponse::Timeout);
    assert_eq!(pages(&updater, comic).len(), 3);
}

#[tokio::test]
async fn test_panicking_run_is_reported_as_error() {
    let site = FakeSite::chain(&[0, 1, 2, 3]);
    site.panic_on(&page_url(2));
    let (updater, comic) = updater_with_comic(&site, &[0, 1, 2], unlimited(), fast_settings());

    let response = run(&updater, comic, UpdateMode::SinglePage).await;

    assert_eq!(response, UpdateResponse::error("Update task panicked"));
    assert!(!updater.is_running(comic));
    assert!(updater.running().is_empty());
    assert_eq!(pages(&updater, comic).len(), 3);
}

#[tokio::test]
async fn test_duplicate_image_is_not_stored() {
    // Page 3 reposts the image of page 2
    let site = FakeSite::chain(&[0, 1, 2, 3]);
    site.set_page_image(3, &image_src(2));
    let (updater, comic) = updater_with_comic(&site, &[0, 1, 2], unlimited(), fast_settings());

    let response = run(&updater, comic, UpdateMode::SinglePage).await;

    assert_eq!(response, UpdateResponse::success("Unable to find suitable image"));
    assert_eq!(pages(&updater, comic).len(), 3);
}

#[tokio::test]
async fn test_multiple_pages_from_scratch() {
    let site = FakeSite::chain(&[0, 1, 2]);
    let (updater, comic) = updater_with_comic(&site, &[], unlimited(), fast_settings());

    let response = run(&updater, comic, UpdateMode::MultiplePages).await;

    assert_eq!(response, UpdateResponse::success("Fetched 3 new pages"));
    assert_eq!(
        page_urls(&updater, comic),
        vec![page_url(0), page_url(1), page_url(2)]
    );

    let response = run(&updater, comic, UpdateMode::MultiplePages).await;
    assert_eq!(response, UpdateResponse::success("No new pages found"));
    assert_eq!(pages(&updater, comic).len(), 3);
}

#[tokio::test]
async fn test_multiple_pages_picks_up_appended_pages() {
    let site = FakeSite::chain(&[0, 1, 2]);
    let (updater, comic) = updater_with_comic(&site, &[0, 1, 2], unlimited(), fast_settings());

    site.set_chain(&[0, 1, 2, 3, 4]);
    let response = run(&updater, comic, UpdateMode::MultiplePages).await;

    assert_eq!(response, UpdateResponse::success("Fetched 2 new pages"));
    assert_eq!(pages(&updater, comic).len(), 5);

    let comic = updater.store().lock().unwrap().get_comic(comic).unwrap();
    assert!(comic.updated_at.is_some());
}

#[tokio::test]
async fn test_page_limit_counts_unread_pages() {
    let site = FakeSite::chain(&[0, 1, 2, 3, 4, 5]);
    let policy = UpdatePolicy {
        page_limit: 2,
        ..unlimited()
    };
    let (updater, comic) = updater_with_comic(&site, &[], policy, fast_settings());

    let response = run(&updater, comic, UpdateMode::MultiplePages).await;
    assert_eq!(response, UpdateResponse::success("Fetched 2 new pages"));

    // Limit reached: no network traffic at all
    let requests = site.requests();
    let response = run(&updater, comic, UpdateMode::MultiplePages).await;
    assert_eq!(response, UpdateResponse::success("New page limit reached"));
    assert_eq!(site.requests(), requests);
    assert_eq!(pages(&updater, comic).len(), 2);

    // Reading the pages makes room for more
    {
        let mut store = updater.store().lock().unwrap();
        for page in store.get_pages(comic).unwrap() {
            store.mark_page_accessed(page.id, Utc::now()).unwrap();
        }
    }
    let response = run(&updater, comic, UpdateMode::MultiplePages).await;
    assert_eq!(response, UpdateResponse::success("Fetched 2 new pages"));
    assert_eq!(pages(&updater, comic).len(), 4);
}

#[tokio::test]
async fn test_stop_mid_multiple_pages_keeps_stored_pages() {
    let site = FakeSite::chain(&[0, 1, 2, 3, 4, 5]);
    let settings = comic_updater::config::UpdaterConfig {
        page_delay_ms: 60_000,
        ..fast_settings()
    };
    let (updater, comic) = updater_with_comic(&site, &[0], unlimited(), settings);
    let mut events = updater.subscribe();

    let handle = updater.start(comic, UpdateMode::MultiplePages).unwrap();
    assert!(updater.is_running(comic));
    assert!(updater.start(comic, UpdateMode::SinglePage).is_none());

    // Wait for the first page, then stop during the page delay
    loop {
        let event = events.recv().await.unwrap();
        if event.response == Some(UpdateResponse::success("Fetching new pages (1)")) {
            break;
        }
    }
    assert!(updater.stop(comic));

    let response = handle.await.unwrap();
    assert_eq!(response, UpdateResponse::Canceled);
    assert!(!updater.is_running(comic));
    assert_eq!(page_urls(&updater, comic), vec![page_url(0), page_url(1)]);

    let last = drain(&mut events).await.pop().unwrap();
    assert_eq!(last.phase, UpdatePhase::Canceled);
    assert_eq!(last.response, Some(UpdateResponse::Canceled));

    // A stopped multi-page run still counts as an update
    let comic = updater.store().lock().unwrap().get_comic(comic).unwrap();
    assert!(comic.updated_at.is_some());
}

#[tokio::test]
async fn test_stop_without_run() {
    let site = FakeSite::chain(&[0]);
    let (updater, comic) = updater_with_comic(&site, &[], unlimited(), fast_settings());

    assert!(!updater.stop(comic));
    assert!(updater.running().is_empty());
}

#[tokio::test]
async fn test_events_follow_phases() {
    let site = FakeSite::chain(&[0, 1, 2]);
    let (updater, comic) = updater_with_comic(&site, &[0, 1], unlimited(), fast_settings());
    let mut events = updater.subscribe();

    run(&updater, comic, UpdateMode::SinglePage).await;
    let seen = drain(&mut events).await;

    let mut phases: Vec<UpdatePhase> = seen.iter().map(|e| e.phase).collect();
    phases.dedup();
    assert_eq!(
        phases,
        vec![
            UpdatePhase::Verifying,
            UpdatePhase::LocatingNextPage,
            UpdatePhase::VerifyingBackLink,
            UpdatePhase::FetchingImage,
            UpdatePhase::Persisting,
            UpdatePhase::Done,
        ]
    );

    assert!(seen
        .iter()
        .any(|e| e.progress.as_deref() == Some("Fetching page 2…")));
    assert!(seen.iter().all(|e| e.comic_id == comic));
    assert_eq!(
        seen.last().unwrap().response,
        Some(UpdateResponse::success("Successfully fetched page 3"))
    );
}

#[tokio::test]
async fn test_check_due_starts_due_comics() {
    let site = FakeSite::chain(&[0, 1]);
    let policy = UpdatePolicy {
        interval_secs: 3600,
        ..unlimited()
    };
    let (updater, comic) = updater_with_comic(&site, &[], policy, fast_settings());

    let manual = updater
        .store()
        .lock()
        .unwrap()
        .create_comic(
            &page_url(0),
            UpdatePolicy {
                enabled: false,
                ..policy
            },
        )
        .unwrap();

    let started = check_due(&updater, Utc::now() + Duration::hours(2)).unwrap();
    let ids: Vec<i64> = started.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, vec![comic]);
    assert!(!ids.contains(&manual.id));

    for (_, handle) in started {
        let response = handle.await.unwrap();
        assert_eq!(response, UpdateResponse::success("Fetched 2 new pages"));
    }

    // Just updated: not due again before the interval elapses
    let started = check_due(&updater, Utc::now() + Duration::minutes(30)).unwrap();
    assert!(started.is_empty());
}
