//! Single-page and multi-page update runs

use crate::storage::PageStore;
use crate::updater::discovery::{Discovery, StartingPoint, Step, Stop};
use crate::updater::{UpdateMode, UpdateResponse};
use tokio::sync::watch;

/// Drives a run to completion or until `stop` is signaled
///
/// A stop drops the in-flight step, which aborts its fetches. Pages already
/// persisted stay; a page is never half written because persisting does not
/// suspend.
pub async fn execute(discovery: &mut Discovery, mut stop: watch::Receiver<bool>) -> UpdateResponse {
    let comic_id = discovery.comic_id();
    let mode = discovery.mode();
    tracing::info!("Comic {}: starting {} update", comic_id, mode);

    let outcome = tokio::select! {
        outcome = drive(discovery) => Some(outcome),
        _ = stopped(&mut stop) => None,
    };

    let response = match outcome {
        None => UpdateResponse::Canceled,
        Some(Ok(response)) => response,
        Some(Err(Stop::Respond(response))) => response,
        Some(Err(Stop::Fault(e))) => {
            tracing::error!("Comic {}: update failed: {}", comic_id, e);
            UpdateResponse::error(e.to_string())
        }
    };

    tracing::info!("Comic {}: {} update finished: {}", comic_id, mode, response);
    response
}

async fn drive(discovery: &mut Discovery) -> Step<UpdateResponse> {
    match discovery.mode() {
        UpdateMode::SinglePage => update_single_page(discovery).await,
        UpdateMode::MultiplePages => update_multiple_pages(discovery).await,
    }
}

/// Resolves once the stop flag is raised
///
/// A dropped sender means nobody can stop the run any more.
async fn stopped(stop: &mut watch::Receiver<bool>) {
    while !*stop.borrow_and_update() {
        if stop.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Fetches at most one new page
pub async fn update_single_page(discovery: &mut Discovery) -> Step<UpdateResponse> {
    let (next, page) = match discovery.locate_valid_starting_page().await? {
        // Nothing stored: the comic's own page is the first page
        StartingPoint::Root { webpage } => (webpage, None),
        StartingPoint::Page { page, webpage } => {
            let previous = discovery.fetch_previous_webpage(&page).await?;

            match discovery.fetch_next_webpage(&webpage, previous.as_ref()).await? {
                Some(next) => (next, Some(page)),
                None => return Ok(UpdateResponse::success("No new page found")),
            }
        }
    };

    let Some(image) = discovery.fetch_next_image(&next, page.as_ref()).await? else {
        return Ok(UpdateResponse::success("Unable to find suitable image"));
    };

    let new_page = discovery.persist(&next.url, &image)?;

    Ok(UpdateResponse::success(format!(
        "Successfully fetched page {}",
        new_page.number + 1
    )))
}

/// Fetches new pages until none is found or the unread-page limit is hit
pub async fn update_multiple_pages(discovery: &mut Discovery) -> Step<UpdateResponse> {
    let comic_id = discovery.comic_id();

    if limit_reached(discovery, comic_id)? {
        return Ok(UpdateResponse::success("New page limit reached"));
    }

    let (mut current_page, mut current_webpage, mut previous_webpage) =
        match discovery.locate_valid_starting_page().await? {
            StartingPoint::Root { webpage } => (None, webpage, None),
            StartingPoint::Page { page, webpage } => {
                let previous = discovery.fetch_previous_webpage(&page).await?;
                (Some(page), webpage, previous)
            }
        };

    let mut fetched = 0usize;

    loop {
        let next = match &current_page {
            None => current_webpage.clone(),
            Some(_) => {
                let next = discovery
                    .fetch_next_webpage(&current_webpage, previous_webpage.as_ref())
                    .await?;

                match next {
                    Some(next) => next,
                    None if fetched == 0 => {
                        return Ok(UpdateResponse::success("No new pages found"))
                    }
                    None => return Ok(UpdateResponse::success(fetched_message(fetched))),
                }
            }
        };

        let Some(image) = discovery.fetch_next_image(&next, current_page.as_ref()).await? else {
            return Ok(UpdateResponse::success("Unable to find suitable image"));
        };

        let new_page = discovery.persist(&next.url, &image)?;
        fetched += 1;

        if limit_reached(discovery, comic_id)? {
            return Ok(UpdateResponse::success(fetched_message(fetched)));
        }

        discovery.report(UpdateResponse::success(format!(
            "Fetching new pages ({})",
            fetched
        )));

        // The root page has no predecessor to compare links against
        previous_webpage = current_page.is_some().then_some(current_webpage);
        current_webpage = next;
        current_page = Some(new_page);

        tokio::time::sleep(discovery.settings().page_delay()).await;
    }
}

fn limit_reached(discovery: &Discovery, comic_id: i64) -> Step<bool> {
    discovery.with_store(|s| {
        let comic = s.get_comic(comic_id)?;
        let unread = s.count_new_pages(comic_id)?;
        Ok(comic.policy.limit_reached(unread))
    })
}

fn fetched_message(fetched: usize) -> String {
    if fetched == 1 {
        "Fetched 1 new page".to_string()
    } else {
        format!("Fetched {} new pages", fetched)
    }
}
