//! Next-page discovery steps
//!
//! This module contains the building blocks shared by single-page and
//! multi-page runs:
//! - Verifying the last stored page (deleting broken pages, falling back)
//! - Locating the next page through link similarity and back-link checks
//! - Picking the next image while skipping images already stored

use crate::config::UpdaterConfig;
use crate::gate::FetchError;
use crate::similarity::{best_match_index, filter_by_similarity, sorted_cluster};
use crate::storage::{PageRecord, PageStore, SqliteStorage, StorageError, StorageResult};
use crate::updater::source::WebSource;
use crate::updater::{UpdateEvent, UpdateMode, UpdatePhase, UpdateResponse};
use crate::webpage::{Link, WebImage, WebpageModel};
use crate::UpdaterError;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Why a run stopped before finishing its current step
#[derive(Debug)]
pub enum Stop {
    /// The run ends with this response
    Respond(UpdateResponse),

    /// Something outside the web failed (storage, illegal transition)
    Fault(UpdaterError),
}

impl From<UpdaterError> for Stop {
    fn from(error: UpdaterError) -> Self {
        Stop::Fault(error)
    }
}

impl From<StorageError> for Stop {
    fn from(error: StorageError) -> Self {
        Stop::Fault(error.into())
    }
}

impl Stop {
    /// Stop reporting a fetch failure verbatim
    fn fetch(error: &FetchError) -> Self {
        Stop::Respond(UpdateResponse::from_fetch_error(error))
    }
}

/// Result of a discovery step
pub type Step<T> = std::result::Result<T, Stop>;

/// Where a run starts from
#[derive(Debug, Clone)]
pub enum StartingPoint {
    /// The last stored page that is still valid
    Page {
        page: PageRecord,
        webpage: WebpageModel,
    },

    /// No stored page survived; the comic's own URL
    Root { webpage: WebpageModel },
}

/// State of one update run
pub struct Discovery {
    comic_id: i64,
    mode: UpdateMode,
    phase: UpdatePhase,
    source: Arc<dyn WebSource>,
    store: Arc<Mutex<SqliteStorage>>,
    settings: UpdaterConfig,
    events: broadcast::Sender<UpdateEvent>,
}

impl Discovery {
    pub fn new(
        comic_id: i64,
        mode: UpdateMode,
        source: Arc<dyn WebSource>,
        store: Arc<Mutex<SqliteStorage>>,
        settings: UpdaterConfig,
        events: broadcast::Sender<UpdateEvent>,
    ) -> Self {
        Self {
            comic_id,
            mode,
            phase: UpdatePhase::Idle,
            source,
            store,
            settings,
            events,
        }
    }

    pub fn comic_id(&self) -> i64 {
        self.comic_id
    }

    pub fn mode(&self) -> UpdateMode {
        self.mode
    }

    pub fn phase(&self) -> UpdatePhase {
        self.phase
    }

    pub fn settings(&self) -> &UpdaterConfig {
        &self.settings
    }

    // ===== Reporting =====

    /// Moves to `next` and reports it
    pub fn enter(&mut self, next: UpdatePhase, progress: Option<String>) -> Step<()> {
        if !self.phase.can_transition_to(next) {
            return Err(UpdaterError::InvalidTransition {
                from: self.phase,
                to: next,
            }
            .into());
        }

        self.phase = next;
        self.emit(progress, None);
        Ok(())
    }

    /// Reports progress within the current phase
    pub fn progress(&self, message: impl Into<String>) {
        self.emit(Some(message.into()), None);
    }

    /// Reports an intermediate response within the current phase
    pub fn report(&self, response: UpdateResponse) {
        self.emit(None, Some(response));
    }

    /// Moves to the terminal phase matching `response` and reports it
    pub fn finish(&mut self, response: &UpdateResponse) {
        let terminal = UpdatePhase::for_response(response);
        if self.phase.can_transition_to(terminal) {
            self.phase = terminal;
        }
        self.emit(None, Some(response.clone()));
    }

    fn emit(&self, progress: Option<String>, response: Option<UpdateResponse>) {
        if let Some(message) = &progress {
            tracing::trace!("Comic {} [{}] {}", self.comic_id, self.phase, message);
        }

        // Nobody listening is fine
        let _ = self.events.send(UpdateEvent {
            comic_id: self.comic_id,
            mode: self.mode,
            phase: self.phase,
            progress,
            response,
        });
    }

    // ===== Store access =====

    /// Runs `f` against the store without holding the lock across a suspension
    pub fn with_store<T>(
        &self,
        f: impl FnOnce(&mut SqliteStorage) -> StorageResult<T>,
    ) -> Step<T> {
        let mut store = self.store.lock().map_err(|_| UpdaterError::LockPoisoned)?;
        Ok(f(&mut *store)?)
    }

    // ===== Verification =====

    /// Finds the last stored page that still exists and still shows its image
    ///
    /// Broken pages are deleted and verification falls back to the page
    /// before. Pages that fail with a non-404 error are kept but skipped.
    /// After `max_retries` fallbacks the run fails.
    pub async fn locate_valid_starting_page(&mut self) -> Step<StartingPoint> {
        let comic_id = self.comic_id;
        let comic = self.with_store(|s| s.get_comic(comic_id))?;
        let pages = self.with_store(|s| s.get_pages(comic_id))?;
        let mut page = pages.last().cloned();

        let progress = match &page {
            Some(page) => format!("Fetching page {}…", page.number + 1),
            None => "Fetching page…".to_string(),
        };
        self.enter(UpdatePhase::Verifying, Some(progress))?;

        for attempt in 1..=self.settings.max_retries + 1 {
            let url = page.as_ref().map_or(comic.url.as_str(), |p| p.url.as_str());

            match self.source.fetch_webpage(url).await {
                Ok(webpage) => {
                    let Some(current) = page.take() else {
                        return Ok(StartingPoint::Root { webpage });
                    };

                    if self.is_image_unchanged(&current, &webpage).await? {
                        return Ok(StartingPoint::Page {
                            page: current,
                            webpage,
                        });
                    }

                    tracing::warn!(
                        "Image of page {} changed or vanished, deleting {}",
                        current.number + 1,
                        current.url
                    );
                    self.with_store(|s| s.delete_page(current.id))?;
                    page = Some(current);
                }
                Err(e) if e.is_terminal() => return Err(Stop::fetch(&e)),
                Err(e) => {
                    let Some(current) = page.as_ref() else {
                        return Err(Stop::fetch(&e));
                    };

                    if e.is_not_found() {
                        tracing::warn!(
                            "Page {} is gone, deleting {}",
                            current.number + 1,
                            current.url
                        );
                        let page_id = current.id;
                        self.with_store(|s| s.delete_page(page_id))?;
                    } else {
                        tracing::debug!("Failed to fetch page {}: {}", current.number + 1, e);
                    }
                }
            }

            self.progress(format!("Failed to verify page (Attempt #{})", attempt));

            let number = page.as_ref().map_or(0, |p| p.number);
            page = self.stored_page(number - 1)?;
        }

        Err(Stop::Respond(UpdateResponse::error(
            "Unable to verify the last stored page",
        )))
    }

    /// Returns true if the stored image of `page` is still on `webpage`
    /// with the same content
    async fn is_image_unchanged(
        &self,
        page: &PageRecord,
        webpage: &WebpageModel,
    ) -> Step<bool> {
        let page_id = page.id;
        let info = self.with_store(|s| s.get_image_info(page_id))?;

        if !webpage.has_image(&info.src) {
            return Ok(false);
        }

        self.progress(format!("Verifying image of page {}…", page.number + 1));

        match self.source.fetch_images(&[info.src.clone()]).await {
            Ok(images) => Ok(images.first().is_some_and(|image| image.hash == info.hash)),
            Err(e) if e.is_terminal() => Err(Stop::fetch(&e)),
            Err(_) => Ok(false),
        }
    }

    /// Stored page with the given number, if any
    fn stored_page(&self, number: i64) -> Step<Option<PageRecord>> {
        if number < 0 {
            return Ok(None);
        }

        let comic_id = self.comic_id;
        let pages = self.with_store(|s| s.get_pages(comic_id))?;
        Ok(pages.into_iter().find(|p| p.number == number))
    }

    /// Fetches the webpage of the page stored before `page`
    ///
    /// `None` for the first page or when the fetch fails.
    pub async fn fetch_previous_webpage(&self, page: &PageRecord) -> Step<Option<WebpageModel>> {
        let Some(previous) = self.stored_page(page.number - 1)? else {
            return Ok(None);
        };

        match self.source.fetch_webpage(&previous.url).await {
            Ok(webpage) => Ok(Some(webpage)),
            Err(e) if e.is_terminal() => Err(Stop::fetch(&e)),
            Err(e) => {
                tracing::debug!("Previous page {} unavailable: {}", previous.url, e);
                Ok(None)
            }
        }
    }

    // ===== Next webpage =====

    /// Candidate URLs for the page after `current`, most promising first
    pub fn candidate_urls(
        &self,
        current: &WebpageModel,
        previous: Option<&WebpageModel>,
    ) -> Vec<String> {
        let threshold = self.settings.cluster_threshold;
        let link_threshold = self.settings.link_threshold;
        let next_link =
            previous.and_then(|prev| find_next_link(&current.url, prev, link_threshold));

        let urls = match next_link {
            Some(next_link) => {
                // Rank the current page's links by how much they look like
                // the link that led here
                let by_markup: HashMap<String, &str> = current
                    .links
                    .iter()
                    .map(|link| (link.to_markup(), link.href.as_str()))
                    .collect();
                let markups: Vec<String> = current.links.iter().map(Link::to_markup).collect();

                sorted_cluster(&next_link.to_markup(), &markups, threshold)
                    .into_iter()
                    .filter_map(|markup| by_markup.get(&markup).map(|href| href.to_string()))
                    .collect()
            }
            None => sorted_cluster(&current.url, &current.link_hrefs(), threshold),
        };

        let mut seen = HashSet::new();
        urls.into_iter().filter(|url| seen.insert(url.clone())).collect()
    }

    /// Finds the page after `current`
    ///
    /// A candidate is accepted when it is not stored yet and links back to
    /// `current`. `None` when every candidate is exhausted.
    pub async fn fetch_next_webpage(
        &mut self,
        current: &WebpageModel,
        previous: Option<&WebpageModel>,
    ) -> Step<Option<WebpageModel>> {
        let candidates = self.candidate_urls(current, previous);
        tracing::debug!(
            "Comic {}: {} candidate(s) after {}",
            self.comic_id,
            candidates.len(),
            current.url
        );

        for (i, url) in candidates.iter().enumerate() {
            self.enter(
                UpdatePhase::LocatingNextPage,
                Some(format!("Locating next page (#{})", i + 1)),
            )?;

            tokio::time::sleep(self.settings.probe_delay()).await;

            let next = match self.source.fetch_webpage(url).await {
                Ok(next) => next,
                Err(e) if e.is_terminal() => return Err(Stop::fetch(&e)),
                Err(e) => {
                    tracing::debug!("Candidate {} failed: {}", url, e);
                    continue;
                }
            };

            let comic_id = self.comic_id;
            let next_url = next.url.clone();
            if self.with_store(|s| s.is_page_in_use(comic_id, &next_url))? {
                tracing::trace!("Candidate {} already stored", next.url);
                continue;
            }

            self.enter(UpdatePhase::VerifyingBackLink, None)?;

            let back_link = sorted_cluster(
                &current.url,
                &next.link_hrefs(),
                self.settings.cluster_threshold,
            )
            .into_iter()
            .next();

            let Some(back_link) = back_link else {
                tracing::trace!("Candidate {} has no link back", next.url);
                continue;
            };

            match self.source.fetch_webpage(&back_link).await {
                Ok(back) if back.url == current.url => {
                    tracing::debug!("Accepted {} as next page", next.url);
                    return Ok(Some(next));
                }
                Ok(back) => {
                    tracing::trace!("Candidate {} points back to {}", next.url, back.url);
                }
                Err(e) if e.is_terminal() => return Err(Stop::fetch(&e)),
                Err(e) => {
                    tracing::debug!("Back link {} failed: {}", back_link, e);
                }
            }
        }

        Ok(None)
    }

    // ===== Next image =====

    /// Picks the image of `webpage` to store
    ///
    /// Without a previous page every image is a candidate, largest first.
    /// Otherwise candidates are the images whose source resembles the
    /// previous page's image. The first image not stored yet wins.
    pub async fn fetch_next_image(
        &mut self,
        webpage: &WebpageModel,
        previous_page: Option<&PageRecord>,
    ) -> Step<Option<WebImage>> {
        self.enter(UpdatePhase::FetchingImage, None)?;

        let urls = match previous_page {
            None => webpage.images.clone(),
            Some(page) => {
                let page_id = page.id;
                let info = self.with_store(|s| s.get_image_info(page_id))?;
                sorted_cluster(&info.src, &webpage.images, self.settings.cluster_threshold)
            }
        };

        let mut seen = HashSet::new();
        let urls: Vec<String> = urls.into_iter().filter(|url| seen.insert(url.clone())).collect();

        self.progress(format!("Fetching images ({})", urls.len()));
        if urls.is_empty() {
            return Ok(None);
        }

        let mut images = match self.source.fetch_images(&urls).await {
            Ok(images) => images,
            Err(e) if e.is_terminal() => return Err(Stop::fetch(&e)),
            Err(e) => {
                tracing::debug!("Image batch failed: {}", e);
                return Ok(None);
            }
        };

        if previous_page.is_none() {
            images.sort_by(|a, b| b.area().cmp(&a.area()));
        }

        let comic_id = self.comic_id;
        for image in images {
            let hash = image.hash.clone();
            if !self.with_store(|s| s.is_image_in_use(comic_id, &hash))? {
                return Ok(Some(image));
            }
            tracing::trace!("Image {} already stored", image.src);
        }

        Ok(None)
    }

    // ===== Persisting =====

    /// Appends the discovered page and stamps the comic as updated
    pub fn persist(&mut self, url: &str, image: &WebImage) -> Step<PageRecord> {
        self.enter(UpdatePhase::Persisting, None)?;

        let comic_id = self.comic_id;
        let page = self.with_store(|s| {
            let page = s.insert_page(comic_id, url, image)?;
            s.update_comic_updated(comic_id, Utc::now())?;
            Ok(page)
        })?;

        tracing::info!("Comic {}: stored page {} ({})", comic_id, page.number + 1, url);
        Ok(page)
    }
}

/// Finds the link on `previous` that most likely led to `search_url`
///
/// Among links whose href has similarity >= `threshold` to `search_url`, the
/// best scoring ones are kept and the one with the longest markup wins (first
/// on ties). Without any such link, the link with the closest href is used.
pub fn find_next_link<'a>(
    search_url: &str,
    previous: &'a WebpageModel,
    threshold: f64,
) -> Option<&'a Link> {
    let hrefs = previous.link_hrefs();
    let matches = filter_by_similarity(search_url, &hrefs, threshold);

    let max_similarity = matches
        .iter()
        .map(|m| m.similarity)
        .fold(f64::NEG_INFINITY, f64::max);

    let mut longest: Option<(&Link, usize)> = None;
    for m in matches.iter().filter(|m| m.similarity >= max_similarity) {
        let link = &previous.links[m.index];
        let length = link.to_markup().chars().count();

        if longest.map_or(true, |(_, best)| length > best) {
            longest = Some((link, length));
        }
    }

    longest
        .map(|(link, _)| link)
        .or_else(|| best_match_index(search_url, &hrefs).map(|index| &previous.links[index]))
}
