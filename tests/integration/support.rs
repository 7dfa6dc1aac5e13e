//! Shared fixtures: an in-memory comic site and a store seeded from it

use async_trait::async_trait;
use comic_updater::config::UpdaterConfig;
use comic_updater::storage::{PageRecord, PageStore, SqliteStorage, UpdatePolicy};
use comic_updater::updater::{Updater, WebSource};
use comic_updater::{FetchError, Link, WebImage, WebpageModel};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const SITE: &str = "https://comic.example";
pub const BANNER_SRC: &str = "https://cdn.other-host.net/assets/banner.png";

pub fn page_url(n: u32) -> String {
    format!("{}/page/{}", SITE, n)
}

pub fn image_src(n: u32) -> String {
    format!("{}/img/{}.png", SITE, n)
}

pub fn digest(label: &str) -> String {
    hex::encode(Sha256::digest(label.as_bytes()))
}

/// Full-size page image whose content is identified by `label`
pub fn comic_image(src: &str, label: &str) -> WebImage {
    WebImage {
        src: src.to_string(),
        mime: "image/png".to_string(),
        width: 800,
        height: 1200,
        hash: digest(label),
        bytes: label.as_bytes().to_vec(),
    }
}

fn banner() -> WebImage {
    WebImage {
        src: BANNER_SRC.to_string(),
        mime: "image/png".to_string(),
        width: 468,
        height: 60,
        hash: digest("banner"),
        bytes: Vec::new(),
    }
}

fn link(href: &str, rel: Option<&str>, text: &str) -> Link {
    Link {
        href: href.to_string(),
        classes: None,
        rel: rel.map(str::to_string),
        text_content: Some(text.to_string()),
    }
}

/// An append-only comic site served from memory
///
/// Unknown URLs answer 404. Individual page URLs can be made to fail with
/// any fetch error, or to panic.
#[derive(Default)]
pub struct FakeSite {
    pages: Mutex<HashMap<String, WebpageModel>>,
    images: Mutex<HashMap<String, WebImage>>,
    faults: Mutex<HashMap<String, FetchError>>,
    panics: Mutex<HashSet<String>>,
    requests: AtomicUsize,
}

impl FakeSite {
    /// Site whose pages `ids` link to each other in the given order
    pub fn chain(ids: &[u32]) -> Arc<Self> {
        let site = Arc::new(Self::default());
        site.set_chain(ids);
        site
    }

    /// Rebuilds the pages so that `ids` form the prev/next chain
    pub fn set_chain(&self, ids: &[u32]) {
        let mut pages = self.pages.lock().unwrap();
        let mut images = self.images.lock().unwrap();
        pages.clear();

        images.insert(BANNER_SRC.to_string(), banner());

        for (i, id) in ids.iter().enumerate() {
            let mut links = vec![link(&format!("{}/home", SITE), None, "Home")];
            if i > 0 {
                links.push(link(&page_url(ids[i - 1]), Some("prev"), "Prev"));
            }
            if let Some(next) = ids.get(i + 1) {
                links.push(link(&page_url(*next), Some("next"), "Next"));
            }
            links.push(link(&format!("{}/about", SITE), None, "About"));

            pages.insert(
                page_url(*id),
                WebpageModel {
                    url: page_url(*id),
                    links,
                    images: vec![BANNER_SRC.to_string(), image_src(*id)],
                    inline_frames: vec![],
                },
            );

            images
                .entry(image_src(*id))
                .or_insert_with(|| comic_image(&image_src(*id), &format!("page-{}", id)));
        }
    }

    /// Replaces the image served at `src`
    pub fn set_image(&self, image: WebImage) {
        self.images.lock().unwrap().insert(image.src.clone(), image);
    }

    /// Makes page `id` show the image at `src`
    pub fn set_page_image(&self, id: u32, src: &str) {
        let mut pages = self.pages.lock().unwrap();
        if let Some(page) = pages.get_mut(&page_url(id)) {
            page.images = vec![BANNER_SRC.to_string(), src.to_string()];
        }
    }

    /// Makes every fetch of the page at `url` fail with `error`
    pub fn fail(&self, url: &str, error: FetchError) {
        self.faults.lock().unwrap().insert(url.to_string(), error);
    }

    /// Makes every fetch of the page at `url` panic
    pub fn panic_on(&self, url: &str) {
        self.panics.lock().unwrap().insert(url.to_string());
    }

    /// Number of fetches served so far
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebSource for FakeSite {
    async fn fetch_webpage(&self, url: &str) -> Result<WebpageModel, FetchError> {
        self.requests.fetch_add(1, Ordering::SeqCst);

        let panics = self.panics.lock().unwrap().contains(url);
        if panics {
            panic!("fetch of {} blew up", url);
        }
        if let Some(error) = self.faults.lock().unwrap().get(url).cloned() {
            return Err(error);
        }

        self.pages
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or(FetchError::Http { status_code: 404 })
    }

    async fn fetch_images(&self, urls: &[String]) -> Result<Vec<WebImage>, FetchError> {
        self.requests.fetch_add(urls.len(), Ordering::SeqCst);
        let images = self.images.lock().unwrap();
        Ok(urls.iter().filter_map(|url| images.get(url).cloned()).collect())
    }
}

/// Discovery settings without throttling
pub fn fast_settings() -> UpdaterConfig {
    UpdaterConfig {
        probe_delay_ms: 0,
        page_delay_ms: 0,
        max_retries: 3,
        cluster_threshold: 0.62,
        link_threshold: 0.9,
        auto_check_interval_secs: 1,
    }
}

/// An updater over `site` with one comic whose pages `stored` are already
/// saved, in order, with the images the site serves for them
pub fn updater_with_comic(
    site: &Arc<FakeSite>,
    stored: &[u32],
    policy: UpdatePolicy,
    settings: UpdaterConfig,
) -> (Updater, i64) {
    let mut store = SqliteStorage::open_in_memory().unwrap();
    let comic = store.create_comic(&page_url(0), policy).unwrap();

    for id in stored {
        let image = comic_image(&image_src(*id), &format!("page-{}", id));
        store.insert_page(comic.id, &page_url(*id), &image).unwrap();
    }

    let source: Arc<dyn WebSource> = site.clone();
    let updater = Updater::new(source, Arc::new(Mutex::new(store)), settings);
    (updater, comic.id)
}

pub fn unlimited() -> UpdatePolicy {
    UpdatePolicy {
        enabled: true,
        interval_secs: 86_400,
        page_limit: -1,
    }
}

pub fn pages(updater: &Updater, comic_id: i64) -> Vec<PageRecord> {
    updater.store().lock().unwrap().get_pages(comic_id).unwrap()
}

pub fn page_urls(updater: &Updater, comic_id: i64) -> Vec<String> {
    pages(updater, comic_id).into_iter().map(|p| p.url).collect()
}
