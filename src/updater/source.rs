//! Web sources for the discovery engine
//!
//! Discovery only talks to the web through `WebSource`, so runs can be driven
//! by the real request gate or by an in-memory site in tests.

use crate::gate::{FetchError, FetchHandle, RequestGate};
use crate::webpage::{decode_data_uri, decode_image, parse_webpage, WebImage, WebpageModel};
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// Fetches webpages and images for a discovery run
#[async_trait]
pub trait WebSource: Send + Sync {
    /// Fetches and parses a webpage
    async fn fetch_webpage(&self, url: &str) -> Result<WebpageModel, FetchError>;

    /// Fetches a batch of images
    ///
    /// Images that fail to download or decode are left out. The whole batch
    /// fails only on `Timeout` or `Canceled`.
    async fn fetch_images(&self, urls: &[String]) -> Result<Vec<WebImage>, FetchError>;
}

/// `WebSource` backed by the request gate
///
/// Every call runs under its own token. If the call's future is dropped
/// mid-flight (the run was stopped), the token is canceled and its fetches
/// aborted.
#[derive(Debug, Clone)]
pub struct HttpSource {
    gate: Arc<RequestGate>,
}

/// An image in a batch, in request order
enum PendingImage {
    Inline(Option<WebImage>),
    Remote(FetchHandle),
}

impl HttpSource {
    pub fn new(gate: Arc<RequestGate>) -> Self {
        Self { gate }
    }

    pub fn gate(&self) -> &Arc<RequestGate> {
        &self.gate
    }

    fn new_token() -> String {
        Uuid::new_v4().to_string()
    }
}

#[async_trait]
impl WebSource for HttpSource {
    async fn fetch_webpage(&self, url: &str) -> Result<WebpageModel, FetchError> {
        let token = Self::new_token();
        let guard = self.gate.scope(&token)?;

        let response = guard.push(url)?.response().await;
        let response = match response {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("Error fetching webpage {}: {}", url, e);
                return Err(e);
            }
        };
        guard.finish()?;

        Ok(parse_webpage(&response.text(), &response.final_url))
    }

    async fn fetch_images(&self, urls: &[String]) -> Result<Vec<WebImage>, FetchError> {
        let token = Self::new_token();
        let guard = self.gate.scope(&token)?;

        let mut pending = Vec::with_capacity(urls.len());
        for url in urls {
            if url.starts_with("data:") {
                let image = decode_data_uri(url).and_then(|bytes| decode_image(url, bytes));
                pending.push(PendingImage::Inline(image));
            } else {
                pending.push(PendingImage::Remote(guard.push(url)?));
            }
        }

        let mut images = Vec::with_capacity(pending.len());
        for item in pending {
            let image = match item {
                PendingImage::Inline(image) => image,
                PendingImage::Remote(handle) => {
                    let src = handle.url().to_string();
                    match handle.response().await {
                        Ok(response) => decode_image(&src, response.body),
                        Err(e) if e.is_terminal() => return Err(e),
                        Err(e) => {
                            tracing::debug!("Error fetching image {}: {}", src, e);
                            None
                        }
                    }
                }
            };

            images.extend(image);
        }

        guard.finish()?;
        Ok(images)
    }
}
