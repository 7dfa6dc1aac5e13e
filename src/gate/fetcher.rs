//! HTTP fetch implementation for the request gate
//!
//! This module handles the single-request side of the gate:
//! - Building the shared HTTP client (timeout, user agent, redirects)
//! - Classifying responses and transport failures into `FetchError`
//! - Reading the body eagerly so the connection goes back to the pool
//! - Extracting the freshness lifetime the server granted

use crate::config::HttpConfig;
use crate::gate::FetchError;
use reqwest::header::{HeaderMap, CACHE_CONTROL, CONTENT_TYPE};
use reqwest::{redirect::Policy, Client, StatusCode};
use url::Url;

/// A successful response, fully read
#[derive(Debug, Clone)]
pub struct FetchedResponse {
    /// Final URL after redirects
    pub final_url: Url,

    /// HTTP status code
    pub status: u16,

    /// Content-Type header value
    pub content_type: Option<String>,

    /// Response body
    pub body: Vec<u8>,

    /// Cache lifetime granted by `Cache-Control: max-age` (seconds)
    pub max_age: Option<u64>,
}

impl FetchedResponse {
    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Builds the HTTP client shared by every fetch of a gate
///
/// Connections are pooled by the client and reused across tokens.
///
/// # Arguments
///
/// * `config` - The HTTP configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use comic_updater::config::HttpConfig;
/// use comic_updater::gate::build_http_client;
///
/// let client = build_http_client(&HttpConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
    let redirect = if config.follow_redirects {
        Policy::limited(10)
    } else {
        Policy::none()
    };

    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(config.timeout())
        .redirect(redirect)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Returns true if a status counts as a successful fetch
///
/// 304 and 2xx always succeed. 3xx succeeds too when redirects are not
/// followed, since the response is then the final answer.
pub fn is_response_ok(status: StatusCode, follow_redirects: bool) -> bool {
    let limit = if follow_redirects { 299 } else { 399 };
    let code = status.as_u16();

    status == StatusCode::NOT_MODIFIED || (200..=limit).contains(&code)
}

/// Fetches a URL and classifies the outcome
///
/// # Outcomes
///
/// | Condition | Result |
/// |-----------|--------|
/// | 2xx / 304 (3xx without redirects) | `Ok(FetchedResponse)` |
/// | Any other status | `FetchError::Http` |
/// | Timeout (connect, headers or body) | `FetchError::Timeout` |
/// | Anything else | `FetchError::Unknown` |
pub async fn fetch_url(
    client: &Client,
    url: &str,
    follow_redirects: bool,
) -> Result<FetchedResponse, FetchError> {
    let response = client.get(url).send().await.map_err(classify_error)?;

    let status = response.status();
    if !is_response_ok(status, follow_redirects) {
        tracing::debug!("GET {} -> {}", url, status);
        return Err(FetchError::Http {
            status_code: status.as_u16(),
        });
    }

    let final_url = response.url().clone();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let max_age = max_age(response.headers());

    let body = response.bytes().await.map_err(classify_error)?.to_vec();

    tracing::trace!("GET {} -> {} ({} bytes)", url, status, body.len());

    Ok(FetchedResponse {
        final_url,
        status: status.as_u16(),
        content_type,
        body,
        max_age,
    })
}

/// Maps a transport error onto the fetch taxonomy
fn classify_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Unknown(e.to_string())
    }
}

/// Reads `max-age` from `Cache-Control`
///
/// Returns `None` for `no-store`, a missing header, or a zero lifetime.
pub(crate) fn max_age(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get(CACHE_CONTROL)?.to_str().ok()?;

    let mut lifetime = None;
    for directive in value.split(',').map(str::trim) {
        if directive.eq_ignore_ascii_case("no-store") || directive.eq_ignore_ascii_case("no-cache")
        {
            return None;
        }

        if let Some((name, seconds)) = directive.split_once('=') {
            if name.trim().eq_ignore_ascii_case("max-age") {
                lifetime = seconds.trim().trim_matches('"').parse::<u64>().ok();
            }
        }
    }

    lifetime.filter(|seconds| *seconds > 0)
}
