//! HTML parser for building webpage models
//!
//! Walks the document once, in tree order, collecting:
//! - `<a href>` links with class, rel and serialized child content
//! - `<img src>` sources
//! - `<iframe src>` sources

use crate::url::{normalize_or_keep, normalize_url, resolve_url};
use crate::webpage::{Link, WebpageModel};
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Parses HTML content into a webpage model
///
/// # Extraction Rules
///
/// - Anchors without `href` are skipped
/// - Anchor hrefs are resolved against `base_url`, then normalized; anchors
///   that do not resolve to an HTTP(S) URL (`mailto:`, `javascript:`, ...)
///   are skipped
/// - Image and frame sources are resolved but not normalized; only the first
///   `src` of an element counts
/// - Output order matches document order
///
/// # Arguments
///
/// * `html` - The HTML content to parse
/// * `base_url` - The final URL the content was fetched from
///
/// # Example
///
/// ```
/// use comic_updater::webpage::parse_webpage;
/// use url::Url;
///
/// let html = r#"<a href="/2" rel="next">Next</a><img src="1.png">"#;
/// let base_url = Url::parse("https://example.com/comic/1").unwrap();
/// let page = parse_webpage(html, &base_url);
/// assert_eq!(page.links[0].href, "https://example.com/2");
/// assert_eq!(page.images[0], "https://example.com/comic/1.png");
/// ```
pub fn parse_webpage(html: &str, base_url: &Url) -> WebpageModel {
    let document = Html::parse_document(html);

    let mut links = Vec::new();
    let mut images = Vec::new();
    let mut inline_frames = Vec::new();

    if let Ok(selector) = Selector::parse("a, img, iframe") {
        for element in document.select(&selector) {
            match element.value().name() {
                "a" => {
                    if let Some(link) = extract_link(&element, base_url) {
                        links.push(link);
                    }
                }
                "img" => {
                    if let Some(src) = extract_source(&element, base_url) {
                        images.push(src);
                    }
                }
                "iframe" => {
                    if let Some(src) = extract_source(&element, base_url) {
                        inline_frames.push(src);
                    }
                }
                _ => {}
            }
        }
    }

    tracing::trace!(
        "Parsed {}: {} links, {} images, {} frames",
        base_url,
        links.len(),
        images.len(),
        inline_frames.len()
    );

    WebpageModel {
        url: normalize_or_keep(base_url.as_str()),
        links,
        images,
        inline_frames,
    }
}

/// Builds a link from an anchor element
fn extract_link(element: &ElementRef<'_>, base_url: &Url) -> Option<Link> {
    let attributes = element.value();
    let href = attributes.attr("href")?;

    let resolved = resolve_url(href, base_url)?;
    let normalized = normalize_url(resolved.as_str()).ok()?;

    let content = element.inner_html();
    let text_content = if content.trim().is_empty() {
        None
    } else {
        Some(content)
    };

    Some(Link {
        href: normalized.to_string(),
        classes: attributes.attr("class").map(str::to_string),
        rel: attributes.attr("rel").map(str::to_string),
        text_content,
    })
}

/// Resolves the `src` attribute of an image or frame
fn extract_source(element: &ElementRef<'_>, base_url: &Url) -> Option<String> {
    let src = element.value().attr("src")?;
    resolve_url(src, base_url).map(String::from)
}
