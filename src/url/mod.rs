//! URL handling module for Comic-Updater
//!
//! Links, webpage addresses and stored page URLs are all compared in their
//! normalized form, so two spellings of the same address never count as
//! different pages.

mod normalize;

pub use normalize::normalize_url;

use ::url::Url;

/// Resolves a possibly relative reference against a base URL
///
/// Returns `None` for empty references and for references that cannot be
/// resolved. The result is not normalized; image and frame sources are stored
/// exactly as the site serves them.
///
/// # Examples
///
/// ```
/// use comic_updater::url::resolve_url;
/// use url::Url;
///
/// let base = Url::parse("https://example.com/comic/1").unwrap();
/// let img = resolve_url("../img/1.png", &base).unwrap();
/// assert_eq!(img.as_str(), "https://example.com/img/1.png");
/// ```
pub fn resolve_url(reference: &str, base: &Url) -> Option<Url> {
    let reference = reference.trim();
    if reference.is_empty() {
        return None;
    }

    base.join(reference).ok()
}

/// Normalizes a URL, returning it as a string
///
/// Falls back to the input when normalization fails, so callers comparing
/// already-stored URLs never lose a value.
pub fn normalize_or_keep(url_str: &str) -> String {
    normalize_url(url_str)
        .map(String::from)
        .unwrap_or_else(|_| url_str.to_string())
}
